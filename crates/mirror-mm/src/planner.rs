//! Phase classification and order generation.
//!
//! The planner is deliberately free of IO: it sees one cycle's
//! observations and produces one plan. The worker owns fetching,
//! scaling, and broadcasting.

use crate::MarketParams;
use mirror_core::{
    ActionPlan, CancelRef, CreateIntent, Market, OpenOrder, OrderSide, OrderbookSnapshot, Phase,
    Price, PriceSample, Size,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Gap beyond which a deep book gets actively moved.
const MOVE_GAP_THRESHOLD: Decimal = Decimal::from_parts(15, 0, 0, false, 2); // 0.15
/// A book thinner than this cannot absorb a move; build instead.
const MOVE_MIN_TOTAL: usize = 30;
/// Book totals below this mean depth is still missing.
const BUILD_TOTAL_MIN: usize = 50;
/// Near-price orders below this mean depth is in the wrong place.
const BUILD_NEAR_MIN: usize = 20;

struct BuildTier {
    lo_bps: u32,
    hi_bps: u32,
    levels: usize,
    size_pct: u32,
}

/// Five-tier staircase: tight and small near the mid, wide and heavy out.
const BUILD_TIERS: [BuildTier; 5] = [
    BuildTier { lo_bps: 1, hi_bps: 10, levels: 5, size_pct: 80 },
    BuildTier { lo_bps: 10, hi_bps: 50, levels: 5, size_pct: 130 },
    BuildTier { lo_bps: 50, hi_bps: 150, levels: 2, size_pct: 200 },
    BuildTier { lo_bps: 150, hi_bps: 300, levels: 1, size_pct: 300 },
    BuildTier { lo_bps: 300, hi_bps: 500, levels: 1, size_pct: 450 },
];

/// Spread bands the maintenance phase rotates through, in bps.
const MAINTAIN_STAGES: [(u32, u32); 4] = [(50, 150), (150, 300), (300, 500), (500, 800)];

/// Everything the planner sees for one cycle.
pub struct PlanInputs<'a> {
    pub market: &'a Market,
    pub params: &'a MarketParams,
    pub sample: &'a PriceSample,
    pub snapshot: &'a OrderbookSnapshot,
    pub own_orders: &'a [OpenOrder],
    pub max_open_orders: usize,
}

/// Per-worker strategy state: a seeded RNG plus the rotating maintenance
/// stage for each market.
pub struct Planner {
    rng: ChaCha8Rng,
    stages: HashMap<String, usize>,
}

impl Planner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            stages: HashMap::new(),
        }
    }

    /// Classify the market state and produce this cycle's plan.
    pub fn plan(&mut self, inputs: &PlanInputs<'_>) -> ActionPlan {
        let Some(mainnet) = inputs.sample.mainnet_mid else {
            return ActionPlan::idle("mainnet mid unavailable");
        };
        // Present whenever the mainnet mid is.
        let gap = inputs.sample.gap().unwrap_or_default();
        let snapshot = inputs.snapshot;

        let mut plan = if gap > MOVE_GAP_THRESHOLD && snapshot.total_orders >= MOVE_MIN_TOTAL {
            self.move_phase(inputs, mainnet, gap)
        } else if snapshot.total_orders < BUILD_TOTAL_MIN
            || snapshot.orders_near_price < BUILD_NEAR_MIN
        {
            self.build_phase(inputs, mainnet, gap)
        } else {
            self.maintain_phase(inputs, mainnet, gap)
        };

        dedup_creates(&mut plan.creates, inputs.own_orders, inputs.market);

        if plan.phase == Phase::Build {
            let headroom = inputs
                .max_open_orders
                .saturating_sub(inputs.own_orders.len());
            if plan.creates.len() > headroom {
                debug!(
                    market = %inputs.market.symbol,
                    dropped = plan.creates.len() - headroom,
                    "build creates capped by max open orders"
                );
                // Creates are ordered tight to wide; drop the widest first.
                plan.creates.truncate(headroom);
            }
        }

        plan
    }

    /// Shift the testnet price toward mainnet: cancel the orders propping
    /// up the wrong price, quote tight on the correcting side only.
    fn move_phase(&mut self, inputs: &PlanInputs<'_>, mainnet: Price, gap: Decimal) -> ActionPlan {
        let testnet = inputs.sample.testnet_mid.unwrap_or(mainnet);
        let side = if testnet > mainnet {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };

        let n_cancels = self.rng.gen_range(8..=12usize);
        let mut by_distance: Vec<&OpenOrder> = inputs.own_orders.iter().collect();
        by_distance.sort_by(|a, b| {
            b.price
                .distance(mainnet)
                .cmp(&a.price.distance(mainnet))
                .then_with(|| b.quantity.cmp(&a.quantity))
                .then_with(|| a.order_hash.as_str().cmp(b.order_hash.as_str()))
        });
        let cancels: Vec<CancelRef> = by_distance
            .into_iter()
            .take(n_cancels)
            .map(|o| CancelRef {
                order_hash: o.order_hash.clone(),
            })
            .collect();

        let n_creates = self.rng.gen_range(6..=10usize);
        let mut creates = Vec::with_capacity(n_creates);
        for _ in 0..n_creates {
            let spread = self.spread_between(10, 100);
            let price = match side {
                OrderSide::Sell => mainnet * (Decimal::ONE + spread),
                OrderSide::Buy => mainnet * (Decimal::ONE - spread),
            };
            let mult = Decimal::from(self.rng.gen_range(50..=100u32)) / Decimal::ONE_HUNDRED;
            creates.push(CreateIntent {
                side,
                price,
                quantity: Size::new(inputs.params.base_order_size * mult),
            });
        }

        ActionPlan {
            phase: Phase::Move,
            creates,
            cancels,
            rationale: format!(
                "gap {:.2}% on {} resting orders, correcting with {} quotes",
                gap * Decimal::ONE_HUNDRED,
                inputs.snapshot.total_orders,
                side
            ),
        }
    }

    /// Seed a sparse book: a symmetric five-tier staircase around the
    /// mainnet mid, no cancels.
    fn build_phase(&mut self, inputs: &PlanInputs<'_>, mainnet: Price, gap: Decimal) -> ActionPlan {
        let mut creates = Vec::with_capacity(28);
        for tier in &BUILD_TIERS {
            let size_mult = Decimal::from(tier.size_pct) / Decimal::ONE_HUNDRED;
            for _ in 0..tier.levels {
                let spread = self.spread_between(tier.lo_bps, tier.hi_bps);
                let bid = mainnet * (Decimal::ONE - spread);
                let ask = mainnet * (Decimal::ONE + spread);
                for (side, price) in [(OrderSide::Buy, bid), (OrderSide::Sell, ask)] {
                    let jitter =
                        Decimal::from(self.rng.gen_range(90..=110u32)) / Decimal::ONE_HUNDRED;
                    creates.push(CreateIntent {
                        side,
                        price,
                        quantity: Size::new(inputs.params.base_order_size * size_mult * jitter),
                    });
                }
            }
        }

        ActionPlan {
            phase: Phase::Build,
            creates,
            cancels: Vec::new(),
            rationale: format!(
                "sparse book ({} total, {} near, gap {:.2}%), seeding staircase around {}",
                inputs.snapshot.total_orders,
                inputs.snapshot.orders_near_price,
                gap * Decimal::ONE_HUNDRED,
                mainnet
            ),
        }
    }

    /// Depth is healthy: rotate small orders through widening spread
    /// bands, retiring orders that sit outside the current band.
    fn maintain_phase(
        &mut self,
        inputs: &PlanInputs<'_>,
        mainnet: Price,
        gap: Decimal,
    ) -> ActionPlan {
        let symbol = &inputs.market.symbol;
        let stage = *self.stages.get(symbol).unwrap_or(&0);
        let (lo_bps, hi_bps) = MAINTAIN_STAGES[stage % MAINTAIN_STAGES.len()];

        let n_per_side = self.rng.gen_range(5..=8usize);
        let mut creates = Vec::with_capacity(n_per_side * 2);
        for _ in 0..n_per_side {
            let spread = self.spread_between(lo_bps, hi_bps);
            let mult = Decimal::from(self.rng.gen_range(20..=50u32)) / Decimal::ONE_HUNDRED;
            let quantity = Size::new(inputs.params.base_order_size * mult);
            creates.push(CreateIntent {
                side: OrderSide::Buy,
                price: mainnet * (Decimal::ONE - spread),
                quantity,
            });
            creates.push(CreateIntent {
                side: OrderSide::Sell,
                price: mainnet * (Decimal::ONE + spread),
                quantity,
            });
        }

        // Retire orders outside the current band first, farthest out first.
        let band_lo = Decimal::from(lo_bps) / Decimal::from(10_000u32);
        let band_hi = Decimal::from(hi_bps) / Decimal::from(10_000u32);
        let in_band = |order: &OpenOrder| {
            order
                .price
                .gap_from(mainnet)
                .map(|g| g >= band_lo && g <= band_hi)
                .unwrap_or(false)
        };

        let mut candidates: Vec<&OpenOrder> = inputs.own_orders.iter().collect();
        candidates.sort_by(|a, b| {
            in_band(a)
                .cmp(&in_band(b))
                .then_with(|| b.price.distance(mainnet).cmp(&a.price.distance(mainnet)))
                .then_with(|| a.order_hash.as_str().cmp(b.order_hash.as_str()))
        });
        let n_cancels = self.rng.gen_range(4..=6usize);
        let cancels: Vec<CancelRef> = candidates
            .into_iter()
            .take(n_cancels)
            .map(|o| CancelRef {
                order_hash: o.order_hash.clone(),
            })
            .collect();

        self.stages.insert(symbol.clone(), stage + 1);

        ActionPlan {
            phase: Phase::Maintain,
            creates,
            cancels,
            rationale: format!(
                "aligned (gap {:.2}%), rotating depth stage {} ({}-{} bps)",
                gap * Decimal::ONE_HUNDRED,
                stage % MAINTAIN_STAGES.len(),
                lo_bps,
                hi_bps
            ),
        }
    }

    /// Uniform spread in `[lo_bps, hi_bps]`, sampled in tenths of a bps
    /// so the result stays an exact decimal.
    fn spread_between(&mut self, lo_bps: u32, hi_bps: u32) -> Decimal {
        let tenths = self.rng.gen_range(lo_bps * 10..=hi_bps * 10);
        Decimal::from(tenths) / Decimal::from(100_000u32)
    }
}

/// Drop creates that duplicate a resting order: same side, price within
/// one tick.
fn dedup_creates(creates: &mut Vec<CreateIntent>, own_orders: &[OpenOrder], market: &Market) {
    if own_orders.is_empty() {
        return;
    }
    let tick = market.human_price_tick();
    creates.retain(|intent| {
        !own_orders
            .iter()
            .any(|o| o.side == intent.side && o.price.distance(intent.price) < tick)
    });
}
