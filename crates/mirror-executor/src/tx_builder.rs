//! Plan-to-batch construction with chain-unit scaling.
//!
//! Scaling rules:
//! - Prices snap to the tick grid in human units, *inward*: BUY rounds
//!   down, SELL rounds up, so an order is never more aggressive than the
//!   planner intended. The snapped price then scales by `10^price_scale`.
//! - Quantities round down to the quantity tick, then scale by
//!   `10^base_decimals`.
//! - Creates that round to zero quantity or fall below the market's
//!   minimum notional are dropped, not failed.
//!
//! Cancels are advisory: refs that no longer match a live order are
//! dropped, and a plan that empties out entirely is reported as
//! [`BuildError::NothingToDo`] so the worker skips the broadcast without
//! consuming a sequence number.

use mirror_chain::{BatchOrders, ChainCancel, ChainOrder};
use mirror_core::{ActionPlan, Market, OpenOrder, OrderSide};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Every create and cancel was filtered out; nothing to broadcast.
    #[error("plan reduced to an empty batch")]
    NothingToDo,
}

/// Stateless batch constructor.
pub struct TxBuilder;

impl TxBuilder {
    /// Build the chain-unit batch for one plan.
    ///
    /// `open_orders` is the worker's view of its live orders from the same
    /// cycle; cancel refs outside it are stale and silently dropped.
    pub fn build(
        market: &Market,
        plan: &ActionPlan,
        open_orders: &[OpenOrder],
    ) -> Result<BatchOrders, BuildError> {
        let mut creates = Vec::with_capacity(plan.creates.len());
        for intent in &plan.creates {
            let rounded_price = match intent.side {
                OrderSide::Buy => intent.price.floor_to_tick(market.min_price_tick),
                OrderSide::Sell => intent.price.ceil_to_tick(market.min_price_tick),
            };
            let rounded_qty = intent.quantity.floor_to_tick(market.min_quantity_tick);
            let chain_price = market.scale_price(rounded_price);
            let chain_qty = market.scale_quantity(rounded_qty);

            if chain_qty.is_zero() {
                debug!(
                    market = %market.symbol,
                    side = %intent.side,
                    quantity = %intent.quantity,
                    "create dropped: quantity rounds to zero"
                );
                continue;
            }
            if chain_price * chain_qty < market.min_notional {
                debug!(
                    market = %market.symbol,
                    side = %intent.side,
                    price = %intent.price,
                    quantity = %intent.quantity,
                    "create dropped: below minimum notional"
                );
                continue;
            }

            creates.push(ChainOrder {
                market_id: market.testnet_market_id.clone(),
                side: intent.side,
                price: chain_price,
                quantity: chain_qty,
            });
        }

        let live: HashSet<&str> = open_orders
            .iter()
            .map(|o| o.order_hash.as_str())
            .collect();
        let cancels: Vec<ChainCancel> = plan
            .cancels
            .iter()
            .filter(|c| {
                let known = live.contains(c.order_hash.as_str());
                if !known {
                    debug!(
                        market = %market.symbol,
                        order_hash = %c.order_hash,
                        "cancel dropped: order no longer open"
                    );
                }
                known
            })
            .map(|c| ChainCancel {
                market_id: market.testnet_market_id.clone(),
                order_hash: c.order_hash.clone(),
            })
            .collect();

        if creates.is_empty() && cancels.is_empty() {
            return Err(BuildError::NothingToDo);
        }

        Ok(BatchOrders {
            market_type: market.market_type,
            creates,
            cancels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{
        CancelRef, CreateIntent, MarketId, MarketType, OrderHash, OrderState, Phase, Price, Size,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn inj_usdt() -> Market {
        Market {
            symbol: "INJ/USDT".to_string(),
            market_type: MarketType::Spot,
            testnet_market_id: MarketId::new("0xtest"),
            mainnet_market_id: MarketId::new("0xmain"),
            price_scale: 12,
            base_decimals: 18,
            quote_decimals: 6,
            min_price_tick: dec!(0.0001),
            min_quantity_tick: dec!(0.01),
            min_notional: dec!(0),
        }
    }

    fn plan(creates: Vec<CreateIntent>, cancels: Vec<CancelRef>) -> ActionPlan {
        ActionPlan {
            phase: Phase::Maintain,
            creates,
            cancels,
            rationale: String::new(),
        }
    }

    fn intent(side: OrderSide, price: Decimal, quantity: Decimal) -> CreateIntent {
        CreateIntent {
            side,
            price: Price::new(price),
            quantity: Size::new(quantity),
        }
    }

    fn open_order(hash: &str) -> OpenOrder {
        OpenOrder {
            order_hash: OrderHash::new(hash),
            side: OrderSide::Buy,
            price: Price::new(dec!(24.5)),
            quantity: Size::new(dec!(10)),
            filled_quantity: Size::ZERO,
            state: OrderState::Booked,
        }
    }

    #[test]
    fn test_tick_conformance() {
        let market = inj_usdt();
        let p = plan(
            vec![
                intent(OrderSide::Buy, dec!(24.56237), dec!(15.237)),
                intent(OrderSide::Sell, dec!(24.57011), dec!(8.555)),
            ],
            vec![],
        );

        let batch = TxBuilder::build(&market, &p, &[]).unwrap();
        assert_eq!(batch.creates.len(), 2);

        // Chain values must sit on the scaled tick grids.
        let chain_price_tick = market.min_price_tick * Decimal::from(10u64.pow(12));
        let chain_qty_tick = market.min_quantity_tick * Decimal::from(10u64.pow(18));
        for order in &batch.creates {
            assert_eq!(order.price % chain_price_tick, Decimal::ZERO);
            assert_eq!(order.quantity % chain_qty_tick, Decimal::ZERO);
        }

        // Off-grid inputs were actually snapped, not passed through.
        assert_eq!(
            batch.creates[0].price,
            dec!(24.5623) * Decimal::from(10u64.pow(12))
        );
        assert_eq!(
            batch.creates[0].quantity,
            dec!(15.23) * Decimal::from(10u64.pow(18))
        );
    }

    #[test]
    fn test_inward_rounding() {
        let market = inj_usdt();
        let scale = Decimal::from(10u64.pow(12));
        let p = plan(
            vec![
                intent(OrderSide::Buy, dec!(24.56237), dec!(10)),
                intent(OrderSide::Sell, dec!(24.56231), dec!(10)),
            ],
            vec![],
        );

        let batch = TxBuilder::build(&market, &p, &[]).unwrap();
        // Buy rounds down, sell rounds up.
        assert_eq!(batch.creates[0].price, dec!(24.5623) * scale);
        assert_eq!(batch.creates[1].price, dec!(24.5624) * scale);
        // Neither is more aggressive than the intent.
        assert!(batch.creates[0].price <= dec!(24.56237) * scale);
        assert!(batch.creates[1].price >= dec!(24.56231) * scale);
    }

    #[test]
    fn test_zero_quantity_dropped() {
        let market = inj_usdt();
        // 0.001 floors to zero against the 0.01 quantity tick.
        let p = plan(
            vec![
                intent(OrderSide::Buy, dec!(24.5), dec!(0.001)),
                intent(OrderSide::Buy, dec!(24.5), dec!(10)),
            ],
            vec![],
        );

        let batch = TxBuilder::build(&market, &p, &[]).unwrap();
        assert_eq!(batch.creates.len(), 1);
    }

    #[test]
    fn test_below_notional_dropped() {
        let mut market = inj_usdt();
        // Demand a notional no small order can meet (chain units: the
        // order below comes to 1e24).
        market.min_notional = dec!(10000000000000000000000000);
        let p = plan(
            vec![intent(OrderSide::Buy, dec!(0.0001), dec!(0.01))],
            vec![],
        );

        assert_eq!(
            TxBuilder::build(&market, &p, &[]),
            Err(BuildError::NothingToDo)
        );
    }

    #[test]
    fn test_stale_cancels_are_advisory() {
        let market = inj_usdt();
        let p = plan(
            vec![intent(OrderSide::Buy, dec!(24.5), dec!(10))],
            vec![
                CancelRef {
                    order_hash: OrderHash::new("0xlive"),
                },
                CancelRef {
                    order_hash: OrderHash::new("0xgone"),
                },
            ],
        );

        let batch = TxBuilder::build(&market, &p, &[open_order("0xlive")]).unwrap();
        assert_eq!(batch.cancels.len(), 1);
        assert_eq!(batch.cancels[0].order_hash.as_str(), "0xlive");
    }

    #[test]
    fn test_all_stale_cancels_and_no_creates_is_nothing_to_do() {
        let market = inj_usdt();
        let p = plan(
            vec![],
            vec![CancelRef {
                order_hash: OrderHash::new("0xgone"),
            }],
        );

        assert_eq!(
            TxBuilder::build(&market, &p, &[]),
            Err(BuildError::NothingToDo)
        );
    }

    #[test]
    fn test_empty_plan_is_nothing_to_do() {
        let market = inj_usdt();
        assert_eq!(
            TxBuilder::build(&market, &plan(vec![], vec![]), &[]),
            Err(BuildError::NothingToDo)
        );
    }

    #[test]
    fn test_batch_carries_market_type() {
        let mut market = inj_usdt();
        market.market_type = MarketType::Derivative;
        let p = plan(vec![intent(OrderSide::Buy, dec!(24.5), dec!(10))], vec![]);

        let batch = TxBuilder::build(&market, &p, &[]).unwrap();
        assert_eq!(batch.market_type, MarketType::Derivative);
    }
}
