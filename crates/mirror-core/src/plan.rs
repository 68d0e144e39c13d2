//! Planner output: one batched mutation of the worker's own orders.

use crate::{OrderHash, OrderSide, Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy phase chosen for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Shift the testnet price toward mainnet.
    Move,
    /// Seed a sparse book with a full staircase.
    Build,
    /// Rotate depth through widening spread bands.
    Maintain,
    /// Nothing to do this cycle (no reference price).
    Idle,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Build => write!(f, "build"),
            Self::Maintain => write!(f, "maintain"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// A single order the planner wants created, in human units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIntent {
    pub side: OrderSide,
    pub price: Price,
    pub quantity: Size,
}

/// Reference to one of the worker's own orders to cancel.
///
/// Advisory: the transaction builder drops refs that no longer match a
/// live order instead of failing the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRef {
    pub order_hash: OrderHash,
}

/// The planner's decision for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub phase: Phase,
    pub creates: Vec<CreateIntent>,
    pub cancels: Vec<CancelRef>,
    /// One-line explanation logged before broadcast.
    pub rationale: String,
}

impl ActionPlan {
    pub fn idle(rationale: impl Into<String>) -> Self {
        Self {
            phase: Phase::Idle,
            creates: Vec::new(),
            cancels: Vec::new(),
            rationale: rationale.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.cancels.is_empty()
    }
}
