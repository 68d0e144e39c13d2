//! Sequence-safe transaction construction and submission.
//!
//! Two pieces:
//! - [`SequenceController`]: owns the wallet's signing sequence number and
//!   hands it out under an exclusive lease, recovering from mismatches,
//!   timeout-height rejections, and silent drift.
//! - [`TxBuilder`]: turns an [`mirror_core::ActionPlan`] into a chain-unit
//!   batch, enforcing tick alignment and minimum notional, treating
//!   cancels as advisory.

pub mod sequence;
pub mod tx_builder;

pub use sequence::{RetryKind, SequenceController, SubmitError};
pub use tx_builder::{BuildError, TxBuilder};
