//! Reconciliation diff logic
//!
//! The pure half of the orchestrator: comparing remote provider state
//! against last-known snapshots. Applying the resulting plan (storage
//! writes, notifications) happens in infrastructure.

pub mod diff;

pub use diff::{diff_remote_state, ReconcileInput, ReconcilePlan};
