//! CalWeave HTTP application
//!
//! Composition root and axum surface for the engine: webhook intake,
//! the OAuth code-exchange callback, availability reads, the booking
//! endpoints, and health. The binary in `main.rs` wires a context,
//! starts the sweep scheduler, and serves the router.

pub mod context;
pub mod routes;

pub use context::{AppContext, ConnectionCredentialStore, PendingConnection};
