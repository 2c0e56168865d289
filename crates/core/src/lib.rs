//! Core business logic for CalWeave
//!
//! This crate holds the provider-agnostic heart of the engine: the port
//! traits that infrastructure implements (repositories, notification,
//! credential storage, the calendar adapter capability set) and the pure
//! domain services built on top of them (interval merging, availability,
//! reconciliation diffing). Nothing in here performs I/O directly.

pub mod availability;
pub mod calendar_ports;
pub mod ports;
pub mod sync;

pub use availability::{free_windows, merge_slots, Availability, AvailabilityService};
pub use calendar_ports::{AdapterFactory, CalendarAdapter, EventDelta};
pub use sync::{diff_remote_state, ReconcileInput, ReconcilePlan};
