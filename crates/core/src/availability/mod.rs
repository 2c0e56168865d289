//! Busy-interval merging and availability computation

pub mod merge;
pub mod service;

pub use merge::{free_windows, merge_slots};
pub use service::{Availability, AvailabilityService};
