//! Port implementations backing the engine
//!
//! The engine never prescribes a storage format; these in-memory
//! implementations serve the composition root and the test suites. A
//! deployment with durable storage swaps them behind the same ports.

mod memory;

pub use memory::{
    InMemoryAccountRepository, InMemoryConnectedCalendarRepository, InMemoryCredentialStore,
    InMemoryKnownEventRepository, InMemoryMeetingRepository, InMemorySyncInfoRepository,
    LogNotificationPort, RecordingNotificationPort,
};
