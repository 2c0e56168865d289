//! Infrastructure layer for CalWeave
//!
//! Everything behind the engine's ports lives here: the provider calendar
//! adapters (Google, Microsoft Graph, CalDAV, iCloud, webcal, internal),
//! OAuth credential management with single-flight refresh, the keyed sync
//! task pipeline and its reconciler, webhook ingestion with duplicate
//! suppression, the scheduled sweep, configuration loading, and in-memory
//! repository implementations used by the composition root and tests.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod providers;
pub mod repositories;
pub mod sync;

pub use credentials::{CredentialManager, OAuthTokenClient};
pub use errors::InfraError;
pub use http::HttpClient;
pub use providers::CalendarAdapterFactory;
pub use sync::{SyncScheduler, SyncService, WebhookIngest};
