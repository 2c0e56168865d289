//! Domain types and models

pub mod calendar;
pub mod credential;
pub mod event;
pub mod meeting;
pub mod sync;
pub mod webhook;

pub use calendar::{Account, CalendarListing, CalendarSyncInfo, ConnectedCalendar, SubCalendar};
pub use credential::{AccessToken, Credential, CredentialPayload};
pub use event::{
    BusyInterval, CreateEventRequest, CreatedEvent, EventAttendee, EventIdentity, EventPatch,
    Provider, TimeRange, UnifiedEvent,
};
pub use meeting::{Meeting, MeetingPayload, MeetingStatus};
pub use sync::{CalendarSyncState, KnownEvent, SyncTask, SyncTaskKind};
pub use webhook::{
    AccountNotification, NotificationKind, WebhookChannel, WebhookNotification,
    WebhookRegistration,
};
