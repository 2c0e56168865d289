//! Provider adapters
//!
//! One module per provider family, each implementing the
//! [`calweave_core::CalendarAdapter`] capability trait, plus the factory
//! that maps a connection's provider and stored credential onto the right
//! implementation. iCloud rides on the CalDAV adapter with a different
//! default endpoint.

mod caldav;
mod factory;
mod google;
mod ics;
mod internal;
mod office365;
mod webcal;

pub use caldav::CalDavCalendarAdapter;
pub use factory::{CalendarAdapterFactory, ProviderEndpoints};
pub use google::GoogleCalendarAdapter;
pub use internal::{InternalCalendarAdapter, INTERNAL_CALENDAR_ID};
pub use office365::Office365CalendarAdapter;
pub use webcal::WebcalCalendarAdapter;
