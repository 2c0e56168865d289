//! Credential state for connected calendars

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// OAuth token state for one connection
///
/// Mutated in place by the credential manager on refresh; persisted through
/// the credential store port. `expiry_date` is epoch seconds, matching what
/// provider token endpoints hand back after arithmetic on `expires_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry_date: i64,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expiry_date: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry_date,
        }
    }

    /// A credential is expired the moment `expiry_date <= now`. No skew
    /// window: the refresh contract is exact.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now.timestamp()
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.expiry_date, 0).single().unwrap_or_else(Utc::now)
    }
}

/// The opaque credential blob stored on a [`crate::ConnectedCalendar`]
///
/// OAuth providers carry token state; CalDAV-family providers authenticate
/// with a username and an (app-specific) password; webcal feeds are plain
/// URLs; the internal provider needs nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialPayload {
    OAuth(Credential),
    Basic { username: String, password: String, base_url: String },
    Url { url: String },
    None,
}

impl CredentialPayload {
    /// The OAuth credential, when this payload carries one.
    pub fn as_oauth(&self) -> Option<&Credential> {
        match self {
            Self::OAuth(credential) => Some(credential),
            _ => None,
        }
    }
}

/// A served access token with its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}
