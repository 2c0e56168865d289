//! Conversions from external infrastructure errors into domain errors.
//!
//! The HTTP status mapping lives in exactly one place, [`status_to_error`],
//! so every provider integration classifies failures the same way.

use calweave_common::TaskError;
use calweave_domain::CalWeaveError;
use reqwest::Error as HttpError;
use reqwest::StatusCode;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalWeaveError);

impl From<InfraError> for CalWeaveError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalWeaveError> for InfraError {
    fn from(value: CalWeaveError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCalWeaveError {
    fn into_calweave(self) -> CalWeaveError;
}

/// Map an HTTP response status into the provider error taxonomy.
///
/// `retry_after_secs` is the parsed `Retry-After` header when the caller had
/// one; it only matters for 429.
pub fn status_to_error(
    status: StatusCode,
    context: &str,
    retry_after_secs: Option<u64>,
) -> CalWeaveError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CalWeaveError::AuthExpired(format!("HTTP {status}: {context}"))
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            CalWeaveError::NotFound(format!("HTTP {status}: {context}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            CalWeaveError::rate_limited(format!("HTTP 429: {context}"), retry_after_secs)
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CalWeaveError::Validation(format!("HTTP {status}: {context}"))
        }
        StatusCode::REQUEST_TIMEOUT => {
            CalWeaveError::Transient(format!("HTTP {status}: {context}"))
        }
        status if status.is_server_error() => {
            CalWeaveError::Transient(format!("HTTP {status}: {context}"))
        }
        status if status.is_client_error() => {
            CalWeaveError::Validation(format!("HTTP {status}: {context}"))
        }
        status => CalWeaveError::Internal(format!("Unexpected HTTP {status}: {context}")),
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for HttpError {
    fn into_calweave(self) -> CalWeaveError {
        if self.is_timeout() {
            return CalWeaveError::Transient("HTTP request timed out".into());
        }
        if self.is_connect() {
            return CalWeaveError::Transient(format!("HTTP connection failure: {self}"));
        }
        if let Some(status) = self.status() {
            return status_to_error(status, &self.to_string(), None);
        }
        if self.is_decode() {
            return CalWeaveError::Serialization(format!("Failed to decode HTTP response: {self}"));
        }
        CalWeaveError::Transient(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for serde_json::Error {
    fn into_calweave(self) -> CalWeaveError {
        CalWeaveError::Serialization(format!("JSON error: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* quick_xml::Error → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for quick_xml::Error {
    fn into_calweave(self) -> CalWeaveError {
        CalWeaveError::Serialization(format!("XML error: {self}"))
    }
}

impl From<quick_xml::Error> for InfraError {
    fn from(value: quick_xml::Error) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* url::ParseError → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for url::ParseError {
    fn into_calweave(self) -> CalWeaveError {
        CalWeaveError::Validation(format!("Invalid URL: {self}"))
    }
}

impl From<url::ParseError> for InfraError {
    fn from(value: url::ParseError) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* toml::de::Error → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for toml::de::Error {
    fn into_calweave(self) -> CalWeaveError {
        CalWeaveError::Config(format!("Invalid TOML: {self}"))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for std::io::Error {
    fn into_calweave(self) -> CalWeaveError {
        CalWeaveError::Internal(format!("I/O error: {self}"))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* TaskError<CalWeaveError> → CalWeaveError */
/* -------------------------------------------------------------------------- */

impl IntoCalWeaveError for TaskError<CalWeaveError> {
    fn into_calweave(self) -> CalWeaveError {
        match self {
            TaskError::Task(inner) => inner,
            TaskError::Cancelled => {
                CalWeaveError::Internal("sync task cancelled before completion".into())
            }
            TaskError::Timeout { limit } => {
                CalWeaveError::Transient(format!("sync task exceeded {limit:?}"))
            }
        }
    }
}

impl From<TaskError<CalWeaveError>> for InfraError {
    fn from(value: TaskError<CalWeaveError>) -> Self {
        InfraError(value.into_calweave())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
