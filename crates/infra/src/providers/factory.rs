//! Adapter construction from connection records

use std::sync::Arc;

use async_trait::async_trait;
use calweave_core::ports::MeetingRepository;
use calweave_core::{AdapterFactory, CalendarAdapter};
use calweave_domain::{CalWeaveError, ConnectedCalendar, CredentialPayload, Provider, Result};

use crate::credentials::CredentialManager;
use crate::http::HttpClient;
use crate::providers::{
    CalDavCalendarAdapter, GoogleCalendarAdapter, InternalCalendarAdapter,
    Office365CalendarAdapter, WebcalCalendarAdapter,
};

/// Provider API endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub google_base: Option<String>,
    pub microsoft_base: Option<String>,
    /// Used when an iCloud connection does not carry its own DAV URL.
    pub icloud_caldav_base: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            google_base: None,
            microsoft_base: None,
            icloud_caldav_base: "https://caldav.icloud.com".to_string(),
        }
    }
}

/// Builds one adapter per connection, keyed on the connection's provider.
///
/// Construction validates that the stored credential payload matches what
/// the provider needs; a mismatch is a `Validation` error rather than a
/// latent panic deep inside a sync pass.
pub struct CalendarAdapterFactory {
    http: HttpClient,
    credentials: Arc<CredentialManager>,
    meetings: Arc<dyn MeetingRepository>,
    endpoints: ProviderEndpoints,
}

impl CalendarAdapterFactory {
    pub fn new(
        http: HttpClient,
        credentials: Arc<CredentialManager>,
        meetings: Arc<dyn MeetingRepository>,
    ) -> Self {
        Self { http, credentials, meetings, endpoints: ProviderEndpoints::default() }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn oauth_credential(connection: &ConnectedCalendar) -> Result<calweave_domain::Credential> {
        connection.payload.as_oauth().cloned().ok_or_else(|| {
            CalWeaveError::Validation(format!(
                "Connection {} ({}) has no OAuth credential",
                connection.id, connection.provider
            ))
        })
    }
}

#[async_trait]
impl AdapterFactory for CalendarAdapterFactory {
    async fn adapter_for(
        &self,
        connection: &ConnectedCalendar,
    ) -> Result<Arc<dyn CalendarAdapter>> {
        match connection.provider {
            Provider::Google => {
                let credential = Self::oauth_credential(connection)?;
                let mut adapter = GoogleCalendarAdapter::new(
                    self.http.clone(),
                    self.credentials.clone(),
                    connection.id,
                    &connection.email,
                    credential,
                );
                if let Some(base) = &self.endpoints.google_base {
                    adapter = adapter.with_base_url(base);
                }
                Ok(Arc::new(adapter))
            }
            Provider::Office365 => {
                let credential = Self::oauth_credential(connection)?;
                let mut adapter = Office365CalendarAdapter::new(
                    self.http.clone(),
                    self.credentials.clone(),
                    connection.id,
                    &connection.email,
                    credential,
                );
                if let Some(base) = &self.endpoints.microsoft_base {
                    adapter = adapter.with_base_url(base);
                }
                Ok(Arc::new(adapter))
            }
            Provider::Caldav | Provider::Icloud => {
                let CredentialPayload::Basic { username, password, base_url } = &connection.payload
                else {
                    return Err(CalWeaveError::Validation(format!(
                        "Connection {} ({}) has no username/password credential",
                        connection.id, connection.provider
                    )));
                };
                let base_url = if base_url.is_empty() {
                    if connection.provider == Provider::Icloud {
                        self.endpoints.icloud_caldav_base.clone()
                    } else {
                        return Err(CalWeaveError::Validation(format!(
                            "Connection {} has no CalDAV endpoint",
                            connection.id
                        )));
                    }
                } else {
                    base_url.clone()
                };
                Ok(Arc::new(CalDavCalendarAdapter::new(
                    self.http.clone(),
                    connection.provider,
                    &connection.email,
                    username,
                    password,
                    base_url,
                )))
            }
            Provider::Webcal => {
                let CredentialPayload::Url { url } = &connection.payload else {
                    return Err(CalWeaveError::Validation(format!(
                        "Connection {} (webcal) has no feed URL",
                        connection.id
                    )));
                };
                Ok(Arc::new(WebcalCalendarAdapter::new(
                    self.http.clone(),
                    &connection.email,
                    url,
                )))
            }
            Provider::Internal => Ok(Arc::new(InternalCalendarAdapter::new(
                self.meetings.clone(),
                &connection.account_address,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use calweave_core::ports::{CredentialStore, TokenRefresher};
    use calweave_domain::Credential;
    use uuid::Uuid;

    use crate::repositories::InMemoryMeetingRepository;

    use super::*;

    struct NeverRefresh;

    #[async_trait]
    impl TokenRefresher for NeverRefresh {
        async fn refresh(
            &self,
            _provider: Provider,
            _credential: &Credential,
        ) -> Result<Credential> {
            Err(CalWeaveError::Internal("refresh not expected in this test".into()))
        }
    }

    struct NullStore;

    #[async_trait]
    impl CredentialStore for NullStore {
        async fn load(&self, _connection_id: Uuid) -> Result<Option<CredentialPayload>> {
            Ok(None)
        }

        async fn persist(
            &self,
            _connection_id: Uuid,
            _payload: &CredentialPayload,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn factory() -> CalendarAdapterFactory {
        CalendarAdapterFactory::new(
            HttpClient::new().expect("http client"),
            Arc::new(CredentialManager::new(Arc::new(NeverRefresh), Arc::new(NullStore))),
            Arc::new(InMemoryMeetingRepository::default()),
        )
    }

    fn connection(provider: Provider, payload: CredentialPayload) -> ConnectedCalendar {
        ConnectedCalendar {
            id: Uuid::now_v7(),
            account_address: "heidi@example.com".into(),
            provider,
            email: "heidi@example.com".into(),
            payload,
            calendars: vec![],
            active: true,
        }
    }

    #[tokio::test]
    async fn each_provider_gets_its_adapter() {
        let factory = factory();

        let google = connection(
            Provider::Google,
            CredentialPayload::OAuth(Credential::new("at", "rt", 4_102_444_800)),
        );
        assert_eq!(factory.adapter_for(&google).await.unwrap().provider(), Provider::Google);

        let webcal = connection(
            Provider::Webcal,
            CredentialPayload::Url { url: "webcal://example.com/feed.ics".into() },
        );
        assert_eq!(factory.adapter_for(&webcal).await.unwrap().provider(), Provider::Webcal);

        let internal = connection(Provider::Internal, CredentialPayload::None);
        assert_eq!(factory.adapter_for(&internal).await.unwrap().provider(), Provider::Internal);
    }

    #[tokio::test]
    async fn icloud_without_an_endpoint_uses_the_default_dav_base() {
        let factory = factory();
        let icloud = connection(
            Provider::Icloud,
            CredentialPayload::Basic {
                username: "heidi@icloud.com".into(),
                password: "app-pass".into(),
                base_url: String::new(),
            },
        );
        let adapter = factory.adapter_for(&icloud).await.unwrap();
        assert_eq!(adapter.provider(), Provider::Icloud);
    }

    #[tokio::test]
    async fn mismatched_payload_is_a_validation_error() {
        let factory = factory();
        let broken = connection(Provider::Google, CredentialPayload::None);
        let err = factory.adapter_for(&broken).await.expect_err("payload mismatch");
        assert!(matches!(err, CalWeaveError::Validation(_)));

        let caldav_without_endpoint = connection(
            Provider::Caldav,
            CredentialPayload::Basic {
                username: "heidi".into(),
                password: "pw".into(),
                base_url: String::new(),
            },
        );
        let err = factory
            .adapter_for(&caldav_without_endpoint)
            .await
            .expect_err("generic CalDAV needs an endpoint");
        assert!(matches!(err, CalWeaveError::Validation(_)));
    }
}
