//! OAuth token endpoint round-trips
//!
//! Plain form POSTs against the Google and Microsoft token endpoints for
//! refresh-token and authorization-code grants. The consent screen itself is
//! out of scope; this client only performs the server-to-server legs.

use async_trait::async_trait;
use calweave_core::ports::TokenRefresher;
use calweave_domain::{
    CalWeaveError, Credential, OAuthClientConfig, Provider, ProvidersConfig, Result,
};
use chrono::Utc;
use reqwest::{Method, Response};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{status_to_error, InfraError};
use crate::http::HttpClient;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_REFRESH_SCOPE: &str = "https://graph.microsoft.com/Calendars.ReadWrite offline_access";

/// Client for the OAuth token endpoints of the push-capable providers
pub struct OAuthTokenClient {
    http: HttpClient,
    providers: ProvidersConfig,
    google_token_url: String,
    microsoft_token_url: String,
}

impl OAuthTokenClient {
    pub fn new(http: HttpClient, providers: ProvidersConfig) -> Self {
        Self {
            http,
            providers,
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            microsoft_token_url: MICROSOFT_TOKEN_URL.to_string(),
        }
    }

    /// Point both token endpoints at another base, for tests.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.google_token_url.clone_from(&url);
        self.microsoft_token_url = url;
        self
    }

    fn client_for(&self, provider: Provider) -> Result<(&OAuthClientConfig, &str)> {
        let configured = match provider {
            Provider::Google => {
                self.providers.google.as_ref().map(|c| (c, self.google_token_url.as_str()))
            }
            Provider::Office365 => {
                self.providers.microsoft.as_ref().map(|c| (c, self.microsoft_token_url.as_str()))
            }
            _ => None,
        };
        configured.ok_or_else(|| {
            CalWeaveError::Config(format!("No OAuth client configured for provider {provider}"))
        })
    }

    /// Exchange an authorization code for an initial credential.
    ///
    /// Used by the OAuth callback route when a user connects a calendar.
    pub async fn exchange_code(&self, provider: Provider, code: &str) -> Result<Credential> {
        let (client, token_url) = self.client_for(provider)?;
        let redirect_uri = client.redirect_uri.as_deref().ok_or_else(|| {
            CalWeaveError::Config(format!("No redirect URI configured for provider {provider}"))
        })?;

        debug!(%provider, "exchanging authorization code");
        let request = self.http.request(Method::POST, token_url).form(&[
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ]);
        let response = self.http.send(request).await?;
        let token = parse_token_response(response).await?;
        token.into_credential(None)
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenClient {
    async fn refresh(&self, provider: Provider, credential: &Credential) -> Result<Credential> {
        let (client, token_url) = self.client_for(provider)?;

        let mut form = vec![
            ("client_id", client.client_id.clone()),
            ("client_secret", client.client_secret.clone()),
            ("refresh_token", credential.refresh_token.clone()),
            ("grant_type", "refresh_token".to_string()),
        ];
        if provider == Provider::Office365 {
            form.push(("scope", MICROSOFT_REFRESH_SCOPE.to_string()));
        }

        debug!(%provider, "refreshing OAuth access token");
        let response = self.http.send(self.http.request(Method::POST, token_url).form(&form)).await?;
        let token = parse_token_response(response).await?;
        token.into_credential(Some(&credential.refresh_token))
    }
}

/// Successful token endpoint payload, shared by both grant types
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Build a credential, falling back to the previous refresh token when
    /// the endpoint did not rotate it (Google usually does not).
    fn into_credential(self, previous_refresh_token: Option<&str>) -> Result<Credential> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_owned))
            .ok_or_else(|| {
                CalWeaveError::AuthExpired(
                    "token endpoint granted no refresh token; reconnect with offline access".into(),
                )
            })?;
        Ok(Credential::new(
            self.access_token,
            refresh_token,
            Utc::now().timestamp() + self.expires_in,
        ))
    }
}

/// Decode a token endpoint response, surfacing `invalid_grant` as
/// [`CalWeaveError::AuthExpired`] no matter which status carried it.
async fn parse_token_response(response: Response) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(300).collect();
        if body.contains("invalid_grant") {
            return Err(CalWeaveError::AuthExpired(format!(
                "token endpoint rejected the grant: {excerpt}"
            )));
        }
        return Err(status_to_error(status, &excerpt, None));
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|err| CalWeaveError::from(InfraError::from(err)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn providers_config() -> ProvidersConfig {
        ProvidersConfig {
            google: Some(OAuthClientConfig {
                client_id: "google-client".into(),
                client_secret: "google-secret".into(),
                redirect_uri: Some("https://app.example.com/oauth/callback".into()),
            }),
            microsoft: Some(OAuthClientConfig {
                client_id: "ms-client".into(),
                client_secret: "ms-secret".into(),
                redirect_uri: None,
            }),
        }
    }

    fn token_client(server_uri: &str) -> OAuthTokenClient {
        let http = HttpClient::builder()
            .max_attempts(1)
            .build()
            .expect("http client");
        OAuthTokenClient::new(http, providers_config()).with_token_url(format!("{server_uri}/token"))
    }

    #[tokio::test]
    async fn refresh_keeps_the_old_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-original"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-new",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let old = Credential::new("at-old", "rt-original", 0);
        let rotated = client.refresh(Provider::Google, &old).await.expect("refresh");

        assert_eq!(rotated.access_token, "at-new");
        assert_eq!(rotated.refresh_token, "rt-original");
        assert!(rotated.expiry_date > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn invalid_grant_maps_to_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let credential = Credential::new("at", "rt-dead", 0);
        let result = client.refresh(Provider::Google, &credential).await;

        assert!(matches!(result, Err(CalWeaveError::AuthExpired(_))));
    }

    #[tokio::test]
    async fn microsoft_refresh_sends_the_graph_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("scope="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "expires_in": 3599,
                "refresh_token": "rt-rotated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let credential = Credential::new("at", "rt", 0);
        let rotated = client.refresh(Provider::Office365, &credential).await.expect("refresh");
        assert_eq!(rotated.refresh_token, "rt-rotated");
    }

    #[tokio::test]
    async fn code_exchange_requires_a_redirect_uri() {
        let server = MockServer::start().await;
        let client = token_client(&server.uri());
        // Microsoft client is configured without a redirect URI
        let result = client.exchange_code(Provider::Office365, "auth-code").await;
        assert!(matches!(result, Err(CalWeaveError::Config(_))));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_a_config_error() {
        let http = HttpClient::new().expect("http client");
        let client = OAuthTokenClient::new(http, ProvidersConfig::default());
        let credential = Credential::new("at", "rt", 0);
        let result = client.refresh(Provider::Google, &credential).await;
        assert!(matches!(result, Err(CalWeaveError::Config(_))));
    }
}
