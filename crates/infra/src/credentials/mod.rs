//! Credential lifecycle management
//!
//! Serves access tokens for OAuth connections. An expired token triggers at
//! most one refresh across any number of concurrent callers (single-flight);
//! a refresh the provider rejects as irrecoverable latches the connection as
//! revoked so nothing retries it until a new credential is supplied.

mod oauth;

use std::sync::Arc;

use calweave_common::{Clock, SingleFlight, SystemClock};
use calweave_core::ports::{CredentialStore, TokenRefresher};
use calweave_domain::{AccessToken, CalWeaveError, Credential, CredentialPayload, Provider, Result};
use dashmap::DashSet;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use oauth::OAuthTokenClient;

/// Serves access tokens, refreshing and persisting them as needed
pub struct CredentialManager {
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<Uuid, Credential, CalWeaveError>,
    revoked: DashSet<Uuid>,
}

impl CredentialManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_clock(refresher, store, Arc::new(SystemClock))
    }

    /// Build a manager with an explicit clock, useful for testing expiry
    /// with `MockClock`.
    pub fn with_clock(
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { refresher, store, clock, flights: SingleFlight::new(), revoked: DashSet::new() }
    }

    /// Serve a valid access token for an OAuth connection.
    ///
    /// A token that has not reached its expiry is returned as-is. An expired
    /// one is refreshed under single-flight: concurrent callers for the same
    /// connection await one provider round-trip and all receive the rotated
    /// credential, which is persisted through the store before anyone sees
    /// it. `AuthExpired` from the refresh latches the connection.
    #[instrument(skip(self, credential), fields(connection_id = %connection_id, %provider))]
    pub async fn get_token(
        &self,
        connection_id: Uuid,
        provider: Provider,
        credential: &Credential,
    ) -> Result<AccessToken> {
        if self.revoked.contains(&connection_id) {
            return Err(CalWeaveError::AuthExpired(
                "credential revoked; the connection must be re-authorized".into(),
            ));
        }

        if !credential.is_expired_at(self.clock.now_utc()) {
            return Ok(AccessToken {
                token: credential.access_token.clone(),
                expiry: credential.expiry(),
            });
        }

        let refresher = Arc::clone(&self.refresher);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let snapshot = credential.clone();
        let result = self
            .flights
            .run(connection_id, move || async move {
                // A sibling flight may have rotated the credential while we
                // waited; serve the stored one if it is already fresh.
                if let Some(CredentialPayload::OAuth(stored)) =
                    store.load(connection_id).await?
                {
                    if !stored.is_expired_at(clock.now_utc()) {
                        debug!(%connection_id, "stored credential already fresh");
                        return Ok(stored);
                    }
                }

                let rotated = refresher.refresh(provider, &snapshot).await?;
                store.persist(connection_id, &CredentialPayload::OAuth(rotated.clone())).await?;
                Ok(rotated)
            })
            .await;

        match result {
            Ok(rotated) => Ok(AccessToken {
                token: rotated.access_token.clone(),
                expiry: rotated.expiry(),
            }),
            Err(error) => {
                if matches!(error, CalWeaveError::AuthExpired(_)) {
                    warn!(%connection_id, "refresh rejected as irrecoverable, latching connection");
                    self.revoked.insert(connection_id);
                }
                Err(error)
            }
        }
    }

    /// Whether the connection is latched as revoked.
    pub fn is_revoked(&self, connection_id: Uuid) -> bool {
        self.revoked.contains(&connection_id)
    }

    /// Clear the revoked latch once a new credential has been stored,
    /// typically from the OAuth callback after the user reconnects.
    pub fn reinstate(&self, connection_id: Uuid) {
        if self.revoked.remove(&connection_id).is_some() {
            debug!(%connection_id, "connection reinstated after reconnect");
        }
    }
}
