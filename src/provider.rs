use crate::{
    error::GateError,
    models::{AuthEvent, Session, SessionChange},
    supabase::SupabaseState,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{sync::broadcast, time::timeout};

/// IdentityProvider Trait
///
/// The external authentication service as seen by the session gate: a
/// one-shot probe of the current session and a continuous stream of session
/// changes. Dropping the receiver returned by `subscribe` unsubscribes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, GateError>;

    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;

    async fn sign_out(&self) -> Result<(), GateError>;
}

/// IdentityProviderState
pub type IdentityProviderState = Arc<dyn IdentityProvider>;

/// TabIdentityProvider
///
/// In-process provider for one browser tab. The tab forwards its auth events
/// to the service; `publish` records the new session and fans the change out
/// to subscribers. Sign-out also revokes the session at the auth vendor when
/// a client is attached; revocation is bounded by `revoke_timeout` and never
/// holds back the local `SIGNED_OUT`.
pub struct TabIdentityProvider {
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionChange>,
    revoker: Option<SupabaseState>,
    revoke_timeout: Duration,
}

impl TabIdentityProvider {
    pub fn new(initial: Option<Session>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            current: RwLock::new(initial),
            events,
            revoker: None,
            revoke_timeout: crate::supabase::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_revoker(mut self, client: SupabaseState) -> Self {
        self.revoker = Some(client);
        self
    }

    pub fn with_revoke_timeout(mut self, limit: Duration) -> Self {
        self.revoke_timeout = limit;
        self
    }

    /// publish
    ///
    /// Replaces the current session, then notifies subscribers. The write
    /// happens first so a probe racing with the notification never sees an
    /// older session than the one announced.
    pub fn publish(&self, event: AuthEvent, session: Option<Session>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session.clone();

        if self.events.send(SessionChange { event, session }).is_err() {
            tracing::debug!(?event, "session change published with no subscribers");
        }
    }
}

#[async_trait]
impl IdentityProvider for TabIdentityProvider {
    async fn current_session(&self) -> Result<Option<Session>, GateError> {
        let session = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        // An expired session is reported as no session.
        Ok(session.filter(|s| {
            let expired = s.is_expired(Utc::now());
            if expired {
                tracing::debug!(user_id = %s.user_id, "ignoring expired session");
            }
            !expired
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), GateError> {
        let token = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.access_token.clone());

        if let (Some(client), Some(token)) = (&self.revoker, token) {
            // Best effort: the local sign-out proceeds even if revocation fails.
            match timeout(self.revoke_timeout, client.sign_out(&token)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "remote sign-out failed"),
                Err(_) => tracing::warn!(
                    limit_ms = self.revoke_timeout.as_millis() as u64,
                    "remote sign-out timed out"
                ),
            }
        }

        self.publish(AuthEvent::SignedOut, None);
        Ok(())
    }
}
