//! Session gate: who is signed in, what role they hold, and whether their
//! health-quiz answers are recent enough.
//!
//! The gate listens to two asynchronous inputs, an initial session probe and
//! the provider's session-change subscription, and funnels both into one
//! reducer ([`state::GateState`]). Freshness lookups run as background tasks
//! and are committed only if the identity they were issued for is still the
//! current one.

pub mod state;

use crate::{
    error::{GateError, StoreFailure},
    freshness::FreshnessPolicy,
    models::{GateSnapshot, SessionChange},
    provider::IdentityProviderState,
    repository::ProfileStoreState,
};
use chrono::{DateTime, Utc};
use state::{FreshnessRequest, GateMessage, GateState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::timeout,
};

struct GateInner {
    provider: IdentityProviderState,
    store: ProfileStoreState,
    policy: FreshnessPolicy,
    state: Mutex<GateState>,
    changes: watch::Sender<GateSnapshot>,
}

/// SessionGate
///
/// Cheap to clone; every clone reads and drives the same state. Obtain one
/// through [`SessionGate::initialize`], which also hands back the
/// [`GateHandle`] that owns the gate's lifetime.
#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<GateInner>,
}

impl SessionGate {
    /// initialize
    ///
    /// Subscribes to the provider's session changes, then probes the current
    /// session in the background. Subscribing first means no change emitted
    /// while the probe is in flight is lost; the probe result is discarded if
    /// such a change has already been applied.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(
        provider: IdentityProviderState,
        store: ProfileStoreState,
        policy: FreshnessPolicy,
    ) -> GateHandle {
        let state = GateState::new();
        let (changes, _) = watch::channel(state.snapshot(&policy, Utc::now()));
        let gate = SessionGate {
            inner: Arc::new(GateInner {
                provider,
                store,
                policy,
                state: Mutex::new(state),
                changes,
            }),
        };

        let events = gate.inner.provider.subscribe();
        gate.spawn_probe();
        let driver = tokio::spawn(gate.clone().drive(events));

        GateHandle {
            gate,
            driver: Some(driver),
        }
    }

    /// Current derived state, freshness evaluated against the wall clock.
    pub fn snapshot(&self) -> GateSnapshot {
        self.lock().snapshot(&self.inner.policy, Utc::now())
    }

    /// Number of committed transitions so far.
    pub fn revision(&self) -> u64 {
        self.lock().revision()
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.inner.policy
    }

    /// Receiver that observes every committed snapshot.
    pub fn watch(&self) -> watch::Receiver<GateSnapshot> {
        self.inner.changes.subscribe()
    }

    /// settled
    ///
    /// Resolves once the snapshot is no longer loading. Callers that cannot
    /// wait indefinitely should wrap this in a timeout.
    pub async fn settled(&self) -> GateSnapshot {
        let mut rx = self.watch();
        let closed = rx.wait_for(|s| !s.is_loading).await.is_err();
        if closed {
            tracing::debug!("gate snapshot channel closed while waiting to settle");
        }
        self.snapshot()
    }

    /// on_session_changed
    ///
    /// Entry point for provider events. Replaying the same event is harmless:
    /// an unchanged identity id does not trigger another freshness lookup.
    pub fn on_session_changed(&self, change: SessionChange) {
        tracing::debug!(
            event = ?change.event,
            user_id = change.session.as_ref().map(|s| s.user_id.as_str()),
            "session change"
        );
        self.dispatch(GateMessage::SessionChanged(change));
    }

    /// record_quiz_completion
    ///
    /// Called once the quiz form has saved. No-op unless `user_id` is the
    /// identity this gate currently holds.
    pub fn record_quiz_completion(&self, user_id: &str, completed_at: DateTime<Utc>) {
        self.dispatch(GateMessage::QuizCompleted {
            user_id: user_id.to_string(),
            completed_at,
        });
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, msg: GateMessage) {
        let result = {
            let mut state = self.lock();
            let result = state.apply(msg);
            if result.is_ok() {
                // Published under the lock so observers see commits in order.
                self.inner
                    .changes
                    .send_replace(state.snapshot(&self.inner.policy, Utc::now()));
            }
            result
        };

        match result {
            Ok(Some(request)) => self.spawn_freshness_fetch(request),
            Ok(None) => {}
            Err(GateError::StaleResultDiscarded) => tracing::debug!("stale gate result discarded"),
            Err(GateError::Disposed) => tracing::debug!("gate disposed, result dropped"),
            Err(e) => tracing::warn!(error = %e, "gate transition rejected"),
        }
    }

    fn spawn_probe(&self) {
        let issued_seq = self.lock().session_seq();
        let gate = self.clone();
        tokio::spawn(async move {
            let probe = gate.inner.provider.current_session();
            let result = match timeout(gate.inner.policy.fetch_timeout, probe).await {
                Ok(result) => result,
                Err(_) => Err(GateError::ProviderUnavailable("session probe timed out".into())),
            };
            if let Err(e) = &result {
                tracing::warn!(error = %e, "session probe failed, continuing signed out");
            }
            gate.dispatch(GateMessage::Probed { issued_seq, result });
        });
    }

    fn spawn_freshness_fetch(&self, request: FreshnessRequest) {
        let gate = self.clone();
        tokio::spawn(async move {
            let lookup = gate.inner.store.get_quiz_completion(&request.user_id);
            let result = match timeout(gate.inner.policy.fetch_timeout, lookup).await {
                Ok(result) => result,
                Err(_) => Err(StoreFailure::Other("freshness lookup timed out".into())),
            };
            if let Err(failure @ StoreFailure::Other(_)) = &result {
                let error = GateError::from(failure.clone());
                tracing::warn!(
                    user_id = %request.user_id,
                    error = %error,
                    "freshness lookup failed, treating quiz as not fresh"
                );
            }
            gate.dispatch(GateMessage::FreshnessResolved { request, result });
        });
    }

    async fn drive(self, mut events: broadcast::Receiver<SessionChange>) {
        loop {
            match events.recv().await {
                Ok(change) => self.on_session_changed(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "session subscription lagged, re-probing");
                    self.spawn_probe();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("identity provider closed the session subscription");
                    break;
                }
            }
        }
    }
}

/// GateHandle
///
/// Owns the gate's subscription. `dispose` consumes the handle, so it runs at
/// most once; a handle dropped without `dispose` is disposed on drop. After
/// disposal no probe, event or freshness result can change the gate's state.
pub struct GateHandle {
    gate: SessionGate,
    driver: Option<JoinHandle<()>>,
}

impl GateHandle {
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Mark first: tasks already past their await must find the gate closed.
            self.gate.lock().dispose();
            // Aborting the driver drops the receiver, which unsubscribes.
            driver.abort();
            tracing::debug!("session gate disposed");
        }
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.release();
    }
}
