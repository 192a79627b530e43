use crate::{
    freshness::FreshnessPolicy,
    gate::{GateHandle, SessionGate},
    models::{AuthEvent, Session},
    provider::{IdentityProvider, TabIdentityProvider},
    repository::ProfileStoreState,
    supabase::SupabaseState,
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use uuid::Uuid;

/// Tabs kept open at most, unless configured otherwise.
pub const DEFAULT_MAX_TABS: usize = 10_000;
/// A tab nobody has asked about for this long is closed by the sweeper.
pub const DEFAULT_TAB_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Tab
///
/// One browser tab's gate together with the provider its events feed.
struct Tab {
    provider: Arc<TabIdentityProvider>,
    handle: GateHandle,
    last_seen: Mutex<Instant>,
}

impl Tab {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// GateRegistry
///
/// All open tab gates, keyed by the tab id handed out at open time. Each tab
/// gets its own provider and gate; the profile store is shared.
///
/// Browser tabs close without saying so, so every lookup refreshes the tab's
/// last-seen time and `sweep_idle` disposes the ones left behind. The number
/// of open tabs is capped at `max_tabs`.
pub struct GateRegistry {
    tabs: RwLock<HashMap<Uuid, Tab>>,
    store: ProfileStoreState,
    policy: FreshnessPolicy,
    event_capacity: usize,
    revoker: Option<SupabaseState>,
    max_tabs: usize,
    idle_ttl: Duration,
}

/// GateRegistryState
pub type GateRegistryState = Arc<GateRegistry>;

impl GateRegistry {
    pub fn new(store: ProfileStoreState, policy: FreshnessPolicy, event_capacity: usize) -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
            store,
            policy,
            event_capacity,
            revoker: None,
            max_tabs: DEFAULT_MAX_TABS,
            idle_ttl: DEFAULT_TAB_IDLE_TTL,
        }
    }

    /// Tabs opened from now on revoke their session at the auth vendor on sign-out.
    pub fn with_revoker(mut self, client: SupabaseState) -> Self {
        self.revoker = Some(client);
        self
    }

    pub fn with_limits(mut self, max_tabs: usize, idle_ttl: Duration) -> Self {
        self.max_tabs = max_tabs;
        self.idle_ttl = idle_ttl;
        self
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// open
    ///
    /// Starts a gate whose first probe will see `initial`. Returns `None`
    /// when `max_tabs` gates are already open.
    pub fn open(&self, initial: Option<Session>) -> Option<(Uuid, SessionGate)> {
        let mut tabs = self.tabs.write().unwrap_or_else(PoisonError::into_inner);
        if tabs.len() >= self.max_tabs {
            tracing::warn!(open = tabs.len(), max = self.max_tabs, "tab limit reached");
            return None;
        }

        // Revocation shares the gate's fetch bound.
        let mut provider = TabIdentityProvider::new(initial, self.event_capacity)
            .with_revoke_timeout(self.policy.fetch_timeout);
        if let Some(client) = &self.revoker {
            provider = provider.with_revoker(client.clone());
        }
        let provider = Arc::new(provider);

        let handle = SessionGate::initialize(provider.clone(), self.store.clone(), self.policy);
        let gate = handle.gate().clone();
        let tab_id = Uuid::new_v4();

        tabs.insert(
            tab_id,
            Tab {
                provider,
                handle,
                last_seen: Mutex::new(Instant::now()),
            },
        );
        drop(tabs);

        tracing::info!(%tab_id, "tab gate opened");
        Some((tab_id, gate))
    }

    pub fn gate(&self, tab_id: Uuid) -> Option<SessionGate> {
        self.tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab_id)
            .map(|tab| {
                tab.touch();
                tab.handle.gate().clone()
            })
    }

    /// publish
    ///
    /// Feeds a forwarded auth event into the tab's provider. Returns `false`
    /// for an unknown tab.
    pub fn publish(&self, tab_id: Uuid, event: AuthEvent, session: Option<Session>) -> bool {
        let provider = self.provider(tab_id);
        match provider {
            Some(provider) => {
                provider.publish(event, session);
                true
            }
            None => false,
        }
    }

    /// sign_out
    ///
    /// Signs the tab out through its provider. Returns `false` for an unknown tab.
    pub async fn sign_out(&self, tab_id: Uuid) -> bool {
        let Some(provider) = self.provider(tab_id) else {
            return false;
        };
        if let Err(e) = provider.sign_out().await {
            tracing::warn!(%tab_id, error = %e, "tab sign-out failed");
        }
        true
    }

    /// close
    ///
    /// Disposes the tab's gate. Returns `false` for an unknown tab.
    pub fn close(&self, tab_id: Uuid) -> bool {
        let removed = self
            .tabs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab_id);

        match removed {
            Some(tab) => {
                tab.handle.dispose();
                tracing::info!(%tab_id, "tab gate closed");
                true
            }
            None => false,
        }
    }

    /// Disposes every open gate. Used at shutdown.
    pub fn close_all(&self) {
        let tabs: Vec<Tab> = self
            .tabs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, tab)| tab)
            .collect();

        let count = tabs.len();
        for tab in tabs {
            tab.handle.dispose();
        }
        tracing::info!(count, "all tab gates closed");
    }

    /// sweep_idle
    ///
    /// Disposes every tab untouched for at least `idle_ttl` and returns how
    /// many were closed.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(Uuid, Tab)> = {
            let mut tabs = self.tabs.write().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<Uuid> = tabs
                .iter()
                .filter(|(_, tab)| tab.idle_for(now) >= self.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| tabs.remove(&id).map(|tab| (id, tab)))
                .collect()
        };

        let count = expired.len();
        for (tab_id, tab) in expired {
            tab.handle.dispose();
            tracing::debug!(%tab_id, "idle tab gate closed");
        }
        if count > 0 {
            tracing::info!(count, "idle tab gates swept");
        }
        count
    }

    /// spawn_sweeper
    ///
    /// Runs `sweep_idle` every `period` until the returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
            loop {
                interval.tick().await;
                self.sweep_idle();
            }
        })
    }

    /// record_quiz_completion
    ///
    /// Tells every open gate that `user_id` just saved the quiz. Gates holding
    /// a different identity ignore it.
    pub fn record_quiz_completion(&self, user_id: &str, completed_at: DateTime<Utc>) {
        let gates: Vec<SessionGate> = self
            .tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tab| tab.handle.gate().clone())
            .collect();

        for gate in gates {
            gate.record_quiz_completion(user_id, completed_at);
        }
    }

    pub fn len(&self) -> usize {
        self.tabs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn provider(&self, tab_id: Uuid) -> Option<Arc<TabIdentityProvider>> {
        self.tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab_id)
            .map(|tab| {
                tab.touch();
                tab.provider.clone()
            })
    }
}
