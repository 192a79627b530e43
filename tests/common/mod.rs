#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ezcare_gate::{
    error::{GateError, StoreFailure},
    models::{MedicalProfile, QuizAnswers, QuizCompletion, Session, SessionChange},
    provider::IdentityProvider,
    repository::ProfileStore,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{Notify, broadcast};

// --- CONTROLLED PROFILE STORE ---

// Store whose lookups can be held open per user until the test releases them.
// Lets a test decide the order in which concurrent freshness fetches resolve.
#[derive(Default)]
pub struct ControlledStore {
    rows: Mutex<HashMap<String, Result<QuizCompletion, StoreFailure>>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ControlledStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_completed(&self, user_id: &str, completed_at: Option<DateTime<Utc>>) {
        self.rows
            .lock()
            .unwrap()
            .insert(user_id.to_string(), Ok(QuizCompletion { completed_at }));
    }

    pub fn set_failure(&self, user_id: &str, failure: StoreFailure) {
        self.rows
            .lock()
            .unwrap()
            .insert(user_id.to_string(), Err(failure));
    }

    /// Lookups for `user_id` block until `release` is called.
    pub fn hold(&self, user_id: &str) {
        self.holds
            .lock()
            .unwrap()
            .insert(user_id.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, user_id: &str) {
        if let Some(notify) = self.holds.lock().unwrap().get(user_id) {
            // notify_one stores a permit, so releasing before the lookup waits is fine.
            notify.notify_one();
        }
    }

    pub fn calls(&self, user_id: &str) -> usize {
        self.calls.lock().unwrap().get(user_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProfileStore for ControlledStore {
    async fn get_quiz_completion(&self, user_id: &str) -> Result<QuizCompletion, StoreFailure> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default() += 1;

        let hold = self.holds.lock().unwrap().get(user_id).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        self.rows
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or(Err(StoreFailure::NotFound))
    }

    async fn get_medical_profile(&self, _user_id: &str) -> Result<MedicalProfile, StoreFailure> {
        Err(StoreFailure::NotFound)
    }

    async fn upsert_quiz_completion(
        &self,
        user_id: &str,
        answers: &QuizAnswers,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalProfile, StoreFailure> {
        self.set_completed(user_id, Some(completed_at));
        Ok(MedicalProfile::from_answers(user_id, answers, completed_at))
    }
}

// --- MISBEHAVING PROVIDERS ---

// Provider whose session probe always errors.
pub struct UnreachableProvider {
    events: broadcast::Sender<SessionChange>,
}

impl UnreachableProvider {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self { events })
    }
}

#[async_trait]
impl IdentityProvider for UnreachableProvider {
    async fn current_session(&self) -> Result<Option<Session>, GateError> {
        Err(GateError::ProviderUnavailable("connection refused".into()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), GateError> {
        Err(GateError::ProviderUnavailable("connection refused".into()))
    }
}

// Provider whose session probe never answers.
pub struct SilentProvider {
    events: broadcast::Sender<SessionChange>,
}

impl SilentProvider {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self { events })
    }
}

#[async_trait]
impl IdentityProvider for SilentProvider {
    async fn current_session(&self) -> Result<Option<Session>, GateError> {
        std::future::pending().await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), GateError> {
        Ok(())
    }
}

// --- HELPERS ---

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives spawned tasks time to run when there is nothing observable to wait on.
pub async fn let_tasks_run() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}

// --- APP STATE ---

/// AppState over the given store, with default local config and no remote
/// sign-out.
pub fn create_app_state(store: ezcare_gate::ProfileStoreState) -> ezcare_gate::AppState {
    let config = ezcare_gate::AppConfig::default();
    let registry = ezcare_gate::GateRegistry::new(
        store.clone(),
        config.freshness_policy(),
        config.event_capacity,
    );
    ezcare_gate::AppState {
        registry: Arc::new(registry),
        store,
        supabase: Arc::new(ezcare_gate::SupabaseAuthClient::new(
            &config.supabase_url,
            &config.supabase_anon_key,
        )),
        config,
    }
}

/// Signs a Supabase-shaped access token for `user_id` with the given role.
pub fn access_token(user_id: &str, role: &str, secret: &str) -> String {
    signed_token(user_id, role, secret, ezcare_gate::auth::AUTHENTICATED_AUDIENCE, 3600)
}

pub fn signed_token(user_id: &str, role: &str, secret: &str, aud: &str, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let mut user_metadata = serde_json::Map::new();
    user_metadata.insert("role".into(), serde_json::Value::String(role.into()));

    let claims = ezcare_gate::auth::Claims {
        sub: user_id.to_string(),
        aud: aud.to_string(),
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
        email: Some(format!("{user_id}@example.com")),
        user_metadata,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
