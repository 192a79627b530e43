use crate::{
    freshness::{DEFAULT_FRESH_DAYS, FreshnessPolicy},
    registry::{DEFAULT_MAX_TABS, DEFAULT_TAB_IDLE_TTL},
};
use std::{env, time::Duration};

/// AppConfig
///
/// Holds the service's entire configuration. Immutable once loaded and pulled
/// into handlers through `FromRef`, like the rest of the shared state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the local auth bypass and log format.
    pub env: Env,
    // Postgres connection string. `None` in local runs selects the in-memory store.
    pub db_url: Option<String>,
    // Base URL of the Supabase project (auth REST endpoints live under /auth/v1).
    pub supabase_url: String,
    // Public anon key sent as `apikey` on every auth call.
    pub supabase_anon_key: String,
    // Secret used to verify Supabase-issued access tokens (HS256).
    pub jwt_secret: String,
    // Front-end origin, used to build the password-reset redirect.
    pub site_url: String,
    // Days a completed quiz keeps the patient dashboard unlocked.
    pub quiz_fresh_days: i64,
    // Upper bound on each session probe and freshness lookup.
    pub fetch_timeout: Duration,
    // Buffer size of each tab's session-change channel.
    pub event_capacity: usize,
    // Open tab gates allowed at once; `POST /tabs` answers 503 beyond it.
    pub max_tabs: usize,
    // A tab gate untouched this long is disposed by the sweeper.
    pub tab_idle_ttl: Duration,
    pub bind_addr: String,
}

/// Env
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const LOCAL_SUPABASE_URL: &str = "http://localhost:54321";

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking values for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            supabase_url: LOCAL_SUPABASE_URL.to_string(),
            supabase_anon_key: "local-anon-key".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            site_url: "http://localhost:5173".to_string(),
            quiz_fresh_days: DEFAULT_FRESH_DAYS,
            fetch_timeout: Duration::from_secs(10),
            event_capacity: 32,
            max_tabs: DEFAULT_MAX_TABS,
            tab_idle_ttl: DEFAULT_TAB_IDLE_TTL,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment.
    ///
    /// # Panics
    /// Panics in production when `DATABASE_URL`, `SUPABASE_URL`,
    /// `SUPABASE_ANON_KEY` or `SUPABASE_JWT_SECRET` is missing, and in any
    /// environment when a numeric variable does not parse.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let tunables = |mut config: Self| {
            config.site_url = env::var("SITE_URL").unwrap_or(defaults.site_url.clone());
            config.quiz_fresh_days = parse_var("QUIZ_FRESH_DAYS", defaults.quiz_fresh_days);
            config.fetch_timeout = Duration::from_millis(parse_var(
                "GATE_FETCH_TIMEOUT_MS",
                defaults.fetch_timeout.as_millis() as u64,
            ));
            config.event_capacity = parse_var("GATE_EVENT_CAPACITY", defaults.event_capacity);
            config.max_tabs = parse_var("GATE_MAX_TABS", defaults.max_tabs);
            config.tab_idle_ttl = Duration::from_secs(parse_var(
                "GATE_TAB_IDLE_SECS",
                defaults.tab_idle_ttl.as_secs(),
            ));
            config.bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr.clone());
            config
        };

        match env {
            Env::Local => tunables(Self {
                env: Env::Local,
                db_url: env::var("DATABASE_URL").ok(),
                supabase_url: env::var("SUPABASE_URL")
                    .unwrap_or_else(|_| LOCAL_SUPABASE_URL.to_string()),
                supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                    .unwrap_or(defaults.supabase_anon_key.clone()),
                jwt_secret: env::var("SUPABASE_JWT_SECRET")
                    .unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                ..defaults.clone()
            }),
            Env::Production => tunables(Self {
                env: Env::Production,
                db_url: Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                ),
                supabase_url: env::var("SUPABASE_URL")
                    .expect("FATAL: SUPABASE_URL required in prod"),
                supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                    .expect("FATAL: SUPABASE_ANON_KEY required in prod"),
                jwt_secret: env::var("SUPABASE_JWT_SECRET")
                    .expect("FATAL: SUPABASE_JWT_SECRET must be set in production."),
                ..defaults.clone()
            }),
        }
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            window_days: self.quiz_fresh_days,
            fetch_timeout: self.fetch_timeout,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("FATAL: invalid {key} value {raw:?}: {e}")),
        Err(_) => default,
    }
}
