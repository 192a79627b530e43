use ezcare_gate::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    registry::GateRegistry,
    repository::{MemoryProfileStore, PostgresProfileStore, ProfileStoreState},
    supabase::SupabaseAuthClient,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, the Profile Store, the auth client
/// and the gate registry, then serves HTTP until Ctrl-C.
#[tokio::main]
async fn main() {
    // 1. Configuration (.env first so AppConfig sees it)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise these defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ezcare_gate=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Profile Store (Postgres, or in-memory for local runs without a database)
    let store: ProfileStoreState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            if config.env == Env::Local {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .expect("FATAL: Failed to run migrations.");
            }
            Arc::new(PostgresProfileStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory profile store");
            Arc::new(MemoryProfileStore::new())
        }
    };

    // 4. Auth vendor client and tab gates
    let supabase = Arc::new(SupabaseAuthClient::with_timeout(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.fetch_timeout,
    ));
    let registry = Arc::new(
        GateRegistry::new(
            store.clone(),
            config.freshness_policy(),
            config.event_capacity,
        )
        .with_revoker(supabase.clone())
        .with_limits(config.max_tabs, config.tab_idle_ttl),
    );

    // Tabs that vanish without DELETE are reclaimed after the idle TTL.
    let sweeper = registry.clone().spawn_sweeper(config.tab_idle_ttl / 4);

    let app_state = AppState {
        registry: registry.clone(),
        store,
        supabase,
        config: config.clone(),
    };

    // 5. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("FATAL: HTTP server error.");

    sweeper.abort();
    registry.close_all();
}
