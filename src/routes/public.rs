use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a verified identity. Tab gates live here: a
/// signed-out tab still needs routing decisions, and the events that sign it
/// in carry their own access token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Sign-up form; the account itself is created at the auth vendor.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Password sign-in; the returned access token seeds the tab's gate.
        .route("/login", post(handlers::login))
        // GET /oauth/{provider}
        // Redirects the browser to the vendor's third-party sign-in page.
        .route("/oauth/{provider}", get(handlers::oauth_authorize))
        // POST /password/recover
        .route("/password/recover", post(handlers::recover_password))
        // POST /password/reset
        // Second half of the reset flow, authorized by the recovery session.
        .route("/password/reset", post(handlers::reset_password))
        // --- Tab Gates ---
        // POST /tabs
        // Opens a gate for a browser tab, optionally seeded with a Bearer session.
        .route("/tabs", post(handlers::open_tab))
        // GET/DELETE /tabs/{id}
        .route(
            "/tabs/{id}",
            get(handlers::get_tab_snapshot).delete(handlers::close_tab),
        )
        // GET /tabs/{id}/navigate?path=/dashboard
        // The route decision for one path, once the gate has settled.
        .route("/tabs/{id}/navigate", get(handlers::navigate))
        // POST /tabs/{id}/events
        // Auth events observed by the tab (SIGNED_IN, TOKEN_REFRESHED, ...).
        .route("/tabs/{id}/events", post(handlers::post_auth_event))
        // POST /tabs/{id}/sign-out
        .route("/tabs/{id}/sign-out", post(handlers::sign_out_tab))
}
