use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`; the layer in
/// `create_router` rejects the request before that otherwise.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/POST /quiz
        // Reads the stored answers for pre-fill, or saves a new completion.
        // A save unlocks the dashboard in every open gate of the user.
        .route("/quiz", get(handlers::get_quiz).post(handlers::submit_quiz))
}
