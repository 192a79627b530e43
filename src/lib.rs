use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Session gate core: the controller, its inputs and the pure routing function.
pub mod freshness;
pub mod gate;
pub mod navigation;
pub mod provider;

// Service components around the gate.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod repository;
pub mod supabase;
pub mod validation;

// Routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gate::{GateHandle, SessionGate};
pub use registry::{GateRegistry, GateRegistryState};
pub use repository::{MemoryProfileStore, PostgresProfileStore, ProfileStoreState};
pub use supabase::{SupabaseAuthClient, SupabaseState};

/// ApiDoc
///
/// OpenAPI document for the service, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::open_tab, handlers::get_tab_snapshot, handlers::navigate,
        handlers::post_auth_event, handlers::sign_out_tab, handlers::close_tab,
        handlers::get_quiz, handlers::submit_quiz, handlers::register_user,
        handlers::recover_password, handlers::login, handlers::oauth_authorize,
        handlers::reset_password
    ),
    components(
        schemas(
            models::Role, models::Identity, models::AuthEvent, models::GateSnapshot,
            models::MedicalProfile, models::QuizAnswers, models::QuizStatus,
            models::RegisterUserRequest, models::RegisteredUser, models::RecoverPasswordRequest,
            models::AuthEventRequest, models::OpenTabResponse, models::LoginRequest,
            models::SignInResponse, models::ResetPasswordRequest, models::OAuthProvider,
            navigation::RouteDecision, navigation::NavigateResponse,
        )
    ),
    tags(
        (name = "ezcare-gate", description = "EzCare session gate API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared state handed to every request. All members are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Open tab gates.
    pub registry: GateRegistryState,
    /// Profile Store, shared by every gate and the quiz handlers.
    pub store: ProfileStoreState,
    /// Auth vendor REST client.
    pub supabase: SupabaseState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for GateRegistryState {
    fn from_ref(app_state: &AppState) -> GateRegistryState {
        app_state.registry.clone()
    }
}

impl FromRef<AppState> for ProfileStoreState {
    fn from_ref(app_state: &AppState) -> ProfileStoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for SupabaseState {
    fn from_ref(app_state: &AppState) -> SupabaseState {
        app_state.supabase.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated routes. The `AuthUser` extractor rejects with
/// 401 before the handler runs when no valid identity is present.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, scoped middleware, shared state and the observability
/// layers.
///
/// 1. CORS: the front-end is served from another origin.
/// 2. Routes: Swagger UI, public routes, then the authenticated routes with
///    `auth_middleware` as a route layer so it only guards those.
/// 3. Observability: request id, tracing span, request id echoed back.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Routes and state
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability. The request id is generated first so the trace span
    // can carry it.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for every request, correlated by the `x-request-id` header.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
