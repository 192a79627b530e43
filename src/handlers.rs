use crate::{
    AppState,
    auth::{AuthUser, bearer_token, verify_access_token},
    error::{ApiError, StoreFailure, ValidationError},
    models::{
        AuthEvent, AuthEventRequest, GateSnapshot, LoginRequest, MedicalProfile, OAuthProvider,
        OpenTabResponse, QuizAnswers, QuizStatus, RecoverPasswordRequest, RegisterUserRequest,
        RegisteredUser, ResetPasswordRequest, Session, SignInResponse,
    },
    navigation::{self, NavigateResponse},
    validation,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

/// NavigateQuery
///
/// Query parameters for the navigation decision endpoint.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NavigateQuery {
    /// The path the tab wants to show, e.g. `/dashboard`.
    pub path: String,
}

fn verify(state: &AppState, token: &str) -> Result<Session, ApiError> {
    verify_access_token(token, &state.config.jwt_secret).map_err(|_| ApiError::Unauthorized)
}

// --- Tab Gates ---

/// open_tab
///
/// [Public Route] Opens a gate for a browser tab. A Bearer token, when
/// present, is the session the gate's first probe sees; without one the tab
/// starts signed out.
///
/// The gate lives until `DELETE /tabs/{id}` or until it sits idle past the
/// configured TTL. Once the tab limit is reached new opens get 503.
#[utoipa::path(
    post,
    path = "/tabs",
    responses(
        (status = 201, description = "Tab gate opened", body = OpenTabResponse),
        (status = 401, description = "Invalid access token"),
        (status = 503, description = "Too many open tabs")
    )
)]
pub async fn open_tab(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<OpenTabResponse>), ApiError> {
    // 1. An invalid token is rejected outright rather than opening signed out.
    let initial = bearer_token(&headers)
        .map(|token| verify(&state, token))
        .transpose()?;

    // 2. Start the gate; its first probe runs in the background.
    let (tab_id, gate) = state.registry.open(initial).ok_or(ApiError::TooManyTabs)?;
    Ok((
        StatusCode::CREATED,
        Json(OpenTabResponse {
            tab_id,
            snapshot: gate.snapshot(),
        }),
    ))
}

/// get_tab_snapshot
///
/// [Public Route] Current derived state of the tab's gate.
#[utoipa::path(
    get,
    path = "/tabs/{id}",
    params(("id" = Uuid, Path, description = "Tab ID")),
    responses(
        (status = 200, description = "Snapshot", body = GateSnapshot),
        (status = 404, description = "Unknown tab")
    )
)]
pub async fn get_tab_snapshot(
    State(state): State<AppState>,
    Path(tab_id): Path<Uuid>,
) -> Result<Json<GateSnapshot>, ApiError> {
    let gate = state.registry.gate(tab_id).ok_or(ApiError::TabNotFound)?;
    Ok(Json(gate.snapshot()))
}

/// navigate
///
/// [Public Route] Routing decision for `path`. Waits for the gate to settle,
/// bounded by the fetch timeout; a gate still loading after that yields
/// `pending`.
#[utoipa::path(
    get,
    path = "/tabs/{id}/navigate",
    params(("id" = Uuid, Path, description = "Tab ID"), NavigateQuery),
    responses(
        (status = 200, description = "Decision", body = NavigateResponse),
        (status = 404, description = "Unknown tab")
    )
)]
pub async fn navigate(
    State(state): State<AppState>,
    Path(tab_id): Path<Uuid>,
    Query(query): Query<NavigateQuery>,
) -> Result<Json<NavigateResponse>, ApiError> {
    let gate = state.registry.gate(tab_id).ok_or(ApiError::TabNotFound)?;

    // Answer from a settled gate where possible; a slow store must not hold
    // the request longer than one fetch.
    let snapshot = match tokio::time::timeout(state.config.fetch_timeout, gate.settled()).await {
        Ok(snapshot) => snapshot,
        Err(_) => {
            tracing::warn!(%tab_id, "gate did not settle in time");
            gate.snapshot()
        }
    };

    Ok(Json(navigation::navigate(&query.path, &snapshot)))
}

/// post_auth_event
///
/// [Public Route] Forwards one of the tab's auth events into its gate. Every
/// event except `SIGNED_OUT` must carry a valid access token.
#[utoipa::path(
    post,
    path = "/tabs/{id}/events",
    params(("id" = Uuid, Path, description = "Tab ID")),
    request_body = AuthEventRequest,
    responses(
        (status = 202, description = "Event accepted"),
        (status = 401, description = "Invalid access token"),
        (status = 404, description = "Unknown tab"),
        (status = 422, description = "Missing access token")
    )
)]
pub async fn post_auth_event(
    State(state): State<AppState>,
    Path(tab_id): Path<Uuid>,
    Json(payload): Json<AuthEventRequest>,
) -> Result<StatusCode, ApiError> {
    // SIGNED_OUT carries no session; every other event must prove one.
    let session = match payload.event {
        AuthEvent::SignedOut => None,
        event => {
            let token = payload
                .access_token
                .as_deref()
                .ok_or_else(|| ValidationError::MissingAccessToken(format!("{event:?}")))?;
            Some(verify(&state, token)?)
        }
    };

    if !state.registry.publish(tab_id, payload.event, session) {
        return Err(ApiError::TabNotFound);
    }
    Ok(StatusCode::ACCEPTED)
}

/// sign_out_tab
///
/// [Public Route] Signs the tab out: revokes the session at the auth vendor
/// (best effort) and emits `SIGNED_OUT` into the gate.
#[utoipa::path(
    post,
    path = "/tabs/{id}/sign-out",
    params(("id" = Uuid, Path, description = "Tab ID")),
    responses(
        (status = 204, description = "Signed out"),
        (status = 404, description = "Unknown tab")
    )
)]
pub async fn sign_out_tab(
    State(state): State<AppState>,
    Path(tab_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.registry.sign_out(tab_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::TabNotFound)
    }
}

/// close_tab
///
/// [Public Route] Disposes the tab's gate. Anything still in flight for it
/// is dropped.
#[utoipa::path(
    delete,
    path = "/tabs/{id}",
    params(("id" = Uuid, Path, description = "Tab ID")),
    responses(
        (status = 204, description = "Closed"),
        (status = 404, description = "Unknown tab")
    )
)]
pub async fn close_tab(
    State(state): State<AppState>,
    Path(tab_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.registry.close(tab_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::TabNotFound)
    }
}

// --- Quiz ---

/// get_quiz
///
/// [Authenticated Route] The user's stored answers, for pre-filling the form.
/// `early_retry` is set while the last answers are still fresh.
#[utoipa::path(
    get,
    path = "/quiz",
    responses((status = 200, description = "Quiz status", body = QuizStatus))
)]
pub async fn get_quiz(
    AuthUser { id, role }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<QuizStatus>, ApiError> {
    let profile = match state.store.get_medical_profile(&id).await {
        Ok(profile) => Some(profile),
        Err(StoreFailure::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let early_retry = profile.as_ref().is_some_and(|p| {
        state
            .config
            .freshness_policy()
            .is_fresh(p.last_quiz_completed_at, Utc::now())
    });

    tracing::debug!(user_id = %id, ?role, found = profile.is_some(), early_retry, "quiz status read");
    Ok(Json(QuizStatus {
        profile,
        early_retry,
    }))
}

/// submit_quiz
///
/// [Authenticated Route] Saves the quiz answers and stamps the completion
/// time. Every open gate of this user is told right away, so the dashboard
/// unlocks without waiting for a re-fetch.
#[utoipa::path(
    post,
    path = "/quiz",
    request_body = QuizAnswers,
    responses(
        (status = 200, description = "Saved", body = MedicalProfile),
        (status = 422, description = "Invalid answers")
    )
)]
pub async fn submit_quiz(
    AuthUser { id, role }: AuthUser,
    State(state): State<AppState>,
    Json(answers): Json<QuizAnswers>,
) -> Result<Json<MedicalProfile>, ApiError> {
    // 1. Validation against today's date (age is computed from the birth date).
    let now = Utc::now();
    validation::validate_quiz(&answers, now.date_naive())?;

    // 2. Persist. The stored stamp and the one pushed to the gates are the same.
    let profile = state.store.upsert_quiz_completion(&id, &answers, now).await?;

    // 3. Unlock the dashboard in every open tab of this user.
    state.registry.record_quiz_completion(&id, now);

    tracing::info!(user_id = %id, ?role, "quiz submitted");
    Ok(Json(profile))
}

// --- Account ---

/// register_user
///
/// [Public Route] Validates the sign-up form and creates the account at the
/// auth vendor. The role lands in the user metadata the gate routes on.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = RegisteredUser),
        (status = 422, description = "Invalid form"),
        (status = 502, description = "Auth service rejected the sign-up")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<Json<RegisteredUser>, ApiError> {
    validation::validate_registration(&payload)?;
    let user = state.supabase.sign_up(&payload).await?;

    tracing::info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok(Json(user))
}

/// recover_password
///
/// [Public Route] Sends the password-reset mail. The link lands on the
/// front-end's `/forgot-password` page.
#[utoipa::path(
    post,
    path = "/password/recover",
    request_body = RecoverPasswordRequest,
    responses(
        (status = 202, description = "Reset mail requested"),
        (status = 422, description = "Missing email")
    )
)]
pub async fn recover_password(
    State(state): State<AppState>,
    Json(payload): Json<RecoverPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validation::validate_email(&payload.email)?;
    let redirect_to = format!(
        "{}/forgot-password",
        state.config.site_url.trim_end_matches('/')
    );
    state
        .supabase
        .recover_password(&payload.email, &redirect_to)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// login
///
/// [Public Route] Password sign-in at the auth vendor. A wrong pair answers
/// 401 with "incorrect email or password"; the returned access token is what
/// the tab then opens its gate with.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Incorrect email or password"),
        (status = 422, description = "Missing email or password"),
        (status = 502, description = "Auth service error")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    validation::validate_login(&payload)?;
    let signed_in = state
        .supabase
        .sign_in_with_password(&payload.email, &payload.password)
        .await?;

    tracing::info!(user_id = %signed_in.user_id, role = ?signed_in.role, "user signed in");
    Ok(Json(signed_in))
}

/// oauth_authorize
///
/// [Public Route] Sends the browser to the vendor's sign-in page for
/// `provider`. After the provider round trip the user lands on the
/// front-end's `/dashboard`, where the tab's gate takes over.
#[utoipa::path(
    get,
    path = "/oauth/{provider}",
    params(("provider" = OAuthProvider, Path, description = "Sign-in provider")),
    responses((status = 303, description = "Redirect to the provider sign-in"))
)]
pub async fn oauth_authorize(
    State(state): State<AppState>,
    Path(provider): Path<OAuthProvider>,
) -> Result<Redirect, ApiError> {
    let redirect_to = format!("{}/dashboard", state.config.site_url.trim_end_matches('/'));
    let url = state.supabase.authorize_url(provider, &redirect_to)?;
    Ok(Redirect::to(url.as_str()))
}

/// reset_password
///
/// [Public Route] Completes a password reset. The Bearer token is the
/// recovery session the mailed link opened; the new password must pass the
/// sign-up rules and match its confirmation.
#[utoipa::path(
    post,
    path = "/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Missing or invalid recovery session"),
        (status = 422, description = "Invalid password")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    // 1. The recovery session must be one this project issued.
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let session = verify(&state, token)?;

    // 2. Form rules before anything reaches the vendor.
    validation::validate_new_password(&payload)?;

    state.supabase.update_password(token, &payload.password).await?;

    tracing::info!(user_id = %session.user_id, "password reset completed");
    Ok(StatusCode::NO_CONTENT)
}
