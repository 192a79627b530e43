use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// StoreFailure
///
/// Outcome of a Profile Store query that did not return a row.
/// `NotFound` is an expected state (new user, quiz never taken), not a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreFailure {
    #[error("no row found")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

/// GateError
///
/// Failure taxonomy of the session gate. None of these ever reach the gate's
/// caller as a thrown error: provider and store failures degrade to safe
/// defaults, stale and disposed results are dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("profile store query failed: {0}")]
    StoreQueryFailed(#[from] StoreFailure),

    #[error("stale result discarded")]
    StaleResultDiscarded,

    #[error("gate disposed")]
    Disposed,
}

/// ValidationError
///
/// Form-level rejections for the sign-up and quiz payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("all fields are required")]
    MissingFields,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("terms of use must be accepted")]
    TermsNotAccepted,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("birth date is required")]
    MissingBirthDate,

    #[error("birth date is in the future")]
    BirthDateInFuture,

    #[error("users must be at least {0} years old")]
    TooYoung(u32),

    #[error("email is required")]
    MissingEmail,

    #[error("access token is required for {0}")]
    MissingAccessToken(String),

    #[error("email and password are required")]
    MissingCredentials,
}

/// ApiError
///
/// HTTP-facing error, mapped onto a status code and a small JSON body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("tab not found")]
    TabNotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("incorrect email or password")]
    InvalidCredentials,

    #[error("too many open tabs")]
    TooManyTabs,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("auth service error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] StoreFailure),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::TabNotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::TooManyTabs => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(StoreFailure::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreFailure::Other(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
