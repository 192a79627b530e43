use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use chrono::DateTime;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    models::{Role, Session},
};

/// Audience Supabase stamps on access tokens of signed-in users.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Claims
///
/// The subset of a Supabase access token this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the auth user id.
    pub sub: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata written at sign-up (first_name, last_name, role).
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

/// verify_access_token
///
/// Checks signature, expiry and audience, and turns the claims into a
/// `Session` that keeps the raw token for later revocation.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Session, ErrorKind> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

    let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("access token expired"),
            other => tracing::debug!(error = ?other, "access token rejected"),
        }
        e.into_kind()
    })?;

    let claims = data.claims;
    Ok(Session {
        user_id: claims.sub,
        email: claims.email,
        metadata: claims.user_metadata,
        expires_at: DateTime::from_timestamp(claims.exp as i64, 0),
        access_token: Some(token.to_string()),
    })
}

/// Pulls the token out of an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// AuthUser
///
/// The resolved identity of an authenticated request. The role comes from
/// the token's user metadata, as the gate reads it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header holding a UUID
///    (with optional `x-user-role`) stands in for a token. Anything that is
///    not a UUID falls through to step 2, since the Profile Store keys on
///    UUIDs.
/// 2. Otherwise a Bearer access token is required and verified; the role is
///    read from its user metadata.
///
/// Rejection: `401 Unauthorized` on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        // 1. Local Development Bypass
        if config.env == Env::Local {
            let header = |name: &str| {
                parts
                    .headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            };
            if let Some(user_id) = header("x-user-id").and_then(|raw| Uuid::parse_str(&raw).ok()) {
                let role = header("x-user-role")
                    .map(|raw| Role::parse(&raw))
                    .unwrap_or_default();
                return Ok(AuthUser {
                    id: user_id.to_string(),
                    role,
                });
            }
        }
        // Production, or a missing/bad bypass header: the token decides.

        // 2. Token Extraction and Verification
        let token = bearer_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let session =
            verify_access_token(token, &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            role: Role::from_metadata(&session.metadata),
            id: session.user_id,
        })
    }
}
