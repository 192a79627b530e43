use crate::{
    error::ApiError,
    models::{OAuthProvider, RegisterUserRequest, RegisteredUser, Role, SignInResponse},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// Upper bound on every call to the auth vendor.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GoTrue's message for a wrong email/password pair.
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// SupabaseUser
///
/// The part of a GoTrue user object this service reads.
#[derive(Deserialize)]
struct SupabaseUser {
    id: Uuid,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

/// TokenResponse
///
/// Body of a successful `/token?grant_type=password` call.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: SupabaseUser,
}

/// GoTrueError
///
/// GoTrue reports failures under different keys depending on the endpoint.
#[derive(Deserialize, Default)]
struct GoTrueError {
    error_description: Option<String>,
    msg: Option<String>,
}

impl GoTrueError {
    fn message(&self) -> &str {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .unwrap_or_default()
    }
}

/// SignUpResponse
///
/// GoTrue answers `/signup` with the bare user when e-mail confirmation is
/// pending, and with a full session (user nested) when auto-confirm is on.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    WithSession { user: SupabaseUser },
    User(SupabaseUser),
}

impl SignUpResponse {
    fn user_id(&self) -> Uuid {
        match self {
            SignUpResponse::WithSession { user } | SignUpResponse::User(user) => user.id,
        }
    }
}

/// SupabaseAuthClient
///
/// Thin REST client over the auth vendor's GoTrue endpoints. Constructed once
/// at startup and shared by reference.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

/// SupabaseState
pub type SupabaseState = Arc<SupabaseAuthClient>;

impl SupabaseAuthClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self::with_timeout(base_url, anon_key, DEFAULT_REQUEST_TIMEOUT)
    }

    /// with_timeout
    ///
    /// Every request gives up after `timeout`, so a vendor that accepts the
    /// connection but never answers cannot hold a caller forever.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` fails to build.
    pub fn with_timeout(base_url: &str, anon_key: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("FATAL: reqwest client should build"),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// sign_up
    ///
    /// Creates the vendor account. First name, last name and role travel as
    /// user metadata, which is where the gate later reads the role from.
    pub async fn sign_up(&self, req: &RegisterUserRequest) -> Result<RegisteredUser, ApiError> {
        let response = self
            .http
            .post(self.url("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "email": req.email,
                "password": req.password,
                "data": {
                    "first_name": req.first_name,
                    "last_name": req.last_name,
                    "role": req.role,
                },
            }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body, "sign-up rejected by auth service");
            return Err(ApiError::Upstream(format!("sign-up rejected ({status})")));
        }

        let created = response
            .json::<SignUpResponse>()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        Ok(RegisteredUser {
            id: created.user_id(),
            email: req.email.clone(),
            role: Role::parse(&req.role),
        })
    }

    /// sign_in_with_password
    ///
    /// Exchanges email and password for a session. A wrong pair comes back as
    /// `InvalidCredentials`; any other refusal is an upstream error.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, ApiError> {
        let response = self
            .http
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.json::<GoTrueError>().await.unwrap_or_default();
            if error.message() == INVALID_CREDENTIALS {
                return Err(ApiError::InvalidCredentials);
            }
            tracing::warn!(%status, message = error.message(), "sign-in rejected by auth service");
            return Err(ApiError::Upstream(format!("sign-in rejected ({status})")));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        Ok(SignInResponse {
            user_id: token.user.id,
            role: Role::from_metadata(&token.user.user_metadata),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }

    /// authorize_url
    ///
    /// Where the browser goes to sign in with a third-party provider. The
    /// vendor sends it back to `redirect_to` once the provider is done.
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<reqwest::Url, ApiError> {
        reqwest::Url::parse_with_params(
            &self.url("authorize"),
            &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
        )
        .map_err(|e| ApiError::Upstream(format!("invalid auth service url: {e}")))
    }

    /// update_password
    ///
    /// Sets a new password for the user behind `access_token`. This is the
    /// second half of the reset flow: the mailed link signs the user in with a
    /// recovery session, and that session's token authorizes the change.
    pub async fn update_password(&self, access_token: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .put(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.json::<GoTrueError>().await.unwrap_or_default();
            tracing::warn!(%status, message = error.message(), "password update rejected");
            return Err(ApiError::Upstream(format!("password update rejected ({status})")));
        }
        Ok(())
    }

    /// recover_password
    ///
    /// Asks the vendor to mail a reset link that lands on `redirect_to`.
    pub async fn recover_password(&self, email: &str, redirect_to: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("recover"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "password recovery rejected ({})",
                response.status()
            )));
        }
        Ok(())
    }

    /// sign_out
    ///
    /// Revokes the refresh tokens behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "logout rejected ({})",
                response.status()
            )));
        }
        Ok(())
    }
}
