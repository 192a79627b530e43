use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity & Session ---

/// Role
///
/// The role carried in the auth vendor's user metadata. Read once when the
/// identity is derived, never re-validated against the Profile Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Unknown,
    Patient,
    Clinician,
}

impl Role {
    /// Parses the `role` metadata value. The sign-up form stores clinicians as
    /// `medecin`; English spellings are accepted too.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "patient" => Role::Patient,
            "clinician" | "medecin" | "médecin" | "doctor" => Role::Clinician,
            _ => Role::Unknown,
        }
    }

    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        metadata
            .get("role")
            .and_then(Value::as_str)
            .map(Role::parse)
            .unwrap_or_default()
    }

    /// Role used for dashboard routing: anything that is not a clinician is
    /// routed as a patient.
    pub fn for_routing(self) -> Self {
        match self {
            Role::Clinician => Role::Clinician,
            Role::Patient | Role::Unknown => Role::Patient,
        }
    }
}

/// Session
///
/// Proof of authentication handed out by the Identity Provider.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub metadata: Map<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
    /// The raw vendor access token, kept so the session can be revoked.
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            metadata,
            expires_at: None,
            access_token: None,
        }
    }

    /// Shorthand for a session whose metadata only carries a role.
    pub fn with_role(user_id: impl Into<String>, role: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("role".to_string(), Value::String(role.to_string()));
        Self::new(user_id, metadata)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("metadata", &self.metadata)
            .field("expires_at", &self.expires_at)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Identity
///
/// The gate's normalized view of a session. Replaced atomically on every
/// auth event, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    #[schema(value_type = Object)]
    #[ts(type = "Record<string, unknown>")]
    pub raw_metadata: Map<String, Value>,
}

impl From<&Session> for Identity {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            role: Role::from_metadata(&session.metadata),
            raw_metadata: session.metadata.clone(),
        }
    }
}

/// AuthEvent
///
/// Session-change event kinds, named the way the auth vendor emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// SessionChange
///
/// One message on the Identity Provider's subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// GateSnapshot
///
/// Synchronous read of the gate's derived state, consumed by the route decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GateSnapshot {
    pub identity: Option<Identity>,
    pub role: Role,
    pub is_fresh: bool,
    pub is_loading: bool,
}

// --- Medical Profile (Quiz) ---

/// MedicalProfile
///
/// One row of the `medical_profiles` table. `last_quiz_completed_at` drives
/// quiz freshness; the remaining columns are the stored quiz answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MedicalProfile {
    pub user_id: String,
    #[ts(type = "string | null")]
    pub last_quiz_completed_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub birth_date: Option<NaiveDate>,
    pub biological_sex: Option<String>,
    pub lifestyle: Option<String>,
    pub goals: Vec<String>,
    pub conditions: Option<String>,
    pub medications: Option<String>,
    pub allergies: Option<String>,
    pub energy_level: Option<String>,
    pub sleep_quality: Option<String>,
    /// Location of the pain, `None` when the user reported no pain.
    pub pain: Option<String>,
}

impl MedicalProfile {
    pub fn from_answers(
        user_id: impl Into<String>,
        answers: &QuizAnswers,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            last_quiz_completed_at: Some(completed_at),
            birth_date: answers.birth_date,
            biological_sex: answers.biological_sex.clone(),
            lifestyle: answers.lifestyle.clone(),
            goals: answers.goals.clone(),
            conditions: answers.conditions.clone(),
            medications: answers.medications.clone(),
            allergies: answers.allergies.clone(),
            energy_level: answers.energy_level.clone(),
            sleep_quality: answers.sleep_quality.clone(),
            pain: answers.pain.clone(),
        }
    }
}

/// QuizCompletion
///
/// The slice of the profile the gate reads: when the quiz was last completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizCompletion {
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

/// QuizAnswers
///
/// Input payload for submitting the health quiz (POST /quiz).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct QuizAnswers {
    #[schema(example = "1990-04-12")]
    #[ts(type = "string | null")]
    pub birth_date: Option<NaiveDate>,
    pub biological_sex: Option<String>,
    pub lifestyle: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    pub conditions: Option<String>,
    pub medications: Option<String>,
    pub allergies: Option<String>,
    pub energy_level: Option<String>,
    pub sleep_quality: Option<String>,
    pub pain: Option<String>,
}

/// RegisterUserRequest
///
/// Input payload for the sign-up form (POST /register). The password is only
/// forwarded to the auth vendor, never stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub terms_accepted: bool,
    #[schema(example = "patient")]
    pub role: String,
}

/// RecoverPasswordRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RecoverPasswordRequest {
    pub email: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// ResetPasswordRequest
///
/// Second step of the reset flow. Sent with the recovery session's access
/// token as Bearer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

/// OAuthProvider
///
/// Third-party sign-in providers enabled on the auth vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

/// AuthEventRequest
///
/// A session-change event forwarded by a browser tab. `access_token` is
/// required for every event except `SIGNED_OUT`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthEventRequest {
    pub event: AuthEvent,
    pub access_token: Option<String>,
}

// --- Responses ---

/// RegisteredUser
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// SignInResponse
///
/// The session handed back by a password sign-in. The caller opens a tab
/// gate with `access_token` as its Bearer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// QuizStatus
///
/// Response for GET /quiz. `early_retry` is set while the last answers are
/// still fresh, so the form can warn before the user re-takes it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuizStatus {
    pub profile: Option<MedicalProfile>,
    pub early_retry: bool,
}

/// OpenTabResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct OpenTabResponse {
    pub tab_id: Uuid,
    pub snapshot: GateSnapshot,
}
