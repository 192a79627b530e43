use crate::{
    error::StoreFailure,
    models::{MedicalProfile, QuizAnswers, QuizCompletion},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// ProfileStore Trait
///
/// Contract for the per-user medical profile records. The session gate only
/// reads `get_quiz_completion`; the quiz form owns the write path.
///
/// **Send + Sync + async_trait** make `Arc<dyn ProfileStore>` shareable
/// between the HTTP handlers and the gate's background fetch tasks.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// When the user last completed the quiz. `Err(NotFound)` when the user
    /// has no profile row yet.
    async fn get_quiz_completion(&self, user_id: &str) -> Result<QuizCompletion, StoreFailure>;

    async fn get_medical_profile(&self, user_id: &str) -> Result<MedicalProfile, StoreFailure>;

    /// Insert or replace the user's answers, stamping `last_quiz_completed_at`.
    async fn upsert_quiz_completion(
        &self,
        user_id: &str,
        answers: &QuizAnswers,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalProfile, StoreFailure>;
}

/// ProfileStoreState
///
/// The shared handle used by the application state and by every gate.
pub type ProfileStoreState = Arc<dyn ProfileStore>;

/// PostgresProfileStore
///
/// `ProfileStore` backed by the `medical_profiles` table.
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PROFILE_COLUMNS: &str = r#"
    user_id::text AS user_id, last_quiz_completed_at, birth_date, biological_sex,
    lifestyle, goals, conditions, medications, allergies, energy_level,
    sleep_quality, pain
"#;

fn query_failure(op: &str, e: sqlx::Error) -> StoreFailure {
    match e {
        sqlx::Error::RowNotFound => StoreFailure::NotFound,
        other => {
            tracing::error!(op, error = ?other, "medical_profiles query failed");
            StoreFailure::Other(other.to_string())
        }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get_quiz_completion(&self, user_id: &str) -> Result<QuizCompletion, StoreFailure> {
        let completed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_quiz_completed_at FROM medical_profiles WHERE user_id = $1::uuid",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_failure("get_quiz_completion", e))?;

        Ok(QuizCompletion { completed_at })
    }

    async fn get_medical_profile(&self, user_id: &str) -> Result<MedicalProfile, StoreFailure> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM medical_profiles WHERE user_id = $1::uuid");
        sqlx::query_as::<_, MedicalProfile>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failure("get_medical_profile", e))
    }

    /// upsert_quiz_completion
    ///
    /// `ON CONFLICT (user_id)` keeps one row per user; a re-take overwrites
    /// every answer column and moves the completion stamp forward.
    async fn upsert_quiz_completion(
        &self,
        user_id: &str,
        answers: &QuizAnswers,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalProfile, StoreFailure> {
        let sql = format!(
            r#"
            INSERT INTO medical_profiles (
                user_id, last_quiz_completed_at, birth_date, biological_sex, lifestyle,
                goals, conditions, medications, allergies, energy_level, sleep_quality, pain
            )
            VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id) DO UPDATE SET
                last_quiz_completed_at = EXCLUDED.last_quiz_completed_at,
                birth_date = EXCLUDED.birth_date,
                biological_sex = EXCLUDED.biological_sex,
                lifestyle = EXCLUDED.lifestyle,
                goals = EXCLUDED.goals,
                conditions = EXCLUDED.conditions,
                medications = EXCLUDED.medications,
                allergies = EXCLUDED.allergies,
                energy_level = EXCLUDED.energy_level,
                sleep_quality = EXCLUDED.sleep_quality,
                pain = EXCLUDED.pain,
                updated_at = now()
            RETURNING {PROFILE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, MedicalProfile>(&sql)
            .bind(user_id)
            .bind(completed_at)
            .bind(answers.birth_date)
            .bind(&answers.biological_sex)
            .bind(&answers.lifestyle)
            .bind(&answers.goals)
            .bind(&answers.conditions)
            .bind(&answers.medications)
            .bind(&answers.allergies)
            .bind(&answers.energy_level)
            .bind(&answers.sleep_quality)
            .bind(&answers.pain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failure("upsert_quiz_completion", e))
    }
}

/// MemoryProfileStore
///
/// In-process `ProfileStore` used for local runs without a database and in
/// tests. `new_failing()` builds a store whose every query errors.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, MedicalProfile>>,
    fail: bool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Seeds a profile row directly, bypassing the quiz form.
    pub fn insert(&self, profile: MedicalProfile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.user_id.clone(), profile);
    }

    fn check(&self) -> Result<(), StoreFailure> {
        if self.fail {
            return Err(StoreFailure::Other("memory store configured to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_quiz_completion(&self, user_id: &str) -> Result<QuizCompletion, StoreFailure> {
        let profile = self.get_medical_profile(user_id).await?;
        Ok(QuizCompletion {
            completed_at: profile.last_quiz_completed_at,
        })
    }

    async fn get_medical_profile(&self, user_id: &str) -> Result<MedicalProfile, StoreFailure> {
        self.check()?;
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
            .ok_or(StoreFailure::NotFound)
    }

    async fn upsert_quiz_completion(
        &self,
        user_id: &str,
        answers: &QuizAnswers,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalProfile, StoreFailure> {
        self.check()?;
        let profile = MedicalProfile::from_answers(user_id, answers, completed_at);
        self.insert(profile.clone());
        Ok(profile)
    }
}
