use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::models::account::{Account, Role};
use crate::models::application::Application;
use crate::models::chat::{ChatMessage, ChatSession, Sender, SessionState};
use crate::models::vacancy::{Posting, VacancySnapshot};
use crate::scoring::{Mismatch, ScoringResult};
use crate::store::{join_csv, split_csv, Store, StoreError};

// ────────────────────────────────────────────────────────────────────────────
// Row types (database shape, never leave this module)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    role: String,
}

#[derive(Debug, FromRow)]
struct VacancyRow {
    id: Uuid,
    created_by: Option<Uuid>,
    title: String,
    city: Option<String>,
    description: Option<String>,
    min_experience_years: Option<i32>,
    employment_type: Option<String>,
    education_level: Option<String>,
    languages: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    currency: Option<String>,
    skills: Option<String>,
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: Uuid,
    vacancy_id: Uuid,
    candidate_email: String,
    cv_text: Option<String>,
    relevance_score: Option<i32>,
    mismatch_reasons: Option<String>,
    summary_text: Option<String>,
    status: String,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    application_id: Uuid,
    state: String,
    last_score: Option<i32>,
    started_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    sender: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            role: Role::parse(&row.role),
        }
    }
}

impl From<VacancyRow> for Posting {
    fn from(row: VacancyRow) -> Self {
        Posting {
            id: row.id,
            created_by: row.created_by,
            vacancy: VacancySnapshot {
                title: row.title,
                city: row.city,
                description: row.description,
                min_experience_years: row.min_experience_years.unwrap_or(0).max(0) as u32,
                employment_type: row.employment_type,
                education_level: row.education_level,
                languages: split_csv(row.languages.as_deref()),
                salary_min: row.salary_min,
                salary_max: row.salary_max,
                currency: row.currency,
                skills: split_csv(row.skills.as_deref()),
            },
        }
    }
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        let mismatches = split_csv(row.mismatch_reasons.as_deref())
            .iter()
            .map(|name| Mismatch::from_label(name))
            .collect();
        Application {
            id: row.id,
            vacancy_id: row.vacancy_id,
            candidate_email: row.candidate_email,
            cv_text: row.cv_text,
            relevance_score: row.relevance_score,
            mismatches,
            summary: row.summary_text,
            status: row.status,
        }
    }
}

impl TryFrom<SessionRow> for ChatSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let state = SessionState::parse(&row.state).ok_or_else(|| {
            StoreError::Corrupt(format!("session {} has unknown state '{}'", row.id, row.state))
        })?;
        Ok(ChatSession {
            id: row.id,
            application_id: row.application_id,
            state,
            last_score: row.last_score,
            started_at: row.started_at,
            closed_at: row.closed_at,
        })
    }
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender = Sender::parse(&row.sender).ok_or_else(|| {
            StoreError::Corrupt(format!("message {} has unknown sender '{}'", row.id, row.sender))
        })?;
        Ok(ChatMessage {
            id: row.id,
            session_id: row.session_id,
            sender,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, application_id, state, last_score, started_at, closed_at";

// ────────────────────────────────────────────────────────────────────────────
// PgStore
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn active_session(&self, application_id: Uuid) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE application_id = $1 AND state <> 'closed' \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ChatSession::try_from).transpose()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT id, email, role FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, vacancy_id, candidate_email, cv_text, relevance_score,
                   mismatch_reasons, summary_text, status
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Application::from))
    }

    async fn posting(&self, id: Uuid) -> Result<Option<Posting>, StoreError> {
        let row = sqlx::query_as::<_, VacancyRow>(
            r#"
            SELECT id, created_by, title, city, description, min_experience_years,
                   employment_type, education_level, languages, salary_min, salary_max,
                   currency, skills
            FROM vacancies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Posting::from))
    }

    async fn save_scoring(
        &self,
        application_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), StoreError> {
        let names: Vec<&str> = result.mismatches.iter().map(Mismatch::as_str).collect();
        sqlx::query(
            r#"
            UPDATE applications
            SET relevance_score = $2, mismatch_reasons = $3, summary_text = $4
            WHERE id = $1
            "#,
        )
        .bind(application_id)
        .bind(i32::from(result.score))
        .bind(join_csv(&names))
        .bind(&result.summary)
        .execute(&self.pool)
        .await?;
        debug!(%application_id, score = result.score, "Saved scoring result");
        Ok(())
    }

    async fn save_candidate_profile(
        &self,
        application_id: Uuid,
        profile: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE applications SET parsed_cv_json = $2 WHERE id = $1")
            .bind(application_id)
            .bind(profile)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_application_status(
        &self,
        application_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE applications SET status = $2 WHERE id = $1")
            .bind(application_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_or_create_active_session(
        &self,
        application_id: Uuid,
        seed_score: Option<i32>,
    ) -> Result<ChatSession, StoreError> {
        if let Some(existing) = self.active_session(application_id).await? {
            return Ok(existing);
        }

        // The partial unique index turns a racing second insert into a no-op.
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, application_id, state, last_score)
            VALUES ($1, $2, 'awaiting_first_question', $3)
            ON CONFLICT (application_id) WHERE state <> 'closed' DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(seed_score)
        .execute(&self.pool)
        .await?;

        self.active_session(application_id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!(
                "no active session for application {application_id} after insert"
            ))
        })
    }

    async fn latest_session(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE application_id = $1 ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ChatSession::try_from).transpose()
    }

    async fn set_session_state(
        &self,
        session_id: Uuid,
        state: SessionState,
        last_score: Option<i32>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE chat_sessions
            SET state = $2,
                last_score = COALESCE($3, last_score),
                closed_at = CASE WHEN $2 = 'closed' THEN NOW() ELSE closed_at END
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(state.as_str())
        .bind(last_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO chat_messages (id, session_id, sender, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, session_id, sender, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(sender.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        ChatMessage::try_from(row)
    }

    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, sender, content, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn application_messages(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.session_id, m.sender, m.content, m.created_at
            FROM chat_messages m
            JOIN chat_sessions s ON s.id = m.session_id
            WHERE s.application_id = $1
            ORDER BY m.seq ASC
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }
}
