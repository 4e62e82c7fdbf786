//! Storage collaborator seam.
//!
//! The conversation core only sees `Store`; list-valued columns (skills, languages,
//! mismatches) are comma-joined text in Postgres and proper `Vec`s everywhere else.
//! That conversion lives in `postgres.rs` and nowhere else.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::account::Account;
use crate::models::application::Application;
use crate::models::chat::{ChatMessage, ChatSession, Sender, SessionState};
use crate::models::vacancy::Posting;
use crate::scoring::ScoringResult;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn application(&self, id: Uuid) -> Result<Option<Application>, StoreError>;

    async fn posting(&self, id: Uuid) -> Result<Option<Posting>, StoreError>;

    /// Overwrites the application's score, mismatches and summary.
    async fn save_scoring(
        &self,
        application_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), StoreError>;

    async fn save_candidate_profile(
        &self,
        application_id: Uuid,
        profile: &Value,
    ) -> Result<(), StoreError>;

    async fn set_application_status(
        &self,
        application_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError>;

    /// Returns the application's non-closed session, creating one in
    /// `awaiting_first_question` if there is none.
    ///
    /// This is the single serialization point for concurrent session starts:
    /// two racing callers for the same application get the same session back.
    async fn get_or_create_active_session(
        &self,
        application_id: Uuid,
        seed_score: Option<i32>,
    ) -> Result<ChatSession, StoreError>;

    /// Most recently started session, whatever its state.
    async fn latest_session(&self, application_id: Uuid)
        -> Result<Option<ChatSession>, StoreError>;

    /// Sets `closed_at` when moving to `Closed`.
    async fn set_session_state(
        &self,
        session_id: Uuid,
        state: SessionState,
        last_score: Option<i32>,
    ) -> Result<(), StoreError>;

    async fn append_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// Messages of one session in insertion order.
    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;

    /// Messages across every session of an application, in insertion order.
    async fn application_messages(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

/// `"a, b,,c"` → `["a", "b", "c"]`.
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_csv<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
