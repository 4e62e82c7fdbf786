// In-memory `Store` for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::account::{Account, Role};
use crate::models::application::Application;
use crate::models::chat::{ChatMessage, ChatSession, Sender, SessionState};
use crate::models::vacancy::{Posting, VacancySnapshot};
use crate::scoring::ScoringResult;
use crate::store::{Store, StoreError};

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    postings: Vec<Posting>,
    applications: Vec<Application>,
    profiles: Vec<(Uuid, Value)>,
    sessions: Vec<ChatSession>,
    messages: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.lock().unwrap();
        f(&mut tables)
    }

    pub fn add_account(&self, email: &str, role: Role) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        };
        self.with(|t| t.accounts.push(account.clone()));
        account
    }

    pub fn add_posting(&self, created_by: Option<Uuid>, vacancy: VacancySnapshot) -> Posting {
        let posting = Posting {
            id: Uuid::new_v4(),
            created_by,
            vacancy,
        };
        self.with(|t| t.postings.push(posting.clone()));
        posting
    }

    pub fn add_application(&self, vacancy_id: Uuid, email: &str, cv_text: &str) -> Application {
        let application = Application {
            id: Uuid::new_v4(),
            vacancy_id,
            candidate_email: email.to_string(),
            cv_text: Some(cv_text.to_string()),
            relevance_score: None,
            mismatches: Vec::new(),
            summary: None,
            status: "submitted".to_string(),
        };
        self.with(|t| t.applications.push(application.clone()));
        application
    }

    pub fn application_now(&self, id: Uuid) -> Option<Application> {
        self.with(|t| t.applications.iter().find(|a| a.id == id).cloned())
    }

    pub fn sessions_for(&self, application_id: Uuid) -> Vec<ChatSession> {
        self.with(|t| {
            t.sessions
                .iter()
                .filter(|s| s.application_id == application_id)
                .cloned()
                .collect()
        })
    }

    pub fn profile_for(&self, application_id: Uuid) -> Option<Value> {
        self.with(|t| {
            t.profiles
                .iter()
                .find(|(id, _)| *id == application_id)
                .map(|(_, p)| p.clone())
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.with(|t| t.accounts.iter().find(|a| a.id == id).cloned()))
    }

    async fn application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.application_now(id))
    }

    async fn posting(&self, id: Uuid) -> Result<Option<Posting>, StoreError> {
        Ok(self.with(|t| t.postings.iter().find(|p| p.id == id).cloned()))
    }

    async fn save_scoring(
        &self,
        application_id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), StoreError> {
        self.with(|t| {
            if let Some(app) = t.applications.iter_mut().find(|a| a.id == application_id) {
                app.relevance_score = Some(i32::from(result.score));
                app.mismatches = result.mismatches.clone();
                app.summary = Some(result.summary.clone());
            }
        });
        Ok(())
    }

    async fn save_candidate_profile(
        &self,
        application_id: Uuid,
        profile: &Value,
    ) -> Result<(), StoreError> {
        self.with(|t| {
            t.profiles.retain(|(id, _)| *id != application_id);
            t.profiles.push((application_id, profile.clone()));
        });
        Ok(())
    }

    async fn set_application_status(
        &self,
        application_id: Uuid,
        status: &str,
    ) -> Result<(), StoreError> {
        self.with(|t| {
            if let Some(app) = t.applications.iter_mut().find(|a| a.id == application_id) {
                app.status = status.to_string();
            }
        });
        Ok(())
    }

    async fn get_or_create_active_session(
        &self,
        application_id: Uuid,
        seed_score: Option<i32>,
    ) -> Result<ChatSession, StoreError> {
        Ok(self.with(|t| {
            if let Some(existing) = t
                .sessions
                .iter()
                .find(|s| s.application_id == application_id && s.state != SessionState::Closed)
            {
                return existing.clone();
            }
            let session = ChatSession {
                id: Uuid::new_v4(),
                application_id,
                state: SessionState::AwaitingFirstQuestion,
                last_score: seed_score,
                started_at: Utc::now(),
                closed_at: None,
            };
            t.sessions.push(session.clone());
            session
        }))
    }

    async fn latest_session(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.with(|t| {
            t.sessions
                .iter()
                .rev()
                .find(|s| s.application_id == application_id)
                .cloned()
        }))
    }

    async fn set_session_state(
        &self,
        session_id: Uuid,
        state: SessionState,
        last_score: Option<i32>,
    ) -> Result<(), StoreError> {
        self.with(|t| {
            if let Some(session) = t.sessions.iter_mut().find(|s| s.id == session_id) {
                session.state = state;
                if last_score.is_some() {
                    session.last_score = last_score;
                }
                if state == SessionState::Closed {
                    session.closed_at = Some(Utc::now());
                }
            }
        });
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.with(|t| t.messages.push(message.clone()));
        Ok(message)
    }

    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.with(|t| {
            t.messages
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect()
        }))
    }

    async fn application_messages(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.with(|t| {
            let session_ids: Vec<Uuid> = t
                .sessions
                .iter()
                .filter(|s| s.application_id == application_id)
                .map(|s| s.id)
                .collect();
            t.messages
                .iter()
                .filter(|m| session_ids.contains(&m.session_id))
                .cloned()
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reuses_active_session() {
        let store = MemoryStore::new();
        let app_id = Uuid::new_v4();
        let first = store.get_or_create_active_session(app_id, Some(50)).await.unwrap();
        let second = store.get_or_create_active_session(app_id, None).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.last_score, Some(50));

        store
            .set_session_state(first.id, SessionState::Closed, None)
            .await
            .unwrap();
        let third = store.get_or_create_active_session(app_id, None).await.unwrap();
        assert_ne!(third.id, first.id);
        assert_eq!(third.state, SessionState::AwaitingFirstQuestion);
    }
}
