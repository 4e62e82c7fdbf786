//! Conversation state machine for one screening session.
//!
//! States: `awaiting_first_question → open → closed`. `closed` is terminal.
//! A `Conversation` holds the session's claim in `LiveSessions`, so exactly one
//! connection drives it and every step runs sequentially; the oracle call is the only slow operation and is spawned onto
//! the runtime so other sessions keep making progress while this one waits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::claims::{LiveSessions, SessionClaim};
use crate::chat::protocol::{ChannelClosed, ClientMessage, Outbox, ServerMessage};
use crate::models::application::{Application, STATUS_SCREENED};
use crate::models::chat::{turns_from_messages, ChatSession, Sender, SessionState, Turn};
use crate::models::vacancy::VacancySnapshot;
use crate::oracle::{OracleOutcome, ScoringOracle};
use crate::scoring::questions::question_variants;
use crate::scoring::relevance::compute_relevance;
use crate::scoring::{Mismatch, ScoringResult};
use crate::store::{Store, StoreError};

/// Hard ceiling on questions asked in one session.
pub const MAX_TURNS: usize = 8;

/// Upper bound on one oracle evaluation, provider fallbacks and retries included.
pub const ORACLE_DEADLINE: Duration = Duration::from_secs(60);

pub const ANALYSIS_STATUS: &str = "Evaluating your résumé…";
pub const RESUME_EVALUATED: &str =
    "Thank you! We have evaluated your résumé and will pass the information to the recruiter.";
pub const ANSWERS_RECORDED: &str =
    "Thank you! We have taken your answers into account and will pass them to the recruiter.";

const ACKNOWLEDGMENTS: &[&str] = &[
    "Thank you, that helps.",
    "Got it, thanks for clarifying!",
    "Thanks, noted.",
    "Understood, thank you for the detail.",
];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Disconnected: {0}")]
    Disconnected(#[from] ChannelClosed),

    #[error("session already active")]
    AlreadyActive,
}

pub struct Conversation {
    store: Arc<dyn Store>,
    oracle: Arc<dyn ScoringOracle>,
    application: Application,
    vacancy: VacancySnapshot,
    session: ChatSession,
    turns: Vec<Turn>,
    /// Normalized text of every question asked in this session.
    asked: HashSet<String>,
    _claim: SessionClaim,
}

impl Conversation {
    /// Resumes the application's active session or starts a new one, replaying
    /// any prior turns into context. Fails with `AlreadyActive` while another
    /// connection is driving the same session.
    pub async fn open(
        live: &LiveSessions,
        store: Arc<dyn Store>,
        oracle: Arc<dyn ScoringOracle>,
        application: Application,
        vacancy: VacancySnapshot,
    ) -> Result<Self, SessionError> {
        let session = store
            .get_or_create_active_session(application.id, application.relevance_score)
            .await?;
        let claim = live.claim(session.id).ok_or(SessionError::AlreadyActive)?;
        let messages = store.session_messages(session.id).await?;
        let turns = turns_from_messages(&messages);
        let asked = turns.iter().map(|t| normalize(&t.question)).collect();

        info!(
            session_id = %session.id,
            application_id = %application.id,
            state = session.state.as_str(),
            prior_turns = turns.len(),
            "Conversation opened"
        );

        Ok(Self {
            store,
            oracle,
            application,
            vacancy,
            session,
            turns,
            asked,
            _claim: claim,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn is_closed(&self) -> bool {
        self.session.state == SessionState::Closed
    }

    /// Greets the client and brings the session to the point where it waits for
    /// an answer (or closes it).
    pub async fn begin<O: Outbox>(&mut self, out: &mut O) -> Result<(), SessionError> {
        out.send(ServerMessage::Welcome {
            session_id: self.session.id,
        })
        .await?;

        match self.session.state {
            SessionState::Closed => Ok(()),
            SessionState::AwaitingFirstQuestion => self.first_question(out).await,
            SessionState::Open => match self.turns.last() {
                None => self.first_question(out).await,
                Some(turn) if turn.answer.is_none() => {
                    // Re-send the pending question; it is already recorded.
                    let text = turn.question.clone();
                    out.send(ServerMessage::Question {
                        id: self.turns.len() as u32,
                        text,
                    })
                    .await?;
                    Ok(())
                }
                Some(_) => {
                    out.send(ServerMessage::BotTyping { value: true }).await?;
                    self.after_answer(out).await
                }
            },
        }
    }

    /// Processes one raw inbound frame.
    pub async fn handle<O: Outbox>(&mut self, raw: &str, out: &mut O) -> Result<(), SessionError> {
        let Some(message) = ClientMessage::parse(raw) else {
            out.send(ServerMessage::error("unknown message")).await?;
            return Ok(());
        };

        if self.is_closed() {
            out.send(ServerMessage::error("session is closed")).await?;
            return Ok(());
        }

        match message {
            ClientMessage::Answer { text } => self.answer(text, out).await,
            ClientMessage::End => self.end(out).await,
        }
    }

    async fn first_question<O: Outbox>(&mut self, out: &mut O) -> Result<(), SessionError> {
        out.send(ServerMessage::AnalysisStatus {
            message: ANALYSIS_STATUS.to_string(),
        })
        .await?;
        out.send(ServerMessage::BotTyping { value: true }).await?;
        let outcome = self.consult().await;
        out.send(ServerMessage::BotTyping { value: false }).await?;

        if let OracleOutcome::Verdict(verdict) = &outcome {
            if let Some(question) = verdict.question.as_deref().filter(|q| !self.was_asked(q)) {
                let question = question.to_string();
                self.persist(&verdict.scoring(), verdict.candidate_profile.as_ref())
                    .await?;
                return self.ask(question, out).await;
            }
        }

        let result = compute_relevance(self.application.resume_text(), &self.vacancy);
        self.persist(&result, None).await?;
        match self.next_fallback(&result.mismatches) {
            Some(question) => self.ask(question, out).await,
            None => self.close(&result, out).await,
        }
    }

    async fn answer<O: Outbox>(&mut self, text: String, out: &mut O) -> Result<(), SessionError> {
        let pending = self.session.state == SessionState::Open
            && self.turns.last().is_some_and(|t| t.answer.is_none());
        if !pending {
            out.send(ServerMessage::error("no question is awaiting an answer"))
                .await?;
            return Ok(());
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            out.send(ServerMessage::error("answer text is required")).await?;
            return Ok(());
        }

        self.store
            .append_message(self.session.id, Sender::User, &text)
            .await?;
        if let Some(turn) = self.turns.last_mut() {
            turn.answer = Some(text);
        }

        out.send(ServerMessage::BotTyping { value: true }).await?;
        self.after_answer(out).await
    }

    /// Rescores with full context, then asks the next question or closes.
    async fn after_answer<O: Outbox>(&mut self, out: &mut O) -> Result<(), SessionError> {
        let outcome = self.consult().await;
        out.send(ServerMessage::BotTyping { value: false }).await?;

        let (result, oracle_question, profile) = match outcome {
            OracleOutcome::Verdict(verdict) => {
                let result = verdict.scoring();
                (result, verdict.question, verdict.candidate_profile)
            }
            OracleOutcome::Unavailable => (
                compute_relevance(self.application.resume_text(), &self.vacancy),
                None,
                None,
            ),
        };
        self.persist(&result, profile.as_ref()).await?;

        if result.mismatches.is_empty() || self.turns.len() >= MAX_TURNS {
            return self.close(&result, out).await;
        }

        let next = oracle_question
            .filter(|q| !self.was_asked(q))
            .or_else(|| self.next_fallback(&result.mismatches));
        match next {
            Some(question) => {
                let ack = ACKNOWLEDGMENTS[(self.turns.len() - 1) % ACKNOWLEDGMENTS.len()];
                out.send(ServerMessage::AnalysisUpdate {
                    message: ack.to_string(),
                })
                .await?;
                self.ask(question, out).await
            }
            None => self.close(&result, out).await,
        }
    }

    async fn end<O: Outbox>(&mut self, out: &mut O) -> Result<(), SessionError> {
        info!(session_id = %self.session.id, "End requested by client");
        out.send(ServerMessage::BotTyping { value: true }).await?;
        let outcome = self.consult().await;
        out.send(ServerMessage::BotTyping { value: false }).await?;

        let (result, profile) = match outcome {
            OracleOutcome::Verdict(verdict) => (verdict.scoring(), verdict.candidate_profile),
            OracleOutcome::Unavailable => (
                compute_relevance(self.application.resume_text(), &self.vacancy),
                None,
            ),
        };
        self.persist(&result, profile.as_ref()).await?;
        if !result.summary.is_empty() {
            self.store
                .append_message(
                    self.session.id,
                    Sender::System,
                    &format!("Final summary: {}", result.summary),
                )
                .await?;
        }
        self.close(&result, out).await
    }

    /// Records and emits a question, opening the session if needed.
    async fn ask<O: Outbox>(&mut self, question: String, out: &mut O) -> Result<(), SessionError> {
        self.store
            .append_message(self.session.id, Sender::Bot, &question)
            .await?;
        self.asked.insert(normalize(&question));
        self.turns.push(Turn {
            question: question.clone(),
            answer: None,
        });

        if self.session.state != SessionState::Open {
            self.store
                .set_session_state(self.session.id, SessionState::Open, None)
                .await?;
            self.session.state = SessionState::Open;
        }

        out.send(ServerMessage::Question {
            id: self.turns.len() as u32,
            text: question,
        })
        .await?;
        Ok(())
    }

    async fn close<O: Outbox>(
        &mut self,
        result: &ScoringResult,
        out: &mut O,
    ) -> Result<(), SessionError> {
        self.store
            .set_application_status(self.application.id, STATUS_SCREENED)
            .await?;
        self.store
            .set_session_state(
                self.session.id,
                SessionState::Closed,
                Some(i32::from(result.score)),
            )
            .await?;
        self.session.state = SessionState::Closed;

        info!(
            session_id = %self.session.id,
            application_id = %self.application.id,
            score = result.score,
            questions = self.turns.len(),
            "Conversation closed"
        );

        let message = if self.turns.is_empty() {
            RESUME_EVALUATED
        } else {
            ANSWERS_RECORDED
        };
        out.send(ServerMessage::FinalSummary {
            message: message.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn persist(
        &mut self,
        result: &ScoringResult,
        profile: Option<&serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.store.save_scoring(self.application.id, result).await?;
        if let Some(profile) = profile.filter(|p| !p.is_null()) {
            self.store
                .save_candidate_profile(self.application.id, profile)
                .await?;
        }
        let score = i32::from(result.score);
        self.application.relevance_score = Some(score);
        self.session.last_score = Some(score);
        self.store
            .set_session_state(self.session.id, self.session.state, Some(score))
            .await
    }

    /// Runs the oracle off this connection's control flow. A panicked,
    /// cancelled or overdue evaluation counts as unavailable.
    async fn consult(&self) -> OracleOutcome {
        let oracle = Arc::clone(&self.oracle);
        let resume = self.application.resume_text().to_string();
        let vacancy = self.vacancy.clone();
        let context = self.turns.clone();

        let mut task =
            tokio::spawn(async move { oracle.evaluate(&resume, &vacancy, &context).await });
        match tokio::time::timeout(ORACLE_DEADLINE, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(session_id = %self.session.id, "Oracle task failed: {e}");
                OracleOutcome::Unavailable
            }
            Err(_) => {
                task.abort();
                warn!(
                    session_id = %self.session.id,
                    "Oracle gave no answer within {}s",
                    ORACLE_DEADLINE.as_secs()
                );
                OracleOutcome::Unavailable
            }
        }
    }

    /// First template, across current mismatches and then their follow-up
    /// phrasings, that has not been asked yet.
    fn next_fallback(&self, mismatches: &[Mismatch]) -> Option<String> {
        let candidates: Vec<[String; 2]> = mismatches
            .iter()
            .map(|m| question_variants(*m, &self.vacancy))
            .collect();
        (0..2)
            .flat_map(|phrasing| candidates.iter().map(move |v| &v[phrasing]))
            .find(|q| !self.was_asked(q))
            .cloned()
    }

    fn was_asked(&self, question: &str) -> bool {
        self.asked.contains(&normalize(question))
    }
}

fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}
