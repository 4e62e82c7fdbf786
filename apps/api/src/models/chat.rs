use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a screening conversation. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingFirstQuestion,
    Open,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingFirstQuestion => "awaiting_first_question",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "awaiting_first_question" => Some(SessionState::AwaitingFirstQuestion),
            "open" => Some(SessionState::Open),
            "closed" => Some(SessionState::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Bot => "bot",
            Sender::User => "user",
            Sender::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bot" => Some(Sender::Bot),
            "user" => Some(Sender::User),
            "system" => Some(Sender::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub application_id: Uuid,
    pub state: SessionState,
    pub last_score: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One question/answer exchange. `answer` is `None` while the question is pending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: Option<String>,
}

/// Rebuilds the turn sequence from a stored message log.
/// Bot messages open a turn; the next user message answers it; system notes are skipped.
pub fn turns_from_messages(messages: &[ChatMessage]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    for message in messages {
        match message.sender {
            Sender::Bot => turns.push(Turn {
                question: message.content.clone(),
                answer: None,
            }),
            Sender::User => {
                if let Some(last) = turns.last_mut().filter(|t| t.answer.is_none()) {
                    last.answer = Some(message.content.clone());
                }
            }
            Sender::System => {}
        }
    }
    turns
}
