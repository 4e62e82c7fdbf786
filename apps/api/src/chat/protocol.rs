//! Session channel envelopes.
//!
//! Every message is a JSON object tagged by `type`. The conversation core writes
//! through an [`Outbox`] so it never depends on the concrete transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { session_id: Uuid },
    AnalysisStatus { message: String },
    BotTyping { value: bool },
    Question { id: u32, text: String },
    AnalysisUpdate { message: String },
    FinalSummary { message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Answer {
        #[serde(default)]
        text: String,
    },
    End,
}

impl ClientMessage {
    /// `None` for anything that is not a recognised envelope.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Error)]
#[error("session channel closed")]
pub struct ChannelClosed;

/// Outbound half of the session channel.
#[async_trait]
pub trait Outbox: Send {
    async fn send(&mut self, message: ServerMessage) -> Result<(), ChannelClosed>;
}

#[cfg(test)]
#[async_trait]
impl Outbox for Vec<ServerMessage> {
    async fn send(&mut self, message: ServerMessage) -> Result<(), ChannelClosed> {
        self.push(message);
        Ok(())
    }
}
