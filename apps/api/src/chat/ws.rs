use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, Uri},
    response::Response,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{identify, token_from, AuthError};
use crate::chat::protocol::{ChannelClosed, Outbox, ServerMessage};
use crate::chat::session::{Conversation, SessionError};
use crate::models::application::Application;
use crate::models::vacancy::VacancySnapshot;
use crate::state::AppState;
use crate::store::StoreError;

/// Why a connection was refused before the conversation started.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("application not found")]
    ApplicationNotFound,

    #[error("vacancy not found")]
    VacancyNotFound,

    #[error("internal error")]
    Store(#[from] StoreError),
}

/// GET /ws/applications/:id
pub async fn session_channel_handler(
    ws: WebSocketUpgrade,
    Path(application_id): Path<Uuid>,
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let token = token_from(&uri, &headers);
    ws.on_upgrade(move |socket| run_channel(socket, state, application_id, token))
}

/// Resolves and authorizes everything the conversation needs.
pub async fn bootstrap(
    state: &AppState,
    application_id: Uuid,
    token: Option<&str>,
) -> Result<(Application, VacancySnapshot), Rejection> {
    let identity = identify(state.store.as_ref(), &state.tokens, token).await?;
    let application = state
        .store
        .application(application_id)
        .await?
        .ok_or(Rejection::ApplicationNotFound)?;
    identity.ensure_owns(&application)?;
    let posting = state
        .store
        .posting(application.vacancy_id)
        .await?
        .ok_or(Rejection::VacancyNotFound)?;
    Ok((application, posting.vacancy))
}

/// What an inbound WebSocket message means to the conversation.
#[derive(Debug, PartialEq)]
enum Inbound {
    Envelope(String),
    Binary,
    Control,
    Closed,
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Inbound::Envelope(text),
            Message::Binary(_) => Inbound::Binary,
            Message::Ping(_) | Message::Pong(_) => Inbound::Control,
            Message::Close(_) => Inbound::Closed,
        }
    }
}

struct Channel {
    socket: WebSocket,
}

impl Channel {
    /// Next text frame, or `None` once the client is gone. Binary frames are
    /// answered with an error and skipped.
    async fn recv(&mut self) -> Option<String> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => {
                    debug!("Session channel read failed: {e}");
                    return None;
                }
            };
            match Inbound::from(message) {
                Inbound::Envelope(text) => return Some(text),
                Inbound::Binary => {
                    let reply = ServerMessage::error("binary frames are not supported");
                    if self.send(reply).await.is_err() {
                        return None;
                    }
                }
                Inbound::Control => continue,
                Inbound::Closed => return None,
            }
        }
    }

    async fn close(mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

#[async_trait]
impl Outbox for Channel {
    async fn send(&mut self, message: ServerMessage) -> Result<(), ChannelClosed> {
        let text = serde_json::to_string(&message).map_err(|e| {
            error!("Failed to encode outbound message: {e}");
            ChannelClosed
        })?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|_| ChannelClosed)
    }
}

async fn run_channel(
    socket: WebSocket,
    state: AppState,
    application_id: Uuid,
    token: Option<String>,
) {
    let mut channel = Channel { socket };

    let (application, vacancy) = match bootstrap(&state, application_id, token.as_deref()).await {
        Ok(found) => found,
        Err(rejection) => {
            if let Rejection::Store(e) = &rejection {
                error!(%application_id, "Session bootstrap failed: {e}");
            } else {
                warn!(%application_id, "Session channel rejected: {rejection}");
            }
            let _ = channel.send(ServerMessage::error(rejection.to_string())).await;
            channel.close().await;
            return;
        }
    };

    let mut conversation = match Conversation::open(
        &state.live_sessions,
        state.store.clone(),
        state.oracle.clone(),
        application,
        vacancy,
    )
    .await
    {
        Ok(conversation) => conversation,
        Err(SessionError::AlreadyActive) => {
            warn!(%application_id, "Session already has a live connection");
            let _ = channel
                .send(ServerMessage::error(SessionError::AlreadyActive.to_string()))
                .await;
            channel.close().await;
            return;
        }
        Err(e) => {
            error!(%application_id, "Failed to open conversation: {e}");
            let _ = channel.send(ServerMessage::error("internal error")).await;
            channel.close().await;
            return;
        }
    };

    match drive(&mut conversation, &mut channel).await {
        Ok(()) => {
            debug!(
                session_id = %conversation.session_id(),
                state = conversation.state().as_str(),
                "Session channel finished"
            );
        }
        Err(SessionError::Disconnected(_)) => {
            info!(session_id = %conversation.session_id(), "Client disconnected mid-step");
            return;
        }
        Err(e) => {
            error!(session_id = %conversation.session_id(), "Conversation aborted: {e}");
            let _ = channel.send(ServerMessage::error("internal error")).await;
        }
    }
    channel.close().await;
}

/// Strict alternation: one inbound frame is fully processed before the next is read.
async fn drive(conversation: &mut Conversation, channel: &mut Channel) -> Result<(), SessionError> {
    conversation.begin(channel).await?;
    while !conversation.is_closed() {
        let Some(frame) = channel.recv().await else {
            info!(session_id = %conversation.session_id(), "Client disconnected");
            return Ok(());
        };
        conversation.handle(&frame, channel).await?;
    }
    Ok(())
}
