use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::application::Application;
use crate::models::chat::{ChatMessage, SessionState};
use crate::scoring::Mismatch;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SummaryResponse {
    pub relevance_score: Option<i32>,
    pub mismatch_reasons: Vec<Mismatch>,
    pub summary_text: Option<String>,
    pub status: String,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub exists: bool,
    pub state: Option<SessionState>,
    pub session_id: Option<Uuid>,
}

/// Loads an application the caller is allowed to read.
async fn viewable_application(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<Application, AppError> {
    let application = state
        .store
        .application(id)
        .await?
        .ok_or_else(|| AppError::NotFound("application not found".to_string()))?;
    let posting = state.store.posting(application.vacancy_id).await?;
    if !identity.can_view(&application, posting.as_ref()) {
        return Err(AppError::Forbidden);
    }
    Ok(application)
}

/// GET /api/v1/applications/:id/summary
pub async fn handle_get_summary(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<SummaryResponse>, AppError> {
    let application = viewable_application(&state, &identity, id).await?;
    Ok(Json(SummaryResponse {
        relevance_score: application.relevance_score,
        mismatch_reasons: application.mismatches,
        summary_text: application.summary,
        status: application.status,
    }))
}

/// GET /api/v1/applications/:id/session
pub async fn handle_get_session(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    viewable_application(&state, &identity, id).await?;
    let session = state.store.latest_session(id).await?;
    Ok(Json(SessionStatusResponse {
        exists: session.is_some(),
        state: session.as_ref().map(|s| s.state),
        session_id: session.map(|s| s.id),
    }))
}

/// GET /api/v1/applications/:id/messages
pub async fn handle_get_messages(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    viewable_application(&state, &identity, id).await?;
    Ok(Json(state.store.application_messages(id).await?))
}
