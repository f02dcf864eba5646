use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::database::models::{ChatMessageRow, ChatSessionRow};
use crate::models::api::{
    AskQuestionRequest, AskQuestionResponse, ChatHistoryResponse, ChatMessageResponse,
    ChatSessionResponse, CreateSessionRequest, ListSessionsParams,
};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /api/rag/chat/ask
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskQuestionRequest>,
) -> Result<Json<AskQuestionResponse>, ApiError> {
    info!(
        session_id = ?request.session_id,
        model = %request.model,
        "Chat question"
    );

    if let Some(user_id) = request.user_id {
        state.permissions.require_ask(user_id).await?;
    }

    let start = Instant::now();
    let outcome = state.chat.ask_question(&request).await?;

    Ok(Json(AskQuestionResponse {
        answer: outcome.content,
        session_id: request.session_id,
        source_references: outcome.source_references,
        model_used: outcome.model_used,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// POST /api/rag/chat/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<ChatSessionResponse>, ApiError> {
    let session = state
        .chat
        .create_session(request.user_id, &request.session_name)
        .await?;

    Ok(Json(session_response(session)))
}

/// PUT /api/rag/chat/sessions/{id}
pub async fn rename_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<ChatSessionResponse>, ApiError> {
    let session = state
        .chat
        .rename_session(session_id, &request.session_name)
        .await?;

    Ok(Json(session_response(session)))
}

/// GET /api/rag/chat/sessions?user_id=
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<Vec<ChatSessionResponse>>, ApiError> {
    let sessions = state.chat.list_sessions(params.user_id).await?;

    Ok(Json(sessions.into_iter().map(session_response).collect()))
}

/// DELETE /api/rag/chat/sessions/{id}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.chat.delete_session(session_id).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Session gelöscht"
    })))
}

/// GET /api/rag/chat/sessions/{id}/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i32>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let messages = state.chat.get_history(session_id).await?;
    let total_messages = messages.len();

    Ok(Json(ChatHistoryResponse {
        session_id,
        messages: messages.into_iter().map(message_response).collect(),
        total_messages,
    }))
}

fn session_response(session: ChatSessionRow) -> ChatSessionResponse {
    ChatSessionResponse {
        id: session.id,
        user_id: session.user_id,
        session_name: session.session_name,
        created_at: session.created_at,
        last_message_at: session.last_message_at,
        is_active: session.is_active,
    }
}

fn message_response(message: ChatMessageRow) -> ChatMessageResponse {
    ChatMessageResponse {
        id: message.id,
        role: message.role,
        content: message.content,
        source_references: message.source_references.0,
        ai_model_used: message.ai_model_used,
        created_at: message.created_at,
    }
}
