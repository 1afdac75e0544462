use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{info, instrument};

use super::responder::{ChatContext, TaskStats};
use crate::{auth::AuthUser, error::ApiError, extract::ApiJson, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub task_stats: TaskStats,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chatbot", post(chat))
}

/// Context is always rebuilt from the store; the client never supplies it.
pub async fn respond(
    state: &AppState,
    user: &AuthUser,
    req: ChatRequest,
    today: Date,
) -> Result<ChatResponse, ApiError> {
    let Some(message) = req.message.filter(|m| !m.trim().is_empty()) else {
        return Err(ApiError::validation("Message is required"));
    };

    let tasks = state.store.list_tasks(user.user_id).await?;
    let ctx = ChatContext::new(user.email.clone(), tasks, today);
    let response = state.responder.respond(&message, &ctx).await?;
    info!(user_id = user.user_id, total = ctx.stats.total, "chat answered");

    Ok(ChatResponse {
        success: true,
        response,
        task_stats: ctx.stats,
    })
}

#[instrument(skip(state, user, payload), fields(user_id = user.user_id))]
pub async fn chat(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    respond(&state, &user, payload, OffsetDateTime::now_utc().date())
        .await
        .map(Json)
}
