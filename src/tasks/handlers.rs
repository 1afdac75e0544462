use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::{CreateTaskRequest, TaskResponse, UpdateTaskRequest};
use super::services;
use crate::{auth::AuthUser, error::ApiError, extract::ApiJson, state::AppState};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", put(update_task).delete(delete_task))
        .route("/tasks/:id/toggle", patch(toggle_task))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    services::list(&state, user.user_id).await.map(Json)
}

#[instrument(skip(state, user, payload), fields(user_id = user.user_id))]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let task = services::create(&state, user.user_id, payload, OffsetDateTime::now_utc()).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user, payload), fields(user_id = user.user_id))]
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    services::update(&state, user.user_id, &id, payload, OffsetDateTime::now_utc())
        .await
        .map(Json)
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn toggle_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    services::toggle(&state, user.user_id, &id, OffsetDateTime::now_utc())
        .await
        .map(Json)
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    services::delete(&state, user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
