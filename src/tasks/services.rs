use time::OffsetDateTime;
use tracing::{info, warn};

use super::dto::{CreateTaskRequest, TaskResponse, UpdateTaskRequest};
use crate::{
    error::ApiError,
    state::AppState,
    store::{types::non_empty, types::DEFAULT_LIST, NewTask, TaskPatch},
};

const TASK_NOT_FOUND: &str = "Task not found";

/// Ids that are not integers cannot name a task.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::not_found(TASK_NOT_FOUND))
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub async fn list(state: &AppState, user_id: i64) -> Result<Vec<TaskResponse>, ApiError> {
    let tasks = state.store.list_tasks(user_id).await?;
    Ok(tasks.into_iter().map(TaskResponse::from).collect())
}

pub async fn create(
    state: &AppState,
    user_id: i64,
    req: CreateTaskRequest,
    now: OffsetDateTime,
) -> Result<TaskResponse, ApiError> {
    let Some(title) = req.title.filter(|t| !blank(t)) else {
        return Err(ApiError::validation("Title is required"));
    };

    let new = NewTask {
        title,
        description: req.description.unwrap_or_default(),
        due_date: req.due_date.and_then(non_empty),
        list: req
            .list
            .filter(|l| !blank(l))
            .unwrap_or_else(|| DEFAULT_LIST.to_string()),
        tags: req.tags.unwrap_or_default(),
        subtasks: req.subtasks.unwrap_or_default(),
        priority: req.priority.unwrap_or_default(),
    };
    let task = state.store.insert_task(user_id, new, now).await?;
    info!(user_id, task_id = task.id, "task created");
    Ok(task.into())
}

pub async fn update(
    state: &AppState,
    user_id: i64,
    id: &str,
    req: UpdateTaskRequest,
    now: OffsetDateTime,
) -> Result<TaskResponse, ApiError> {
    let id = parse_id(id)?;
    if req.title.as_deref().is_some_and(blank) {
        return Err(ApiError::validation("Title cannot be empty"));
    }

    let patch = TaskPatch {
        title: req.title,
        description: req.description,
        completed: req.completed,
        due_date: req.due_date,
        list: req.list,
        tags: req.tags,
        subtasks: req.subtasks,
        priority: req.priority,
    };
    match state.store.update_task(user_id, id, patch, now).await? {
        Some(task) => {
            info!(user_id, task_id = id, "task updated");
            Ok(task.into())
        }
        None => {
            warn!(user_id, task_id = id, "update of missing task");
            Err(ApiError::not_found(TASK_NOT_FOUND))
        }
    }
}

pub async fn toggle(
    state: &AppState,
    user_id: i64,
    id: &str,
    now: OffsetDateTime,
) -> Result<TaskResponse, ApiError> {
    let id = parse_id(id)?;
    let task = state
        .store
        .toggle_task(user_id, id, now)
        .await?
        .ok_or_else(|| ApiError::not_found(TASK_NOT_FOUND))?;
    info!(user_id, task_id = id, completed = task.completed, "task toggled");
    Ok(task.into())
}

pub async fn delete(state: &AppState, user_id: i64, id: &str) -> Result<(), ApiError> {
    let id = parse_id(id)?;
    if !state.store.delete_task(user_id, id).await? {
        warn!(user_id, task_id = id, "delete of missing task");
        return Err(ApiError::not_found(TASK_NOT_FOUND));
    }
    info!(user_id, task_id = id, "task deleted");
    Ok(())
}
