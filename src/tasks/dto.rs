use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::{Priority, Task};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub list: Option<String>,
    pub tags: Option<Vec<String>>,
    pub subtasks: Option<Vec<String>>,
    pub priority: Option<Priority>,
}

/// Every field optional; `null` and absent both mean "keep".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<String>,
    pub list: Option<String>,
    pub tags: Option<Vec<String>>,
    pub subtasks: Option<Vec<String>>,
    pub priority: Option<Priority>,
}

/// Task as the client sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub due_date: Option<String>,
    pub list: String,
    pub tags: Vec<String>,
    pub subtasks: Vec<String>,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description,
            completed: t.completed,
            due_date: t.due_date,
            list: t.list,
            tags: t.tags,
            subtasks: t.subtasks,
            priority: t.priority,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}
