use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;

use super::types::{non_empty, NewTask, PasswordReset, Task, TaskPatch, User};
use super::{Store, StoreError, StoreResult};

const TASK_COLUMNS: &str = "id, user_id, title, description, completed, due_date, list, \
                            tags, subtasks, priority, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
        }
    }
}

/// Row as stored: flags are 0/1, tags and subtasks are JSON text.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    user_id: i64,
    title: String,
    description: String,
    completed: i32,
    due_date: Option<String>,
    list: String,
    tags: String,
    subtasks: String,
    priority: String,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            description: r.description,
            completed: r.completed != 0,
            due_date: r.due_date.and_then(non_empty),
            list: r.list,
            tags: serde_json::from_str(&r.tags).context("decode tags")?,
            subtasks: serde_json::from_str(&r.subtasks).context("decode subtasks")?,
            priority: r.priority.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn encode_list(items: &[String]) -> anyhow::Result<String> {
    serde_json::to_string(items).context("encode string list")
}

fn decode_rows(rows: Vec<TaskRow>) -> StoreResult<Vec<Task>> {
    rows.into_iter()
        .map(|r| Task::try_from(r).map_err(StoreError::from))
        .collect()
}

fn decode_row(row: Option<TaskRow>) -> StoreResult<Option<Task>> {
    row.map(Task::try_from).transpose().map_err(StoreError::from)
}

fn db_err(e: sqlx::Error, what: &'static str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(e).context(what))
}

/// PostgreSQL engine. Every operation is one statement so concurrent
/// requests never see half-applied writes.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        Ok(Self { db })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref d) if d.is_unique_violation() => {
                StoreError::Conflict("users.email")
            }
            e => db_err(e, "insert user"),
        })?;
        Ok(row.into())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| db_err(e, "find user by email"))?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| db_err(e, "find user by id"))?;
        Ok(row.map(User::from))
    }

    async fn update_password_hash(&self, email: &str, password_hash: &str) -> StoreResult<bool> {
        let res = sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE email = $2"#)
            .bind(password_hash)
            .bind(email)
            .execute(&self.db)
            .await
            .map_err(|e| db_err(e, "update password hash"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_task(&self, user_id: i64, task: NewTask, now: OffsetDateTime) -> StoreResult<Task> {
        let sql = format!(
            r#"
            INSERT INTO tasks (user_id, title, description, completed, due_date, list,
                               tags, subtasks, priority, created_at)
            VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8, $9)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(user_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.due_date)
            .bind(&task.list)
            .bind(encode_list(&task.tags)?)
            .bind(encode_list(&task.subtasks)?)
            .bind(task.priority.as_str())
            .bind(now)
            .fetch_one(&self.db)
            .await
            .map_err(|e| db_err(e, "insert task"))?;
        Ok(Task::try_from(row)?)
    }

    async fn list_tasks(&self, user_id: i64) -> StoreResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 ORDER BY id DESC");
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| db_err(e, "list tasks"))?;
        decode_rows(rows)
    }

    async fn get_task(&self, user_id: i64, id: i64) -> StoreResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| db_err(e, "get task"))?;
        decode_row(row)
    }

    async fn update_task(
        &self,
        user_id: i64,
        id: i64,
        patch: TaskPatch,
        now: OffsetDateTime,
    ) -> StoreResult<Option<Task>> {
        // An explicit empty due date clears the column; absent keeps it.
        let clear_due = matches!(patch.due_date.as_deref(), Some(d) if d.trim().is_empty());
        let tags = patch.tags.as_deref().map(encode_list).transpose()?;
        let subtasks = patch.subtasks.as_deref().map(encode_list).transpose()?;
        let sql = format!(
            r#"
            UPDATE tasks SET
                title       = COALESCE($3, title),
                description = COALESCE($4, description),
                completed   = COALESCE($5, completed),
                due_date    = CASE WHEN $6 THEN NULL ELSE COALESCE($7, due_date) END,
                list        = COALESCE($8, list),
                tags        = COALESCE($9, tags),
                subtasks    = COALESCE($10, subtasks),
                priority    = COALESCE($11, priority),
                updated_at  = $12
            WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.completed.map(i32::from))
            .bind(clear_due)
            .bind(patch.due_date.and_then(non_empty))
            .bind(patch.list)
            .bind(tags)
            .bind(subtasks)
            .bind(patch.priority.map(|p| p.as_str()))
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| db_err(e, "update task"))?;
        decode_row(row)
    }

    async fn toggle_task(&self, user_id: i64, id: i64, now: OffsetDateTime) -> StoreResult<Option<Task>> {
        let sql = format!(
            r#"
            UPDATE tasks SET completed = 1 - completed, updated_at = $3
            WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| db_err(e, "toggle task"))?;
        decode_row(row)
    }

    async fn delete_task(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        let res = sqlx::query(r#"DELETE FROM tasks WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(|e| db_err(e, "delete task"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_password_reset(
        &self,
        email: &str,
        otp: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO password_resets (email, otp, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(otp)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|e| db_err(e, "insert password reset"))?;
        Ok(PasswordReset {
            id,
            email: email.to_string(),
            otp: otp.to_string(),
            expires_at,
            used: false,
            created_at: now,
        })
    }

    async fn consume_password_reset(&self, email: &str, otp: &str, now: OffsetDateTime) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE password_resets SET used = 1
            WHERE id = (
                SELECT id FROM password_resets
                WHERE email = $1 AND otp = $2 AND used = 0 AND expires_at > $3
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(otp)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| db_err(e, "consume password reset"))?;
        Ok(row.is_some())
    }

    async fn invalidate_password_resets(&self, email: &str) -> StoreResult<()> {
        sqlx::query(r#"UPDATE password_resets SET used = 1 WHERE email = $1"#)
            .bind(email)
            .execute(&self.db)
            .await
            .map_err(|e| db_err(e, "invalidate password resets"))?;
        Ok(())
    }
}
