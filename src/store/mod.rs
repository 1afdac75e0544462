//! Persistence for users, tasks and password resets.
//!
//! Every engine implements [`Store`]; the rest of the service only ever holds
//! an `Arc<dyn Store>` chosen at startup.

mod file;
mod memory;
mod postgres;
mod tables;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::info;

use crate::config::StoreBackend;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use types::{NewTask, PasswordReset, Priority, Task, TaskPatch, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique column already holds this value.
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    /// Returns false when no user has this email.
    async fn update_password_hash(&self, email: &str, password_hash: &str) -> StoreResult<bool>;

    // tasks, always scoped by owner
    async fn insert_task(&self, user_id: i64, task: NewTask, now: OffsetDateTime) -> StoreResult<Task>;
    /// Highest id first.
    async fn list_tasks(&self, user_id: i64) -> StoreResult<Vec<Task>>;
    async fn get_task(&self, user_id: i64, id: i64) -> StoreResult<Option<Task>>;
    async fn update_task(
        &self,
        user_id: i64,
        id: i64,
        patch: TaskPatch,
        now: OffsetDateTime,
    ) -> StoreResult<Option<Task>>;
    async fn toggle_task(&self, user_id: i64, id: i64, now: OffsetDateTime) -> StoreResult<Option<Task>>;
    /// Returns false when nothing was deleted.
    async fn delete_task(&self, user_id: i64, id: i64) -> StoreResult<bool>;

    // password resets
    async fn insert_password_reset(
        &self,
        email: &str,
        otp: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset>;
    /// Marks the newest unused, unexpired matching record as used.
    /// Returns false when there was none.
    async fn consume_password_reset(&self, email: &str, otp: &str, now: OffsetDateTime) -> StoreResult<bool>;
    async fn invalidate_password_resets(&self, email: &str) -> StoreResult<()>;
}

/// Opens the configured engine.
pub async fn open(backend: &StoreBackend) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match backend {
        StoreBackend::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File(path) => {
            info!(path = %path.display(), "using file store");
            Arc::new(FileStore::open(path).await?)
        }
        StoreBackend::Postgres(url) => {
            info!("using postgres store");
            Arc::new(PgStore::connect(url).await?)
        }
    };
    Ok(store)
}
