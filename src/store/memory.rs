use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::tables::Tables;
use super::types::{NewTask, PasswordReset, Task, TaskPatch, User};
use super::{Store, StoreResult};

/// Everything lives in process memory and is gone on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        self.tables
            .lock()
            .await
            .create_user(email, password_hash, OffsetDateTime::now_utc())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.find_user_by_email(email))
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.find_user_by_id(id))
    }

    async fn update_password_hash(&self, email: &str, password_hash: &str) -> StoreResult<bool> {
        Ok(self.tables.lock().await.update_password_hash(email, password_hash))
    }

    async fn insert_task(&self, user_id: i64, task: NewTask, now: OffsetDateTime) -> StoreResult<Task> {
        Ok(self.tables.lock().await.insert_task(user_id, task, now))
    }

    async fn list_tasks(&self, user_id: i64) -> StoreResult<Vec<Task>> {
        Ok(self.tables.lock().await.list_tasks(user_id))
    }

    async fn get_task(&self, user_id: i64, id: i64) -> StoreResult<Option<Task>> {
        Ok(self.tables.lock().await.get_task(user_id, id))
    }

    async fn update_task(
        &self,
        user_id: i64,
        id: i64,
        patch: TaskPatch,
        now: OffsetDateTime,
    ) -> StoreResult<Option<Task>> {
        Ok(self.tables.lock().await.update_task(user_id, id, patch, now))
    }

    async fn toggle_task(&self, user_id: i64, id: i64, now: OffsetDateTime) -> StoreResult<Option<Task>> {
        Ok(self.tables.lock().await.toggle_task(user_id, id, now))
    }

    async fn delete_task(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        Ok(self.tables.lock().await.delete_task(user_id, id))
    }

    async fn insert_password_reset(
        &self,
        email: &str,
        otp: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        Ok(self
            .tables
            .lock()
            .await
            .insert_password_reset(email, otp, expires_at, now))
    }

    async fn consume_password_reset(&self, email: &str, otp: &str, now: OffsetDateTime) -> StoreResult<bool> {
        Ok(self.tables.lock().await.consume_password_reset(email, otp, now))
    }

    async fn invalidate_password_resets(&self, email: &str) -> StoreResult<()> {
        self.tables.lock().await.invalidate_password_resets(email);
        Ok(())
    }
}
