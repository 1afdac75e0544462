use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::tables::Tables;
use super::types::{NewTask, PasswordReset, Task, TaskPatch, User};
use super::{Store, StoreResult};

/// Same tables as the memory engine, snapshotted to a JSON file after every
/// write. The lock is held across the write so snapshots never interleave.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl FileStore {
    /// Loads `path` if it exists, otherwise starts empty.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("parse store file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("read store file {}", path.display()))
            }
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create store dir {}", dir.display()))?;
        }
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    async fn persist(&self, tables: &Tables) -> anyhow::Result<()> {
        let raw = serde_json::to_vec_pretty(tables).context("serialize store")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename into {}", self.path.display()))?;
        debug!(path = %self.path.display(), "store snapshot written");
        Ok(())
    }

    /// Runs a mutation on a copy under the lock. The copy replaces the live
    /// tables only once its snapshot is on disk.
    async fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self.tables.lock().await;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        self.persist(&staged).await?;
        *tables = staged;
        Ok(out)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let now = OffsetDateTime::now_utc();
        self.write(|t| t.create_user(email, password_hash, now)).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.find_user_by_email(email))
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.find_user_by_id(id))
    }

    async fn update_password_hash(&self, email: &str, password_hash: &str) -> StoreResult<bool> {
        self.write(|t| Ok(t.update_password_hash(email, password_hash)))
            .await
    }

    async fn insert_task(&self, user_id: i64, task: NewTask, now: OffsetDateTime) -> StoreResult<Task> {
        self.write(|t| Ok(t.insert_task(user_id, task, now))).await
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
        self.write(|t| Ok(t.update_task(user_id, id, patch, now)))
            .await
    }

    async fn toggle_task(&self, user_id: i64, id: i64, now: OffsetDateTime) -> StoreResult<Option<Task>> {
        self.write(|t| Ok(t.toggle_task(user_id, id, now))).await
    }

    async fn delete_task(&self, user_id: i64, id: i64) -> StoreResult<bool> {
        self.write(|t| Ok(t.delete_task(user_id, id))).await
    }

    async fn insert_password_reset(
        &self,
        email: &str,
        otp: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> StoreResult<PasswordReset> {
        self.write(|t| Ok(t.insert_password_reset(email, otp, expires_at, now)))
            .await
    }

    async fn consume_password_reset(&self, email: &str, otp: &str, now: OffsetDateTime) -> StoreResult<bool> {
        self.write(|t| Ok(t.consume_password_reset(email, otp, now)))
            .await
    }

    async fn invalidate_password_resets(&self, email: &str) -> StoreResult<()> {
        self.write(|t| {
            t.invalidate_password_resets(email);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Priority, StoreError};

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let (user_id, task_id) = {
            let store = FileStore::open(&path).await.unwrap();
            let user = store.create_user("ann@example.com", "hash").await.unwrap();
            let mut new = NewTask::titled("Water plants");
            new.tags = vec!["home".into(), "daily".into()];
            new.priority = Priority::High;
            let task = store
                .insert_task(user.id, new, OffsetDateTime::now_utc())
                .await
                .unwrap();
            store
                .toggle_task(user.id, task.id, OffsetDateTime::now_utc())
                .await
                .unwrap();
            (user.id, task.id)
        };

        let reopened = FileStore::open(&path).await.unwrap();
        let user = reopened
            .find_user_by_email("ann@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, user_id);

        let task = reopened.get_task(user_id, task_id).await.unwrap().unwrap();
        assert_eq!(task.title, "Water plants");
        assert_eq!(task.tags, vec!["home".to_string(), "daily".to_string()]);
        assert_eq!(task.priority, Priority::High);
        assert!(task.completed);
        assert!(task.updated_at.is_some());

        // ids keep counting after a reload
        let next = reopened
            .insert_task(user_id, NewTask::titled("next"), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(next.id > task_id);
    }

    #[tokio::test]
    async fn failed_snapshot_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).await.unwrap();

        // a directory where the tmp snapshot goes makes the write fail
        let tmp = path.with_extension("json.tmp");
        tokio::fs::create_dir(&tmp).await.unwrap();
        let err = store.create_user("ann@example.com", "hash").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store
            .find_user_by_email("ann@example.com")
            .await
            .unwrap()
            .is_none());

        tokio::fs::remove_dir(&tmp).await.unwrap();
        let user = store.create_user("ann@example.com", "hash").await.unwrap();
        assert_eq!(user.id, 1);

        let reopened = FileStore::open(&path).await.unwrap();
        assert!(reopened
            .find_user_by_email("ann@example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let err = FileStore::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("parse store file"));
    }
}
