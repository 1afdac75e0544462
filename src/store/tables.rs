use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::types::{NewTask, PasswordReset, Task, TaskPatch, User};
use super::{StoreError, StoreResult};

/// Plain in-process tables shared by the memory and file engines.
/// Callers hold the lock; nothing here is async.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct Tables {
    users: Vec<User>,
    tasks: Vec<Task>,
    password_resets: Vec<PasswordReset>,
    next_user_id: i64,
    next_task_id: i64,
    next_reset_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    pub fn create_user(&mut self, email: &str, password_hash: &str, now: OffsetDateTime) -> StoreResult<User> {
        if self.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict("users.email"));
        }
        let user = User {
            id: next(&mut self.next_user_id),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users.iter().find(|u| u.email == email).cloned()
    }

    pub fn find_user_by_id(&self, id: i64) -> Option<User> {
        self.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn update_password_hash(&mut self, email: &str, password_hash: &str) -> bool {
        match self.users.iter_mut().find(|u| u.email == email) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                true
            }
            None => false,
        }
    }

    pub fn insert_task(&mut self, user_id: i64, new: NewTask, now: OffsetDateTime) -> Task {
        let task = Task {
            id: next(&mut self.next_task_id),
            user_id,
            title: new.title,
            description: new.description,
            completed: false,
            due_date: new.due_date,
            list: new.list,
            tags: new.tags,
            subtasks: new.subtasks,
            priority: new.priority,
            created_at: now,
            updated_at: None,
        };
        self.tasks.push(task.clone());
        task
    }

    pub fn list_tasks(&self, user_id: i64) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.id.cmp(&a.id));
        tasks
    }

    fn owned_mut(&mut self, user_id: i64, id: i64) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
    }

    pub fn get_task(&self, user_id: i64, id: i64) -> Option<Task> {
        self.tasks
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned()
    }

    pub fn update_task(&mut self, user_id: i64, id: i64, patch: TaskPatch, now: OffsetDateTime) -> Option<Task> {
        let task = self.owned_mut(user_id, id)?;
        patch.apply(task, now);
        Some(task.clone())
    }

    pub fn toggle_task(&mut self, user_id: i64, id: i64, now: OffsetDateTime) -> Option<Task> {
        let task = self.owned_mut(user_id, id)?;
        task.completed = !task.completed;
        task.updated_at = Some(now);
        Some(task.clone())
    }

    pub fn delete_task(&mut self, user_id: i64, id: i64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| !(t.id == id && t.user_id == user_id));
        self.tasks.len() != before
    }

    pub fn insert_password_reset(
        &mut self,
        email: &str,
        otp: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> PasswordReset {
        let reset = PasswordReset {
            id: next(&mut self.next_reset_id),
            email: email.to_string(),
            otp: otp.to_string(),
            expires_at,
            used: false,
            created_at: now,
        };
        self.password_resets.push(reset.clone());
        reset
    }

    pub fn consume_password_reset(&mut self, email: &str, otp: &str, now: OffsetDateTime) -> bool {
        // ids grow with insertion order, so the last match is the newest
        match self
            .password_resets
            .iter_mut()
            .rev()
            .find(|r| r.is_redeemable(email, otp, now))
        {
            Some(reset) => {
                reset.used = true;
                true
            }
            None => false,
        }
    }

    pub fn invalidate_password_resets(&mut self, email: &str) {
        self.password_resets
            .iter_mut()
            .filter(|r| r.email == email)
            .for_each(|r| r.used = true);
    }

    #[cfg(test)]
    pub fn password_resets(&self) -> &[PasswordReset] {
        &self.password_resets
    }
}
