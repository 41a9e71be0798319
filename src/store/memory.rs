use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::auth::guard::ensure_owner;
use crate::error::AppError;
use crate::models::{NewTask, Task, TaskPage, TaskQuery, User};
use crate::store::{TaskMutation, TaskStore, UserStore};

#[derive(Default)]
struct TaskRows {
    last_id: i64,
    rows: BTreeMap<i64, Task>,
}

/// In-process task storage. Every operation holds the lock for its whole
/// read-modify-write, which gives the same atomicity as a row lock.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<TaskRows>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, TaskRows>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError("Task store lock poisoned".into()))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: NewTask) -> Result<Task, AppError> {
        let mut guard = self.lock()?;
        // ids are never reused, even after deletes
        let id = guard.last_id + 1;
        let task = task.into_task(id)?;
        guard.last_id = id;
        guard.rows.insert(id, task.clone());
        Ok(task)
    }

    async fn find(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        Ok(self.lock()?.rows.get(&task_id).cloned())
    }

    async fn update(
        &self,
        task_id: i64,
        owner_id: &str,
        mutation: TaskMutation,
    ) -> Result<Task, AppError> {
        let mut guard = self.lock()?;
        let current = guard
            .rows
            .get(&task_id)
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        ensure_owner(current.owner_id(), owner_id)?;

        let updated = mutation(current)?;
        guard.rows.insert(task_id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, task_id: i64, owner_id: &str) -> Result<(), AppError> {
        let mut guard = self.lock()?;
        let current = guard
            .rows
            .get(&task_id)
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        ensure_owner(current.owner_id(), owner_id)?;

        guard.rows.remove(&task_id);
        Ok(())
    }

    async fn list(&self, owner_id: &str, query: &TaskQuery) -> Result<TaskPage, AppError> {
        let guard = self.lock()?;
        let mut matching: Vec<&Task> = guard
            .rows
            .values()
            .filter(|task| task.owner_id() == owner_id && query.filter.matches(task))
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let total = matching.len() as i64;
        let tasks = matching
            .into_iter()
            .skip(query.page.offset as usize)
            .take(query.page.limit as usize)
            .cloned()
            .collect();
        Ok(TaskPage::new(tasks, total, query.page))
    }
}

/// In-process user storage keyed by id, with a unique email index.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, User>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::InternalServerError("User store lock poisoned".into()))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, AppError> {
        let mut users = self.lock()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.trim().to_lowercase();
        Ok(self.lock()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.get(user_id).cloned())
    }
}
