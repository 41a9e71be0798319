//! Storage collaborators.
//!
//! Workflows and routes talk to storage only through [`TaskStore`] and
//! [`UserStore`]. `postgres` is the production implementation; `memory` keeps
//! the same semantics in-process for tests and database-less development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{NewTask, Task, TaskPage, TaskQuery, User};

pub use memory::{MemoryTaskStore, MemoryUserStore};
pub use postgres::{PgTaskStore, PgUserStore};

/// Produces the replacement entity from the current one. Runs inside the
/// store's read-modify-write boundary, after the ownership check.
pub type TaskMutation = Box<dyn FnOnce(&Task) -> Result<Task, AppError> + Send>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new task; the store assigns a never-reused id.
    async fn insert(&self, task: NewTask) -> Result<Task, AppError>;

    /// Unscoped lookup. `None` means no row exists at all.
    async fn find(&self, task_id: i64) -> Result<Option<Task>, AppError>;

    /// Atomically loads the row, checks `owner_id` owns it, applies `mutation`
    /// and replaces the whole row.
    ///
    /// Missing row (including one deleted concurrently) is `NotFound`; another
    /// owner's row is `Forbidden`.
    async fn update(
        &self,
        task_id: i64,
        owner_id: &str,
        mutation: TaskMutation,
    ) -> Result<Task, AppError>;

    /// Ownership-checked hard delete, same error contract as [`TaskStore::update`].
    async fn delete(&self, task_id: i64, owner_id: &str) -> Result<(), AppError>;

    /// Filtered, sorted, paginated listing of one owner's tasks.
    async fn list(&self, owner_id: &str, query: &TaskQuery) -> Result<TaskPage, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn insert(&self, user: User) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError>;
}
