//! Task operations used by the HTTP layer.
//!
//! Every write funnels through the validating constructors on [`Task`] and
//! [`NewTask`], and every owner-scoped operation reports a missing task as
//! `NotFound` and someone else's task as `Forbidden`.

use chrono::Utc;
use log::debug;

use crate::auth::guard::ensure_owner;
use crate::error::AppError;
use crate::models::{NewTask, Task, TaskFields, TaskPage, TaskPatch, TaskQuery};
use crate::store::TaskStore;

pub async fn create_task(
    store: &dyn TaskStore,
    owner_id: &str,
    fields: TaskFields,
) -> Result<Task, AppError> {
    let new_task = NewTask::new(owner_id, fields, Utc::now())?;
    let task = store.insert(new_task).await?;
    debug!("Created task {} for {}", task.id(), owner_id);
    Ok(task)
}

pub async fn get_task(store: &dyn TaskStore, task_id: i64, owner_id: &str) -> Result<Task, AppError> {
    let task = store
        .find(task_id)
        .await?
        .ok_or_else(|| AppError::task_not_found(task_id))?;
    ensure_owner(task.owner_id(), owner_id)?;
    Ok(task)
}

pub async fn list_tasks(
    store: &dyn TaskStore,
    owner_id: &str,
    query: &TaskQuery,
) -> Result<TaskPage, AppError> {
    store.list(owner_id, query).await
}

/// Applies only the fields present in `patch`; id, owner and creation time
/// are never taken from input.
pub async fn update_task(
    store: &dyn TaskStore,
    task_id: i64,
    owner_id: &str,
    patch: TaskPatch,
) -> Result<Task, AppError> {
    store
        .update(
            task_id,
            owner_id,
            Box::new(move |current: &Task| current.patched(patch, Utc::now())),
        )
        .await
}

pub async fn toggle_complete(
    store: &dyn TaskStore,
    task_id: i64,
    owner_id: &str,
) -> Result<Task, AppError> {
    store
        .update(
            task_id,
            owner_id,
            Box::new(|current: &Task| current.toggled(Utc::now())),
        )
        .await
}

pub async fn delete_task(store: &dyn TaskStore, task_id: i64, owner_id: &str) -> Result<(), AppError> {
    store.delete(task_id, owner_id).await?;
    debug!("Deleted task {} for {}", task_id, owner_id);
    Ok(())
}
