use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};

use crate::auth::guard::ensure_owner;
use crate::error::AppError;
use crate::models::query::{SortKey, SortOrder, TaskFilter, TaskSort};
use crate::models::{NewTask, Subtask, Task, TaskFields, TaskPage, TaskQuery, User};
use crate::store::{TaskMutation, TaskStore, UserStore};

const TASK_COLUMNS: &str = "id, user_id, title, description, completed, priority, tags, \
                            due_date, subtasks, created_at, updated_at";

const USER_COLUMNS: &str = "id::text AS id, email, name, password_hash, created_at, updated_at";

/// Opens the connection pool and applies pending migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Migration failed: {}", e)))?;
    info!("Database migrations applied");

    Ok(pool)
}

/// A `tasks` row as stored. Tags and subtasks are JSON text columns.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    user_id: String,
    title: String,
    description: Option<String>,
    completed: bool,
    priority: String,
    tags: String,
    due_date: Option<DateTime<Utc>>,
    subtasks: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    /// Goes through [`Task::restore`], so stored tags are re-normalized on every read.
    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt =
            |e: String| AppError::DatabaseError(format!("Stored task {} is invalid: {}", id, e));

        let tags: Vec<String> = serde_json::from_str(&row.tags).map_err(|e| corrupt(e.to_string()))?;
        let subtasks: Vec<Subtask> =
            serde_json::from_str(&row.subtasks).map_err(|e| corrupt(e.to_string()))?;

        let fields = TaskFields {
            title: row.title,
            description: row.description,
            completed: row.completed,
            priority: row.priority,
            tags,
            due_date: row.due_date,
            subtasks,
        };
        Task::restore(id, row.user_id, fields, row.created_at, row.updated_at)
            .map_err(|e| corrupt(e.to_string()))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, owner_id: &str, filter: &TaskFilter) {
    builder.push(" WHERE user_id = ").push_bind(owner_id.to_string());

    if let Some(completed) = filter.completed {
        builder.push(" AND completed = ").push_bind(completed);
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(tag) = &filter.tag {
        builder
            .push(" AND tags::jsonb @> jsonb_build_array(")
            .push_bind(tag.clone())
            .push("::text)");
    }
    if let Some(search) = &filter.search {
        // backslash is the default LIKE escape character in Postgres
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR COALESCE(description, '') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn order_by(sort: &TaskSort) -> String {
    let direction = match sort.order() {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let primary = match sort.key() {
        // byte order, matching the in-memory comparison
        SortKey::Title => "LOWER(title) COLLATE \"C\"",
        SortKey::Priority => {
            "CASE priority WHEN 'low' THEN 1 WHEN 'medium' THEN 2 WHEN 'high' THEN 3 ELSE 0 END"
        }
        SortKey::CreatedAt => "created_at",
    };
    format!(" ORDER BY {primary} {direction}, id {direction}")
}

async fn lock_task(
    tx: &mut Transaction<'_, Postgres>,
    task_id: i64,
) -> Result<Option<TaskRow>, AppError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
    ))
    .bind(task_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: NewTask) -> Result<Task, AppError> {
        let content = task.content();
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks \
             (user_id, title, description, completed, priority, tags, due_date, subtasks, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.owner_id())
        .bind(content.title())
        .bind(content.description())
        .bind(content.completed())
        .bind(content.priority().as_str())
        .bind(to_json(&content.tags())?)
        .bind(content.due_date())
        .bind(to_json(&content.subtasks())?)
        .bind(task.created_at())
        .fetch_one(&self.pool)
        .await?;

        Task::try_from(row)
    }

    async fn find(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update(
        &self,
        task_id: i64,
        owner_id: &str,
        mutation: TaskMutation,
    ) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_task(&mut tx, task_id)
            .await?
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        ensure_owner(&current.user_id, owner_id)?;
        let current = Task::try_from(current)?;

        let updated = mutation(&current)?;
        let content = updated.content();
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE tasks SET title = $1, description = $2, completed = $3, priority = $4, \
             tags = $5, due_date = $6, subtasks = $7, updated_at = $8 \
             WHERE id = $9 AND user_id = $10 \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(content.title())
        .bind(content.description())
        .bind(content.completed())
        .bind(content.priority().as_str())
        .bind(to_json(&content.tags())?)
        .bind(content.due_date())
        .bind(to_json(&content.subtasks())?)
        .bind(updated.updated_at())
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::task_not_found(task_id))?;

        tx.commit().await?;
        Task::try_from(row)
    }

    async fn delete(&self, task_id: i64, owner_id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_task(&mut tx, task_id)
            .await?
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        ensure_owner(&current.user_id, owner_id)?;

        let deleted = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::task_not_found(task_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, owner_id: &str, query: &TaskQuery) -> Result<TaskPage, AppError> {
        let mut tx = self.pool.begin().await?;
        // count and page must see the same snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks");
        push_filters(&mut count, owner_id, &query.filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));
        push_filters(&mut select, owner_id, &query.filter);
        select.push(order_by(&query.sort));
        select
            .push(" LIMIT ")
            .push_bind(query.page.limit)
            .push(" OFFSET ")
            .push_bind(query.page.offset);
        let rows: Vec<TaskRow> = select.build_query_as::<TaskRow>().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let tasks = rows
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TaskPage::new(tasks, total, query.page))
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: User) -> Result<User, AppError> {
        // a unique violation on lower(email) surfaces as Conflict
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, name, password_hash, created_at, updated_at) \
             VALUES ($1::uuid, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        // remote principals are not UUIDs and simply have no local row
        let Ok(id) = uuid::Uuid::parse_str(user_id) else {
            return Ok(None);
        };
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
