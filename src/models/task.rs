use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::AppError;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const SUBTASK_TEXT_MAX_CHARS: usize = 500;

/// Represents the priority of a task.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// Ordinal used for sorting: low=1, medium=2, high=3.
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(AppError::validation(
                "Priority must be one of: high, medium, low",
            )),
        }
    }
}

/// A checklist item inside a task.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    fn validate_invariants(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("Subtask id cannot be empty"));
        }
        if self.text.trim().is_empty() {
            return Err(AppError::validation("Subtask text cannot be empty"));
        }
        if self.text.chars().count() > SUBTASK_TEXT_MAX_CHARS {
            return Err(AppError::validation(format!(
                "Subtask text cannot exceed {} characters",
                SUBTASK_TEXT_MAX_CHARS
            )));
        }
        Ok(())
    }
}

/// Trims, lowercases, drops empties and de-duplicates, keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let cleaned = tag.as_ref().trim().to_lowercase();
        if !cleaned.is_empty() && !normalized.contains(&cleaned) {
            normalized.push(cleaned);
        }
    }
    normalized
}

/// Unvalidated task attributes. The only way to turn them into a [`Task`] or
/// [`NewTask`] is through the validating constructors below.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub subtasks: Vec<Subtask>,
}

impl TaskFields {
    /// PATCH semantics: fields absent from `patch` keep their current value.
    pub fn apply(self, patch: TaskPatch) -> TaskFields {
        TaskFields {
            title: patch.title.unwrap_or(self.title),
            description: patch.description.or(self.description),
            completed: patch.completed.unwrap_or(self.completed),
            priority: patch.priority.unwrap_or(self.priority),
            tags: patch.tags.unwrap_or(self.tags),
            due_date: patch.due_date.or(self.due_date),
            subtasks: patch.subtasks.unwrap_or(self.subtasks),
        }
    }
}

/// The validated, owner-independent part of a task.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TaskContent {
    title: String,
    description: Option<String>,
    completed: bool,
    priority: TaskPriority,
    tags: Vec<String>,
    due_date: Option<DateTime<Utc>>,
    subtasks: Vec<Subtask>,
}

impl TaskContent {
    pub fn new(fields: TaskFields) -> Result<Self, AppError> {
        if fields.title.trim().is_empty() {
            return Err(AppError::validation("Title cannot be empty"));
        }
        if fields.title.chars().count() > TITLE_MAX_CHARS {
            return Err(AppError::validation(format!(
                "Title cannot exceed {} characters",
                TITLE_MAX_CHARS
            )));
        }
        if let Some(description) = &fields.description {
            if description.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(AppError::validation(format!(
                    "Description cannot exceed {} characters",
                    DESCRIPTION_MAX_CHARS
                )));
            }
        }
        let priority = fields.priority.parse::<TaskPriority>()?;
        for subtask in &fields.subtasks {
            subtask.validate_invariants()?;
        }

        Ok(Self {
            title: fields.title,
            description: fields.description,
            completed: fields.completed,
            priority,
            tags: normalize_tags(&fields.tags),
            due_date: fields.due_date.map(|due| due.trunc_subsecs(6)),
            subtasks: fields.subtasks,
        })
    }

    pub fn to_fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            completed: self.completed,
            priority: self.priority.as_str().to_string(),
            tags: self.tags.clone(),
            due_date: self.due_date,
            subtasks: self.subtasks.clone(),
        }
    }
}

/// A validated task that storage has not assigned an id to yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    owner_id: String,
    content: TaskContent,
    created_at: DateTime<Utc>,
}

impl NewTask {
    pub fn new(owner_id: &str, fields: TaskFields, now: DateTime<Utc>) -> Result<Self, AppError> {
        if owner_id.trim().is_empty() {
            return Err(AppError::validation("Task owner is required"));
        }
        Ok(Self {
            owner_id: owner_id.to_string(),
            content: TaskContent::new(fields)?,
            created_at: storage_precision(now),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn content(&self) -> &TaskContent {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attaches the storage-assigned id.
    pub fn into_task(self, id: i64) -> Result<Task, AppError> {
        Task::restore(
            id,
            self.owner_id,
            self.content.to_fields(),
            self.created_at,
            self.created_at,
        )
    }
}

/// Represents a task entity as stored and returned by the API.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Task {
    id: i64,
    #[serde(rename = "user_id")]
    owner_id: String,
    #[serde(flatten)]
    content: TaskContent,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Rebuilds a task from stored values, re-running every invariant check
    /// (tags are re-normalized in case of out-of-band writes).
    pub fn restore(
        id: i64,
        owner_id: String,
        fields: TaskFields,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        if id <= 0 {
            return Err(AppError::validation("Task ID must be a positive integer"));
        }
        Ok(Self {
            id,
            owner_id,
            content: TaskContent::new(fields)?,
            created_at,
            updated_at: updated_at.max(created_at),
        })
    }

    /// Replaces the task's content with `fields`, keeping id, owner and
    /// creation time, and moves `updated_at` strictly forward.
    pub fn revise(&self, fields: TaskFields, now: DateTime<Utc>) -> Result<Self, AppError> {
        Ok(Self {
            id: self.id,
            owner_id: self.owner_id.clone(),
            content: TaskContent::new(fields)?,
            created_at: self.created_at,
            updated_at: advance(self.updated_at, now),
        })
    }

    pub fn patched(&self, patch: TaskPatch, now: DateTime<Utc>) -> Result<Self, AppError> {
        self.revise(self.content.to_fields().apply(patch), now)
    }

    pub fn toggled(&self, now: DateTime<Utc>) -> Result<Self, AppError> {
        let mut fields = self.content.to_fields();
        fields.completed = !fields.completed;
        self.revise(fields, now)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn content(&self) -> &TaskContent {
        &self.content
    }

    pub fn title(&self) -> &str {
        &self.content.title
    }

    pub fn description(&self) -> Option<&str> {
        self.content.description.as_deref()
    }

    pub fn completed(&self) -> bool {
        self.content.completed
    }

    pub fn priority(&self) -> TaskPriority {
        self.content.priority
    }

    pub fn tags(&self) -> &[String] {
        &self.content.tags
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.content.due_date
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.content.subtasks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl TaskContent {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }
}

/// Postgres keeps microseconds; truncating up front keeps stored and
/// in-memory timestamps comparable.
fn storage_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = storage_precision(now);
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Request body for creating a task.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    /// `high`, `medium` or `low`; defaults to `medium`.
    pub priority: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl From<TaskInput> for TaskFields {
    fn from(input: TaskInput) -> Self {
        TaskFields {
            title: input.title,
            description: input.description,
            completed: false,
            priority: input
                .priority
                .unwrap_or_else(|| TaskPriority::default().as_str().to_string()),
            tags: input.tags,
            due_date: input.due_date,
            subtasks: input.subtasks,
        }
    }
}

/// Request body for a partial update. Absent or `null` fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TaskPatch {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    pub completed: Option<bool>,

    pub priority: Option<String>,

    pub tags: Option<Vec<String>>,

    pub due_date: Option<DateTime<Utc>>,

    pub subtasks: Option<Vec<Subtask>>,
}
