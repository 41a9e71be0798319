//! Listing parameters for a user's tasks.
//!
//! Parsing is permissive on purpose: an unknown `status`, `priority`, `sort` or
//! `order`, or a non-numeric `limit`/`offset`, falls back to "no filter" or the
//! default instead of rejecting the request. Clients rely on this, so keep it.

use actix_web::web;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::models::task::{normalize_tags, Task, TaskPriority};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Raw query string. Everything is a string so that bad values degrade
/// instead of failing extraction.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskListParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl TaskListParams {
    /// Reads a raw query string. The first value of a repeated key wins,
    /// unknown keys are ignored and an undecodable string gives the defaults.
    pub fn from_query_str(query: &str) -> Self {
        let pairs = web::Query::<Vec<(String, String)>>::from_query(query)
            .map(web::Query::into_inner)
            .unwrap_or_default();

        let mut params = TaskListParams::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "status" => &mut params.status,
                "priority" => &mut params.priority,
                "tag" => &mut params.tag,
                "q" => &mut params.q,
                "sort" => &mut params.sort,
                "order" => &mut params.order,
                "limit" => &mut params.limit,
                "offset" => &mut params.offset,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

/// Conditions combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub priority: Option<TaskPriority>,
    /// Already normalized like a stored tag.
    pub tag: Option<String>,
    /// Case-insensitive substring of the title or the description.
    pub search: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(completed) = self.completed {
            if task.completed() != completed {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority() != priority {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !task.tags().iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = task.title().to_lowercase().contains(&needle);
            let in_description = task
                .description()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Priority,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Primary key plus direction; ties always break on task id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSort {
    key: SortKey,
    order: SortOrder,
}

impl TaskSort {
    /// The default `created_at` ordering is always newest first, whatever was requested.
    pub fn new(key: SortKey, requested: SortOrder) -> Self {
        let order = match key {
            SortKey::CreatedAt => SortOrder::Desc,
            _ => requested,
        };
        Self { key, order }
    }

    pub fn key(&self) -> SortKey {
        self.key
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let primary = match self.key {
            SortKey::Title => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
            SortKey::Priority => a.priority().rank().cmp(&b.priority().rank()),
            SortKey::CreatedAt => a.created_at().cmp(&b.created_at()),
        };
        let ordering = primary.then_with(|| a.id().cmp(&b.id()));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl Default for TaskSort {
    fn default() -> Self {
        TaskSort::new(SortKey::CreatedAt, SortOrder::Desc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::new(DEFAULT_LIMIT, 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub filter: TaskFilter,
    pub sort: TaskSort,
    pub page: Pagination,
}

impl From<TaskListParams> for TaskQuery {
    fn from(params: TaskListParams) -> Self {
        let completed = match normalized(params.status).as_deref() {
            Some("completed") => Some(true),
            Some("pending") => Some(false),
            _ => None,
        };
        let priority = normalized(params.priority).and_then(|p| p.parse().ok());
        let tag = params
            .tag
            .and_then(|tag| normalize_tags([tag]).into_iter().next());
        let search = params
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let key = match normalized(params.sort).as_deref() {
            Some("title") => SortKey::Title,
            Some("priority") => SortKey::Priority,
            _ => SortKey::CreatedAt,
        };
        let order = match normalized(params.order).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };

        TaskQuery {
            filter: TaskFilter {
                completed,
                priority,
                tag,
                search,
            },
            sort: TaskSort::new(key, order),
            page: Pagination::new(
                parse_or(params.limit, DEFAULT_LIMIT),
                parse_or(params.offset, 0),
            ),
        }
    }
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn parse_or(value: Option<String>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

/// One page of a filtered, sorted listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    /// Rows matching the filter, ignoring pagination.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl TaskPage {
    pub fn new(tasks: Vec<Task>, total: i64, page: Pagination) -> Self {
        let has_more = page.offset + (tasks.len() as i64) < total;
        Self {
            tasks,
            total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        }
    }
}
