// src/query.rs

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::{Priority, Task, TaskStatus};

/// Optional list filters a client can combine. Absent fields are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCriteria {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    /// Matches tasks carrying any of these tags.
    pub tags: Vec<String>,
    /// Case-insensitive substring of the title or the description.
    pub search: Option<String>,
    pub due_date_from: Option<DateTime<Utc>>,
    pub due_date_to: Option<DateTime<Utc>>,
    pub overdue_only: bool,
}

/// A store predicate. Every set field is ANDed; `tags_any` and `search` are
/// internally ORed. Tasks without a deadline never satisfy a due-date bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// `None` only for store-wide maintenance such as the overdue sweep.
    pub owner_id: Option<String>,
    pub ids: Option<Vec<String>>,
    pub status: Option<TaskStatus>,
    pub status_ne: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub tags_any: Option<Vec<String>>,
    pub search: Option<String>,
    /// Inclusive lower bound.
    pub due_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub due_to: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub due_before: Option<DateTime<Utc>>,
    pub is_overdue: Option<bool>,
}

impl TaskFilter {
    pub fn owned_by(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_id(self, id: &str) -> Self {
        self.with_ids(vec![id.to_string()])
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Tasks the sweeper should flag: past due, not completed, not yet flagged.
    pub fn overdue_candidates(now: DateTime<Utc>) -> Self {
        Self {
            due_before: Some(now),
            status_ne: Some(TaskStatus::Completed),
            is_overdue: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(owner) = &self.owner_id {
            if &task.user_id != owner {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &task.id) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.status_ne.is_some_and(|s| s == task.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(category) = &self.category {
            if &task.category != category {
                return false;
            }
        }
        if let Some(tags) = &self.tags_any {
            if !task.tags.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.due_from.is_some() || self.due_to.is_some() || self.due_before.is_some() {
            let Some(due) = task.due_date else {
                return false;
            };
            if self.due_from.is_some_and(|from| due < from)
                || self.due_to.is_some_and(|to| due > to)
                || self.due_before.is_some_and(|before| due >= before)
            {
                return false;
            }
        }
        if self.is_overdue.is_some_and(|flag| flag != task.is_overdue) {
            return false;
        }
        true
    }
}

/// Result ordering for `find_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    /// Ascending `order`, newest `created_at` first on ties.
    Manual,
    Unsorted,
}

impl TaskSort {
    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        match self {
            TaskSort::Manual => a
                .order
                .cmp(&b.order)
                .then_with(|| b.created_at.cmp(&a.created_at)),
            TaskSort::Unsorted => Ordering::Equal,
        }
    }
}

/// Turns client criteria into the owner-scoped store predicate.
pub fn build_query(owner_id: &str, criteria: &TaskCriteria) -> TaskFilter {
    let mut filter = TaskFilter::owned_by(owner_id);
    filter.status = criteria.status;
    filter.priority = criteria.priority;
    filter.category = criteria.category.clone().filter(|c| !c.is_empty());
    if !criteria.tags.is_empty() {
        filter.tags_any = Some(criteria.tags.clone());
    }
    filter.search = criteria.search.clone().filter(|s| !s.is_empty());
    filter.due_from = criteria.due_date_from;
    filter.due_to = criteria.due_date_to;
    if criteria.overdue_only {
        filter.is_overdue = Some(true);
    }
    filter
}
