use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dates;

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| "status must be one of [todo, in-progress, completed]".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| "priority must be one of [low, medium, high]".to_string())
    }
}

/// A stored task, as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub category: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Derived from `due_date` and `status` on every write and by the sweeper.
    pub is_overdue: bool,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a store needs to persist a new task. The store assigns the id
/// and both timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskRecord {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub category: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_overdue: bool,
    pub order: i64,
}

/// Client payload for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "dates::optional")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Client payload for a partial update. `due_date: Some(None)` clears the
/// deadline.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "dates::patch")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        *self == TaskChanges::default()
    }
}

/// A store-level `$set`: client changes plus the derived overdue flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub changes: TaskChanges,
    pub is_overdue: Option<bool>,
}

impl TaskPatch {
    pub fn overdue(is_overdue: bool) -> Self {
        Self {
            changes: TaskChanges::default(),
            is_overdue: Some(is_overdue),
        }
    }

    /// Applies the patch in place. Timestamps are the store's business.
    pub fn apply(&self, task: &mut Task) {
        let c = &self.changes;
        if let Some(title) = &c.title {
            task.title = title.clone();
        }
        if let Some(description) = &c.description {
            task.description = description.clone();
        }
        if let Some(status) = c.status {
            task.status = status;
        }
        if let Some(priority) = c.priority {
            task.priority = priority;
        }
        if let Some(category) = &c.category {
            task.category = category.clone();
        }
        if let Some(tags) = &c.tags {
            task.tags = tags.clone();
        }
        if let Some(due_date) = c.due_date {
            task.due_date = due_date;
        }
        if let Some(order) = c.order {
            task.order = order;
        }
        if let Some(is_overdue) = self.is_overdue {
            task.is_overdue = is_overdue;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in-progress\"");
        assert_eq!("in-progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
    }

    #[test]
    fn draft_rejects_client_set_overdue_flag() {
        let res = serde_json::from_str::<TaskDraft>(r#"{"title":"x","isOverdue":true}"#);
        assert!(res.is_err());
    }

    #[test]
    fn changes_parse_null_due_date_as_clear() {
        let changes: TaskChanges = serde_json::from_str(r#"{"dueDate":null}"#).unwrap();
        assert_eq!(changes.due_date, Some(None));
        assert!(!changes.is_empty());
        assert!(TaskChanges::default().is_empty());
    }
}
