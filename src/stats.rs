// src/stats.rs

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Priority, Task, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
    pub overdue: usize,
    pub by_priority: PriorityCounts,
    /// Only categories that actually occur.
    pub by_category: BTreeMap<String, usize>,
}

/// Aggregates one owner's full task set in a single pass.
pub fn compute_statistics(tasks: &[Task]) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        ..TaskStats::default()
    };

    for task in tasks {
        match task.status {
            TaskStatus::Todo => stats.todo += 1,
            TaskStatus::InProgress => stats.in_progress += 1,
            TaskStatus::Completed => stats.completed += 1,
        }
        // is_overdue is cached and may lag a status change; re-check.
        if task.is_overdue && task.status != TaskStatus::Completed {
            stats.overdue += 1;
        }
        match task.priority {
            Priority::High => stats.by_priority.high += 1,
            Priority::Medium => stats.by_priority.medium += 1,
            Priority::Low => stats.by_priority.low += 1,
        }
        *stats.by_category.entry(task.category.clone()).or_insert(0) += 1;
    }

    stats
}

/// Every category in use, each once. Order is unspecified.
pub fn distinct_categories(tasks: &[Task]) -> Vec<String> {
    dedup(tasks.iter().map(|t| t.category.as_str()))
}

/// Every tag in use across all tasks, each once. Order is unspecified.
pub fn distinct_tags(tasks: &[Task]) -> Vec<String> {
    dedup(tasks.iter().flat_map(|t| t.tags.iter().map(String::as_str)))
}

fn dedup<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}
