use chrono::{DateTime, Utc};

use crate::models::task::TaskStatus;

/// Whether a task with this deadline and status counts as overdue at `now`.
///
/// Completed tasks and tasks without a deadline are never overdue; otherwise
/// the deadline must be strictly in the past.
pub fn derive_overdue(due_date: Option<DateTime<Utc>>, status: TaskStatus, now: DateTime<Utc>) -> bool {
    match due_date {
        Some(due) if status != TaskStatus::Completed => now > due,
        _ => false,
    }
}
