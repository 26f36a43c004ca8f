// src/task_service.rs

use std::sync::Arc;

use log::{debug, error, info};
use serde::Deserialize;

use crate::clock::Clock;
use crate::error::{AppError, StoreResult};
use crate::lifecycle::derive_overdue;
use crate::models::task::DEFAULT_CATEGORY;
use crate::models::{NewTaskRecord, Task, TaskChanges, TaskDraft, TaskPatch, TaskStatus};
use crate::query::{build_query, TaskCriteria, TaskFilter, TaskSort};
use crate::stats::{compute_statistics, TaskStats};
use crate::store::{BulkWriteResult, DistinctField, TaskStore, WriteOp};

/// One `(id, order)` pair of a reorder request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskOrder {
    pub id: String,
    pub order: i64,
}

/// The only path from the service to the store. Every filter it hands over
/// is pinned to `owner_id`, whatever the caller put in it.
struct OwnedTasks<'a> {
    store: &'a dyn TaskStore,
    owner_id: &'a str,
}

impl<'a> OwnedTasks<'a> {
    fn pin(&self, mut filter: TaskFilter) -> TaskFilter {
        filter.owner_id = Some(self.owner_id.to_string());
        filter
    }

    fn by_id(&self, id: &str) -> TaskFilter {
        TaskFilter::owned_by(self.owner_id).with_id(id)
    }

    fn by_ids(&self, ids: Vec<String>) -> TaskFilter {
        TaskFilter::owned_by(self.owner_id).with_ids(ids)
    }

    async fn insert(&self, mut record: NewTaskRecord) -> StoreResult<String> {
        record.user_id = self.owner_id.to_string();
        self.store.insert(record).await
    }

    async fn find_one(&self, id: &str) -> StoreResult<Option<Task>> {
        self.store.find_one(&self.by_id(id)).await
    }

    async fn find_many(&self, filter: TaskFilter, sort: TaskSort) -> StoreResult<Vec<Task>> {
        self.store.find_many(&self.pin(filter), sort).await
    }

    async fn update_one(&self, id: &str, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        self.store.update_one(&self.by_id(id), patch).await
    }

    async fn delete_one(&self, id: &str) -> StoreResult<Option<Task>> {
        self.store.delete_one(&self.by_id(id)).await
    }

    /// Applies one patch per task id as a single batch.
    async fn update_each(&self, patches: Vec<(String, TaskPatch)>) -> StoreResult<BulkWriteResult> {
        if patches.is_empty() {
            return Ok(BulkWriteResult::default());
        }
        let ops = patches
            .into_iter()
            .map(|(id, patch)| WriteOp::UpdateOne {
                filter: self.by_id(&id),
                patch,
            })
            .collect();
        self.store.bulk_write(ops).await
    }

    async fn delete_many(&self, ids: Vec<String>) -> StoreResult<BulkWriteResult> {
        let op = WriteOp::DeleteMany {
            filter: self.by_ids(ids),
        };
        self.store.bulk_write(vec![op]).await
    }

    async fn distinct(&self, field: DistinctField) -> StoreResult<Vec<String>> {
        self.store
            .distinct(field, &TaskFilter::owned_by(self.owner_id))
            .await
    }
}

/// Task operations on behalf of one user at a time.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn owned<'a>(&'a self, owner_id: &'a str) -> OwnedTasks<'a> {
        OwnedTasks {
            store: self.store.as_ref(),
            owner_id,
        }
    }

    pub async fn create(&self, owner_id: &str, draft: TaskDraft) -> Result<Task, AppError> {
        let status = draft.status.unwrap_or_default();
        let record = NewTaskRecord {
            user_id: owner_id.to_string(),
            title: draft.title,
            description: draft.description.unwrap_or_default(),
            status,
            priority: draft.priority.unwrap_or_default(),
            category: draft.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            tags: draft.tags.unwrap_or_default(),
            due_date: draft.due_date,
            is_overdue: derive_overdue(draft.due_date, status, self.clock.now()),
            order: draft.order.unwrap_or(0),
        };

        let tasks = self.owned(owner_id);
        let id = tasks.insert(record).await?;
        debug!("Created task {} for user {}", id, owner_id);
        tasks.find_one(&id).await?.ok_or_else(|| {
            error!("Task {} missing right after insert", id);
            AppError::Internal("Task could not be created".to_string())
        })
    }

    pub async fn get_many(&self, owner_id: &str, criteria: &TaskCriteria) -> Result<Vec<Task>, AppError> {
        let filter = build_query(owner_id, criteria);
        Ok(self.owned(owner_id).find_many(filter, TaskSort::Manual).await?)
    }

    pub async fn get_one(&self, owner_id: &str, id: &str) -> Result<Task, AppError> {
        self.owned(owner_id)
            .find_one(id)
            .await?
            .ok_or_else(AppError::task_not_found)
    }

    /// Merges `changes` into the stored task and re-derives the overdue flag
    /// from the merged deadline and status.
    ///
    /// The read and the write are separate store calls, so two concurrent
    /// updates to one task resolve as last-write-wins.
    pub async fn update(&self, owner_id: &str, id: &str, changes: TaskChanges) -> Result<Task, AppError> {
        let tasks = self.owned(owner_id);
        let mut merged = tasks.find_one(id).await?.ok_or_else(AppError::task_not_found)?;

        let mut patch = TaskPatch {
            changes,
            is_overdue: None,
        };
        patch.apply(&mut merged);
        patch.is_overdue = Some(derive_overdue(merged.due_date, merged.status, self.clock.now()));

        tasks
            .update_one(id, &patch)
            .await?
            .ok_or_else(AppError::task_not_found)
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<Task, AppError> {
        self.owned(owner_id)
            .delete_one(id)
            .await?
            .ok_or_else(AppError::task_not_found)
    }

    /// Moves tasks to new positions. Ids the caller does not own are skipped.
    pub async fn reorder(&self, owner_id: &str, items: Vec<TaskOrder>) -> Result<(), AppError> {
        let tasks = self.owned(owner_id);
        let ids = items.iter().map(|item| item.id.clone()).collect();
        let current = tasks.find_many(tasks.by_ids(ids), TaskSort::Unsorted).await?;
        let now = self.clock.now();

        let patches = items
            .into_iter()
            .filter_map(|item| {
                let task = current.iter().find(|t| t.id == item.id)?;
                let patch = TaskPatch {
                    changes: TaskChanges {
                        order: Some(item.order),
                        ..TaskChanges::default()
                    },
                    is_overdue: Some(derive_overdue(task.due_date, task.status, now)),
                };
                Some((item.id, patch))
            })
            .collect();

        let result = tasks.update_each(patches).await?;
        debug!("Reordered {} tasks for user {}", result.matched, owner_id);
        Ok(())
    }

    /// Returns how many tasks were removed.
    pub async fn bulk_delete(&self, owner_id: &str, ids: Vec<String>) -> Result<u64, AppError> {
        let result = self.owned(owner_id).delete_many(ids).await?;
        info!("Bulk deleted {} tasks for user {}", result.deleted, owner_id);
        Ok(result.deleted)
    }

    /// Sets `status` on every owned task in `ids`, re-deriving each task's
    /// overdue flag against its own deadline. Returns the modified count.
    pub async fn bulk_update_status(
        &self,
        owner_id: &str,
        ids: Vec<String>,
        status: TaskStatus,
    ) -> Result<u64, AppError> {
        let tasks = self.owned(owner_id);
        let current = tasks.find_many(tasks.by_ids(ids), TaskSort::Unsorted).await?;
        let now = self.clock.now();

        let patches = current
            .into_iter()
            .map(|task| {
                let patch = TaskPatch {
                    changes: TaskChanges {
                        status: Some(status),
                        ..TaskChanges::default()
                    },
                    is_overdue: Some(derive_overdue(task.due_date, status, now)),
                };
                (task.id, patch)
            })
            .collect();

        let result = tasks.update_each(patches).await?;
        info!("Set status {} on {} tasks for user {}", status, result.modified, owner_id);
        Ok(result.modified)
    }

    pub async fn statistics(&self, owner_id: &str) -> Result<TaskStats, AppError> {
        let all = self
            .owned(owner_id)
            .find_many(TaskFilter::default(), TaskSort::Unsorted)
            .await?;
        Ok(compute_statistics(&all))
    }

    pub async fn categories(&self, owner_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self.owned(owner_id).distinct(DistinctField::Category).await?)
    }

    pub async fn tags(&self, owner_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self.owned(owner_id).distinct(DistinctField::Tags).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::Priority;
    use crate::store::InMemoryTaskStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const ALICE: &str = "alice";
    const BOB: &str = "bob";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn service() -> (Arc<FixedClock>, TaskService) {
        let clock = Arc::new(FixedClock::new(now()));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone()));
        (clock.clone(), TaskService::new(store, clock))
    }

    fn draft(title: &str, status: TaskStatus, due_in_days: Option<i64>) -> TaskDraft {
        TaskDraft {
            status: Some(status),
            due_date: due_in_days.map(|d| now() + Duration::days(d)),
            ..TaskDraft::titled(title)
        }
    }

    #[tokio::test]
    async fn create_fills_defaults_and_reads_back_the_same_fields() {
        let (_, svc) = service();
        let due = now() + Duration::days(3);
        let created = svc
            .create(
                ALICE,
                TaskDraft {
                    description: Some("details".into()),
                    priority: Some(Priority::High),
                    tags: Some(vec!["home".into()]),
                    due_date: Some(due),
                    order: Some(4),
                    ..TaskDraft::titled("Write report")
                },
            )
            .await
            .unwrap();

        assert_eq!(created.user_id, ALICE);
        assert_eq!(created.title, "Write report");
        assert_eq!(created.description, "details");
        assert_eq!(created.status, TaskStatus::Todo);
        assert_eq!(created.priority, Priority::High);
        assert_eq!(created.category, DEFAULT_CATEGORY);
        assert_eq!(created.tags, ["home"]);
        assert_eq!(created.due_date, Some(due));
        assert_eq!(created.order, 4);
        assert!(!created.is_overdue);
        assert_eq!(created.created_at, now());

        assert_eq!(svc.get_one(ALICE, &created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn overdue_is_derived_on_create() {
        let (_, svc) = service();
        let a = svc.create(ALICE, draft("A", TaskStatus::Todo, Some(-1))).await.unwrap();
        let b = svc.create(ALICE, draft("B", TaskStatus::Completed, Some(-1))).await.unwrap();
        let c = svc.create(ALICE, draft("C", TaskStatus::Todo, Some(1))).await.unwrap();

        assert!(a.is_overdue);
        assert!(!b.is_overdue);
        assert!(!c.is_overdue);
        assert_eq!(svc.statistics(ALICE).await.unwrap().overdue, 1);
    }

    #[tokio::test]
    async fn bulk_completion_clears_the_overdue_flag() {
        let (_, svc) = service();
        let a = svc.create(ALICE, draft("A", TaskStatus::Todo, Some(-1))).await.unwrap();
        let c = svc.create(ALICE, draft("C", TaskStatus::Todo, Some(1))).await.unwrap();

        let modified = svc
            .bulk_update_status(ALICE, vec![a.id.clone(), c.id.clone()], TaskStatus::Completed)
            .await
            .unwrap();
        assert_eq!(modified, 2);

        let a = svc.get_one(ALICE, &a.id).await.unwrap();
        assert_eq!(a.status, TaskStatus::Completed);
        assert!(!a.is_overdue);
    }

    #[tokio::test]
    async fn bulk_status_counts_every_owned_task_even_when_unchanged() {
        let (_, svc) = service();
        let a = svc.create(ALICE, draft("A", TaskStatus::Todo, None)).await.unwrap();
        let b = svc.create(ALICE, draft("B", TaskStatus::Todo, None)).await.unwrap();
        let theirs = svc.create(BOB, draft("C", TaskStatus::Todo, None)).await.unwrap();

        let modified = svc
            .bulk_update_status(ALICE, vec![a.id, b.id, theirs.id], TaskStatus::Todo)
            .await
            .unwrap();
        assert_eq!(modified, 2);
    }

    #[tokio::test]
    async fn bulk_reopen_flags_past_due_tasks() {
        let (_, svc) = service();
        let done = svc.create(ALICE, draft("done", TaskStatus::Completed, Some(-2))).await.unwrap();
        assert!(!done.is_overdue);

        svc.bulk_update_status(ALICE, vec![done.id.clone()], TaskStatus::Todo)
            .await
            .unwrap();
        assert!(svc.get_one(ALICE, &done.id).await.unwrap().is_overdue);
    }

    #[tokio::test]
    async fn update_re_derives_from_the_merged_task() {
        let (clock, svc) = service();
        let task = svc.create(ALICE, draft("t", TaskStatus::Todo, Some(1))).await.unwrap();
        clock.advance(Duration::days(2));

        let renamed = svc
            .update(
                ALICE,
                &task.id,
                TaskChanges {
                    title: Some("renamed".into()),
                    ..TaskChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "renamed");
        assert!(renamed.is_overdue);
        assert_eq!(renamed.updated_at, clock.now());

        let moved = svc
            .update(
                ALICE,
                &task.id,
                TaskChanges {
                    due_date: Some(Some(clock.now() + Duration::days(1))),
                    ..TaskChanges::default()
                },
            )
            .await
            .unwrap();
        assert!(!moved.is_overdue);

        let cleared = svc
            .update(
                ALICE,
                &task.id,
                TaskChanges {
                    due_date: Some(None),
                    ..TaskChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.due_date, None);
        assert!(!cleared.is_overdue);
    }

    #[tokio::test]
    async fn other_owners_tasks_are_not_found() {
        let (_, svc) = service();
        let task = svc.create(ALICE, TaskDraft::titled("private")).await.unwrap();

        let change = TaskChanges {
            title: Some("hijacked".into()),
            ..TaskChanges::default()
        };
        assert!(matches!(svc.get_one(BOB, &task.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.update(BOB, &task.id, change).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(BOB, &task.id).await, Err(AppError::NotFound(_))));

        assert_eq!(svc.bulk_delete(BOB, vec![task.id.clone()]).await.unwrap(), 0);
        assert_eq!(
            svc.bulk_update_status(BOB, vec![task.id.clone()], TaskStatus::Completed)
                .await
                .unwrap(),
            0
        );
        assert_eq!(svc.get_one(ALICE, &task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn delete_removes_the_task() {
        let (_, svc) = service();
        let task = svc.create(ALICE, TaskDraft::titled("gone")).await.unwrap();
        svc.delete(ALICE, &task.id).await.unwrap();
        assert!(matches!(svc.get_one(ALICE, &task.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(ALICE, &task.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reorder_changes_list_order_and_skips_foreign_ids() {
        let (_, svc) = service();
        let a = svc.create(ALICE, TaskDraft::titled("A")).await.unwrap();
        let b = svc.create(ALICE, TaskDraft::titled("B")).await.unwrap();
        let foreign = svc.create(BOB, TaskDraft::titled("theirs")).await.unwrap();

        svc.reorder(
            ALICE,
            vec![
                TaskOrder { id: a.id.clone(), order: 2 },
                TaskOrder { id: b.id.clone(), order: 1 },
                TaskOrder { id: foreign.id.clone(), order: 9 },
            ],
        )
        .await
        .unwrap();

        let listed = svc.get_many(ALICE, &TaskCriteria::default()).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["B", "A"]);
        assert_eq!(svc.get_one(BOB, &foreign.id).await.unwrap().order, 0);
    }

    #[tokio::test]
    async fn search_and_repeat_listing_are_stable() {
        let (_, svc) = service();
        svc.create(ALICE, TaskDraft::titled("Foobar")).await.unwrap();
        svc.create(
            ALICE,
            TaskDraft {
                description: Some("contains foo here".into()),
                ..TaskDraft::titled("Other")
            },
        )
        .await
        .unwrap();
        svc.create(ALICE, TaskDraft::titled("Nothing")).await.unwrap();

        let criteria = TaskCriteria {
            search: Some("foo".into()),
            ..TaskCriteria::default()
        };
        let first = svc.get_many(ALICE, &criteria).await.unwrap();
        let mut titles: Vec<_> = first.iter().map(|t| t.title.clone()).collect();
        titles.sort();
        assert_eq!(titles, ["Foobar", "Other"]);

        assert_eq!(svc.get_many(ALICE, &criteria).await.unwrap(), first);
    }

    #[tokio::test]
    async fn bulk_delete_counts_only_owned_tasks() {
        let (_, svc) = service();
        let a = svc.create(ALICE, TaskDraft::titled("a")).await.unwrap();
        let b = svc.create(ALICE, TaskDraft::titled("b")).await.unwrap();
        let foreign = svc.create(BOB, TaskDraft::titled("c")).await.unwrap();

        let deleted = svc
            .bulk_delete(ALICE, vec![a.id, b.id, foreign.id.clone()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(svc.get_many(ALICE, &TaskCriteria::default()).await.unwrap().is_empty());
        assert!(svc.get_one(BOB, &foreign.id).await.is_ok());
    }

    #[tokio::test]
    async fn statistics_and_distinct_values() {
        let (_, svc) = service();
        svc.create(
            ALICE,
            TaskDraft {
                category: Some("Work".into()),
                tags: Some(vec!["x".into(), "y".into()]),
                ..draft("a", TaskStatus::InProgress, None)
            },
        )
        .await
        .unwrap();
        svc.create(
            ALICE,
            TaskDraft {
                tags: Some(vec!["y".into()]),
                ..draft("b", TaskStatus::Completed, None)
            },
        )
        .await
        .unwrap();
        svc.create(BOB, TaskDraft::titled("not counted")).await.unwrap();

        let stats = svc.statistics(ALICE).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.total, stats.completed + stats.in_progress + stats.todo);
        assert_eq!(stats.by_category.get("Work"), Some(&1));
        assert_eq!(stats.by_category.get(DEFAULT_CATEGORY), Some(&1));

        let mut categories = svc.categories(ALICE).await.unwrap();
        categories.sort();
        assert_eq!(categories, [DEFAULT_CATEGORY, "Work"]);

        let mut tags = svc.tags(ALICE).await.unwrap();
        tags.sort();
        assert_eq!(tags, ["x", "y"]);
    }

    #[tokio::test]
    async fn empty_owner_gets_zeroed_statistics() {
        let (_, svc) = service();
        assert_eq!(svc.statistics(ALICE).await.unwrap(), TaskStats::default());
        assert!(svc.tags(ALICE).await.unwrap().is_empty());
    }
}
