use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::{BulkWriteResult, DistinctField, TaskStore, UserStore, WriteOp};
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::models::{NewTaskRecord, NewUserRecord, Task, TaskPatch, User};
use crate::query::{TaskFilter, TaskSort};
use crate::stats::{distinct_categories, distinct_tags};

/// Task store kept in process memory. Rows stay in insertion order, which
/// also breaks ties between tasks created within the same millisecond.
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Every patch stamps `updated_at`, so a matched row always counts as
    /// modified, the same as the Mongo `$set` does.
    fn patch_row(task: &mut Task, patch: &TaskPatch, now: DateTime<Utc>) {
        patch.apply(task);
        task.updated_at = now;
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: NewTaskRecord) -> StoreResult<String> {
        let now = self.clock.now();
        let id = ObjectId::new().to_hex();
        let task = Task {
            id: id.clone(),
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            status: record.status,
            priority: record.priority,
            category: record.category,
            tags: record.tags,
            due_date: record.due_date,
            is_overdue: record.is_overdue,
            order: record.order,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().await.push(task);
        Ok(id)
    }

    async fn find_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| filter.matches(t)).cloned())
    }

    async fn find_many(&self, filter: &TaskFilter, sort: TaskSort) -> StoreResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        // Newest-inserted first so equal timestamps still sort newest first.
        let mut found: Vec<Task> = tasks.iter().rev().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by(|a, b| sort.compare(a, b));
        Ok(found)
    }

    async fn update_one(&self, filter: &TaskFilter, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        let now = self.clock.now();
        let mut tasks = self.tasks.write().await;
        Ok(tasks.iter_mut().find(|t| filter.matches(t)).map(|task| {
            Self::patch_row(task, patch, now);
            task.clone()
        }))
    }

    async fn delete_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .iter()
            .position(|t| filter.matches(t))
            .map(|idx| tasks.remove(idx)))
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StoreResult<BulkWriteResult> {
        let now = self.clock.now();
        let mut tasks = self.tasks.write().await;
        let mut result = BulkWriteResult::default();

        for op in ops {
            match op {
                WriteOp::UpdateOne { filter, patch } => {
                    if let Some(task) = tasks.iter_mut().find(|t| filter.matches(t)) {
                        Self::patch_row(task, &patch, now);
                        result.matched += 1;
                        result.modified += 1;
                    }
                }
                WriteOp::UpdateMany { filter, patch } => {
                    for task in tasks.iter_mut().filter(|t| filter.matches(t)) {
                        Self::patch_row(task, &patch, now);
                        result.matched += 1;
                        result.modified += 1;
                    }
                }
                WriteOp::DeleteMany { filter } => {
                    let before = tasks.len();
                    tasks.retain(|t| !filter.matches(t));
                    result.deleted += (before - tasks.len()) as u64;
                }
            }
        }

        Ok(result)
    }

    async fn distinct(&self, field: DistinctField, filter: &TaskFilter) -> StoreResult<Vec<String>> {
        let tasks = self.tasks.read().await;
        let matched: Vec<Task> = tasks.iter().filter(|t| filter.matches(t)).cloned().collect();
        Ok(match field {
            DistinctField::Category => distinct_categories(&matched),
            DistinctField::Tags => distinct_tags(&matched),
        })
    }
}

/// User store kept in process memory.
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryUserStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            clock,
        }
    }

    async fn find_where(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.read().await.iter().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, record: NewUserRecord) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == record.email) {
            return Err(StoreError::Duplicate(format!("email {}", record.email)));
        }
        let now = self.clock.now();
        let user = User {
            id: ObjectId::new().to_hex(),
            name: record.name,
            email: record.email,
            password_hash: record.password_hash,
            google_id: record.google_id,
            avatar: record.avatar,
            auth_provider: record.auth_provider,
            reset_password_token: None,
            reset_password_expire: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.find_where(|u| u.id == id).await)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.find_where(|u| u.email == email).await)
    }

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .find_where(|u| u.google_id.as_deref() == Some(google_id))
            .await)
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<Option<User>> {
        Ok(self
            .find_where(|u| {
                u.reset_password_token.as_deref() == Some(token_hash)
                    && u.reset_password_expire.is_some_and(|exp| exp > now)
            })
            .await)
    }

    async fn save(&self, user: &User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let mut saved = user.clone();
        saved.updated_at = self.clock.now();
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = saved.clone(),
            None => users.push(saved.clone()),
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Priority, TaskStatus};
    use chrono::{Duration, TimeZone};

    fn record(owner: &str, title: &str, order: i64) -> NewTaskRecord {
        NewTaskRecord {
            user_id: owner.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            category: "General".into(),
            tags: vec![],
            due_date: None,
            is_overdue: false,
            order,
        }
    }

    fn store() -> (Arc<FixedClock>, InMemoryTaskStore) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        (clock.clone(), InMemoryTaskStore::new(clock))
    }

    #[tokio::test]
    async fn same_instant_inserts_list_newest_first() {
        let (_, store) = store();
        store.insert(record("u", "first", 0)).await.unwrap();
        store.insert(record("u", "second", 0)).await.unwrap();

        let tasks = store.find_many(&TaskFilter::owned_by("u"), TaskSort::Manual).await.unwrap();
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);
    }

    #[tokio::test]
    async fn update_one_always_stamps_updated_at() {
        let (clock, store) = store();
        let id = store.insert(record("u", "a", 0)).await.unwrap();
        let created = clock.now();
        clock.advance(Duration::minutes(5));

        let same = store
            .update_one(&TaskFilter::owned_by("u").with_id(&id), &TaskPatch::overdue(false))
            .await
            .unwrap()
            .unwrap();
        assert!(!same.is_overdue);
        assert_eq!(same.updated_at, created + Duration::minutes(5));

        clock.advance(Duration::minutes(5));
        let changed = store
            .update_one(&TaskFilter::owned_by("u").with_id(&id), &TaskPatch::overdue(true))
            .await
            .unwrap()
            .unwrap();
        assert!(changed.is_overdue);
        assert_eq!(changed.updated_at, clock.now());
    }

    #[tokio::test]
    async fn bulk_write_reports_counts_per_kind() {
        let (_, store) = store();
        let a = store.insert(record("u", "a", 0)).await.unwrap();
        let b = store.insert(record("u", "b", 0)).await.unwrap();
        store.insert(record("other", "c", 0)).await.unwrap();

        let result = store
            .bulk_write(vec![
                WriteOp::UpdateMany {
                    filter: TaskFilter::owned_by("u"),
                    patch: TaskPatch::overdue(true),
                },
                WriteOp::UpdateOne {
                    filter: TaskFilter::owned_by("u").with_id(&a),
                    patch: TaskPatch::overdue(true),
                },
                WriteOp::DeleteMany {
                    filter: TaskFilter::owned_by("u").with_id(&b),
                },
            ])
            .await
            .unwrap();

        assert_eq!(result, BulkWriteResult { matched: 3, modified: 3, deleted: 1 });
    }

    #[tokio::test]
    async fn unchanged_rows_still_count_as_modified() {
        let (_, store) = store();
        store.insert(record("u", "a", 0)).await.unwrap();
        store.insert(record("u", "b", 0)).await.unwrap();

        let mut patch = TaskPatch::overdue(false);
        patch.changes.status = Some(TaskStatus::Todo);
        let result = store
            .bulk_write(vec![WriteOp::UpdateMany {
                filter: TaskFilter::owned_by("u"),
                patch,
            }])
            .await
            .unwrap();

        assert_eq!(result, BulkWriteResult { matched: 2, modified: 2, deleted: 0 });
    }

    #[tokio::test]
    async fn user_emails_are_unique() {
        let store = InMemoryUserStore::default();
        let ada = || NewUserRecord {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: None,
            google_id: None,
            avatar: None,
            auth_provider: crate::models::AuthProvider::Local,
        };
        store.insert(ada()).await.unwrap();
        assert!(matches!(store.insert(ada()).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn distinct_flattens_tags() {
        let (_, store) = store();
        let mut a = record("u", "a", 0);
        a.tags = vec!["x".into(), "y".into()];
        let mut b = record("u", "b", 0);
        b.tags = vec!["y".into()];
        b.category = "Work".into();
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        let filter = TaskFilter::owned_by("u");
        assert_eq!(store.distinct(DistinctField::Tags, &filter).await.unwrap(), ["x", "y"]);
        assert_eq!(
            store.distinct(DistinctField::Category, &filter).await.unwrap(),
            ["General", "Work"]
        );
    }
}
