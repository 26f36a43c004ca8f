//! Persistence seams. Services only ever talk to these traits; `mongo` backs
//! them in production and `memory` in tests.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{NewTaskRecord, NewUserRecord, Task, TaskPatch, User};
use crate::query::{TaskFilter, TaskSort};

pub use memory::{InMemoryTaskStore, InMemoryUserStore};
pub use mongo::{MongoTaskStore, MongoUserStore};

/// One entry of a `bulk_write`. Entries run in order; a failure stops the
/// batch and leaves earlier entries applied.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    UpdateOne { filter: TaskFilter, patch: TaskPatch },
    UpdateMany { filter: TaskFilter, patch: TaskPatch },
    DeleteMany { filter: TaskFilter },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
}

impl BulkWriteResult {
    pub fn merge(&mut self, other: BulkWriteResult) {
        self.matched += other.matched;
        self.modified += other.modified;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    Category,
    Tags,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new task and returns its id.
    async fn insert(&self, task: NewTaskRecord) -> StoreResult<String>;

    async fn find_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>>;

    async fn find_many(&self, filter: &TaskFilter, sort: TaskSort) -> StoreResult<Vec<Task>>;

    /// Patches the first match and returns it as it is after the update.
    async fn update_one(&self, filter: &TaskFilter, patch: &TaskPatch) -> StoreResult<Option<Task>>;

    /// Removes the first match and returns it.
    async fn delete_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>>;

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StoreResult<BulkWriteResult>;

    /// Unique values of `field` over the matching tasks. Array fields are
    /// flattened.
    async fn distinct(&self, field: DistinctField, filter: &TaskFilter) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUserRecord) -> StoreResult<User>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>>;

    /// A user whose stored reset token hash matches and has not expired at `now`.
    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<Option<User>>;

    /// Writes every mutable field of `user` back and bumps `updated_at`.
    async fn save(&self, user: &User) -> StoreResult<User>;
}
