// src/store/mongo.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use log::debug;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    error::{Error as MongoError, ErrorKind, WriteError, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use super::{BulkWriteResult, DistinctField, TaskStore, UserStore, WriteOp};
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AuthProvider, NewTaskRecord, NewUserRecord, Priority, Task, TaskPatch, TaskStatus, User,
};
use crate::query::{TaskFilter, TaskSort};

pub const TASKS_COLLECTION: &str = "tasks";
pub const USERS_COLLECTION: &str = "users";

const DUPLICATE_KEY_CODE: i32 = 11000;

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code: DUPLICATE_KEY_CODE, .. }))
    )
}

fn to_bson_date(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

fn from_bson_date(dt: BsonDateTime) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
        .ok_or_else(|| StoreError::Corrupt(format!("date out of range: {}", dt)))
}

/// The task as laid out in the `tasks` collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    user_id: String,
    title: String,
    #[serde(default)]
    description: String,
    status: TaskStatus,
    priority: Priority,
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    due_date: Option<BsonDateTime>,
    #[serde(default)]
    is_overdue: bool,
    #[serde(default)]
    order: i64,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl TryFrom<TaskDocument> for Task {
    type Error = StoreError;

    fn try_from(d: TaskDocument) -> StoreResult<Self> {
        let id = d
            .id
            .ok_or_else(|| StoreError::Corrupt("task without _id".to_string()))?;
        Ok(Task {
            id: id.to_hex(),
            user_id: d.user_id,
            title: d.title,
            description: d.description,
            status: d.status,
            priority: d.priority,
            category: d.category,
            tags: d.tags,
            due_date: d.due_date.map(from_bson_date).transpose()?,
            is_overdue: d.is_overdue,
            order: d.order,
            created_at: from_bson_date(d.created_at)?,
            updated_at: from_bson_date(d.updated_at)?,
        })
    }
}

/// Translates a task predicate into a MongoDB query document.
pub fn filter_document(filter: &TaskFilter) -> Document {
    let mut query = Document::new();

    if let Some(owner) = &filter.owner_id {
        query.insert("userId", owner.as_str());
    }
    if let Some(ids) = &filter.ids {
        // Malformed ids cannot name any document.
        let oids: Vec<ObjectId> = ids
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();
        query.insert("_id", doc! { "$in": oids });
    }
    match (filter.status, filter.status_ne) {
        (Some(eq), None) => {
            query.insert("status", eq.as_str());
        }
        (None, Some(ne)) => {
            query.insert("status", doc! { "$ne": ne.as_str() });
        }
        (Some(eq), Some(ne)) => {
            query.insert("status", doc! { "$eq": eq.as_str(), "$ne": ne.as_str() });
        }
        (None, None) => {}
    }
    if let Some(priority) = filter.priority {
        query.insert("priority", priority.as_str());
    }
    if let Some(category) = &filter.category {
        query.insert("category", category.as_str());
    }
    if let Some(tags) = &filter.tags_any {
        query.insert("tags", doc! { "$in": tags.clone() });
    }
    if let Some(search) = &filter.search {
        let pattern = regex::escape(search);
        query.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": &pattern, "$options": "i" } },
                doc! { "description": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }

    let mut due = Document::new();
    if let Some(from) = filter.due_from {
        due.insert("$gte", to_bson_date(from));
    }
    if let Some(to) = filter.due_to {
        due.insert("$lte", to_bson_date(to));
    }
    if let Some(before) = filter.due_before {
        due.insert("$lt", to_bson_date(before));
    }
    if !due.is_empty() {
        query.insert("dueDate", due);
    }

    if let Some(flag) = filter.is_overdue {
        query.insert("isOverdue", flag);
    }
    query
}

/// Builds the `$set` update for a patch, stamping `updatedAt`.
pub fn update_document(patch: &TaskPatch, now: DateTime<Utc>) -> Document {
    let c = &patch.changes;
    let mut set = Document::new();
    if let Some(title) = &c.title {
        set.insert("title", title.as_str());
    }
    if let Some(description) = &c.description {
        set.insert("description", description.as_str());
    }
    if let Some(status) = c.status {
        set.insert("status", status.as_str());
    }
    if let Some(priority) = c.priority {
        set.insert("priority", priority.as_str());
    }
    if let Some(category) = &c.category {
        set.insert("category", category.as_str());
    }
    if let Some(tags) = &c.tags {
        set.insert("tags", tags.clone());
    }
    if let Some(due_date) = c.due_date {
        set.insert("dueDate", due_date.map(to_bson_date).map_or(Bson::Null, Bson::DateTime));
    }
    if let Some(order) = c.order {
        set.insert("order", order);
    }
    if let Some(is_overdue) = patch.is_overdue {
        set.insert("isOverdue", is_overdue);
    }
    set.insert("updatedAt", to_bson_date(now));
    doc! { "$set": set }
}

fn sort_document(sort: TaskSort) -> Option<Document> {
    match sort {
        TaskSort::Manual => Some(doc! { "order": 1, "createdAt": -1 }),
        TaskSort::Unsorted => None,
    }
}

pub struct MongoTaskStore {
    tasks: Collection<TaskDocument>,
    clock: Arc<dyn Clock>,
}

impl MongoTaskStore {
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: db.collection(TASKS_COLLECTION),
            clock,
        }
    }

    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let indexes = vec![
            IndexModel::builder().keys(doc! { "userId": 1, "status": 1 }).build(),
            IndexModel::builder().keys(doc! { "userId": 1, "dueDate": 1 }).build(),
        ];
        self.tasks.create_indexes(indexes).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MongoTaskStore {
    async fn insert(&self, record: NewTaskRecord) -> StoreResult<String> {
        let now = to_bson_date(self.clock.now());
        let id = ObjectId::new();
        let document = TaskDocument {
            id: Some(id),
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            status: record.status,
            priority: record.priority,
            category: record.category,
            tags: record.tags,
            due_date: record.due_date.map(to_bson_date),
            is_overdue: record.is_overdue,
            order: record.order,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert_one(&document).await?;
        debug!("Inserted task {}", id);
        Ok(id.to_hex())
    }

    async fn find_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>> {
        self.tasks
            .find_one(filter_document(filter))
            .await?
            .map(Task::try_from)
            .transpose()
    }

    async fn find_many(&self, filter: &TaskFilter, sort: TaskSort) -> StoreResult<Vec<Task>> {
        let mut find = self.tasks.find(filter_document(filter));
        if let Some(sort) = sort_document(sort) {
            find = find.sort(sort);
        }
        let documents: Vec<TaskDocument> = find.await?.try_collect().await?;
        documents.into_iter().map(Task::try_from).collect()
    }

    async fn update_one(&self, filter: &TaskFilter, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        self.tasks
            .find_one_and_update(filter_document(filter), update_document(patch, self.clock.now()))
            .return_document(ReturnDocument::After)
            .await?
            .map(Task::try_from)
            .transpose()
    }

    async fn delete_one(&self, filter: &TaskFilter) -> StoreResult<Option<Task>> {
        self.tasks
            .find_one_and_delete(filter_document(filter))
            .await?
            .map(Task::try_from)
            .transpose()
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> StoreResult<BulkWriteResult> {
        let now = self.clock.now();
        let mut result = BulkWriteResult::default();
        for op in ops {
            let step = match op {
                WriteOp::UpdateOne { filter, patch } => {
                    let res = self
                        .tasks
                        .update_one(filter_document(&filter), update_document(&patch, now))
                        .await?;
                    BulkWriteResult {
                        matched: res.matched_count,
                        modified: res.modified_count,
                        deleted: 0,
                    }
                }
                WriteOp::UpdateMany { filter, patch } => {
                    let res = self
                        .tasks
                        .update_many(filter_document(&filter), update_document(&patch, now))
                        .await?;
                    BulkWriteResult {
                        matched: res.matched_count,
                        modified: res.modified_count,
                        deleted: 0,
                    }
                }
                WriteOp::DeleteMany { filter } => {
                    let res = self.tasks.delete_many(filter_document(&filter)).await?;
                    BulkWriteResult {
                        deleted: res.deleted_count,
                        ..BulkWriteResult::default()
                    }
                }
            };
            result.merge(step);
        }
        Ok(result)
    }

    async fn distinct(&self, field: DistinctField, filter: &TaskFilter) -> StoreResult<Vec<String>> {
        let name = match field {
            DistinctField::Category => "category",
            DistinctField::Tags => "tags",
        };
        let values = self.tasks.distinct(name, filter_document(filter)).await?;
        Ok(values
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }
}

/// The user as laid out in the `users` collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    email: String,
    password: Option<String>,
    google_id: Option<String>,
    avatar: Option<String>,
    auth_provider: AuthProvider,
    reset_password_token: Option<String>,
    reset_password_expire: Option<BsonDateTime>,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl TryFrom<UserDocument> for User {
    type Error = StoreError;

    fn try_from(d: UserDocument) -> StoreResult<Self> {
        let id = d
            .id
            .ok_or_else(|| StoreError::Corrupt("user without _id".to_string()))?;
        Ok(User {
            id: id.to_hex(),
            name: d.name,
            email: d.email,
            password_hash: d.password,
            google_id: d.google_id,
            avatar: d.avatar,
            auth_provider: d.auth_provider,
            reset_password_token: d.reset_password_token,
            reset_password_expire: d.reset_password_expire.map(from_bson_date).transpose()?,
            created_at: from_bson_date(d.created_at)?,
            updated_at: from_bson_date(d.updated_at)?,
        })
    }
}

impl UserDocument {
    fn from_user(user: &User, id: ObjectId) -> Self {
        Self {
            id: Some(id),
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            google_id: user.google_id.clone(),
            avatar: user.avatar.clone(),
            auth_provider: user.auth_provider,
            reset_password_token: user.reset_password_token.clone(),
            reset_password_expire: user.reset_password_expire.map(to_bson_date),
            created_at: to_bson_date(user.created_at),
            updated_at: to_bson_date(user.updated_at),
        }
    }
}

pub struct MongoUserStore {
    users: Collection<UserDocument>,
    clock: Arc<dyn Clock>,
}

impl MongoUserStore {
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: db.collection(USERS_COLLECTION),
            clock,
        }
    }

    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(unique_email).await?;
        Ok(())
    }

    async fn find_by(&self, filter: Document) -> StoreResult<Option<User>> {
        self.users
            .find_one(filter)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, record: NewUserRecord) -> StoreResult<User> {
        let now = self.clock.now();
        let user = User {
            id: String::new(),
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
        let id = ObjectId::new();
        self.users
            .insert_one(UserDocument::from_user(&user, id))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::Duplicate(format!("email {}", user.email))
                } else {
                    StoreError::from(e)
                }
            })?;
        Ok(User {
            id: id.to_hex(),
            ..user
        })
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        match ObjectId::parse_str(id) {
            Ok(oid) => self.find_by(doc! { "_id": oid }).await,
            Err(_) => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_by(doc! { "email": email }).await
    }

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        self.find_by(doc! { "googleId": google_id }).await
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<Option<User>> {
        self.find_by(doc! {
            "resetPasswordToken": token_hash,
            "resetPasswordExpire": { "$gt": to_bson_date(now) },
        })
        .await
    }

    async fn save(&self, user: &User) -> StoreResult<User> {
        let oid = ObjectId::parse_str(&user.id)
            .map_err(|_| StoreError::Corrupt(format!("invalid user id {}", user.id)))?;
        let saved = User {
            updated_at: self.clock.now(),
            ..user.clone()
        };
        self.users
            .replace_one(doc! { "_id": oid }, UserDocument::from_user(&saved, oid))
            .await?;
        Ok(saved)
    }
}
