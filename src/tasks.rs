// src/tasks.rs

use actix_web::{web, HttpResponse};
use log::debug;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::dates::parse_timestamp;
use crate::models::{Priority, TaskChanges, TaskDraft, TaskStatus};
use crate::query::TaskCriteria;
use crate::response::ApiResponse;
use crate::task_service::TaskOrder;
use crate::validation::{require_ids, Validate};

/// Query string of `GET /api/tasks`. Everything arrives as text and is
/// checked in [`TaskListQuery::into_criteria`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub search: Option<String>,
    pub due_date_from: Option<String>,
    pub due_date_to: Option<String>,
    pub is_overdue: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn date_param(name: &str, value: Option<String>) -> Result<Option<chrono::DateTime<chrono::Utc>>, AppError> {
    present(value)
        .map(|raw| {
            parse_timestamp(&raw)
                .ok_or_else(|| AppError::validation(format!("{} must be a valid date", name)))
        })
        .transpose()
}

impl TaskListQuery {
    pub fn into_criteria(self) -> Result<TaskCriteria, AppError> {
        Ok(TaskCriteria {
            status: present(self.status)
                .map(|s| s.parse::<TaskStatus>())
                .transpose()
                .map_err(AppError::Validation)?,
            priority: present(self.priority)
                .map(|p| p.parse::<Priority>())
                .transpose()
                .map_err(AppError::Validation)?,
            category: present(self.category),
            tags: present(self.tags)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            search: present(self.search),
            due_date_from: date_param("dueDateFrom", self.due_date_from)?,
            due_date_to: date_param("dueDateTo", self.due_date_to)?,
            overdue_only: self.is_overdue.as_deref() == Some("true"),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReorderRequest {
    pub tasks: Vec<TaskOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BulkDeleteRequest {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BulkStatusRequest {
    pub task_ids: Vec<String>,
    pub status: TaskStatus,
}

/// POST /api/tasks
pub async fn create_task(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<TaskDraft>,
) -> Result<HttpResponse, AppError> {
    let draft = body.into_inner().validate()?;
    debug!("create_task for user {}: {:?}", user.user_id, draft);
    let task = data.tasks.create(&user.user_id, draft).await?;
    Ok(HttpResponse::Created().json(ApiResponse::data(task).with_message("Task created successfully")))
}

/// GET /api/tasks
/// Lists the caller's tasks in manual order, narrowed by the query filters.
pub async fn list_tasks(
    user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<TaskListQuery>,
) -> Result<HttpResponse, AppError> {
    let criteria = query.into_inner().into_criteria()?;
    let tasks = data.tasks.get_many(&user.user_id, &criteria).await?;
    let count = tasks.len();
    Ok(HttpResponse::Ok().json(ApiResponse::data(tasks).with_count(count)))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let task = data.tasks.get_one(&user.user_id, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(task)))
}

/// PUT /api/tasks/{id}
pub async fn update_task(
    user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<TaskChanges>,
) -> Result<HttpResponse, AppError> {
    let changes = body.into_inner().validate()?;
    debug!("update_task {} for user {}: {:?}", id, user.user_id, changes);
    let task = data.tasks.update(&user.user_id, &id, changes).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(task).with_message("Task updated successfully")))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    data.tasks.delete(&user.user_id, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Task deleted successfully")))
}

/// POST /api/tasks/reorder
pub async fn reorder_tasks(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<ReorderRequest>,
) -> Result<HttpResponse, AppError> {
    let ReorderRequest { tasks } = body.into_inner();
    data.tasks.reorder(&user.user_id, tasks).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Tasks reordered successfully")))
}

/// POST /api/tasks/bulk-delete
pub async fn bulk_delete_tasks(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<BulkDeleteRequest>,
) -> Result<HttpResponse, AppError> {
    let BulkDeleteRequest { task_ids } = body.into_inner();
    require_ids(&task_ids)?;
    let deleted = data.tasks.bulk_delete(&user.user_id, task_ids).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::deleted("Tasks deleted successfully", deleted)))
}

/// POST /api/tasks/bulk-update-status
pub async fn bulk_update_status(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<BulkStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let BulkStatusRequest { task_ids, status } = body.into_inner();
    require_ids(&task_ids)?;
    let modified = data
        .tasks
        .bulk_update_status(&user.user_id, task_ids, status)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::modified("Tasks updated successfully", modified)))
}

/// GET /api/tasks/statistics
pub async fn task_statistics(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let stats = data.tasks.statistics(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(stats)))
}

/// GET /api/tasks/categories
pub async fn task_categories(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let categories = data.tasks.categories(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(categories)))
}

/// GET /api/tasks/tags
pub async fn task_tags(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let tags = data.tasks.tags(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(tags)))
}
