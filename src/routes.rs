// src/routes.rs

use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    web, HttpRequest, HttpResponse,
};
use log::debug;
use serde_json::json;

use crate::error::AppError;
use crate::google::{google_callback, google_login};
use crate::response::ApiResponse;
use crate::tasks::{
    bulk_delete_tasks, bulk_update_status, create_task, delete_task, get_task, list_tasks,
    reorder_tasks, task_categories, task_statistics, task_tags, update_task,
};
use crate::users::{
    change_password, forgot_password, get_profile, login, register, reset_password,
    update_profile,
};

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("Rejected JSON body: {}", err);
    AppError::validation(err.to_string()).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(err.to_string()).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::validation(err.to_string()).into()
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "OK", "message": "Server is running" }))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::failure("Route not found"))
}

/// Registers every route and the extractor error handlers. Static task paths
/// come before `/{id}` so they are never taken for an id.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .route("/health", web::get().to(health))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/users")
                        .route("/register", web::post().to(register))
                        .route("/login", web::post().to(login))
                        .route("/forgot-password", web::post().to(forgot_password))
                        .route("/reset-password/{token}", web::post().to(reset_password))
                        .route("/profile", web::get().to(get_profile))
                        .route("/profile", web::put().to(update_profile))
                        .route("/change-password", web::put().to(change_password)),
                )
                .service(
                    web::scope("/auth")
                        .route("/google", web::get().to(google_login))
                        .route("/google/callback", web::get().to(google_callback)),
                )
                .service(
                    web::scope("/tasks")
                        .route("", web::post().to(create_task))
                        .route("", web::get().to(list_tasks))
                        .route("/statistics", web::get().to(task_statistics))
                        .route("/categories", web::get().to(task_categories))
                        .route("/tags", web::get().to(task_tags))
                        .route("/reorder", web::post().to(reorder_tasks))
                        .route("/bulk-delete", web::post().to(bulk_delete_tasks))
                        .route("/bulk-update-status", web::post().to(bulk_update_status))
                        .route("/{id}", web::get().to(get_task))
                        .route("/{id}", web::put().to(update_task))
                        .route("/{id}", web::delete().to(delete_task)),
                ),
        )
        .default_service(web::to(not_found));
}
