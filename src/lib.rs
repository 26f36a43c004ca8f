pub mod app_state;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod google;
pub mod lifecycle;
pub mod mailer;
pub mod models;
pub mod query;
pub mod response;
pub mod routes;
pub mod stats;
pub mod store;
pub mod sweeper;
pub mod task_service;
pub mod tasks;
pub mod user_service;
pub mod users;
pub mod validation;
