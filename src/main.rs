// src/main.rs

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use task_manager::app_state::AppState;
use task_manager::auth::Authentication;
use task_manager::clock::{Clock, SystemClock};
use task_manager::config::Config;
use task_manager::db::MongoDB;
use task_manager::google::GoogleOAuth;
use task_manager::mailer::LogMailer;
use task_manager::routes;
use task_manager::sweeper::OverdueSweeper;
use task_manager::task_service::TaskService;
use task_manager::user_service::UserService;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mongodb = MongoDB::init(&config.mongo_uri, &config.database_name)
        .await
        .map_err(|e| startup_error("MongoDB connection failed", e))?;
    let (task_store, user_store) = mongodb
        .stores(clock.clone())
        .await
        .map_err(|e| startup_error("Index setup failed", e))?;
    let task_store = Arc::new(task_store);

    let sweeper = Arc::new(OverdueSweeper::new(
        task_store.clone(),
        clock.clone(),
        config.overdue_sweep_interval,
    ));
    sweeper.spawn();

    let google = config.google.clone().map(|g| Arc::new(GoogleOAuth::new(g)));
    if google.is_none() {
        info!("Google sign-in disabled: GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_CALLBACK_URL are not all set");
    }

    let state = AppState {
        tasks: Arc::new(TaskService::new(task_store, clock.clone())),
        users: Arc::new(UserService::new(
            Arc::new(user_store),
            Arc::new(LogMailer),
            clock,
            config.auth_settings(),
        )),
        config: config.clone(),
        google,
    };

    let frontend_origin = config.frontend_url.clone();
    info!("Server running at http://0.0.0.0:{}", config.port);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(&state.config.jwt_secret))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
