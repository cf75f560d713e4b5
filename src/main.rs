use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Utc;

use aralin_server::{
    app_state::AppState, config::Config, handlers, middleware::RequestIdMiddleware,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        config.validate_for_production();
    }

    let host = config.web_server_host.clone();
    let port = config.web_server_port;

    let state = AppState::new(config).await.map_err(|err| {
        std::io::Error::other(format!("Failed to initialize application state: {}", err))
    })?;

    // Background sweep for attempts whose heartbeats went quiet.
    let sweeper = state.disengagement.clone();
    let sweep_interval_secs = state.config.sweep_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
        loop {
            interval.tick().await;
            if let Err(err) = sweeper.sweep(Utc::now()).await {
                log::error!("Stale attempt sweep failed: {}", err);
            }
        }
    });

    log::info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .wrap(RequestIdMiddleware)
            .wrap(Cors::permissive())
            .service(handlers::start_quiz)
            .service(handlers::check_existing_attempt)
            .service(handlers::save_quiz_progress)
            .service(handlers::heartbeat)
            .service(handlers::submit_quiz)
            .service(handlers::report_disengagement)
            .service(handlers::reset_student_quiz)
            .service(handlers::get_leaderboard)
            .service(handlers::health_check)
            .service(handlers::health_check_ready)
            .service(handlers::health_check_live)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
