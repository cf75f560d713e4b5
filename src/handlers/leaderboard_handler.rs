use actix_web::{get, web, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    errors::AppError,
    handlers::attempt_handler::parse_variant,
    handlers::identity::CallerIdentity,
    models::dto::request::LeaderboardQuery,
    services::leaderboard_service::LeaderboardScope,
};

const DEFAULT_LIMIT: i64 = 20;

/// Teachers get the board scoped to their own students (optionally one
/// class); students get the open board with their own row flagged.
#[get("/api/leaderboard/{variant}")]
async fn get_leaderboard(
    state: web::Data<AppState>,
    variant: web::Path<String>,
    query: web::Query<LeaderboardQuery>,
    caller: CallerIdentity,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    query.validate()?;
    let variant = parse_variant(&variant)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let board = match &caller {
        CallerIdentity::Teacher(teacher_id) => {
            state
                .leaderboard
                .rank(
                    variant,
                    Some(LeaderboardScope {
                        teacher_id,
                        class_id: query.class_id.as_deref(),
                    }),
                    limit,
                    None,
                )
                .await?
        }
        CallerIdentity::Student(student_id) => {
            state
                .leaderboard
                .rank(variant, None, limit, Some(student_id))
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(board))
}

#[get("/health")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/health/ready")]
async fn health_check_ready(state: web::Data<AppState>) -> HttpResponse {
    let db_health = state.db.health_check().await;

    let status = if db_health.is_ok() {
        "ready"
    } else {
        "not_ready"
    };

    let response = serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": {
            "mongodb": if db_health.is_ok() { "ok" } else { "error" }
        }
    });

    if db_health.is_ok() {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

#[get("/health/live")]
async fn health_check_live() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
