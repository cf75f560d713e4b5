use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use validator::Validate;

use crate::{
    app_state::AppState,
    errors::AppError,
    handlers::identity::{StudentIdentity, TeacherIdentity},
    middleware::get_request_id,
    models::domain::QuizVariant,
    models::dto::request::{
        DisengagementReport, ResetQuizRequest, SaveProgressRequest, SubmitQuizRequest,
    },
    models::dto::response::{
        AttemptDto, CurrentAttemptResponse, HeartbeatResponse, ResetQuizResponse,
        StartQuizResponse,
    },
};

pub(crate) fn parse_variant(raw: &str) -> Result<QuizVariant, AppError> {
    QuizVariant::parse(raw)
        .ok_or_else(|| AppError::NotFound(format!("Unknown quiz variant '{}'", raw)))
}

#[post("/api/quizzes/{variant}/attempts")]
async fn start_quiz(
    state: web::Data<AppState>,
    variant: web::Path<String>,
    student: StudentIdentity,
) -> Result<HttpResponse, AppError> {
    let variant = parse_variant(&variant)?;
    let attempt = state.attempt_lifecycle.start(&student.0, variant).await?;

    Ok(HttpResponse::Created().json(StartQuizResponse {
        attempt: attempt.into(),
        heartbeat_interval_secs: state.config.heartbeat_interval_secs,
    }))
}

#[get("/api/quizzes/{variant}/attempts/current")]
async fn check_existing_attempt(
    state: web::Data<AppState>,
    variant: web::Path<String>,
    student: StudentIdentity,
) -> Result<HttpResponse, AppError> {
    let variant = parse_variant(&variant)?;
    let attempt = state
        .attempt_lifecycle
        .check_existing(&student.0, variant)
        .await?;

    Ok(HttpResponse::Ok().json(CurrentAttemptResponse {
        attempt: attempt.map(AttemptDto::from),
    }))
}

#[put("/api/attempts/{attempt_id}/progress")]
async fn save_quiz_progress(
    state: web::Data<AppState>,
    attempt_id: web::Path<String>,
    request: web::Json<SaveProgressRequest>,
    student: StudentIdentity,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    request.validate()?;

    let response = state
        .attempt_lifecycle
        .save_progress(
            &student.0,
            &attempt_id,
            &request.answers,
            request.elapsed_seconds,
        )
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/api/attempts/{attempt_id}/heartbeat")]
async fn heartbeat(
    state: web::Data<AppState>,
    attempt_id: web::Path<String>,
    student: StudentIdentity,
) -> Result<HttpResponse, AppError> {
    state
        .disengagement
        .heartbeat(&student.0, &attempt_id)
        .await?;
    Ok(HttpResponse::Ok().json(HeartbeatResponse { ok: true }))
}

#[post("/api/attempts/{attempt_id}/submit")]
async fn submit_quiz(
    state: web::Data<AppState>,
    attempt_id: web::Path<String>,
    request: web::Json<SubmitQuizRequest>,
    student: StudentIdentity,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    request.validate()?;

    let response = state
        .attempt_lifecycle
        .submit(
            &student.0,
            &attempt_id,
            &request.answers,
            request.elapsed_seconds,
        )
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/api/attempts/{attempt_id}/disengagement")]
async fn report_disengagement(
    state: web::Data<AppState>,
    attempt_id: web::Path<String>,
    request: web::Json<DisengagementReport>,
    student: StudentIdentity,
    http_request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    log::info!(
        "Received {} report for attempt '{}' (request {})",
        request.reason.as_str(),
        attempt_id.as_str(),
        get_request_id(&http_request).unwrap_or_default()
    );

    let ack = state
        .disengagement
        .report(&student.0, &attempt_id, request.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ack))
}

#[post("/api/quizzes/{variant}/reset")]
async fn reset_student_quiz(
    state: web::Data<AppState>,
    variant: web::Path<String>,
    request: web::Json<ResetQuizRequest>,
    teacher: TeacherIdentity,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    request.validate()?;
    let variant = parse_variant(&variant)?;

    let reset_count = state
        .attempt_lifecycle
        .reset_student_quiz(&teacher.0, &request.student_id, variant)
        .await?;

    Ok(HttpResponse::Ok().json(ResetQuizResponse {
        student_id: request.student_id,
        variant,
        reset_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variant_accepts_known_kebab_names() {
        assert_eq!(
            parse_variant("rational-functions").expect("known variant"),
            QuizVariant::RationalFunctions
        );
        assert_eq!(
            parse_variant("Functions").expect("case-insensitive"),
            QuizVariant::Functions
        );
    }

    #[test]
    fn test_parse_variant_rejects_unknown_names() {
        let err = parse_variant("trigonometry").expect_err("unknown variant");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
