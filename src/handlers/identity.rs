use std::future::{ready, Ready};

use actix_web::{FromRequest, HttpRequest};

use crate::errors::AppError;

pub const STUDENT_ID_HEADER: &str = "X-Student-Id";
pub const TEACHER_ID_HEADER: &str = "X-Teacher-Id";

/// Identity headers injected by the upstream auth gateway. Authentication
/// itself happens before requests reach this service; handlers only need to
/// know who the gateway says is calling.
#[derive(Debug)]
pub struct StudentIdentity(pub String);

#[derive(Debug)]
pub struct TeacherIdentity(pub String);

/// Caller of an endpoint both roles may use. Teacher wins when both headers
/// are present, since a teacher viewing a board wants their scoped view.
pub enum CallerIdentity {
    Student(String),
    Teacher(String),
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl FromRequest for StudentIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let identity = header_value(req, STUDENT_ID_HEADER)
            .map(StudentIdentity)
            .ok_or_else(|| {
                AppError::NotAuthorized(format!("Missing {} header", STUDENT_ID_HEADER))
            });
        ready(identity)
    }
}

impl FromRequest for TeacherIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let identity = header_value(req, TEACHER_ID_HEADER)
            .map(TeacherIdentity)
            .ok_or_else(|| {
                AppError::NotAuthorized(format!("Missing {} header", TEACHER_ID_HEADER))
            });
        ready(identity)
    }
}

impl FromRequest for CallerIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let identity = header_value(req, TEACHER_ID_HEADER)
            .map(CallerIdentity::Teacher)
            .or_else(|| header_value(req, STUDENT_ID_HEADER).map(CallerIdentity::Student))
            .ok_or_else(|| {
                AppError::NotAuthorized(format!(
                    "Missing {} or {} header",
                    TEACHER_ID_HEADER, STUDENT_ID_HEADER
                ))
            });
        ready(identity)
    }
}
