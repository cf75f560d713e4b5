use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::Config;
use crate::errors::{AppError, AppResult};

/// One approved enrollment row as the class service reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub display_name: String,
}

/// Enrollment and naming lookups, served by the platform's class service.
/// This crate only consumes the directory; classes are managed elsewhere.
#[async_trait]
pub trait ClassDirectory: Send + Sync {
    /// The teacher currently responsible for a student, if one is assigned.
    async fn teacher_for_student(&self, student_id: &str) -> AppResult<Option<String>>;
    /// Whether the class exists and belongs to the teacher.
    async fn class_owned_by(&self, teacher_id: &str, class_id: &str) -> AppResult<bool>;
    /// Approved students across the teacher's classes, optionally narrowed to
    /// a single class.
    async fn roster_for_teacher(
        &self,
        teacher_id: &str,
        class_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>>;
    /// Display names for a set of student ids. Ids the directory does not
    /// know are simply absent from the result.
    async fn display_names(
        &self,
        student_ids: &[String],
    ) -> AppResult<HashMap<String, String>>;
}

pub struct HttpClassDirectory {
    client: reqwest::Client,
    base_url: String,
    service_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct TeacherLinkResponse {
    teacher_id: String,
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    students: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
struct DisplayNamesResponse {
    names: HashMap<String, String>,
}

impl HttpClassDirectory {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.directory_base_url.trim_end_matches('/').to_string(),
            service_token: config.directory_service_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ClassDirectory for HttpClassDirectory {
    async fn teacher_for_student(&self, student_id: &str) -> AppResult<Option<String>> {
        let response = self
            .client
            .get(self.url(&format!("/internal/students/{}/teacher", student_id)))
            .bearer_auth(self.service_token.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "class directory returned {} for teacher lookup",
                response.status()
            )));
        }

        let link: TeacherLinkResponse = response.json().await?;
        Ok(Some(link.teacher_id))
    }

    async fn class_owned_by(&self, teacher_id: &str, class_id: &str) -> AppResult<bool> {
        let response = self
            .client
            .get(self.url(&format!(
                "/internal/teachers/{}/classes/{}",
                teacher_id, class_id
            )))
            .bearer_auth(self.service_token.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "class directory returned {} for class ownership",
                response.status()
            )));
        }
        Ok(true)
    }

    async fn roster_for_teacher(
        &self,
        teacher_id: &str,
        class_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        let mut request = self
            .client
            .get(self.url(&format!("/internal/teachers/{}/roster", teacher_id)))
            .bearer_auth(self.service_token.expose_secret());
        if let Some(class_id) = class_id {
            request = request.query(&[("class_id", class_id)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "class directory returned {} for roster",
                response.status()
            )));
        }

        let roster: RosterResponse = response.json().await?;
        Ok(roster.students)
    }

    async fn display_names(
        &self,
        student_ids: &[String],
    ) -> AppResult<HashMap<String, String>> {
        if student_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .client
            .post(self.url("/internal/students/names"))
            .bearer_auth(self.service_token.expose_secret())
            .json(&serde_json::json!({ "student_ids": student_ids }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "class directory returned {} for display names",
                response.status()
            )));
        }

        let names: DisplayNamesResponse = response.json().await?;
        Ok(names.names)
    }
}
