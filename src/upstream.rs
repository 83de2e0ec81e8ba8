//! Client for the research data store.
//!
//! Submissions are always accepted and kept locally first; this client only
//! mirrors them upstream when UPSTREAM_BASE_URL is configured. A 401-class
//! response is distinguished from every other failure because it drives the
//! sticky needs-reauth condition on the session; in both cases the payload is
//! queued for retry with the exact same body.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::{OverallForm, PostTaskForm, PreSurveyForm, SurveyType, TaskResult};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("authentication expired (401)")]
    AuthExpired,
    #[error("upstream rejected the submission with status {0}")]
    Status(u16),
    #[error("upstream unreachable: {0}")]
    Transport(String),
    #[error("payload serialization failed: {0}")]
    Encode(String),
}

impl UpstreamError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, UpstreamError::AuthExpired)
    }
}

#[derive(Clone, Debug, Serialize)]
struct StartBody {
    survey_type: SurveyType,
}

/// One mirrored submission. Held verbatim in the retry queue so a retry
/// reuses the same local answer payload rather than requiring re-entry.
#[derive(Clone, Debug)]
pub enum Submission {
    Start(SurveyType),
    Pre(PreSurveyForm),
    TaskResult(TaskResult),
    Post(PostTaskForm),
    Overall(OverallForm),
}

impl Submission {
    pub fn path(&self) -> &'static str {
        match self {
            Submission::Start(_) => "/api/survey/start",
            Submission::Pre(_) => "/api/survey/pre-task",
            Submission::TaskResult(_) => "/api/survey/task-result",
            Submission::Post(_) => "/api/survey/post-task",
            Submission::Overall(_) => "/api/survey/overall",
        }
    }

    pub fn body(&self) -> Result<Value, UpstreamError> {
        let encoded = match self {
            Submission::Start(survey_type) => serde_json::to_value(StartBody {
                survey_type: *survey_type,
            }),
            Submission::Pre(form) => serde_json::to_value(form),
            Submission::TaskResult(result) => serde_json::to_value(result),
            Submission::Post(form) => serde_json::to_value(form),
            Submission::Overall(form) => serde_json::to_value(form),
        };
        encoded.map_err(|e| UpstreamError::Encode(e.to_string()))
    }
}

#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    pub base_url: String,
}

impl Upstream {
    /// Construct the client if UPSTREAM_BASE_URL is set; otherwise return
    /// None and the engine runs local-only.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("UPSTREAM_BASE_URL").ok()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .ok()?;
        Some(Self { client, base_url })
    }

    #[instrument(level = "info", skip(self, submission), fields(path = submission.path()))]
    pub async fn forward(&self, submission: &Submission) -> Result<(), UpstreamError> {
        let url = format!("{}{}", self.base_url, submission.path());
        let body = submission.body()?;

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(target: "survey", %url, "Upstream returned 401; flagging reauth");
            return Err(UpstreamError::AuthExpired);
        }
        if !status.is_success() {
            warn!(target: "survey", %url, status = status.as_u16(), "Upstream rejected submission");
            return Err(UpstreamError::Status(status.as_u16()));
        }
        info!(target: "survey", %url, "Submission mirrored upstream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SusScores;

    #[test]
    fn submission_paths_match_the_wire_contract() {
        let pre = Submission::Pre(PreSurveyForm {
            participant_id: "P3K9M2A".into(),
            field_of_study: "CS".into(),
            confidence_level: 3,
            use_of_ai: Some(true),
            which_ai: Some("a chatbot".into()),
        });
        assert_eq!(pre.path(), "/api/survey/pre-task");
        assert_eq!(
            Submission::Start(SurveyType::Hints).path(),
            "/api/survey/start"
        );
    }

    #[test]
    fn bodies_keep_the_original_field_casing() {
        let pre = Submission::Pre(PreSurveyForm {
            participant_id: "P3K9M2A".into(),
            field_of_study: "CS".into(),
            confidence_level: 3,
            use_of_ai: Some(true),
            which_ai: None,
        });
        let body = pre.body().unwrap();
        assert_eq!(body["use_of_AI"], serde_json::json!(true));
        assert!(body.get("which_AI").is_none());

        let overall = Submission::Overall(OverallForm {
            participant_id: "P3K9M2A".into(),
            survey_type: SurveyType::Terminal,
            sus: SusScores::default(),
            future_use_likelihood: 4,
            preferred_feedback_style: "C".into(),
            preferred_feedback_reason: "reason".into(),
            other_comments: None,
        });
        let body = overall.body().unwrap();
        assert_eq!(body["survey_type"], serde_json::json!("terminal"));
        assert!(body["sus"].get("q7").is_some() && body["sus"].get("q16").is_some());
    }
}
