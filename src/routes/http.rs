//! HTTP endpoint handlers. These are thin wrappers that forward to core
//! logic. Each handler is instrumented; errors map onto status codes here and
//! nowhere else.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, instrument};

use crate::domain::{OverallForm, PostTaskForm, PreSurveyForm, TaskResult};
use crate::logic::{self, EngineError};
use crate::protocol::*;
use crate::sandbox::SandboxError;
use crate::session::SessionError;
use crate::state::AppState;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
            EngineError::UnknownVariant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Session(SessionError::SubmissionInFlight) => StatusCode::CONFLICT,
            EngineError::Session(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Sandbox(SandboxError::UnknownEntry(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Sandbox(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::AssistantDisabled => StatusCode::FORBIDDEN,
            EngineError::Assistant(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthOut {
        ok: true,
        sandbox: state.sandbox.status(),
        python_version: state.sandbox.version(),
    })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_variants(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.variants.clone())
}

#[instrument(level = "info", skip(state, body), fields(survey = body.survey_type.as_str()))]
pub async fn http_start_survey(
    State(state): State<AppState>,
    Json(body): Json<StartIn>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::start_survey(&state, body.survey_type).await?;
    info!(target: "survey", participant = %out.participant_id, "HTTP survey started");
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id))]
pub async fn http_submit_pre(
    State(state): State<AppState>,
    Json(form): Json<PreSurveyForm>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::submit_pre(&state, form).await?;
    info!(target: "survey", participant = %out.participant_id, phase = ?out.phase, "HTTP pre-task accepted");
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(participant = %body.participant_id, task_index = body.task_index))]
pub async fn http_task_result(
    State(state): State<AppState>,
    Json(body): Json<TaskResult>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::complete_task(&state, body).await?;
    info!(target: "survey", participant = %out.participant_id, phase = ?out.phase, "HTTP task result recorded");
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id, task_index = form.task_index))]
pub async fn http_submit_post(
    State(state): State<AppState>,
    Json(form): Json<PostTaskForm>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::submit_post(&state, form).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id))]
pub async fn http_submit_overall(
    State(state): State<AppState>,
    Json(form): Json<OverallForm>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::submit_overall(&state, form).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(prompt_len = body.prompt.len()))]
pub async fn http_assistant(
    State(state): State<AppState>,
    Json(body): Json<AssistantIn>,
) -> Result<Json<AssistantOut>, EngineError> {
    let response = logic::assistant_reply(&state, body).await?;
    Ok(Json(AssistantOut { response }))
}

#[instrument(level = "info", skip(state, body), fields(participant = %body.participant_id))]
pub async fn http_run(
    State(state): State<AppState>,
    Json(body): Json<RunIn>,
) -> Result<Json<RunOut>, EngineError> {
    let out = logic::run_code(&state, body).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::get_session(&state, &participant_id).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_advance(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Json(body): Json<AdvanceIn>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::advance(&state, &participant_id, body.action).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(file = %body.name))]
pub async fn http_update_file(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Json(body): Json<FileUpdateIn>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::update_file(&state, &participant_id, &body.name, body.content).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(file = %body.name))]
pub async fn http_set_active_file(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Json(body): Json<ActiveFileIn>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::set_active_file(&state, &participant_id, &body.name).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_retry(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionOut>, EngineError> {
    let out = logic::retry_pending(&state, &participant_id).await?;
    Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_quit(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<StatusCode, EngineError> {
    logic::quit(&state, &participant_id).await?;
    info!(target: "survey", %participant_id, "Session cleared on quit");
    Ok(StatusCode::NO_CONTENT)
}
