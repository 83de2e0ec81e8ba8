//! Core behaviors shared by the HTTP handlers.
//!
//! Every operation follows the same shape: mutate the session state machine
//! under the store lock, do network IO (upstream mirror, assistant, sandbox)
//! outside of it, persist the snapshot, and return the public session DTO.
//! Upstream failures never fail the request and never roll back phase or
//! timer state; they queue the payload and, for 401s, set the sticky
//! needs-reauth flag.

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::assistant::{assistant_stub, AssistantError};
use crate::catalog::variant_for;
use crate::domain::{OverallForm, PostTaskForm, PreSurveyForm, SurveyType, TaskResult};
use crate::protocol::{to_out, AssistantIn, RunIn, RunOut, SessionOut};
use crate::sandbox::SandboxError;
use crate::session::{AdvanceAction, SessionError, SurveySession};
use crate::state::AppState;
use crate::upstream::Submission;
use crate::util::{generate_participant_id, is_valid_participant_id};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
    #[error("survey type {0:?} is not a selectable variant")]
    UnknownVariant(SurveyType),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("the assistant is disabled for this survey variant")]
    AssistantDisabled,
    #[error(transparent)]
    Assistant(#[from] AssistantError),
}

async fn snapshot_out(state: &AppState, participant_id: &str) -> Result<SessionOut, EngineError> {
    let session = state
        .session_clone(participant_id)
        .await
        .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))?;
    let pending = state.pending_count(participant_id).await;
    Ok(to_out(&session, &state.limits, &state.tasks, pending))
}

/// Record a submission locally, then try to mirror it upstream. Failures
/// queue the exact payload for retry; a 401 additionally flags the session.
async fn record_and_mirror(state: &AppState, participant_id: &str, submission: Submission) {
    state.record(submission.clone()).await;

    let Some(upstream) = &state.upstream else {
        return;
    };
    match upstream.forward(&submission).await {
        Ok(()) => {}
        Err(e) => {
            let auth = e.is_auth_expired();
            warn!(
                target: "survey",
                %participant_id,
                path = submission.path(),
                error = %e,
                "Mirroring failed; queueing payload for retry"
            );
            state.queue_for_retry(participant_id, submission).await;
            if auth {
                if let Some(session) = state.sessions.write().await.get_mut(participant_id) {
                    session.mark_reauth_needed();
                }
            }
        }
    }
}

/// `select -> intro`: resolve the variant, mint a participant id, create the
/// session, and mirror the start event.
#[instrument(level = "info", skip(state))]
pub async fn start_survey(
    state: &AppState,
    survey_type: SurveyType,
) -> Result<SessionOut, EngineError> {
    let variant = variant_for(&state.variants, survey_type)
        .filter(|v| v.survey_type.is_resolved())
        .ok_or(EngineError::UnknownVariant(survey_type))?;

    let participant_id = {
        let sessions = state.sessions.read().await;
        let mut id = generate_participant_id();
        while sessions.contains_key(&id) {
            id = generate_participant_id();
        }
        id
    };

    let session = SurveySession::new(variant, participant_id.clone());
    state.persist_snapshot(&session);
    state
        .sessions
        .write()
        .await
        .insert(participant_id.clone(), session);
    info!(target: "survey", participant = %participant_id, survey = survey_type.as_str(), "Survey started");

    record_and_mirror(state, &participant_id, Submission::Start(survey_type)).await;
    snapshot_out(state, &participant_id).await
}

/// Manual navigation through the intro/pre form phases.
#[instrument(level = "info", skip(state))]
pub async fn advance(
    state: &AppState,
    participant_id: &str,
    action: AdvanceAction,
) -> Result<SessionOut, EngineError> {
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))?;
        session.advance(action)?;
        state.persist_snapshot(session);
    }
    snapshot_out(state, participant_id).await
}

/// `pre -> task[0]`.
#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id))]
pub async fn submit_pre(state: &AppState, form: PreSurveyForm) -> Result<SessionOut, EngineError> {
    let participant_id = form.participant_id.clone();
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
        session.submit_pre(&form, &state.tasks)?;
        state.persist_snapshot(session);
    }
    record_and_mirror(state, &participant_id, Submission::Pre(form)).await;
    snapshot_out(state, &participant_id).await
}

/// `task[i] -> post[i]`: the complete-task trigger. The engine rebuilds the
/// task-result payload from its own session state; the client body only has
/// to agree on which task is being completed. Duplicate triggers while one
/// submission is in flight fail, so exactly one record is produced.
#[instrument(level = "info", skip(state, body), fields(participant = %body.participant_id, task_index = body.task_index))]
pub async fn complete_task(state: &AppState, body: TaskResult) -> Result<SessionOut, EngineError> {
    let participant_id = body.participant_id.clone();
    let payload = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
        if body.task_index != session.current_task as u32 + 1 {
            return Err(SessionError::Validation(format!(
                "task_index {} does not match the active task {}",
                body.task_index,
                session.current_task + 1
            ))
            .into());
        }
        session.begin_complete_task(&state.limits, &state.tasks)?
    };

    record_and_mirror(state, &participant_id, Submission::TaskResult(payload)).await;

    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
        session.finish_complete_task();
        state.persist_snapshot(session);
    }
    snapshot_out(state, &participant_id).await
}

/// `post[i] -> task[i+1]` or `post[3] -> navigate`.
#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id, task_index = form.task_index))]
pub async fn submit_post(state: &AppState, form: PostTaskForm) -> Result<SessionOut, EngineError> {
    let participant_id = form.participant_id.clone();
    let next = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
        let next = session.submit_post(&form, &state.tasks)?;
        state.persist_snapshot(session);
        next
    };
    info!(target: "survey", participant = %participant_id, ?next, "Post-task questionnaire accepted");
    record_and_mirror(state, &participant_id, Submission::Post(form)).await;
    snapshot_out(state, &participant_id).await
}

/// `overall -> complete`. Completion clears the persisted snapshot; the
/// in-memory session stays until the participant quits or restarts.
#[instrument(level = "info", skip(state, form), fields(participant = %form.participant_id))]
pub async fn submit_overall(state: &AppState, form: OverallForm) -> Result<SessionOut, EngineError> {
    let participant_id = form.participant_id.clone();
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
        session.submit_overall(&form)?;
    }
    record_and_mirror(state, &participant_id, Submission::Overall(form)).await;
    if let Err(e) = state.snapshots.clear(&participant_id) {
        error!(target: "coach_backend", %participant_id, error = %e, "Snapshot clear failed");
    }
    info!(target: "survey", participant = %participant_id, "Survey completed");
    snapshot_out(state, &participant_id).await
}

/// Run the entry file in the sandbox and record the captured stdout as the
/// session's last output when the run succeeds. A traceback on stderr is a
/// normal outcome: it is returned verbatim and leaves the last verified
/// output untouched.
#[instrument(level = "info", skip(state, body), fields(participant = %body.participant_id))]
pub async fn run_code(state: &AppState, body: RunIn) -> Result<RunOut, EngineError> {
    let (files, entry) = {
        let sessions = state.sessions.read().await;
        let session = sessions
            .get(&body.participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(body.participant_id.clone()))?;
        let entry = body
            .entry_file
            .clone()
            .unwrap_or_else(|| session.active_file.clone());
        (session.files.clone(), entry)
    };

    let output = state.sandbox.run(&files, &entry).await?;

    if !output.failed() {
        let mut sessions = state.sessions.write().await;
        if let Some(session) = sessions.get_mut(&body.participant_id) {
            session.record_run_output(&output.stdout);
            state.persist_snapshot(session);
        }
    }
    Ok(RunOut {
        failed: output.failed(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Assistant proxy. With a session id the variant gates the call and supplies
/// the system prompt; without one the default prompt applies. When no model
/// backend is configured (or it errors) the stub answers instead.
#[instrument(level = "info", skip(state, body), fields(prompt_len = body.prompt.len()))]
pub async fn assistant_reply(state: &AppState, body: AssistantIn) -> Result<String, EngineError> {
    let system_prompt: Option<String> = match &body.session_id {
        Some(participant_id) => {
            let session = state
                .session_clone(participant_id)
                .await
                .ok_or_else(|| EngineError::UnknownParticipant(participant_id.clone()))?;
            if !session.variant.ai_enabled {
                info!(target: "survey", participant = %participant_id, "Assistant request rejected: variant disables AI");
                return Err(EngineError::AssistantDisabled);
            }
            session.variant.system_prompt
        }
        None => None,
    };

    match &state.assistant {
        Some(assistant) => {
            match assistant
                .reply(system_prompt.as_deref(), &body.prompt, body.code.as_deref())
                .await
            {
                Ok(text) => Ok(text),
                Err(e) => {
                    error!(target: "coach_backend", error = %e, "Assistant call failed; using stub reply");
                    Ok(assistant_stub(&body.prompt))
                }
            }
        }
        None => Ok(assistant_stub(&body.prompt)),
    }
}

/// Retry every queued submission in order, reusing the stored payloads. Stops
/// at the first failure and requeues the remainder; clearing the whole queue
/// also clears the sticky reauth flag.
#[instrument(level = "info", skip(state))]
pub async fn retry_pending(
    state: &AppState,
    participant_id: &str,
) -> Result<SessionOut, EngineError> {
    if state.session_clone(participant_id).await.is_none() {
        return Err(EngineError::UnknownParticipant(participant_id.to_string()));
    }

    let pending = state.take_pending(participant_id).await;
    if !pending.is_empty() {
        let Some(upstream) = &state.upstream else {
            // No upstream configured: nothing to deliver to.
            for submission in pending {
                state.queue_for_retry(participant_id, submission).await;
            }
            return snapshot_out(state, participant_id).await;
        };

        let mut auth_failed = false;
        let mut iter = pending.into_iter();
        while let Some(submission) = iter.next() {
            match upstream.forward(&submission).await {
                Ok(()) => {}
                Err(e) => {
                    auth_failed = e.is_auth_expired();
                    warn!(target: "survey", %participant_id, error = %e, "Retry stopped; requeueing remainder");
                    state.queue_for_retry(participant_id, submission).await;
                    for rest in iter.by_ref() {
                        state.queue_for_retry(participant_id, rest).await;
                    }
                    break;
                }
            }
        }

        let drained = state.pending_count(participant_id).await == 0;
        let mut sessions = state.sessions.write().await;
        if let Some(session) = sessions.get_mut(participant_id) {
            if drained {
                session.clear_reauth();
            } else if auth_failed {
                session.mark_reauth_needed();
            }
            state.persist_snapshot(session);
        }
    }
    snapshot_out(state, participant_id).await
}

/// Replace one file's content in the session editor.
pub async fn update_file(
    state: &AppState,
    participant_id: &str,
    name: &str,
    content: String,
) -> Result<SessionOut, EngineError> {
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))?;
        session.update_file(name, content)?;
        state.persist_snapshot(session);
    }
    snapshot_out(state, participant_id).await
}

pub async fn set_active_file(
    state: &AppState,
    participant_id: &str,
    name: &str,
) -> Result<SessionOut, EngineError> {
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(participant_id)
            .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))?;
        session.set_active_file(name)?;
        state.persist_snapshot(session);
    }
    snapshot_out(state, participant_id).await
}

pub async fn get_session(
    state: &AppState,
    participant_id: &str,
) -> Result<SessionOut, EngineError> {
    // Ids that cannot have been minted here skip the store lookup entirely.
    if !is_valid_participant_id(participant_id) {
        return Err(EngineError::UnknownParticipant(participant_id.to_string()));
    }
    snapshot_out(state, participant_id).await
}

/// Abandoning the session clears all local state; no timer ever ticks it
/// again.
#[instrument(level = "info", skip(state))]
pub async fn quit(state: &AppState, participant_id: &str) -> Result<(), EngineError> {
    state
        .discard_session(participant_id)
        .await
        .map(|_| ())
        .ok_or_else(|| EngineError::UnknownParticipant(participant_id.to_string()))
}
