//! Public request/response structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! Questionnaire bodies (`PreSurveyForm`, `PostTaskForm`, `OverallForm`,
//! `TaskResult`) live in `domain.rs` because their field casing IS the wire
//! contract; this module adds the session-surface DTOs around them.

use serde::{Deserialize, Serialize};

use crate::domain::{Phase, SourceFile, SurveyType};
use crate::sandbox::SandboxStatus;
use crate::session::{AdvanceAction, SurveySession};
use crate::timer::{self, TimerLimits, Urgency};

#[derive(Debug, Deserialize)]
pub struct StartIn {
    pub survey_type: SurveyType,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceIn {
    pub action: AdvanceAction,
}

#[derive(Debug, Deserialize)]
pub struct FileUpdateIn {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveFileIn {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RunIn {
    pub participant_id: String,
    /// Defaults to the session's active file.
    #[serde(default)]
    pub entry_file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunOut {
    pub stdout: String,
    pub stderr: String,
    pub failed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssistantIn {
    pub prompt: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Participant id; when present the session's variant gates the call.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssistantOut {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub sandbox: SandboxStatus,
    /// Interpreter version string once the sandbox probe has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
}

/// DTO for session delivery: the session itself plus the derived timer
/// presentation the frontend renders.
#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub participant_id: String,
    pub survey_type: SurveyType,
    pub survey_name: String,
    pub ai_enabled: bool,
    pub phase: Phase,
    pub current_task: usize,
    pub task_title: Option<String>,
    pub time_elapsed: u64,
    pub time_display: String,
    pub ceiling: u64,
    pub ceiling_display: String,
    pub urgency: Urgency,
    pub timer_running: bool,
    pub can_complete_task: bool,
    pub files: Vec<SourceFile>,
    pub active_file: String,
    pub needs_reauth: bool,
    /// Submissions accepted locally but still waiting to be mirrored.
    pub pending_upstream: usize,
}

/// Convert the internal session to the public DTO.
pub fn to_out(
    session: &SurveySession,
    limits: &TimerLimits,
    tasks: &[crate::domain::TaskDefinition],
    pending_upstream: usize,
) -> SessionOut {
    let ceiling = limits.ceiling(session.phase);
    SessionOut {
        participant_id: session.participant_id.clone(),
        survey_type: session.variant.survey_type,
        survey_name: session.variant.name.clone(),
        ai_enabled: session.variant.ai_enabled,
        phase: session.phase,
        current_task: session.current_task,
        task_title: (session.phase == Phase::Task || session.phase == Phase::Post)
            .then(|| tasks[session.current_task].title.to_string()),
        time_elapsed: session.time_elapsed,
        time_display: timer::format_time(session.time_elapsed),
        ceiling,
        ceiling_display: timer::format_time(ceiling),
        urgency: timer::urgency(limits, session.phase, session.time_elapsed),
        timer_running: session.timer_running,
        can_complete_task: session.can_complete_task(limits, tasks),
        files: session.files.clone(),
        active_file: session.active_file.clone(),
        needs_reauth: session.needs_reauth,
        pending_upstream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{survey_variants, tasks, variant_for};

    #[test]
    fn session_out_derives_timer_presentation() {
        let variants = survey_variants("p");
        let variant = variant_for(&variants, SurveyType::Terminal).unwrap();
        let mut session = SurveySession::new(variant, "P3K9M2A".into());
        session.phase = Phase::Task;
        session.time_elapsed = 315;
        session.timer_running = true;

        let limits = TimerLimits::default();
        let tasks = tasks();
        let out = to_out(&session, &limits, &tasks, 2);
        assert_eq!(out.time_display, "5:15");
        assert_eq!(out.ceiling, 420);
        assert_eq!(out.ceiling_display, "7:00");
        assert_eq!(out.urgency, Urgency::Warning);
        assert_eq!(out.task_title.as_deref(), Some("Task 1: Variable Shadowing"));
        assert_eq!(out.pending_upstream, 2);
        assert!(!out.ai_enabled);
    }

    #[test]
    fn task_title_is_absent_outside_task_phases() {
        let variants = survey_variants("p");
        let variant = variant_for(&variants, SurveyType::Hints).unwrap();
        let session = SurveySession::new(variant, "P3K9M2A".into());
        let out = to_out(&session, &TimerLimits::default(), &tasks(), 0);
        assert_eq!(out.phase, Phase::Intro);
        assert!(out.task_title.is_none());
    }
}
