//! The survey session state machine.
//!
//! This module is pure state: no IO, no clocks, no HTTP. Handlers drive it
//! under the store lock and do their network calls outside of it. Exactly one
//! phase is active at a time; the only two writers of `phase` are the
//! once-per-second tick and user-triggered transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::catalog;
use crate::domain::{
    OverallForm, Phase, PostTaskForm, PreSurveyForm, SourceFile, SurveyVariant, TaskDefinition,
    TaskResult,
};
use crate::timer::{self, TickOutcome, TimerLimits};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("action not allowed in phase {actual:?} (expected {expected})")]
    InvalidPhase { expected: &'static str, actual: Phase },
    #[error("{0}")]
    Validation(String),
    #[error("task is not completable yet: output does not verify and time remains")]
    TaskNotCompletable,
    #[error("a submission for this step is already in flight")]
    SubmissionInFlight,
    #[error("survey type is not resolved")]
    UnresolvedSurveyType,
    #[error("unknown file: {0}")]
    UnknownFile(String),
}

/// Manual navigation between the form phases (select/intro/pre). Everything
/// past `pre` moves through validated submissions or the timer.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceAction {
    Continue,
    Back,
}

/// Where a validated post-task submission lands next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterPost {
    NextTask(usize),
    Navigate,
}

/// One participant's running session. Serializes as the snapshot blob that is
/// persisted on every phase/file change and restored verbatim on startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurveySession {
    pub participant_id: String,
    pub variant: SurveyVariant,
    pub phase: Phase,
    pub current_task: usize,
    pub time_elapsed: u64,
    pub timer_running: bool,
    pub last_output: String,
    pub files: Vec<SourceFile>,
    pub active_file: String,
    /// Sticky: set when the upstream store rejected a submission with a
    /// 401-class error. Cleared only by a successful retry.
    pub needs_reauth: bool,
    /// Guard against duplicate task-result submissions. Transient by nature,
    /// so a restored snapshot always starts with it clear.
    #[serde(skip)]
    submission_in_flight: bool,
}

impl SurveySession {
    /// Selecting a variant is the event that creates the session, so a fresh
    /// session starts in the intro phase.
    pub fn new(variant: SurveyVariant, participant_id: String) -> Self {
        Self {
            participant_id,
            variant,
            phase: Phase::Intro,
            current_task: 0,
            time_elapsed: 0,
            timer_running: false,
            last_output: String::new(),
            files: Vec::new(),
            active_file: String::new(),
            needs_reauth: false,
            submission_in_flight: false,
        }
    }

    fn load_task(&mut self, tasks: &[TaskDefinition], index: usize) {
        self.files = catalog::task_files(&tasks[index]);
        self.active_file = "main.py".to_string();
        self.last_output.clear();
    }

    fn load_navigation_files(&mut self) {
        self.files = catalog::navigation_files();
        self.active_file = "welcome.py".to_string();
        self.last_output.clear();
    }

    fn restart_timer(&mut self) {
        self.time_elapsed = 0;
        self.timer_running = true;
    }

    /// Manual navigation through the intro/pre forms.
    #[instrument(level = "debug", skip(self), fields(participant = %self.participant_id, phase = ?self.phase))]
    pub fn advance(&mut self, action: AdvanceAction) -> Result<Phase, SessionError> {
        self.phase = match (self.phase, action) {
            (Phase::Select, AdvanceAction::Continue) => Phase::Intro,
            (Phase::Intro, AdvanceAction::Continue) => Phase::Pre,
            (Phase::Intro, AdvanceAction::Back) => Phase::Select,
            (Phase::Pre, AdvanceAction::Back) => Phase::Intro,
            (actual, _) => {
                return Err(SessionError::InvalidPhase {
                    expected: "select/intro/pre",
                    actual,
                })
            }
        };
        Ok(self.phase)
    }

    /// `pre -> task[0]`: validates the pre-questionnaire, loads the first
    /// task, and starts the clock.
    #[instrument(level = "info", skip(self, form, tasks), fields(participant = %self.participant_id))]
    pub fn submit_pre(
        &mut self,
        form: &PreSurveyForm,
        tasks: &[TaskDefinition],
    ) -> Result<(), SessionError> {
        if self.phase != Phase::Pre {
            return Err(SessionError::InvalidPhase {
                expected: "pre",
                actual: self.phase,
            });
        }
        if form.field_of_study.trim().is_empty() {
            return Err(SessionError::Validation("field_of_study is required".into()));
        }
        if form.use_of_ai.is_none() {
            return Err(SessionError::Validation(
                "use_of_AI must be answered yes or no".into(),
            ));
        }
        if !(1..=5).contains(&form.confidence_level) {
            return Err(SessionError::Validation(
                "confidence_level must be between 1 and 5".into(),
            ));
        }
        self.current_task = 0;
        self.load_task(tasks, 0);
        self.restart_timer();
        self.phase = Phase::Task;
        Ok(())
    }

    /// Whether the complete-task action is unlocked: the captured output
    /// verifies, or the task ceiling is exhausted. Both are manual triggers;
    /// nothing submits automatically.
    pub fn can_complete_task(&self, limits: &TimerLimits, tasks: &[TaskDefinition]) -> bool {
        self.phase == Phase::Task
            && (tasks[self.current_task].verify.passes(&self.last_output)
                || timer::is_time_up(limits, Phase::Task, self.time_elapsed))
    }

    /// First half of `task[i] -> post[i]`: claims the in-flight guard and
    /// produces the task-result payload. The caller persists/forwards it and
    /// then calls [`finish_complete_task`]. A second claim while one is in
    /// flight fails, which is what keeps the submission count at one.
    #[instrument(level = "info", skip(self, limits, tasks), fields(participant = %self.participant_id, task = self.current_task))]
    pub fn begin_complete_task(
        &mut self,
        limits: &TimerLimits,
        tasks: &[TaskDefinition],
    ) -> Result<TaskResult, SessionError> {
        if self.phase != Phase::Task {
            return Err(SessionError::InvalidPhase {
                expected: "task",
                actual: self.phase,
            });
        }
        if self.submission_in_flight {
            return Err(SessionError::SubmissionInFlight);
        }
        if !self.can_complete_task(limits, tasks) {
            return Err(SessionError::TaskNotCompletable);
        }
        self.submission_in_flight = true;
        let fixed = tasks[self.current_task].verify.passes(&self.last_output);
        Ok(TaskResult {
            participant_id: self.participant_id.clone(),
            survey_type: self.variant.survey_type,
            task_index: self.current_task as u32 + 1,
            time_taken: self.time_elapsed,
            finished_within_time: fixed,
            code_files: self.files.clone(),
            run_output: self.last_output.clone(),
        })
    }

    /// Second half of `task[i] -> post[i]`: stop the clock and enter the
    /// post-task questionnaire. Local progress is kept even when the upstream
    /// mirror failed; the caller flags `needs_reauth` separately.
    pub fn finish_complete_task(&mut self) {
        self.submission_in_flight = false;
        self.timer_running = false;
        self.phase = Phase::Post;
    }

    /// `post[i] -> task[i+1]` while tasks remain, `post[3] -> navigate` once
    /// all four are done.
    #[instrument(level = "info", skip(self, form, tasks), fields(participant = %self.participant_id, task = self.current_task))]
    pub fn submit_post(
        &mut self,
        form: &PostTaskForm,
        tasks: &[TaskDefinition],
    ) -> Result<AfterPost, SessionError> {
        if self.phase != Phase::Post {
            return Err(SessionError::InvalidPhase {
                expected: "post",
                actual: self.phase,
            });
        }
        if !form.survey_type.is_resolved() {
            return Err(SessionError::UnresolvedSurveyType);
        }
        if form.finished_within_time.is_none()
            || form.difficult_to_fix.is_none()
            || form.helpful_understand.is_none()
            || form.helpful_fix.is_none()
        {
            return Err(SessionError::Validation(
                "all four post-task ratings are required".into(),
            ));
        }
        if form.thought_process.trim().is_empty() || form.feedback.trim().is_empty() {
            return Err(SessionError::Validation(
                "thought_process and feedback must not be empty".into(),
            ));
        }
        if form.task_index != self.current_task as u32 + 1 {
            return Err(SessionError::Validation(format!(
                "task_index {} does not match the active task {}",
                form.task_index,
                self.current_task + 1
            )));
        }

        if self.current_task + 1 < tasks.len() {
            self.current_task += 1;
            self.load_task(tasks, self.current_task);
            self.restart_timer();
            self.phase = Phase::Task;
            Ok(AfterPost::NextTask(self.current_task))
        } else {
            self.load_navigation_files();
            self.restart_timer();
            self.phase = Phase::Navigate;
            Ok(AfterPost::Navigate)
        }
    }

    /// `overall -> complete`.
    #[instrument(level = "info", skip(self, form), fields(participant = %self.participant_id))]
    pub fn submit_overall(&mut self, form: &OverallForm) -> Result<(), SessionError> {
        if self.phase != Phase::Overall {
            return Err(SessionError::InvalidPhase {
                expected: "overall",
                actual: self.phase,
            });
        }
        if !form.survey_type.is_resolved() {
            return Err(SessionError::UnresolvedSurveyType);
        }
        let style = form.preferred_feedback_style.trim();
        if !matches!(style, "A" | "B" | "C" | "D") {
            return Err(SessionError::Validation(
                "preferred_feedback_style must be one of A, B, C, D".into(),
            ));
        }
        if form.preferred_feedback_reason.trim().is_empty() {
            return Err(SessionError::Validation(
                "preferred_feedback_reason must not be empty".into(),
            ));
        }
        self.timer_running = false;
        self.phase = Phase::Complete;
        Ok(())
    }

    /// One whole-second tick. The navigate phase auto-advances to the overall
    /// questionnaire when its ceiling is reached; the task phase only clamps
    /// and stops, leaving completion to the participant.
    pub fn apply_tick(&mut self, limits: &TimerLimits) -> TickOutcome {
        let outcome = timer::tick(limits, self.phase, self.timer_running, self.time_elapsed);
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Running { elapsed } => self.time_elapsed = elapsed,
            TickOutcome::CeilingReached { elapsed } => {
                self.time_elapsed = elapsed;
                self.timer_running = false;
                if self.phase == Phase::Navigate {
                    self.phase = Phase::Overall;
                }
            }
        }
        outcome
    }

    /// Record the captured output of a run against the active session.
    pub fn record_run_output(&mut self, output: &str) {
        self.last_output = output.to_string();
    }

    /// Replace one file's content (editing in place, never reordering).
    pub fn update_file(&mut self, name: &str, content: String) -> Result<(), SessionError> {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(file) => {
                file.content = content;
                Ok(())
            }
            None => Err(SessionError::UnknownFile(name.to_string())),
        }
    }

    pub fn set_active_file(&mut self, name: &str) -> Result<(), SessionError> {
        if self.files.iter().any(|f| f.name == name) {
            self.active_file = name.to_string();
            Ok(())
        } else {
            Err(SessionError::UnknownFile(name.to_string()))
        }
    }

    pub fn mark_reauth_needed(&mut self) {
        self.needs_reauth = true;
    }

    pub fn clear_reauth(&mut self) {
        self.needs_reauth = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{survey_variants, tasks, variant_for};
    use crate::domain::{SurveyType, SusScores};

    fn terminal_session() -> SurveySession {
        let variants = survey_variants("hint prompt");
        let variant = variant_for(&variants, SurveyType::Terminal).unwrap();
        SurveySession::new(variant, "P3K9M2A".into())
    }

    fn valid_pre(pid: &str) -> PreSurveyForm {
        PreSurveyForm {
            participant_id: pid.into(),
            field_of_study: "Computer Science".into(),
            confidence_level: 3,
            use_of_ai: Some(false),
            which_ai: None,
        }
    }

    fn valid_post(pid: &str, task_index: u32) -> PostTaskForm {
        PostTaskForm {
            participant_id: pid.into(),
            survey_type: SurveyType::Terminal,
            task_index,
            finished_within_time: Some(true),
            difficult_to_fix: Some(2),
            helpful_understand: Some(4),
            helpful_fix: Some(4),
            thought_process: "read the traceback".into(),
            feedback: "clear enough".into(),
        }
    }

    fn valid_overall(pid: &str) -> OverallForm {
        OverallForm {
            participant_id: pid.into(),
            survey_type: SurveyType::Terminal,
            sus: SusScores::default(),
            future_use_likelihood: 4,
            preferred_feedback_style: "C".into(),
            preferred_feedback_reason: "plain errors were enough".into(),
            other_comments: None,
        }
    }

    // Known-good stdout per task, used to drive verify-based completion.
    const FIXED_OUTPUTS: [&str; 4] = ["['tool', 'python']\n", "1\n", "[1, 1]\n", "False\nTrue\n"];

    #[test]
    fn fresh_session_starts_in_intro_with_idle_timer() {
        let s = terminal_session();
        assert_eq!(s.phase, Phase::Intro);
        assert_eq!(s.current_task, 0);
        assert_eq!(s.time_elapsed, 0);
        assert!(!s.timer_running);
        assert!(!s.needs_reauth);
    }

    #[test]
    fn intro_navigation_goes_back_and_forth() {
        let mut s = terminal_session();
        assert_eq!(s.advance(AdvanceAction::Back).unwrap(), Phase::Select);
        assert_eq!(s.advance(AdvanceAction::Continue).unwrap(), Phase::Intro);
        assert_eq!(s.advance(AdvanceAction::Continue).unwrap(), Phase::Pre);
        assert_eq!(s.advance(AdvanceAction::Back).unwrap(), Phase::Intro);
    }

    #[test]
    fn pre_submission_requires_field_of_study_and_ai_answer() {
        let tasks = tasks();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();

        let mut form = valid_pre(&s.participant_id);
        form.field_of_study = "  ".into();
        assert!(matches!(
            s.submit_pre(&form, &tasks),
            Err(SessionError::Validation(_))
        ));

        let mut form = valid_pre(&s.participant_id);
        form.use_of_ai = None;
        assert!(matches!(
            s.submit_pre(&form, &tasks),
            Err(SessionError::Validation(_))
        ));
        assert_eq!(s.phase, Phase::Pre);

        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        assert_eq!(s.phase, Phase::Task);
        assert_eq!(s.current_task, 0);
        assert!(s.timer_running);
        assert_eq!(s.time_elapsed, 0);
        assert_eq!(s.active_file, "main.py");
        assert_eq!(s.files.len(), 2);
    }

    #[test]
    fn task_not_completable_until_verify_or_time_up() {
        let tasks = tasks();
        let limits = TimerLimits { task: 3, navigate: 5 };
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();

        assert!(!s.can_complete_task(&limits, &tasks));
        assert!(matches!(
            s.begin_complete_task(&limits, &tasks),
            Err(SessionError::TaskNotCompletable)
        ));

        // Exhaust the clock: the ceiling unlocks completion but nothing
        // auto-advances in the task phase.
        for _ in 0..5 {
            s.apply_tick(&limits);
        }
        assert_eq!(s.phase, Phase::Task);
        assert_eq!(s.time_elapsed, 3);
        assert!(!s.timer_running);
        assert!(s.can_complete_task(&limits, &tasks));

        let result = s.begin_complete_task(&limits, &tasks).unwrap();
        assert!(!result.finished_within_time);
        assert_eq!(result.task_index, 1);
        assert_eq!(result.time_taken, 3);
    }

    #[test]
    fn duplicate_complete_while_in_flight_yields_one_submission() {
        let tasks = tasks();
        let limits = TimerLimits::default();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        s.record_run_output(FIXED_OUTPUTS[0]);

        let first = s.begin_complete_task(&limits, &tasks);
        assert!(first.is_ok());
        let second = s.begin_complete_task(&limits, &tasks);
        assert!(matches!(second, Err(SessionError::SubmissionInFlight)));

        s.finish_complete_task();
        assert_eq!(s.phase, Phase::Post);
        // And a third attempt after settling is an illegal-phase error.
        assert!(matches!(
            s.begin_complete_task(&limits, &tasks),
            Err(SessionError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn post_submission_validates_every_field() {
        let tasks = tasks();
        let limits = TimerLimits::default();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        s.record_run_output(FIXED_OUTPUTS[0]);
        s.begin_complete_task(&limits, &tasks).unwrap();
        s.finish_complete_task();

        let mut form = valid_post(&s.participant_id, 1);
        form.survey_type = SurveyType::None;
        assert_eq!(
            s.submit_post(&form, &tasks),
            Err(SessionError::UnresolvedSurveyType)
        );

        let mut form = valid_post(&s.participant_id, 1);
        form.helpful_fix = None;
        assert!(matches!(
            s.submit_post(&form, &tasks),
            Err(SessionError::Validation(_))
        ));

        let mut form = valid_post(&s.participant_id, 1);
        form.thought_process = String::new();
        assert!(matches!(
            s.submit_post(&form, &tasks),
            Err(SessionError::Validation(_))
        ));

        // Stale index from a previous task is rejected.
        let form = valid_post(&s.participant_id, 2);
        assert!(matches!(
            s.submit_post(&form, &tasks),
            Err(SessionError::Validation(_))
        ));

        let next = s.submit_post(&valid_post(&s.participant_id, 1), &tasks).unwrap();
        assert_eq!(next, AfterPost::NextTask(1));
        assert_eq!(s.phase, Phase::Task);
        assert!(s.timer_running);
        assert_eq!(s.time_elapsed, 0);
    }

    #[test]
    fn snapshot_round_trip_is_lossless() {
        let tasks = tasks();
        let limits = TimerLimits::default();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        for _ in 0..42 {
            s.apply_tick(&limits);
        }
        s.record_run_output("partial output\n");

        let blob = serde_json::to_string(&s).unwrap();
        let restored: SurveySession = serde_json::from_str(&blob).unwrap();
        assert_eq!(restored.phase, s.phase);
        assert_eq!(restored.current_task, s.current_task);
        assert_eq!(restored.time_elapsed, 42);
        assert_eq!(restored.timer_running, s.timer_running);
        assert_eq!(restored.files, s.files);
        assert_eq!(restored.active_file, s.active_file);
        assert_eq!(restored.last_output, s.last_output);
    }

    #[test]
    fn reauth_flag_is_sticky_and_never_rolls_back_state() {
        let tasks = tasks();
        let limits = TimerLimits::default();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        s.record_run_output(FIXED_OUTPUTS[0]);
        s.begin_complete_task(&limits, &tasks).unwrap();
        s.mark_reauth_needed();
        s.finish_complete_task();

        assert!(s.needs_reauth);
        assert_eq!(s.phase, Phase::Post);
        // Further progress keeps the flag until a retry succeeds.
        s.submit_post(&valid_post(&s.participant_id, 1), &tasks).unwrap();
        assert!(s.needs_reauth);
        s.clear_reauth();
        assert!(!s.needs_reauth);
    }

    #[test]
    fn end_to_end_terminal_variant_scenario() {
        let tasks = tasks();
        let limits = TimerLimits { task: 420, navigate: 4 };
        let mut s = terminal_session();
        assert!(!s.variant.ai_enabled);

        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();
        assert_eq!((s.phase, s.current_task), (Phase::Task, 0));
        assert!(s.timer_running);

        for (i, output) in FIXED_OUTPUTS.iter().enumerate() {
            assert_eq!(s.current_task, i);
            s.record_run_output(output);
            let result = s.begin_complete_task(&limits, &tasks).unwrap();
            assert!(result.finished_within_time);
            s.finish_complete_task();
            let next = s
                .submit_post(&valid_post(&s.participant_id, i as u32 + 1), &tasks)
                .unwrap();
            if i < 3 {
                assert_eq!(next, AfterPost::NextTask(i + 1));
            } else {
                assert_eq!(next, AfterPost::Navigate);
            }
        }

        assert_eq!(s.phase, Phase::Navigate);
        assert_eq!(s.active_file, "welcome.py");
        assert!(s.timer_running);

        // Let the navigate ceiling elapse: the session lands in overall on
        // its own, clamped at the ceiling.
        for _ in 0..10 {
            s.apply_tick(&limits);
        }
        assert_eq!(s.phase, Phase::Overall);
        assert_eq!(s.time_elapsed, 4);
        assert!(!s.timer_running);

        s.submit_overall(&valid_overall(&s.participant_id)).unwrap();
        assert_eq!(s.phase, Phase::Complete);
    }

    #[test]
    fn overall_requires_style_and_reason() {
        let mut s = terminal_session();
        s.phase = Phase::Overall;

        let mut form = valid_overall(&s.participant_id);
        form.preferred_feedback_style = String::new();
        assert!(matches!(
            s.submit_overall(&form),
            Err(SessionError::Validation(_))
        ));

        let mut form = valid_overall(&s.participant_id);
        form.preferred_feedback_style = "E".into();
        assert!(matches!(
            s.submit_overall(&form),
            Err(SessionError::Validation(_))
        ));

        let mut form = valid_overall(&s.participant_id);
        form.preferred_feedback_reason = "  ".into();
        assert!(matches!(
            s.submit_overall(&form),
            Err(SessionError::Validation(_))
        ));

        s.submit_overall(&valid_overall(&s.participant_id)).unwrap();
        assert_eq!(s.phase, Phase::Complete);
    }

    #[test]
    fn file_edits_require_known_names() {
        let tasks = tasks();
        let mut s = terminal_session();
        s.advance(AdvanceAction::Continue).unwrap();
        s.submit_pre(&valid_pre(&s.participant_id), &tasks).unwrap();

        s.update_file("main.py", "print('x')".into()).unwrap();
        assert!(s.files.iter().any(|f| f.content == "print('x')"));
        assert!(matches!(
            s.update_file("nope.py", String::new()),
            Err(SessionError::UnknownFile(_))
        ));
        assert!(matches!(
            s.set_active_file("nope.py"),
            Err(SessionError::UnknownFile(_))
        ));
        s.set_active_file("task.md").unwrap();
        assert_eq!(s.active_file, "task.md");
    }
}
