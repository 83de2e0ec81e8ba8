//! Application state: the session store, built-in catalog, snapshot
//! persistence, and the optional assistant/upstream clients.
//!
//! This module owns:
//!   - live sessions keyed by participant id
//!   - the retry queue of submissions that failed to mirror upstream
//!   - the local record of every accepted submission
//!   - the sandbox singleton and the optional HTTP clients

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{error, info, instrument};

use crate::assistant::Assistant;
use crate::catalog;
use crate::config::{load_engine_config_from_env, EngineConfig};
use crate::domain::{SurveyVariant, TaskDefinition};
use crate::persist::SnapshotStore;
use crate::sandbox::PythonSandbox;
use crate::session::SurveySession;
use crate::timer::TimerLimits;
use crate::upstream::{Submission, Upstream};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SurveySession>>>,
    /// Submissions accepted locally but not yet mirrored upstream, per
    /// participant, in submission order.
    pub pending_upstream: Arc<RwLock<HashMap<String, Vec<Submission>>>>,
    /// Local record of every accepted submission. This is the durable copy
    /// the failure semantics lean on.
    pub recorded: Arc<RwLock<Vec<Submission>>>,
    pub variants: Vec<SurveyVariant>,
    pub tasks: Vec<TaskDefinition>,
    pub limits: TimerLimits,
    pub sandbox: Arc<PythonSandbox>,
    pub assistant: Option<Assistant>,
    pub upstream: Option<Upstream>,
    pub snapshots: Arc<SnapshotStore>,
}

impl AppState {
    /// Build state from env: load config, seed the catalog, restore
    /// snapshots, init the optional clients.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Result<Self, crate::persist::PersistError> {
        let cfg = load_engine_config_from_env().unwrap_or_else(EngineConfig::default);
        let limits = cfg.timers.limits();
        let variants = catalog::survey_variants(&cfg.prompts.hints_system);
        let tasks = catalog::tasks();
        info!(
            target: "survey",
            variants = variants.len(),
            tasks = tasks.len(),
            task_limit = limits.task,
            navigate_limit = limits.navigate,
            "Catalog loaded"
        );

        let snapshots = SnapshotStore::from_env()?;
        let mut sessions = HashMap::new();
        for session in snapshots.load_all() {
            info!(
                target: "survey",
                participant = %session.participant_id,
                phase = ?session.phase,
                "Session restored from snapshot"
            );
            sessions.insert(session.participant_id.clone(), session);
        }

        let assistant = Assistant::from_env();
        if assistant.is_some() {
            info!(target: "coach_backend", "Assistant model enabled.");
        } else {
            info!(target: "coach_backend", "Assistant model disabled (no OPENAI_API_KEY). Using stub replies.");
        }

        let upstream = Upstream::from_env();
        match &upstream {
            Some(up) => {
                info!(target: "coach_backend", base_url = %up.base_url, "Upstream mirroring enabled.")
            }
            None => info!(target: "coach_backend", "Upstream mirroring disabled (no UPSTREAM_BASE_URL). Running local-only."),
        }

        Ok(Self {
            sessions: Arc::new(RwLock::new(sessions)),
            pending_upstream: Arc::new(RwLock::new(HashMap::new())),
            recorded: Arc::new(RwLock::new(Vec::new())),
            variants,
            tasks,
            limits,
            sandbox: Arc::new(PythonSandbox::from_env()),
            assistant,
            upstream,
            snapshots: Arc::new(snapshots),
        })
    }

    /// Read-only copy of a session by participant id.
    #[instrument(level = "debug", skip(self))]
    pub async fn session_clone(&self, participant_id: &str) -> Option<SurveySession> {
        self.sessions.read().await.get(participant_id).cloned()
    }

    /// Append to the local record of accepted submissions.
    pub async fn record(&self, submission: Submission) {
        self.recorded.write().await.push(submission);
    }

    /// Queue a submission whose upstream mirror failed, for later retry with
    /// the same payload.
    pub async fn queue_for_retry(&self, participant_id: &str, submission: Submission) {
        self.pending_upstream
            .write()
            .await
            .entry(participant_id.to_string())
            .or_default()
            .push(submission);
    }

    pub async fn take_pending(&self, participant_id: &str) -> Vec<Submission> {
        self.pending_upstream
            .write()
            .await
            .remove(participant_id)
            .unwrap_or_default()
    }

    pub async fn pending_count(&self, participant_id: &str) -> usize {
        self.pending_upstream
            .read()
            .await
            .get(participant_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Persist a snapshot, logging instead of failing the request: losing a
    /// snapshot write must never break the in-memory session.
    pub fn persist_snapshot(&self, session: &SurveySession) {
        if let Err(e) = self.snapshots.save(session) {
            error!(
                target: "coach_backend",
                participant = %session.participant_id,
                error = %e,
                "Snapshot write failed"
            );
        }
    }

    /// Drop a session and its persisted snapshot (quit or completion).
    /// Removing it from the map also stops the background ticker from ever
    /// touching it again.
    #[instrument(level = "info", skip(self))]
    pub async fn discard_session(&self, participant_id: &str) -> Option<SurveySession> {
        let removed = self.sessions.write().await.remove(participant_id);
        if removed.is_some() {
            if let Err(e) = self.snapshots.clear(participant_id) {
                error!(target: "coach_backend", %participant_id, error = %e, "Snapshot clear failed");
            }
            self.pending_upstream.write().await.remove(participant_id);
        }
        removed
    }

    /// One whole-second tick across every live session. Called by the
    /// background ticker; phase auto-advances (navigate -> overall) happen
    /// inside the session's own tick handling.
    pub async fn tick_all(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            let before = (session.phase, session.time_elapsed, session.timer_running);
            session.apply_tick(&self.limits);
            let after = (session.phase, session.time_elapsed, session.timer_running);
            if before != after {
                self.persist_snapshot(session);
            }
            if before.0 != after.0 {
                info!(
                    target: "survey",
                    participant = %session.participant_id,
                    from = ?before.0,
                    to = ?after.0,
                    "Timer-driven phase advance"
                );
            }
        }
    }
}
