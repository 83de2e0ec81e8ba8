//! Session snapshot persistence.
//!
//! One serialized blob per participant under a fixed key prefix, written on
//! every phase/file change, restored verbatim at startup, and removed on quit
//! or completion. Blobs are small JSON files; synchronous IO is fine here.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::session::SurveySession;

/// Fixed key the frontend also used for its local copy.
const SNAPSHOT_KEY: &str = "survey-state";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn from_env() -> Result<Self, PersistError> {
        let dir = std::env::var("COACH_DATA_DIR").unwrap_or_else(|_| "./data".into());
        Self::new(dir)
    }

    fn path_for(&self, participant_id: &str) -> PathBuf {
        self.dir
            .join(format!("{SNAPSHOT_KEY}-{participant_id}.json"))
    }

    /// Persist the session blob, replacing any previous snapshot.
    #[instrument(level = "debug", skip(self, session), fields(participant = %session.participant_id))]
    pub fn save(&self, session: &SurveySession) -> Result<(), PersistError> {
        let blob = serde_json::to_vec_pretty(session)?;
        let path = self.path_for(&session.participant_id);
        // Write-then-rename so a crash never leaves a torn snapshot behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove the participant's snapshot (quit or completion).
    #[instrument(level = "info", skip(self))]
    pub fn clear(&self, participant_id: &str) -> Result<(), PersistError> {
        let path = self.path_for(participant_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Restore every readable snapshot in the data dir. Unreadable files are
    /// logged and skipped so one corrupt blob cannot block startup.
    #[instrument(level = "info", skip(self))]
    pub fn load_all(&self) -> Vec<SurveySession> {
        let mut sessions = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(target: "coach_backend", dir = %self.dir.display(), error = %e, "Cannot read snapshot dir");
                return sessions;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_snapshot_file(&path) {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(PersistError::from)
                .and_then(|s| serde_json::from_str::<SurveySession>(&s).map_err(PersistError::from))
            {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(target: "coach_backend", path = %path.display(), error = %e, "Skipping unreadable snapshot");
                }
            }
        }
        info!(target: "coach_backend", restored = sessions.len(), "Snapshots restored");
        sessions
    }
}

fn is_snapshot_file(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(SNAPSHOT_KEY))
            .unwrap_or(false)
}
