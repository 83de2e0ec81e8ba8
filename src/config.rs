//! Loading engine configuration (prompts + timer ceilings) from TOML.
//!
//! COACH_CONFIG_PATH points at an optional TOML file:
//!
//! ```toml
//! [prompts]
//! hints_system = "..."
//!
//! [timers]
//! task = 420
//! navigate = 600
//! ```
//!
//! Everything has defaults; a missing or malformed file only logs an error.

use serde::Deserialize;
use tracing::{error, info};

use crate::timer::{DEFAULT_NAVIGATE_LIMIT, DEFAULT_TASK_LIMIT, TimerLimits};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub prompts: Prompts,
    #[serde(default)]
    pub timers: TimerCfg,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
    /// System prompt for the hints arm: guidance, never full solutions.
    pub hints_system: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            hints_system: "You are a coding coach helping a study participant debug a short \
Python program. Give hints and guiding questions only. Point at the relevant line or \
concept, but NEVER provide corrected code or state the fix outright."
                .into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimerCfg {
    #[serde(default = "default_task_limit")]
    pub task: u64,
    #[serde(default = "default_navigate_limit")]
    pub navigate: u64,
}

fn default_task_limit() -> u64 {
    DEFAULT_TASK_LIMIT
}

fn default_navigate_limit() -> u64 {
    DEFAULT_NAVIGATE_LIMIT
}

impl Default for TimerCfg {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK_LIMIT,
            navigate: DEFAULT_NAVIGATE_LIMIT,
        }
    }
}

impl TimerCfg {
    pub fn limits(&self) -> TimerLimits {
        TimerLimits {
            task: self.task,
            navigate: self.navigate,
        }
    }
}

/// Attempt to load `EngineConfig` from COACH_CONFIG_PATH. On any parsing/IO
/// error, returns None and the defaults apply.
pub fn load_engine_config_from_env() -> Option<EngineConfig> {
    let path = std::env::var("COACH_CONFIG_PATH").ok()?;
    match std::fs::read_to_string(&path) {
        Ok(s) => match toml::from_str::<EngineConfig>(&s) {
            Ok(cfg) => {
                info!(target: "coach_backend", %path, "Loaded engine config (TOML)");
                Some(cfg)
            }
            Err(e) => {
                error!(target: "coach_backend", %path, error = %e, "Failed to parse TOML config");
                None
            }
        },
        Err(e) => {
            error!(target: "coach_backend", %path, error = %e, "Failed to read TOML config file");
            None
        }
    }
}
