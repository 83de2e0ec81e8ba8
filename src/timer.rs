//! Phase timer: per-phase ceilings, once-per-second tick logic, and the
//! presentational urgency bands the frontend renders.
//!
//! The timer counts whole seconds upward while running. Reaching the ceiling
//! stops the timer and clamps elapsed time; only the navigate phase
//! auto-advances on expiry. For task work the expiry merely unlocks the
//! "complete task" action, it never submits anything by itself.

use serde::{Deserialize, Serialize};

use crate::domain::Phase;

/// Default ceilings in whole seconds. Task and post share one limit; the
/// free-navigation window is longer.
pub const DEFAULT_TASK_LIMIT: u64 = 420; // 7 minutes
pub const DEFAULT_NAVIGATE_LIMIT: u64 = 600; // 10 minutes

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TimerLimits {
    pub task: u64,
    pub navigate: u64,
}

impl Default for TimerLimits {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK_LIMIT,
            navigate: DEFAULT_NAVIGATE_LIMIT,
        }
    }
}

impl TimerLimits {
    /// Ceiling for the given phase. Phases without their own limit fall back
    /// to the task limit, matching how the frontend displayed them.
    pub fn ceiling(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Navigate => self.navigate,
            _ => self.task,
        }
    }
}

/// What a single tick did to the session clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running; nothing changed.
    Idle,
    /// Advanced one second, still under the ceiling.
    Running { elapsed: u64 },
    /// Hit the ceiling this tick: clamped and stopped.
    CeilingReached { elapsed: u64 },
}

/// Advance `elapsed` by one second against the ceiling for `phase`.
/// Returns the clamped value and whether the ceiling was reached.
pub fn tick(limits: &TimerLimits, phase: Phase, running: bool, elapsed: u64) -> TickOutcome {
    if !running {
        return TickOutcome::Idle;
    }
    let ceiling = limits.ceiling(phase);
    if elapsed >= ceiling {
        // Already at (or somehow past) the ceiling: clamp, never exceed.
        return TickOutcome::CeilingReached { elapsed: ceiling };
    }
    let next = elapsed + 1;
    if next >= ceiling {
        TickOutcome::CeilingReached { elapsed: ceiling }
    } else {
        TickOutcome::Running { elapsed: next }
    }
}

pub fn is_time_up(limits: &TimerLimits, phase: Phase, elapsed: u64) -> bool {
    elapsed >= limits.ceiling(phase)
}

/// Presentational urgency: normal below 75 % of the ceiling, warning from
/// there, critical at the ceiling. Reproduced here so the bands are testable.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

pub fn urgency(limits: &TimerLimits, phase: Phase, elapsed: u64) -> Urgency {
    let ceiling = limits.ceiling(phase);
    let warning = ceiling * 75 / 100;
    if elapsed >= ceiling {
        Urgency::Critical
    } else if elapsed >= warning {
        Urgency::Warning
    } else {
        Urgency::Normal
    }
}

/// `mm:ss` rendering used by the top bar and the logs.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timer_never_moves() {
        let limits = TimerLimits::default();
        assert_eq!(tick(&limits, Phase::Task, false, 17), TickOutcome::Idle);
    }

    #[test]
    fn elapsed_is_monotonic_and_clamped() {
        let limits = TimerLimits { task: 5, navigate: 3 };
        let mut elapsed = 0;
        let mut running = true;
        let mut seen = vec![elapsed];
        for _ in 0..10 {
            match tick(&limits, Phase::Task, running, elapsed) {
                TickOutcome::Running { elapsed: e } => elapsed = e,
                TickOutcome::CeilingReached { elapsed: e } => {
                    elapsed = e;
                    running = false;
                }
                TickOutcome::Idle => {}
            }
            seen.push(elapsed);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "elapsed decreased: {seen:?}");
        assert_eq!(elapsed, 5);
    }

    #[test]
    fn navigate_uses_its_own_ceiling() {
        let limits = TimerLimits { task: 420, navigate: 2 };
        assert_eq!(
            tick(&limits, Phase::Navigate, true, 1),
            TickOutcome::CeilingReached { elapsed: 2 }
        );
        assert_eq!(
            tick(&limits, Phase::Task, true, 1),
            TickOutcome::Running { elapsed: 2 }
        );
    }

    #[test]
    fn urgency_bands_sit_at_75_and_100_percent() {
        let limits = TimerLimits { task: 420, navigate: 600 };
        assert_eq!(urgency(&limits, Phase::Task, 0), Urgency::Normal);
        assert_eq!(urgency(&limits, Phase::Task, 314), Urgency::Normal);
        assert_eq!(urgency(&limits, Phase::Task, 315), Urgency::Warning);
        assert_eq!(urgency(&limits, Phase::Task, 419), Urgency::Warning);
        assert_eq!(urgency(&limits, Phase::Task, 420), Urgency::Critical);
        assert_eq!(urgency(&limits, Phase::Navigate, 450), Urgency::Warning);
    }

    #[test]
    fn mmss_formatting() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(420), "7:00");
        assert_eq!(format_time(600), "10:00");
    }
}
