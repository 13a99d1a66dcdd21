//! # Run Phase Tracking
//!
//! The load-generation engine drives a run through a small set of phases.
//! The reporting layer never changes the phase itself; it only reads it to
//! decide whether the run timer is live and whether cached payloads are still
//! valid for the phase the run is in now.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Observable phase of a load-test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has been started yet
    #[default]
    Ready,
    /// Simulated users are being spawned
    Hatching,
    /// All users are spawned and issuing requests
    Running,
    /// The run has been stopped
    Stopped,
}

impl RunState {
    /// Whether the run timer advances in this phase
    pub fn is_live(self) -> bool {
        !matches!(self, RunState::Ready | RunState::Stopped)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Ready => write!(f, "ready"),
            RunState::Hatching => write!(f, "hatching"),
            RunState::Running => write!(f, "running"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How users are being added to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunningType {
    /// Fixed user count hatched at a fixed rate
    #[default]
    Normal,
    /// Automatic ramping until a latency or failure threshold is hit
    Ramp,
}

/// Topology of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Single process generating load
    #[default]
    Local,
    /// Master coordinating remote slaves
    Distributed { slave_count: usize },
}

impl RunMode {
    /// Slave count, only present for distributed runs
    pub fn slave_count(self) -> Option<usize> {
        match self {
            RunMode::Local => None,
            RunMode::Distributed { slave_count } => Some(slave_count),
        }
    }
}

/// Everything a report needs to know about the run besides the counters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStatus {
    pub state: RunState,
    pub user_count: usize,
    pub running_type: RunningType,
    pub host: Option<String>,
    pub mode: RunMode,
}

/// Run timer that advances while the run is live and freezes otherwise
///
/// `refresh` folds the time since the last refresh into the elapsed total,
/// so a poller mid-run sees monotonically increasing run time while a
/// stopped run keeps reporting the value captured when it stopped.
#[derive(Debug, Clone)]
pub struct RunClock {
    elapsed: Duration,
    last_tick: Option<Instant>,
}

impl RunClock {
    pub fn new() -> Self {
        Self {
            elapsed: Duration::ZERO,
            last_tick: None,
        }
    }

    /// Start (or resume) timing
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        if self.last_tick.is_none() {
            self.last_tick = Some(now);
        }
    }

    /// Fold elapsed wall time into the total and freeze the timer
    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    pub fn stop_at(&mut self, now: Instant) {
        self.refresh_at(now);
        self.last_tick = None;
    }

    /// Bring the elapsed total up to date if the timer is running
    pub fn refresh(&mut self) {
        self.refresh_at(Instant::now());
    }

    pub fn refresh_at(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            self.elapsed += now.saturating_duration_since(last);
            self.last_tick = Some(now);
        }
    }

    /// Elapsed time as of the last refresh
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    pub fn reset(&mut self) {
        let running = self.last_tick.is_some();
        self.elapsed = Duration::ZERO;
        self.last_tick = if running { Some(Instant::now()) } else { None };
    }
}

impl Default for RunClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_liveness() {
        assert!(!RunState::Ready.is_live());
        assert!(RunState::Hatching.is_live());
        assert!(RunState::Running.is_live());
        assert!(!RunState::Stopped.is_live());
    }

    #[test]
    fn test_run_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunState::Hatching).unwrap(),
            "\"hatching\""
        );
        assert_eq!(serde_json::to_string(&RunningType::Ramp).unwrap(), "\"ramp\"");
    }

    #[test]
    fn test_run_clock_advances_only_while_running() {
        let t0 = Instant::now();
        let mut clock = RunClock::new();

        clock.refresh_at(t0 + Duration::from_secs(5));
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.start_at(t0);
        clock.refresh_at(t0 + Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));

        clock.stop_at(t0 + Duration::from_secs(4));
        assert_eq!(clock.elapsed(), Duration::from_secs(4));

        clock.refresh_at(t0 + Duration::from_secs(60));
        assert_eq!(clock.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn test_slave_count_only_for_distributed() {
        assert_eq!(RunMode::Local.slave_count(), None);
        assert_eq!(RunMode::Distributed { slave_count: 3 }.slave_count(), Some(3));
    }
}
