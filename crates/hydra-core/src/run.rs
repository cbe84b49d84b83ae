// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The run phase machine and its pause-aware clock.
//!
//! [`RunState`] is pure: every transition takes the current `Instant` as an
//! argument, so the accounting rules can be exercised without sleeping.

use crate::error::StateError;
use std::fmt::{self, Debug, Display};
use std::time::{Duration, Instant};

/// The high-level phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Workers and memory pressure are active.
    Running,
    /// Workers idle, memory held, clock frozen.
    Paused,
    /// Sub-components are shutting down.
    Stopping,
    /// Terminal. The evaluation report is available.
    Finished,
}

impl RunPhase {
    /// Returns `true` if the phase machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Paused)
                | (RunPhase::Paused, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Stopping)
                | (RunPhase::Paused, RunPhase::Stopping)
                | (RunPhase::Stopping, RunPhase::Finished)
        )
    }

    /// Returns `true` while the run holds live sub-components.
    pub fn is_active(self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Paused)
    }
}

impl Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A stopwatch that only advances while explicitly running.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ActiveClock {
    /// Starts (or restarts) accumulation at `now`. No-op if already running.
    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Freezes accumulation at `now`. No-op if already frozen.
    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    /// Returns `true` while accumulating.
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Total running time as of `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }
}

/// Read-only projection of a [`RunState`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatus {
    /// Current phase.
    pub phase: RunPhase,
    /// Time spent in `Running`, excluding pauses.
    pub elapsed_active: Duration,
    /// When the run entered `Running` for the first time.
    pub started_at: Option<Instant>,
    /// When the current pause began, if paused.
    pub paused_at: Option<Instant>,
}

impl RunStatus {
    /// `elapsed_active` in fractional seconds.
    pub fn elapsed_active_seconds(&self) -> f64 {
        self.elapsed_active.as_secs_f64()
    }
}

/// The single owner of a run's phase and active-time accounting.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    phase: RunPhase,
    clock: ActiveClock,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
}

impl RunState {
    /// Creates an idle run state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Active time as of `now`.
    pub fn elapsed_active(&self, now: Instant) -> Duration {
        self.clock.elapsed(now)
    }

    /// Projects the state at `now`.
    pub fn status(&self, now: Instant) -> RunStatus {
        RunStatus {
            phase: self.phase,
            elapsed_active: self.clock.elapsed(now),
            started_at: self.started_at,
            paused_at: self.paused_at,
        }
    }

    /// `Idle → Running`.
    pub fn start(&mut self, now: Instant) -> Result<(), StateError> {
        match self.phase {
            RunPhase::Idle => {}
            RunPhase::Finished => return Err(StateError::Finished),
            other => return Err(StateError::AlreadyStarted(other)),
        }
        self.phase = RunPhase::Running;
        self.started_at = Some(now);
        self.clock.resume(now);
        Ok(())
    }

    /// `Running → Paused`. Freezes the clock.
    pub fn pause(&mut self, now: Instant) -> Result<(), StateError> {
        self.check_edge(RunPhase::Paused)?;
        self.phase = RunPhase::Paused;
        self.paused_at = Some(now);
        self.clock.pause(now);
        Ok(())
    }

    /// `Paused → Running`. Restarts the clock.
    pub fn resume(&mut self, now: Instant) -> Result<(), StateError> {
        match self.phase {
            RunPhase::Paused => {}
            RunPhase::Idle => return Err(StateError::NotRunning),
            RunPhase::Finished => return Err(StateError::Finished),
            other => return Err(StateError::NotPaused(other)),
        }
        self.phase = RunPhase::Running;
        self.paused_at = None;
        self.clock.resume(now);
        Ok(())
    }

    /// `Running | Paused → Stopping`. Freezes the clock.
    ///
    /// Returns `Ok(false)` without effect when already stopping, so repeated
    /// stop requests are harmless.
    pub fn begin_stop(&mut self, now: Instant) -> Result<bool, StateError> {
        if self.phase == RunPhase::Stopping {
            return Ok(false);
        }
        self.check_edge(RunPhase::Stopping)?;
        self.phase = RunPhase::Stopping;
        self.paused_at = None;
        self.clock.pause(now);
        Ok(true)
    }

    /// `Stopping → Finished`.
    pub fn finish(&mut self) -> Result<(), StateError> {
        self.check_edge(RunPhase::Finished)?;
        self.phase = RunPhase::Finished;
        Ok(())
    }

    fn check_edge(&self, to: RunPhase) -> Result<(), StateError> {
        match self.phase {
            RunPhase::Finished => Err(StateError::Finished),
            RunPhase::Idle if to != RunPhase::Running => Err(StateError::NotRunning),
            from if from.can_transition_to(to) => Ok(()),
            from => Err(StateError::InvalidTransition { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_phase_edges() {
        assert!(RunPhase::Idle.can_transition_to(RunPhase::Running));
        assert!(RunPhase::Paused.can_transition_to(RunPhase::Stopping));
        assert!(!RunPhase::Idle.can_transition_to(RunPhase::Paused));
        assert!(!RunPhase::Finished.can_transition_to(RunPhase::Running));
        assert!(!RunPhase::Stopping.can_transition_to(RunPhase::Running));
    }

    #[test]
    fn test_clock_excludes_paused_time() {
        let t0 = Instant::now();
        let mut clock = ActiveClock::default();
        clock.resume(t0);
        clock.pause(t0 + secs(3));
        assert_eq!(clock.elapsed(t0 + secs(100)), secs(3));
        clock.resume(t0 + secs(10));
        assert_eq!(clock.elapsed(t0 + secs(12)), secs(5));
    }

    #[test]
    fn test_clock_pause_and_resume_are_idempotent() {
        let t0 = Instant::now();
        let mut clock = ActiveClock::default();
        clock.resume(t0);
        clock.resume(t0 + secs(2));
        clock.pause(t0 + secs(4));
        clock.pause(t0 + secs(9));
        assert_eq!(clock.elapsed(t0 + secs(20)), secs(4));
        assert!(!clock.is_running());
    }

    #[test]
    fn test_full_lifecycle() {
        let t0 = Instant::now();
        let mut state = RunState::new();
        state.start(t0).unwrap();
        state.pause(t0 + secs(2)).unwrap();
        let paused = state.status(t0 + secs(5));
        assert_eq!(paused.phase, RunPhase::Paused);
        assert_eq!(paused.paused_at, Some(t0 + secs(2)));
        assert_eq!(paused.elapsed_active, secs(2));

        state.resume(t0 + secs(7)).unwrap();
        assert_eq!(state.elapsed_active(t0 + secs(8)), secs(3));

        assert_eq!(state.begin_stop(t0 + secs(9)), Ok(true));
        assert_eq!(state.begin_stop(t0 + secs(10)), Ok(false));
        state.finish().unwrap();

        let done = state.status(t0 + secs(60));
        assert_eq!(done.phase, RunPhase::Finished);
        assert_eq!(done.elapsed_active, secs(4));
    }

    #[test]
    fn test_rejected_commands() {
        let t0 = Instant::now();
        let mut state = RunState::new();
        assert_eq!(state.pause(t0), Err(StateError::NotRunning));
        assert_eq!(state.resume(t0), Err(StateError::NotRunning));
        assert_eq!(state.begin_stop(t0), Err(StateError::NotRunning));

        state.start(t0).unwrap();
        assert_eq!(
            state.start(t0),
            Err(StateError::AlreadyStarted(RunPhase::Running))
        );
        assert_eq!(state.resume(t0), Err(StateError::NotPaused(RunPhase::Running)));

        state.begin_stop(t0).unwrap();
        assert_eq!(
            state.pause(t0),
            Err(StateError::InvalidTransition {
                from: RunPhase::Stopping,
                to: RunPhase::Paused
            })
        );

        state.finish().unwrap();
        assert_eq!(state.start(t0), Err(StateError::Finished));
        assert_eq!(state.pause(t0), Err(StateError::Finished));
        assert_eq!(state.resume(t0), Err(StateError::Finished));
        assert_eq!(state.begin_stop(t0), Err(StateError::Finished));
        assert_eq!(state.finish(), Err(StateError::Finished));
    }
}
