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

//! Error taxonomy of the engine.
//!
//! Only [`ConfigError`] and [`StateError`] ever reach the caller of a run
//! command. Worker failures, spawn shortfalls, missing sensors and shutdown
//! timeouts are absorbed into records and events instead.

use crate::run::RunPhase;
use thiserror::Error;

/// A `RunConfig` was rejected before any sub-component started.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `worker_count` was zero.
    #[error("worker_count must be at least 1")]
    NoWorkers,
    /// `duty_cycle` was outside `(0, 1]` or not a finite number.
    #[error("duty_cycle must be in (0, 1], got {0}")]
    DutyCycleOutOfRange(f64),
    /// A bounded duration of zero seconds was requested.
    #[error("duration_seconds must be at least 1 or \"unbounded\"")]
    ZeroDuration,
    /// A textual duration other than `"unbounded"` was given.
    #[error("invalid duration '{0}', expected a number of seconds or \"unbounded\"")]
    InvalidDuration(String),
    /// `sample_interval_ms` was zero.
    #[error("sample_interval_ms must be at least 1")]
    ZeroSampleInterval,
    /// The memory target cannot be satisfied by the memory currently available.
    #[error(
        "target memory of {target_bytes} bytes exceeds the {available_bytes} bytes of available system memory"
    )]
    TargetExceedsAvailableMemory {
        /// The requested memory target.
        target_bytes: u64,
        /// Available memory reported by the telemetry source at validation time.
        available_bytes: u64,
    },
}

/// A command was issued in a phase that does not accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// `start` was called on a controller that already left `Idle`.
    #[error("run already started (phase: {0})")]
    AlreadyStarted(RunPhase),
    /// The command needs an active run but none has been started.
    #[error("no run in progress")]
    NotRunning,
    /// `resume` was called while the run was not paused.
    #[error("run is not paused (phase: {0})")]
    NotPaused(RunPhase),
    /// The run has finished; a new run needs a fresh controller.
    #[error("run has finished and accepts no further commands")]
    Finished,
    /// The phase machine does not allow this edge.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Phase the run was in.
        from: RunPhase,
        /// Phase the command tried to move to.
        to: RunPhase,
    },
}

/// A single worker unit could not be spawned.
///
/// Never fatal for a run: the supervisor downgrades its active count instead.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to create the thread or process.
    #[error("failed to launch worker: {0}")]
    Io(#[from] std::io::Error),
    /// The backend declined to spawn (e.g. an artificial limit).
    #[error("worker spawn rejected: {0}")]
    Rejected(String),
}

/// Errors returned by the run controller's commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// The configuration was invalid; the run never entered `Running`.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The command is not valid in the current phase.
    #[error(transparent)]
    State(#[from] StateError),
    /// A background thread of the engine could not be started.
    #[error("failed to start the {component} thread: {reason}")]
    Service {
        /// Which component.
        component: &'static str,
        /// The OS error, rendered.
        reason: String,
    },
}

impl ControlError {
    /// Wraps a thread-spawn failure of `component`.
    pub fn service(component: &'static str, err: std::io::Error) -> Self {
        ControlError::Service {
            component,
            reason: err.to_string(),
        }
    }
}
