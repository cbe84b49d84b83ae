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

//! Worker records and the contracts for CPU-load worker backends.
//!
//! A [`WorkerSpawner`] creates independently scheduled [`WorkerUnit`]s (threads
//! or child processes). The supervisor in `hydra-control` drives them only
//! through [`WorkerSignal`]s and liveness checks; it never shares mutable
//! state with a running worker.

use crate::config::DutyCycle;
use crate::error::SpawnError;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

/// Identifier of a worker, unique within a run.
///
/// Replacement workers always receive a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle state of a single worker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, not yet confirmed alive by a supervision tick.
    Starting,
    /// Confirmed alive.
    Running,
    /// Exited as part of a stop sequence.
    TerminatedExpected,
    /// Exited outside a stop sequence.
    TerminatedUnexpected,
    /// A replacement for a worker that terminated unexpectedly, and alive.
    Respawned,
}

impl WorkerState {
    /// Returns `true` for states that count towards the active worker total.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            WorkerState::Starting | WorkerState::Running | WorkerState::Respawned
        )
    }
}

/// Everything the supervisor knows about one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRecord {
    /// Unique id of this worker.
    pub worker_id: WorkerId,
    /// Logical position (`0..worker_count`) this worker fills.
    ///
    /// A replacement takes over the slot of the worker it replaces.
    pub slot: usize,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// When the worker was spawned.
    pub start_time: Instant,
    /// Unexpected exits in this slot's lineage, including this worker's own.
    pub termination_count: u32,
    /// `true` if the worker ignored the stop signal and had to be killed.
    pub forced_termination: bool,
}

impl WorkerRecord {
    /// Creates the record of a freshly spawned worker.
    pub fn spawned(worker_id: WorkerId, slot: usize, start_time: Instant) -> Self {
        Self {
            worker_id,
            slot,
            state: WorkerState::Starting,
            start_time,
            termination_count: 0,
            forced_termination: false,
        }
    }

    /// Creates the record of a replacement, inheriting the lineage count.
    pub fn replacement(worker_id: WorkerId, predecessor: &WorkerRecord, start_time: Instant) -> Self {
        Self {
            worker_id,
            slot: predecessor.slot,
            state: WorkerState::Respawned,
            start_time,
            termination_count: predecessor.termination_count,
            forced_termination: false,
        }
    }
}

/// Cooperative commands delivered to a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// Enter idle-sleep at the end of the current duty cycle, without exiting.
    Pause,
    /// Leave idle-sleep and resume duty cycles.
    Resume,
    /// Exit at the end of the current duty cycle.
    Stop,
}

impl WorkerSignal {
    /// The line-protocol keyword used by process-backed workers.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerSignal::Pause => "pause",
            WorkerSignal::Resume => "resume",
            WorkerSignal::Stop => "stop",
        }
    }

    /// Parses a line-protocol keyword.
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim() {
            "pause" => Some(WorkerSignal::Pause),
            "resume" => Some(WorkerSignal::Resume),
            "stop" => Some(WorkerSignal::Stop),
            _ => None,
        }
    }
}

/// A running CPU-load worker, as seen by its supervisor.
pub trait WorkerUnit: Send {
    /// Returns `true` while the worker has not exited.
    fn is_alive(&mut self) -> bool;

    /// Delivers a cooperative signal. Returns `false` if it could not be delivered.
    fn signal(&mut self, signal: WorkerSignal) -> bool;

    /// Terminates the worker without its cooperation, as far as the backend allows.
    fn terminate(&mut self);

    /// Short human-readable description (e.g. "pid 4242").
    fn describe(&self) -> String;
}

/// Creates worker units. Shared by the supervisor for initial spawns and respawns.
pub trait WorkerSpawner: Send + Sync {
    /// Spawns one worker running the duty-cycle loop.
    ///
    /// `interval` is the length of one busy + idle cycle.
    fn spawn(
        &self,
        id: WorkerId,
        duty: DutyCycle,
        interval: Duration,
    ) -> Result<Box<dyn WorkerUnit>, SpawnError>;

    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;
}
