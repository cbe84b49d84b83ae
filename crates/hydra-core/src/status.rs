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

//! The read-only status surface offered to presentation layers.
//!
//! Presentation layers poll a [`StatusSnapshot`] on their own schedule and
//! may additionally drain the [`RunEvent`] stream for a human-readable log.

use crate::config::MIB;
use crate::run::RunStatus;
use crate::telemetry::{TelemetrySample, ThermalStatus};
use crate::worker::WorkerId;
use crossbeam_channel::{Sender, TrySendError};
use std::fmt::{self, Display};
use std::time::Duration;

/// Point-in-time projection of a run, cheap to produce and never blocking on workers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Phase and active time.
    pub run: RunStatus,
    /// Most recent telemetry sample, if any.
    pub latest_sample: Option<TelemetrySample>,
    /// Workers currently alive.
    pub active_workers: usize,
    /// Workers the run is configured for.
    pub configured_workers: usize,
    /// Memory currently held by the memory stressor.
    pub current_bytes: u64,
    /// Memory the stressor is working towards.
    pub target_bytes: u64,
}

/// Notable things that happened during a run, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run entered `Running`.
    Started {
        /// Workers that actually started.
        workers: usize,
        /// Whether Hydra Mode is on.
        hydra_mode: bool,
    },
    /// A configuration advisory (never blocking).
    Advisory(String),
    /// Fewer workers started than requested.
    SpawnShortfall {
        /// Requested workers.
        requested: usize,
        /// Workers that started.
        spawned: usize,
    },
    /// The run was paused.
    Paused,
    /// The run was resumed.
    Resumed,
    /// A worker exited outside a stop sequence.
    WorkerTerminated {
        /// The worker that exited.
        worker_id: WorkerId,
        /// The slot it occupied.
        slot: usize,
        /// Unexpected exits in that slot so far.
        termination_count: u32,
    },
    /// Hydra Mode replaced a terminated worker.
    WorkerRespawned {
        /// The worker that exited.
        previous: WorkerId,
        /// Its replacement.
        replacement: WorkerId,
        /// The slot both occupy.
        slot: usize,
    },
    /// The memory target was clamped to the safety ceiling.
    MemoryCeilingReached {
        /// The requested target.
        target_bytes: u64,
        /// The fixed ceiling for this run.
        ceiling_bytes: u64,
    },
    /// The allocator refused a memory step; growth stops at the current size.
    AllocationFailed {
        /// Memory held when the step failed.
        current_bytes: u64,
        /// Size of the refused step.
        step_bytes: u64,
    },
    /// The temperature entered a hotter advisory band.
    ThermalAdvisory {
        /// The new band.
        status: ThermalStatus,
        /// The reading that triggered it.
        celsius: f32,
    },
    /// A component did not acknowledge stop in time and was forced down.
    ShutdownTimeout {
        /// Which component.
        component: &'static str,
        /// What was forced.
        detail: String,
    },
    /// The configured duration of active time has elapsed.
    DurationElapsed(Duration),
    /// The run finished and was evaluated.
    Finished {
        /// Stability score of the report.
        stability_score: f64,
        /// Overall stress score of the report.
        overall_stress_score: f64,
    },
}

impl Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::Started {
                workers,
                hydra_mode,
            } => write!(f, "Test Start: {workers} Workers | Hydra: {hydra_mode}"),
            RunEvent::Advisory(message) => write!(f, "Advisory: {message}"),
            RunEvent::SpawnShortfall { requested, spawned } => {
                write!(f, "Only {spawned} of {requested} workers started")
            }
            RunEvent::Paused => write!(f, "Test PAUSED"),
            RunEvent::Resumed => write!(f, "Test RESUMED"),
            RunEvent::WorkerTerminated {
                worker_id, slot, ..
            } => write!(f, "Worker {worker_id} (slot {slot}) terminated."),
            RunEvent::WorkerRespawned {
                previous,
                replacement,
                slot,
            } => write!(
                f,
                "Hydra: Respawned slot {slot} ({previous} -> {replacement})"
            ),
            RunEvent::MemoryCeilingReached {
                target_bytes,
                ceiling_bytes,
            } => write!(
                f,
                "Memory target {} MiB clamped to safety ceiling {} MiB",
                target_bytes / MIB,
                ceiling_bytes / MIB
            ),
            RunEvent::AllocationFailed {
                current_bytes,
                step_bytes,
            } => write!(
                f,
                "Allocation of {} MiB refused at {} MiB held",
                step_bytes / MIB,
                current_bytes / MIB
            ),
            RunEvent::ThermalAdvisory { status, celsius } => {
                write!(f, "Thermal advisory: {status} ({celsius:.1}°C)")
            }
            RunEvent::ShutdownTimeout { component, detail } => {
                write!(f, "{component} shutdown timed out: {detail}")
            }
            RunEvent::DurationElapsed(elapsed) => {
                write!(f, "Duration reached after {:.1}s", elapsed.as_secs_f64())
            }
            RunEvent::Finished {
                stability_score,
                overall_stress_score,
            } => write!(
                f,
                "Test finished (stability {stability_score:.0}, score {overall_stress_score:.0})"
            ),
        }
    }
}

/// Fire-and-forget sender for [`RunEvent`]s.
///
/// Emitting never blocks: when the receiver lags and the buffer is full,
/// the event is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<RunEvent>>,
}

impl EventSink {
    /// Creates a sink feeding `tx`.
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits an event.
    pub fn emit(&self, event: RunEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Event buffer full, dropping: {}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
