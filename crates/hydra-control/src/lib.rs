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


//! # Hydra Control
//!
//! The stress engine proper. The [`RunController`] composes three independent
//! periodic services around a run:
//!
//! - the [`WorkerSupervisor`], which keeps CPU-load workers alive and, in
//!   Hydra Mode, replaces the ones that die;
//! - the [`MemoryStressor`], which walks memory usage towards a target in
//!   bounded steps below a fixed safety ceiling;
//! - the [`TelemetrySampler`](hydra_telemetry::TelemetrySampler), which
//!   records the host's response.
//!
//! When the run stops, the [`Evaluator`] turns the collected records into an
//! [`EvaluationReport`](hydra_core::EvaluationReport).

pub mod config;
pub mod controller;
pub mod evaluation;
pub mod memory;
pub mod workers;

pub use config::{
    EngineConfig, EvaluatorConfig, MemoryStressorConfig, ScoringWeights, SupervisorConfig,
};
pub use controller::{RunController, StartReport, StopOutcome};
pub use evaluation::{evaluate, Evaluator, RunSnapshot};
pub use memory::{MemoryAllocationState, MemoryGauge, MemoryStressor};
pub use workers::{
    DutyCycleLoop, LoopExit, ShutdownSummary, SpawnReport, SupervisorHandle, ThreadSpawner,
    WorkerCounters, WorkerFlags, WorkerSupervisor,
};
