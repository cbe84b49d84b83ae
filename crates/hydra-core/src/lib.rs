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

//! # Hydra Core
//!
//! Foundational crate containing the run model, telemetry types, and the
//! interface contracts that the rest of the HydraHog workspace is built on.
//!
//! This crate defines the abstract "what": the configuration a run is started
//! with, the records the supervisor keeps about its workers, the samples the
//! telemetry sampler records, and the report the evaluator produces.
//! `hydra-telemetry` and `hydra-control` implement the engine on top of these
//! types, and `hydra-infra` provides the concrete OS-facing backends.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod report;
pub mod run;
pub mod service;
pub mod status;
pub mod telemetry;
pub mod worker;

pub use config::{ConfigWarning, DutyCycle, RunConfig, RunDuration, MIB};
pub use error::{ConfigError, ControlError, SpawnError, StateError};
pub use report::{EvaluationReport, StabilityVerdict, ThermalSummary};
pub use run::{ActiveClock, RunPhase, RunState, RunStatus};
pub use service::ServiceThread;
pub use status::{EventSink, RunEvent, StatusSnapshot};
pub use telemetry::{
    SensorReading, SystemStats, TelemetrySample, TelemetrySource, ThermalStatus, Trend,
};
pub use worker::{WorkerId, WorkerRecord, WorkerSignal, WorkerSpawner, WorkerState, WorkerUnit};
