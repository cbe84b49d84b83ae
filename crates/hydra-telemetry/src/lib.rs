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

//! Telemetry sampling for stress runs.
//!
//! The [`TelemetrySampler`] polls a [`TelemetrySource`](hydra_core::TelemetrySource)
//! on its own schedule and owns the run's [`SampleHistory`]. Every other
//! component reads it through snapshots only.

pub mod history;
pub mod sampler;
pub mod scripted;
pub mod sensors;
pub mod trend;

pub use history::{RunningStats, SampleHistory};
pub use sampler::{SamplerConfig, SamplerHandle, TelemetrySampler};
pub use scripted::ScriptedSource;
pub use sensors::SensorTracker;
pub use trend::TrendDetector;
