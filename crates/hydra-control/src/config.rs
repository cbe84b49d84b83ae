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


//! Engine tuning.
//!
//! These are the knobs a run is *executed* with, as opposed to the
//! user-facing [`RunConfig`](hydra_core::RunConfig) describing what to stress.
//! Every struct deserializes with defaults for missing fields, so a config file
//! only needs to name what it overrides. Durations are written in milliseconds.

use hydra_telemetry::SamplerConfig;
use serde::Deserialize;
use std::time::Duration;

use hydra_core::MIB;

/// Serde adapter for `Duration` fields written as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Tuning for the worker supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Liveness check period.
    #[serde(rename = "tick_ms", with = "millis")]
    pub tick: Duration,
    /// Length of one busy/idle cycle of a worker.
    #[serde(rename = "duty_interval_ms", with = "millis")]
    pub duty_interval: Duration,
    /// How long each worker gets to exit after a stop signal.
    #[serde(rename = "stop_grace_ms", with = "millis")]
    pub stop_grace: Duration,
    /// Sleep granularity of a paused worker.
    #[serde(rename = "pause_poll_ms", with = "millis")]
    pub pause_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            duty_interval: Duration::from_millis(100),
            stop_grace: Duration::from_secs(2),
            pause_poll: Duration::from_millis(50),
        }
    }
}

/// Tuning for the memory stressor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryStressorConfig {
    /// Bytes allocated or released per tick.
    pub step_bytes: u64,
    /// Allocation loop period.
    #[serde(rename = "tick_ms", with = "millis")]
    pub tick: Duration,
    /// Upper bound on the gradual release at stop.
    #[serde(rename = "release_timeout_ms", with = "millis")]
    pub release_timeout: Duration,
    /// Fraction of total memory kept free; `0.10` caps a run at 90 %.
    pub safety_margin: f64,
}

impl Default for MemoryStressorConfig {
    fn default() -> Self {
        Self {
            step_bytes: 50 * MIB,
            tick: Duration::from_millis(50),
            release_timeout: Duration::from_secs(10),
            safety_margin: 0.10,
        }
    }
}

/// Relative weight of each component of the overall stress score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Achieved CPU load.
    pub cpu: f64,
    /// Achieved memory pressure.
    pub memory: f64,
    /// Stability score.
    pub stability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cpu: 0.4,
            memory: 0.2,
            stability: 0.4,
        }
    }
}

/// Tuning for the post-run evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Weights of the overall stress score.
    pub weights: ScoringWeights,
    /// Score lost per unexpected termination per worker-minute.
    pub termination_penalty: f64,
    /// Floor of the stability score.
    pub min_stability_score: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            termination_penalty: 1.0,
            min_stability_score: 5.0,
        }
    }
}

/// Everything the [`RunController`](crate::RunController) needs besides the run itself.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker supervision.
    pub supervisor: SupervisorConfig,
    /// Memory pressure.
    pub memory: MemoryStressorConfig,
    /// Telemetry retention and trend detection.
    pub sampler: SamplerConfig,
    /// Scoring.
    pub evaluator: EvaluatorConfig,
    /// Period of the duration watchdog.
    #[serde(rename = "control_tick_ms", with = "millis")]
    pub control_tick: Duration,
    /// Capacity of the run event channel.
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            memory: MemoryStressorConfig::default(),
            sampler: SamplerConfig::default(),
            evaluator: EvaluatorConfig::default(),
            control_tick: Duration::from_millis(100),
            event_buffer_size: 1024,
        }
    }
}

impl EngineConfig {
    /// A configuration with short ticks and small steps, for tests and demos.
    pub fn fast() -> Self {
        Self {
            supervisor: SupervisorConfig {
                tick: Duration::from_millis(20),
                duty_interval: Duration::from_millis(20),
                stop_grace: Duration::from_millis(500),
                pause_poll: Duration::from_millis(5),
            },
            memory: MemoryStressorConfig {
                step_bytes: MIB,
                tick: Duration::from_millis(5),
                release_timeout: Duration::from_secs(2),
                ..MemoryStressorConfig::default()
            },
            control_tick: Duration::from_millis(10),
            ..Self::default()
        }
    }
}
