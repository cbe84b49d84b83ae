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

//! The user-facing run configuration and its validation rules.

use crate::error::ConfigError;
use crate::telemetry::SystemStats;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::num::NonZeroUsize;
use std::time::Duration;

/// One mebibyte, in bytes.
pub const MIB: u64 = 1024 * 1024;

/// Fraction of each scheduling interval a worker spends computing.
///
/// Always within `(0, 1]`; construct it through [`DutyCycle::new`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DutyCycle(f64);

impl DutyCycle {
    /// A worker that never idles.
    pub const FULL: DutyCycle = DutyCycle(1.0);

    /// Validates and wraps a busy fraction.
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::DutyCycleOutOfRange(value))
        }
    }

    /// Returns the busy fraction.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Splits one scheduling interval into its busy and idle parts.
    pub fn split(self, interval: Duration) -> (Duration, Duration) {
        let busy = Duration::from_nanos((interval.as_nanos() as f64 * self.0).round() as u64);
        (busy, interval.saturating_sub(busy))
    }
}

/// How long a run lasts, measured in active (non-paused) time.
///
/// Serialized as a number of seconds or as the string `"unbounded"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DurationRepr", into = "DurationRepr")]
pub enum RunDuration {
    /// Stop automatically after this many seconds of active time.
    Bounded(u64),
    /// Run until explicitly stopped.
    Unbounded,
}

impl RunDuration {
    /// Returns the bound as a `Duration`, or `None` when unbounded.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            RunDuration::Bounded(secs) => Some(Duration::from_secs(secs)),
            RunDuration::Unbounded => None,
        }
    }

    /// Returns `true` once `elapsed_active` has reached the bound.
    pub fn is_expired(self, elapsed_active: Duration) -> bool {
        self.as_duration()
            .is_some_and(|limit| elapsed_active >= limit)
    }
}

impl Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDuration::Bounded(secs) => write!(f, "{secs}s"),
            RunDuration::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Keyword(String),
}

impl TryFrom<DurationRepr> for RunDuration {
    type Error = ConfigError;

    fn try_from(repr: DurationRepr) -> Result<Self, Self::Error> {
        match repr {
            DurationRepr::Seconds(secs) => Ok(RunDuration::Bounded(secs)),
            DurationRepr::Keyword(word) if word.eq_ignore_ascii_case("unbounded") => {
                Ok(RunDuration::Unbounded)
            }
            DurationRepr::Keyword(word) => Err(ConfigError::InvalidDuration(word)),
        }
    }
}

impl From<RunDuration> for DurationRepr {
    fn from(duration: RunDuration) -> Self {
        match duration {
            RunDuration::Bounded(secs) => DurationRepr::Seconds(secs),
            RunDuration::Unbounded => DurationRepr::Keyword("unbounded".to_string()),
        }
    }
}

/// Configuration of a single stress run.
///
/// Immutable once the run starts: the controller keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of CPU-load workers to keep alive.
    pub worker_count: usize,
    /// Busy fraction of each worker's scheduling interval, in `(0, 1]`.
    pub duty_cycle: f64,
    /// Respawn workers that exit outside a stop sequence.
    pub hydra_mode: bool,
    /// Memory the stressor works towards, in bytes.
    pub target_memory_bytes: u64,
    /// Active run time before the run stops on its own.
    pub duration_seconds: RunDuration,
    /// Interval between two telemetry samples, in milliseconds.
    pub sample_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            duty_cycle: 0.9,
            hydra_mode: true,
            target_memory_bytes: 1024 * MIB,
            duration_seconds: RunDuration::Bounded(60),
            sample_interval_ms: 500,
        }
    }
}

impl RunConfig {
    /// Returns the validated duty cycle.
    pub fn duty(&self) -> Result<DutyCycle, ConfigError> {
        DutyCycle::new(self.duty_cycle)
    }

    /// Returns the telemetry sampling interval.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Checks the configuration against a live system reading.
    ///
    /// Returns the advisory warnings on success. Errors abort the run before
    /// any sub-component is started.
    pub fn validate(
        &self,
        stats: &SystemStats,
        safety_margin: f64,
    ) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.duty()?;
        if self.duration_seconds == RunDuration::Bounded(0) {
            return Err(ConfigError::ZeroDuration);
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        if self.target_memory_bytes > stats.available_memory_bytes {
            return Err(ConfigError::TargetExceedsAvailableMemory {
                target_bytes: self.target_memory_bytes,
                available_bytes: stats.available_memory_bytes,
            });
        }

        let mut warnings = Vec::new();
        let recommended = recommended_ceiling(stats.total_memory_bytes, safety_margin);
        if self.target_memory_bytes > recommended {
            warnings.push(ConfigWarning::TargetAboveRecommendedCeiling {
                target_bytes: self.target_memory_bytes,
                ceiling_bytes: recommended,
            });
        }
        if stats.logical_cpus > 0 && self.worker_count > stats.logical_cpus {
            warnings.push(ConfigWarning::WorkersExceedLogicalCpus {
                workers: self.worker_count,
                logical_cpus: stats.logical_cpus,
            });
        }
        Ok(warnings)
    }
}

/// An advisory raised while validating a `RunConfig`. Never blocks a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The memory target is above the recommended ceiling; the stressor will clamp it.
    TargetAboveRecommendedCeiling {
        /// The requested memory target.
        target_bytes: u64,
        /// The recommended ceiling derived from total system memory.
        ceiling_bytes: u64,
    },
    /// More workers than logical CPUs were requested.
    WorkersExceedLogicalCpus {
        /// Requested worker count.
        workers: usize,
        /// Logical CPUs reported by the telemetry source.
        logical_cpus: usize,
    },
}

impl Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::TargetAboveRecommendedCeiling {
                target_bytes,
                ceiling_bytes,
            } => write!(
                f,
                "memory target {} MiB is above the recommended ceiling of {} MiB; allocation will stop at the ceiling",
                target_bytes / MIB,
                ceiling_bytes / MIB
            ),
            ConfigWarning::WorkersExceedLogicalCpus {
                workers,
                logical_cpus,
            } => write!(
                f,
                "{workers} workers requested on {logical_cpus} logical CPUs; workers will share cores"
            ),
        }
    }
}

/// Memory a run may use according to the safety margin alone.
pub fn recommended_ceiling(total_memory_bytes: u64, safety_margin: f64) -> u64 {
    let margin = safety_margin.clamp(0.0, 1.0);
    (total_memory_bytes as f64 * (1.0 - margin)) as u64
}

/// The hard ceiling for the memory stressor, fixed for a run at start.
///
/// The recommended ceiling, further capped by the memory available right now.
pub fn safety_ceiling(stats: &SystemStats, safety_margin: f64) -> u64 {
    recommended_ceiling(stats.total_memory_bytes, safety_margin).min(stats.available_memory_bytes)
}
