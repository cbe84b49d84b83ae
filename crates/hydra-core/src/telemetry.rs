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

//! Provides the data types and the polling contract for system telemetry.
//!
//! A [`TelemetrySource`] is the narrow interface through which the engine
//! observes the host: CPU load, memory usage and, where the platform exposes
//! it, temperature. The concrete sensor backend lives in `hydra-infra`; the
//! engine only ever sees [`SystemStats`] snapshots.
//!
//! Temperature is modelled as `Option` end to end. A platform without
//! sensors yields `None`, which every aggregate skips rather than treats as
//! an error.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::time::Duration;

/// A single temperature sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Sensor label as reported by the platform (e.g. "coretemp Package id 0").
    pub label: String,
    /// Current temperature in degrees Celsius.
    pub celsius: f32,
}

/// A point-in-time reading of the host, as returned by a [`TelemetrySource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    /// Global CPU usage across all logical CPUs (0–100).
    pub cpu_percent: f32,
    /// Used fraction of physical memory (0–100).
    pub ram_percent: f32,
    /// Total physical memory in bytes.
    pub total_memory_bytes: u64,
    /// Memory available for new allocations in bytes.
    pub available_memory_bytes: u64,
    /// Aggregate temperature, or `None` when no sensor is readable.
    pub temperature_celsius: Option<f32>,
    /// Individual sensor readings backing `temperature_celsius`.
    pub sensors: Vec<SensorReading>,
    /// Number of logical CPUs, or 0 when unknown.
    pub logical_cpus: usize,
}

impl SystemStats {
    /// Averages a set of sensor readings into one aggregate temperature.
    ///
    /// Returns `None` for an empty set and ignores non-finite readings.
    pub fn aggregate_temperature(sensors: &[SensorReading]) -> Option<f32> {
        let (sum, count) = sensors
            .iter()
            .map(|s| s.celsius)
            .filter(|c| c.is_finite())
            .fold((0.0f32, 0u32), |(sum, count), c| (sum + c, count + 1));
        (count > 0).then(|| sum / count as f32)
    }
}

/// The polling interface to the platform's sensors.
///
/// Implementations must never fail: unreadable fields are reported as absent
/// (`None` temperature, empty sensor list) rather than as errors.
pub trait TelemetrySource: Send + Sync + Debug {
    /// Takes a fresh reading of the host.
    fn read_system_stats(&self) -> SystemStats;
}

/// One recorded telemetry sample.
///
/// `timestamp` is the offset from the sampler's epoch (the moment it was
/// started), so samples compare and serialize without a wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Offset from the sampler's start.
    pub timestamp: Duration,
    /// Global CPU usage (0–100).
    pub cpu_percent: f32,
    /// Used memory fraction (0–100).
    pub ram_percent: f32,
    /// Aggregate temperature, absent when unsupported.
    pub temperature_celsius: Option<f32>,
}

impl TelemetrySample {
    /// Builds a sample from a system reading, clamping percentages to 0–100.
    pub fn from_stats(timestamp: Duration, stats: &SystemStats) -> Self {
        Self {
            timestamp,
            cpu_percent: clamp_percent(stats.cpu_percent),
            ram_percent: clamp_percent(stats.ram_percent),
            temperature_celsius: stats.temperature_celsius.filter(|t| t.is_finite()),
        }
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Direction of a windowed series (typically temperature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// The recent window is above the earlier one by more than the tolerance.
    Rising,
    /// The recent window is below the earlier one by more than the tolerance.
    Falling,
    /// The difference is within the tolerance band, or there is too little data.
    #[default]
    Stable,
}

impl Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
        };
        f.write_str(label)
    }
}

/// Advisory classification of a temperature.
///
/// The engine never throttles itself on this: it only surfaces warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub enum ThermalStatus {
    /// Below 60 °C.
    #[default]
    Cool,
    /// 60–80 °C.
    Warm,
    /// 80–90 °C, where most CPUs start throttling.
    Throttling,
    /// Above 90 °C.
    Critical,
}

impl ThermalStatus {
    /// Classifies a temperature in degrees Celsius.
    pub fn from_celsius(celsius: f32) -> Self {
        if celsius > 90.0 {
            ThermalStatus::Critical
        } else if celsius > 80.0 {
            ThermalStatus::Throttling
        } else if celsius > 60.0 {
            ThermalStatus::Warm
        } else {
            ThermalStatus::Cool
        }
    }
}

impl Display for ThermalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sensor(label: &str, celsius: f32) -> SensorReading {
        SensorReading {
            label: label.to_string(),
            celsius,
        }
    }

    #[test]
    fn test_aggregate_temperature_averages_sensors() {
        let sensors = vec![sensor("core0", 50.0), sensor("core1", 60.0)];
        assert_relative_eq!(SystemStats::aggregate_temperature(&sensors).unwrap(), 55.0);
    }

    #[test]
    fn test_aggregate_temperature_absent_without_sensors() {
        assert_eq!(SystemStats::aggregate_temperature(&[]), None);
        assert_eq!(
            SystemStats::aggregate_temperature(&[sensor("broken", f32::NAN)]),
            None
        );
    }

    #[test]
    fn test_sample_clamps_percentages() {
        let stats = SystemStats {
            cpu_percent: 104.0,
            ram_percent: -1.0,
            temperature_celsius: Some(f32::INFINITY),
            ..Default::default()
        };
        let sample = TelemetrySample::from_stats(Duration::from_millis(10), &stats);
        assert_eq!(sample.cpu_percent, 100.0);
        assert_eq!(sample.ram_percent, 0.0);
        assert_eq!(sample.temperature_celsius, None);
    }

    #[test]
    fn test_thermal_status_thresholds() {
        assert_eq!(ThermalStatus::from_celsius(45.0), ThermalStatus::Cool);
        assert_eq!(ThermalStatus::from_celsius(60.5), ThermalStatus::Warm);
        assert_eq!(ThermalStatus::from_celsius(85.0), ThermalStatus::Throttling);
        assert_eq!(ThermalStatus::from_celsius(95.0), ThermalStatus::Critical);
        assert!(ThermalStatus::Critical > ThermalStatus::Warm);
    }
}
