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

//! The post-run evaluation report.

use crate::telemetry::{SensorReading, ThermalStatus, Trend};
use serde::Serialize;
use std::fmt::{self, Display};
use std::time::Duration;

/// Highest value any score in the report can take.
pub const MAX_SCORE: f64 = 100.0;

/// Fewer temperature samples than this and the thermal summary is flagged incomplete.
pub const MIN_THERMAL_SAMPLES: usize = 6;

/// Temperature statistics over a run. Every field is absent on platforms
/// without readable sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermalSummary {
    /// Highest aggregate temperature recorded.
    pub peak_celsius: Option<f32>,
    /// Mean of all recorded aggregate temperatures.
    pub mean_celsius: Option<f32>,
    /// First recorded aggregate temperature.
    pub initial_celsius: Option<f32>,
    /// `peak_celsius - initial_celsius`.
    pub delta_celsius: Option<f32>,
    /// Classification of the most recent temperature movement.
    pub trend: Trend,
    /// Advisory classification of the peak.
    pub peak_status: Option<ThermalStatus>,
    /// Peak reading per sensor label.
    pub sensor_peaks: Vec<SensorReading>,
    /// Number of samples that carried a temperature.
    pub sample_count: usize,
}

impl ThermalSummary {
    /// Returns `true` once enough temperature samples exist for the summary to be meaningful.
    pub fn is_complete(&self) -> bool {
        self.sample_count >= MIN_THERMAL_SAMPLES
    }
}

/// Coarse verdict on the host's behaviour under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StabilityVerdict {
    /// No worker terminated unexpectedly.
    Stable,
    /// At least one worker terminated unexpectedly.
    Volatile,
}

/// Result of evaluating a finished run. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// 0–100; decreases with unexpected terminations per worker and unit of time.
    pub stability_score: f64,
    /// Temperature statistics.
    pub thermal_summary: ThermalSummary,
    /// 0–100; weighted combination of CPU load, memory pressure and stability.
    pub overall_stress_score: f64,
    /// Workers that exited outside a stop sequence.
    pub unexpected_termination_total: u32,
    /// Replacement workers spawned by Hydra Mode.
    pub respawn_total: u32,
    /// Workers requested but never started.
    pub spawn_shortfall: usize,
    /// Workers forcibly terminated after ignoring the stop signal.
    pub forced_terminations: usize,
    /// `Stable` when `unexpected_termination_total` is zero.
    pub verdict: StabilityVerdict,
    /// Mean sampled CPU% relative to the theoretical maximum (0–1).
    pub achieved_cpu_ratio: f64,
    /// Peak allocated memory relative to the target (0–1); `None` without a memory target.
    pub achieved_memory_ratio: Option<f64>,
    /// Mean sampled CPU%, `None` when no sample was recorded.
    pub mean_cpu_percent: Option<f64>,
    /// Active run time.
    pub elapsed_active: Duration,
    /// Live workers at the moment the stop sequence began.
    pub final_active_workers: usize,
}

impl Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== FINAL DIAGNOSTIC ===")?;
        writeln!(
            f,
            "OS Stability: {:?} ({} unexpected exits, {} respawns)",
            self.verdict, self.unexpected_termination_total, self.respawn_total
        )?;
        if self.spawn_shortfall > 0 {
            writeln!(f, "Spawn shortfall: {} workers", self.spawn_shortfall)?;
        }
        let thermal = &self.thermal_summary;
        match (thermal.is_complete(), thermal.peak_celsius, thermal.delta_celsius) {
            (true, Some(peak), Some(delta)) => writeln!(
                f,
                "Thermal: peak {peak:.1}°C | delta {delta:+.1}°C | trend {}",
                thermal.trend
            )?,
            _ => writeln!(f, "Thermal Data: Incomplete")?,
        }
        writeln!(
            f,
            "Active time: {:.1}s | CPU load achieved: {:.0}%",
            self.elapsed_active.as_secs_f64(),
            self.achieved_cpu_ratio * 100.0
        )?;
        if let Some(memory) = self.achieved_memory_ratio {
            writeln!(f, "Memory pressure achieved: {:.0}%", memory * 100.0)?;
        }
        writeln!(f, "Stability score: {:.0}/100", self.stability_score)?;
        writeln!(f, "FINAL SCORE: {:.0}/100", self.overall_stress_score)?;
        write!(f, "========================")
    }
}
