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


//! Post-run evaluation.
//!
//! The [`Evaluator`] is a pure function of a finished run's snapshot:
//! identical inputs always give identical reports.
//!
//! - **Stability** falls with the rate of unexpected terminations per worker
//!   per active minute: `100 / (1 + penalty × rate)`, floored at a minimum.
//! - **CPU ratio** is the sampled mean CPU% against the most the configured
//!   workers could load the machine: `min(100, 100 × workers × duty / cpus)`.
//! - **Memory ratio** is the peak held memory against the target.
//! - **Overall** is the weighted mean of the three on a 0-100 scale. Without
//!   a memory target, or without a known memory peak, the memory term is left
//!   out and the rest renormalized.

use crate::config::EvaluatorConfig;
use hydra_core::report::MAX_SCORE;
use hydra_core::{
    EvaluationReport, RunConfig, StabilityVerdict, TelemetrySample, ThermalSummary, WorkerRecord,
    WorkerState,
};
use hydra_telemetry::TrendDetector;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything the evaluator looks at, captured when the run stops.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// The configuration the run was started with.
    pub config: RunConfig,
    /// Every worker record of the run.
    pub records: Vec<WorkerRecord>,
    /// Thermal aggregates over the whole run.
    pub thermal: ThermalSummary,
    /// Mean sampled CPU utilisation over the whole run.
    pub mean_cpu_percent: Option<f64>,
    /// Most memory the stressor held, before it started releasing.
    /// `None` when the stressor was not observed.
    pub peak_memory_bytes: Option<u64>,
    /// Active (non-paused) run time.
    pub elapsed_active: Duration,
    /// Workers that never started.
    pub spawn_shortfall: usize,
    /// Logical CPUs of the host.
    pub logical_cpus: usize,
}

impl RunSnapshot {
    /// Builds a snapshot from the raw history alone.
    ///
    /// Aggregates cover only the retained samples and no per-sensor data is
    /// available; the run controller builds richer snapshots from the sampler.
    ///
    /// A bare history carries neither the host CPU count nor pause intervals
    /// nor the memory peak. The CPU count is taken to equal the worker count,
    /// active time is the span between the first and last sample, and the
    /// memory term is left out of the score.
    pub fn from_history(
        history: &[TelemetrySample],
        records: Vec<WorkerRecord>,
        config: RunConfig,
        detector: TrendDetector,
    ) -> Self {
        let temperatures: Vec<f32> = history.iter().filter_map(|s| s.temperature_celsius).collect();
        let peak = temperatures.iter().copied().reduce(f32::max);
        let initial = temperatures.first().copied();
        let mean = (!temperatures.is_empty())
            .then(|| temperatures.iter().sum::<f32>() / temperatures.len() as f32);
        let mean_cpu = (!history.is_empty()).then(|| {
            history.iter().map(|s| f64::from(s.cpu_percent)).sum::<f64>() / history.len() as f64
        });
        let elapsed_active = match (history.first(), history.last()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => Duration::ZERO,
        };
        Self {
            thermal: ThermalSummary {
                peak_celsius: peak,
                mean_celsius: mean,
                initial_celsius: initial,
                delta_celsius: peak.zip(initial).map(|(p, i)| p - i),
                trend: detector.classify(&temperatures),
                peak_status: peak.map(hydra_core::ThermalStatus::from_celsius),
                sensor_peaks: Vec::new(),
                sample_count: temperatures.len(),
            },
            mean_cpu_percent: mean_cpu,
            peak_memory_bytes: None,
            elapsed_active,
            spawn_shortfall: 0,
            logical_cpus: config.worker_count,
            config,
            records,
        }
    }
}

/// Scores finished runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Creates an evaluator with the given weights and penalties.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Produces the report for a finished run.
    pub fn evaluate(&self, snapshot: &RunSnapshot) -> EvaluationReport {
        let run = &snapshot.config;
        let records = &snapshot.records;

        let unexpected = count(records, |r| r.state == WorkerState::TerminatedUnexpected);
        let forced = count(records, |r| r.forced_termination);
        let slots = latest_per_slot(records);
        let respawn_total = records.len().saturating_sub(slots.len());
        let final_active_workers = slots
            .values()
            .filter(|r| r.state != WorkerState::TerminatedUnexpected)
            .count();

        let stability_score = self.stability(unexpected, run.worker_count, snapshot.elapsed_active);
        let achieved_cpu_ratio = cpu_ratio(
            snapshot.mean_cpu_percent,
            run.worker_count,
            run.duty_cycle,
            snapshot.logical_cpus,
        );
        let achieved_memory_ratio = snapshot
            .peak_memory_bytes
            .filter(|_| run.target_memory_bytes > 0)
            .map(|peak| (peak as f64 / run.target_memory_bytes as f64).clamp(0.0, 1.0));
        let overall_stress_score =
            self.overall(achieved_cpu_ratio, achieved_memory_ratio, stability_score);

        EvaluationReport {
            stability_score,
            thermal_summary: snapshot.thermal.clone(),
            overall_stress_score,
            unexpected_termination_total: unexpected as u32,
            respawn_total: respawn_total as u32,
            spawn_shortfall: snapshot.spawn_shortfall,
            forced_terminations: forced,
            verdict: if unexpected == 0 {
                StabilityVerdict::Stable
            } else {
                StabilityVerdict::Volatile
            },
            achieved_cpu_ratio,
            achieved_memory_ratio,
            mean_cpu_percent: snapshot.mean_cpu_percent,
            elapsed_active: snapshot.elapsed_active,
            final_active_workers,
        }
    }

    fn stability(&self, terminations: usize, workers: usize, elapsed_active: Duration) -> f64 {
        let minutes = (elapsed_active.as_secs_f64() / 60.0).max(1.0);
        let rate = terminations as f64 / (workers.max(1) as f64 * minutes);
        let score = MAX_SCORE / (1.0 + self.config.termination_penalty.max(0.0) * rate);
        score.max(self.config.min_stability_score).min(MAX_SCORE)
    }

    fn overall(&self, cpu: f64, memory: Option<f64>, stability: f64) -> f64 {
        let weights = &self.config.weights;
        let mut total = weights.cpu * cpu * MAX_SCORE + weights.stability * stability;
        let mut weight_sum = weights.cpu + weights.stability;
        if let Some(memory) = memory {
            total += weights.memory * memory * MAX_SCORE;
            weight_sum += weights.memory;
        }
        if weight_sum <= 0.0 {
            return 0.0;
        }
        (total / weight_sum).clamp(0.0, MAX_SCORE)
    }
}

/// Convenience wrapper around [`Evaluator::evaluate`] for a bare history.
pub fn evaluate(
    history: &[TelemetrySample],
    records: &[WorkerRecord],
    config: &RunConfig,
) -> EvaluationReport {
    let snapshot = RunSnapshot::from_history(
        history,
        records.to_vec(),
        config.clone(),
        TrendDetector::default(),
    );
    Evaluator::default().evaluate(&snapshot)
}

fn count(records: &[WorkerRecord], f: impl Fn(&WorkerRecord) -> bool) -> usize {
    records.iter().filter(|r| f(r)).count()
}

fn latest_per_slot(records: &[WorkerRecord]) -> BTreeMap<usize, &WorkerRecord> {
    let mut slots = BTreeMap::new();
    for record in records {
        slots.insert(record.slot, record);
    }
    slots
}

fn cpu_ratio(mean_cpu: Option<f64>, workers: usize, duty: f64, logical_cpus: usize) -> f64 {
    let Some(mean_cpu) = mean_cpu else {
        return 0.0;
    };
    let cpus = logical_cpus.max(1) as f64;
    let theoretical = (MAX_SCORE * workers as f64 * duty / cpus).min(MAX_SCORE);
    if theoretical <= 0.0 {
        return 0.0;
    }
    (mean_cpu / theoretical).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use approx::assert_relative_eq;
    use hydra_core::{RunDuration, Trend, WorkerId, MIB};
    use std::time::Instant;

    fn run(workers: usize, target_memory_bytes: u64) -> RunConfig {
        RunConfig {
            worker_count: workers,
            duty_cycle: 1.0,
            hydra_mode: true,
            target_memory_bytes,
            duration_seconds: RunDuration::Bounded(60),
            sample_interval_ms: 500,
        }
    }

    fn record(id: u64, slot: usize, state: WorkerState) -> WorkerRecord {
        let mut record = WorkerRecord::spawned(WorkerId(id), slot, Instant::now());
        record.state = state;
        record
    }

    fn snapshot(records: Vec<WorkerRecord>, mean_cpu: f64) -> RunSnapshot {
        RunSnapshot {
            config: run(4, 1024 * MIB),
            records,
            thermal: ThermalSummary::default(),
            mean_cpu_percent: Some(mean_cpu),
            peak_memory_bytes: Some(512 * MIB),
            elapsed_active: Duration::from_secs(120),
            spawn_shortfall: 0,
            logical_cpus: 8,
        }
    }

    fn clean_records() -> Vec<WorkerRecord> {
        (0..4)
            .map(|slot| record(slot as u64 + 1, slot, WorkerState::TerminatedExpected))
            .collect()
    }

    #[test]
    fn test_clean_run_has_maximum_stability() {
        let report = Evaluator::default().evaluate(&snapshot(clean_records(), 50.0));
        assert_relative_eq!(report.stability_score, 100.0, epsilon = 1e-9);
        assert_eq!(report.unexpected_termination_total, 0);
        assert_eq!(report.verdict, StabilityVerdict::Stable);
        assert_eq!(report.final_active_workers, 4);
        // 4 workers at full duty on 8 CPUs can reach 50%.
        assert_relative_eq!(report.achieved_cpu_ratio, 1.0, epsilon = 1e-9);
        assert_relative_eq!(report.achieved_memory_ratio.unwrap(), 0.5, epsilon = 1e-9);
        // (0.4 * 100 + 0.2 * 50 + 0.4 * 100) / 1.0
        assert_relative_eq!(report.overall_stress_score, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_terminations_lower_stability_per_worker_minute() {
        let mut records = clean_records();
        records[0].state = WorkerState::TerminatedUnexpected;
        records[0].termination_count = 1;
        let mut replacement = WorkerRecord::replacement(WorkerId(5), &records[0], Instant::now());
        replacement.state = WorkerState::TerminatedExpected;
        records.push(replacement);

        let report = Evaluator::default().evaluate(&snapshot(records, 50.0));
        // 1 termination / (4 workers * 2 minutes) = 0.125
        assert_relative_eq!(report.stability_score, 100.0 / 1.125, epsilon = 1e-9);
        assert_eq!(report.respawn_total, 1);
        assert_eq!(report.final_active_workers, 4);
        assert_eq!(report.verdict, StabilityVerdict::Volatile);
    }

    #[test]
    fn test_stability_is_floored() {
        let records: Vec<WorkerRecord> = (0..4)
            .map(|slot| record(slot as u64 + 1, slot, WorkerState::TerminatedUnexpected))
            .collect();
        let evaluator = Evaluator::new(EvaluatorConfig {
            termination_penalty: 1000.0,
            ..EvaluatorConfig::default()
        });
        let mut snapshot = snapshot(records, 0.0);
        snapshot.elapsed_active = Duration::from_secs(5);
        let report = evaluator.evaluate(&snapshot);
        assert_relative_eq!(report.stability_score, 5.0, epsilon = 1e-9);
        assert_eq!(report.final_active_workers, 0);
    }

    #[test]
    fn test_memory_term_dropped_without_target() {
        let mut snapshot = snapshot(clean_records(), 25.0);
        snapshot.config.target_memory_bytes = 0;
        let report = Evaluator::default().evaluate(&snapshot);
        assert_eq!(report.achieved_memory_ratio, None);
        // (0.4 * 50 + 0.4 * 100) / 0.8
        assert_relative_eq!(report.overall_stress_score, 75.0, epsilon = 1e-9);
    }

    #[test]
    fn test_memory_term_dropped_without_peak() {
        let mut snapshot = snapshot(clean_records(), 25.0);
        snapshot.peak_memory_bytes = None;
        let report = Evaluator::default().evaluate(&snapshot);
        assert_eq!(report.achieved_memory_ratio, None);
        assert_relative_eq!(report.overall_stress_score, 75.0, epsilon = 1e-9);
    }

    #[test]
    fn test_history_evaluation_ignores_unknown_memory_peak() {
        let history: Vec<TelemetrySample> = (0..4u64)
            .map(|i| TelemetrySample {
                timestamp: Duration::from_millis(500 * i),
                cpu_percent: 100.0,
                ram_percent: 30.0,
                temperature_celsius: None,
            })
            .collect();
        let records = clean_records();

        let without_target = evaluate(&history, &records, &run(4, 0));
        let with_target = evaluate(&history, &records, &run(4, 512 * MIB));
        assert_eq!(with_target.achieved_memory_ratio, None);
        assert_relative_eq!(without_target.overall_stress_score, 100.0, epsilon = 1e-9);
        assert_relative_eq!(
            with_target.overall_stress_score,
            without_target.overall_stress_score,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_weights_are_configuration() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            weights: ScoringWeights {
                cpu: 1.0,
                memory: 0.0,
                stability: 0.0,
            },
            ..EvaluatorConfig::default()
        });
        let report = evaluator.evaluate(&snapshot(clean_records(), 20.0));
        assert_relative_eq!(report.overall_stress_score, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_evaluate_is_deterministic_over_history() {
        let history: Vec<TelemetrySample> = (0..8u64)
            .map(|i| TelemetrySample {
                timestamp: Duration::from_millis(500 * i),
                cpu_percent: 80.0,
                ram_percent: 30.0,
                temperature_celsius: (i % 2 == 0).then_some(50.0 + i as f32 * 2.0),
            })
            .collect();
        let records = clean_records();
        let config = run(4, 0);

        let first = evaluate(&history, &records, &config);
        let second = evaluate(&history, &records, &config);
        assert_eq!(first, second);

        let thermal = &first.thermal_summary;
        assert_eq!(thermal.peak_celsius, Some(62.0));
        assert_eq!(thermal.initial_celsius, Some(50.0));
        assert_relative_eq!(thermal.mean_celsius.unwrap(), 56.0, epsilon = 1e-9);
        assert_eq!(thermal.trend, Trend::Rising);
        assert_eq!(thermal.sample_count, 4);
        assert_relative_eq!(first.mean_cpu_percent.unwrap(), 80.0, epsilon = 1e-9);
    }
}
