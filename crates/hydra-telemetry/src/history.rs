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

//! Bounded, time-ordered storage for telemetry samples.

use hydra_core::TelemetrySample;
use std::collections::VecDeque;

/// All-time aggregate of a series, unaffected by eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    max: Option<f32>,
    first: Option<f32>,
}

impl RunningStats {
    /// Folds a value into the aggregate.
    pub fn record(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.sum += f64::from(value);
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.first.get_or_insert(value);
    }

    /// Number of values recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, or `None` when nothing was recorded.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Largest value seen.
    pub fn max(&self) -> Option<f32> {
        self.max
    }

    /// First value seen.
    pub fn first(&self) -> Option<f32> {
        self.first
    }
}

/// Ring of the most recent samples, strictly increasing in timestamp.
///
/// When full, the oldest sample is evicted. Peak, mean and initial values are
/// kept as running aggregates so they cover the whole run, not just what is
/// still in the ring.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
    temperature: RunningStats,
    cpu: RunningStats,
    evicted: u64,
}

impl SampleHistory {
    /// Creates an empty history holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            temperature: RunningStats::default(),
            cpu: RunningStats::default(),
            evicted: 0,
        }
    }

    /// Appends a sample.
    ///
    /// Returns `false` and drops the sample if its timestamp does not follow
    /// the latest one.
    pub fn push(&mut self, sample: TelemetrySample) -> bool {
        if let Some(last) = self.samples.back() {
            if sample.timestamp <= last.timestamp {
                log::warn!(
                    "Dropping out-of-order sample at {:?} (latest is {:?}).",
                    sample.timestamp,
                    last.timestamp
                );
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        if let Some(t) = sample.temperature_celsius {
            self.temperature.record(t);
        }
        self.cpu.record(sample.cpu_percent);
        self.samples.push_back(sample);
        true
    }

    /// Samples currently retained.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples dropped to make room.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    /// Copy of the retained samples, oldest first.
    pub fn to_vec(&self) -> Vec<TelemetrySample> {
        self.samples.iter().copied().collect()
    }

    /// Temperatures of the retained samples that carry one, oldest first.
    pub fn temperatures(&self) -> Vec<f32> {
        self.samples
            .iter()
            .filter_map(|s| s.temperature_celsius)
            .collect()
    }

    /// Hottest aggregate temperature over the whole run.
    pub fn peak_temperature(&self) -> Option<f32> {
        self.temperature.max()
    }

    /// Mean aggregate temperature over the whole run.
    pub fn mean_temperature(&self) -> Option<f32> {
        self.temperature.mean().map(|m| m as f32)
    }

    /// First aggregate temperature of the run.
    pub fn initial_temperature(&self) -> Option<f32> {
        self.temperature.first()
    }

    /// Number of samples over the whole run that carried a temperature.
    pub fn temperature_sample_count(&self) -> usize {
        self.temperature.count() as usize
    }

    /// Mean CPU utilisation over the whole run.
    pub fn mean_cpu(&self) -> Option<f64> {
        self.cpu.mean()
    }
}
