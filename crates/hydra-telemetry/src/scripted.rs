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

//! A deterministic [`TelemetrySource`] for tests and dry runs.

use hydra_core::{SensorReading, SystemStats, TelemetrySource, MIB};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct ScriptState {
    queued: VecDeque<SystemStats>,
    current: SystemStats,
    reads: u64,
}

/// Plays back queued [`SystemStats`], then keeps repeating the last one.
#[derive(Debug)]
pub struct ScriptedSource {
    state: Mutex<ScriptState>,
}

impl ScriptedSource {
    /// A source that always reports `stats`.
    pub fn new(stats: SystemStats) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                queued: VecDeque::new(),
                current: stats,
                reads: 0,
            }),
        }
    }

    /// A plausible idle host: 8 logical CPUs, 16 GiB total with 12 GiB free.
    pub fn idle_host() -> Self {
        Self::new(SystemStats {
            cpu_percent: 5.0,
            ram_percent: 25.0,
            total_memory_bytes: 16 * 1024 * MIB,
            available_memory_bytes: 12 * 1024 * MIB,
            temperature_celsius: None,
            sensors: Vec::new(),
            logical_cpus: 8,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues readings to be returned, one per poll, before falling back to the current one.
    pub fn queue(&self, readings: impl IntoIterator<Item = SystemStats>) {
        self.lock().queued.extend(readings);
    }

    /// Replaces the reading returned once the queue is drained.
    pub fn set(&self, stats: SystemStats) {
        self.lock().current = stats;
    }

    /// Adjusts the current reading in place.
    pub fn update(&self, f: impl FnOnce(&mut SystemStats)) {
        f(&mut self.lock().current);
    }

    /// Sets a single sensor named `cpu` on the current reading.
    pub fn set_temperature(&self, celsius: f32) {
        self.update(|stats| {
            stats.sensors = vec![SensorReading {
                label: "cpu".to_string(),
                celsius,
            }];
            stats.temperature_celsius = Some(celsius);
        });
    }

    /// Number of polls served so far.
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }
}

impl TelemetrySource for ScriptedSource {
    fn read_system_stats(&self) -> SystemStats {
        let mut state = self.lock();
        state.reads += 1;
        if let Some(next) = state.queued.pop_front() {
            state.current = next;
        }
        state.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_then_repeat_last() {
        let source = ScriptedSource::idle_host();
        source.queue([
            SystemStats {
                cpu_percent: 50.0,
                ..Default::default()
            },
            SystemStats {
                cpu_percent: 90.0,
                ..Default::default()
            },
        ]);
        assert_eq!(source.read_system_stats().cpu_percent, 50.0);
        assert_eq!(source.read_system_stats().cpu_percent, 90.0);
        assert_eq!(source.read_system_stats().cpu_percent, 90.0);
        assert_eq!(source.reads(), 3);
    }

    #[test]
    fn test_set_temperature() {
        let source = ScriptedSource::idle_host();
        source.set_temperature(72.5);
        let stats = source.read_system_stats();
        assert_eq!(stats.temperature_celsius, Some(72.5));
        assert_eq!(stats.sensors.len(), 1);
        assert_eq!(stats.logical_cpus, 8);
    }
}
