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


//! sysinfo-based implementation of the TelemetrySource trait.

use hydra_core::{SensorReading, SystemStats, TelemetrySource};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Components, System};

/// A telemetry source that uses the `sysinfo` crate.
///
/// CPU usage is a delta between two refreshes, so the very first reading
/// after construction may report 0%.
pub struct SysinfoSource {
    system: Mutex<System>,
    logical_cpus: usize,
}

impl SysinfoSource {
    /// Creates a new SysinfoSource and primes the CPU counters.
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let logical_cpus = system.cpus().len();
        log::debug!("SysinfoSource: {} logical CPUs detected.", logical_cpus);
        Self {
            system: Mutex::new(system),
            logical_cpus,
        }
    }

    /// Number of logical CPUs seen at construction.
    pub fn logical_cpus(&self) -> usize {
        self.logical_cpus
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SysinfoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoSource")
            .field("logical_cpus", &self.logical_cpus)
            .finish_non_exhaustive()
    }
}

impl TelemetrySource for SysinfoSource {
    fn read_system_stats(&self) -> SystemStats {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let ram_percent = if total > 0 {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };
        let cpu_percent = system.global_cpu_usage();
        let available = system.available_memory();
        drop(system);

        let sensors = read_sensors();
        SystemStats {
            cpu_percent,
            ram_percent,
            total_memory_bytes: total,
            available_memory_bytes: available,
            temperature_celsius: cpu_temperature(&sensors),
            sensors,
            logical_cpus: self.logical_cpus,
        }
    }
}

/// Every component that currently reports a usable temperature.
fn read_sensors() -> Vec<SensorReading> {
    let components = Components::new_with_refreshed_list();
    let mut sensors = Vec::new();
    for component in &components {
        if let Some(celsius) = component.temperature() {
            if celsius.is_finite() && celsius > 0.0 {
                sensors.push(SensorReading {
                    label: component.label().to_string(),
                    celsius,
                });
            }
        }
    }
    sensors
}

/// Mean of the CPU package and core sensors, or of all sensors when none is
/// labelled as such.
fn cpu_temperature(sensors: &[SensorReading]) -> Option<f32> {
    let cpu: Vec<SensorReading> = sensors
        .iter()
        .filter(|s| {
            let label = s.label.to_lowercase();
            label.contains("cpu") || label.contains("core") || label.contains("package")
        })
        .cloned()
        .collect();
    if cpu.is_empty() {
        SystemStats::aggregate_temperature(sensors)
    } else {
        SystemStats::aggregate_temperature(&cpu)
    }
}
