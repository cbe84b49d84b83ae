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


//! The `probe` subcommand.

use crate::cli::ProbeArgs;
use anyhow::{Context, Result};
use hydra_control::MemoryStressorConfig;
use hydra_core::config::{recommended_ceiling, safety_ceiling};
use hydra_core::{SystemStats, TelemetrySource, ThermalStatus, MIB};
use hydra_infra::SysinfoSource;
use serde::Serialize;
use std::thread;
use std::time::Duration;

/// CPU usage is a delta between two refreshes; give the first one time to age.
const CPU_SETTLE: Duration = Duration::from_millis(250);

#[derive(Serialize)]
struct ProbeReport<'a> {
    stats: &'a SystemStats,
    safety_margin: f64,
    recommended_ceiling_bytes: u64,
    safety_ceiling_bytes: u64,
}

pub fn execute(args: ProbeArgs) -> Result<()> {
    let source = SysinfoSource::new();
    thread::sleep(CPU_SETTLE);
    let stats = source.read_system_stats();
    let margin = MemoryStressorConfig::default().safety_margin;
    let report = ProbeReport {
        stats: &stats,
        safety_margin: margin,
        recommended_ceiling_bytes: recommended_ceiling(stats.total_memory_bytes, margin),
        safety_ceiling_bytes: safety_ceiling(&stats, margin),
    };

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("Failed to serialize the probe")?;
        println!("{text}");
        return Ok(());
    }

    println!("Logical CPUs     : {}", stats.logical_cpus);
    println!("CPU usage        : {:.1}%", stats.cpu_percent);
    println!(
        "Memory           : {} MiB total, {} MiB available ({:.1}% used)",
        stats.total_memory_bytes / MIB,
        stats.available_memory_bytes / MIB,
        stats.ram_percent
    );
    println!(
        "Memory ceiling   : {} MiB now ({} MiB recommended, {:.0}% margin)",
        report.safety_ceiling_bytes / MIB,
        report.recommended_ceiling_bytes / MIB,
        margin * 100.0
    );
    match stats.temperature_celsius {
        Some(celsius) => println!(
            "Temperature      : {:.1}°C ({})",
            celsius,
            ThermalStatus::from_celsius(celsius)
        ),
        None => println!("Temperature      : not available on this platform"),
    }
    for sensor in &stats.sensors {
        println!("  {:<30} {:.1}°C", sensor.label, sensor.celsius);
    }
    Ok(())
}
