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


#![allow(dead_code)]

use crossbeam_channel::Receiver;
use hydra_control::{EngineConfig, RunController, ThreadSpawner};
use hydra_core::{RunConfig, RunDuration, RunEvent, SystemStats, MIB};
use hydra_telemetry::ScriptedSource;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn run_config(workers: usize, hydra_mode: bool, duration: RunDuration) -> RunConfig {
    RunConfig {
        worker_count: workers,
        duty_cycle: 0.3,
        hydra_mode,
        target_memory_bytes: 4 * MIB,
        duration_seconds: duration,
        sample_interval_ms: 20,
    }
}

pub fn controller_with(
    engine: EngineConfig,
    source: Arc<ScriptedSource>,
) -> (RunController, Receiver<RunEvent>) {
    let spawner = Arc::new(ThreadSpawner::new(engine.supervisor.pause_poll));
    RunController::new(engine, source, spawner)
}

pub fn controller() -> (RunController, Receiver<RunEvent>) {
    controller_with(EngineConfig::fast(), Arc::new(ScriptedSource::idle_host()))
}

pub fn host(total_mib: u64, available_mib: u64) -> Arc<ScriptedSource> {
    Arc::new(ScriptedSource::new(SystemStats {
        cpu_percent: 10.0,
        ram_percent: 50.0,
        total_memory_bytes: total_mib * MIB,
        available_memory_bytes: available_mib * MIB,
        temperature_celsius: None,
        sensors: Vec::new(),
        logical_cpus: 4,
    }))
}

/// Polls `f` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
