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


//! Hydra Mode over real child processes.

#![cfg(unix)]

use hydra_control::{EngineConfig, WorkerSupervisor};
use hydra_core::{EventSink, RunConfig, RunDuration, RunEvent, WorkerState};
use hydra_infra::ProcessSpawner;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Appends its pid to the file named by `$0`, then obeys stdin signal lines.
const WORKER: &str = r#"echo $$ >> "$0"; while read line; do [ "$line" = stop ] && exit 0; done"#;

fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn pids(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn externally_killed_child_is_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pids");
    let pid_arg = pid_file.to_string_lossy().into_owned();
    let engine = EngineConfig::fast();
    let spawner = Arc::new(ProcessSpawner::new(
        "sh",
        ["-c", WORKER, pid_arg.as_str()],
        engine.supervisor.pause_poll,
    ));
    let (tx, rx) = crossbeam_channel::unbounded();
    let supervisor = WorkerSupervisor::new(engine.supervisor, spawner, EventSink::new(tx));
    let mut handle = supervisor
        .start(&RunConfig {
            worker_count: 2,
            duty_cycle: 0.5,
            hydra_mode: true,
            target_memory_bytes: 0,
            duration_seconds: RunDuration::Unbounded,
            sample_interval_ms: 100,
        })
        .unwrap();

    assert!(eventually(|| pids(&pid_file).len() == 2));
    let victim = pids(&pid_file)[0].clone();
    let status = Command::new("kill").args(["-9", &victim]).status().unwrap();
    assert!(status.success());

    assert!(eventually(|| handle.respawns() == 1 && handle.active_count() == 2));
    assert!(eventually(|| pids(&pid_file).len() == 3));
    let records = handle.poll();
    assert_eq!(
        records
            .iter()
            .filter(|r| r.state == WorkerState::TerminatedUnexpected)
            .count(),
        1
    );

    let summary = handle.stop();
    assert!(summary.forced.is_empty());
    assert_eq!(summary.stopped, 2);
    assert!(rx
        .try_iter()
        .any(|e| matches!(e, RunEvent::WorkerRespawned { .. })));
}
