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


//! End-to-end runs at real time scale.

mod common;

use common::{eventually, host};
use hydra_control::{EngineConfig, RunController, ThreadSpawner};
use hydra_core::{RunConfig, RunDuration, RunEvent, RunPhase, StabilityVerdict};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn controller() -> (RunController, crossbeam_channel::Receiver<RunEvent>) {
    let engine = EngineConfig::default();
    let spawner = Arc::new(ThreadSpawner::new(engine.supervisor.pause_poll));
    RunController::new(engine, host(8 * 1024, 6 * 1024), spawner)
}

#[test]
fn four_workers_for_ten_seconds_without_failures() {
    let (controller, _events) = controller();
    controller
        .start(RunConfig {
            worker_count: 4,
            duty_cycle: 0.5,
            hydra_mode: false,
            target_memory_bytes: 0,
            duration_seconds: RunDuration::Bounded(10),
            sample_interval_ms: 500,
        })
        .unwrap();

    let report = controller
        .wait(Duration::from_secs(20))
        .expect("run should finish on its own");
    assert_eq!(controller.phase(), RunPhase::Finished);
    assert_eq!(report.unexpected_termination_total, 0);
    assert_eq!(report.stability_score, 100.0);
    assert_eq!(report.verdict, StabilityVerdict::Stable);
    assert_eq!(report.final_active_workers, 4);
    assert!(report.elapsed_active >= Duration::from_secs(10));
    // One sample every 500 ms over 10 s.
    let samples = controller.history().len();
    assert!((18..=23).contains(&samples), "{samples} samples");
}

#[test]
fn two_kills_in_hydra_mode_keep_the_worker_count() {
    let (controller, events) = controller();
    let started = Instant::now();
    controller
        .start(RunConfig {
            worker_count: 4,
            duty_cycle: 0.5,
            hydra_mode: true,
            target_memory_bytes: 0,
            duration_seconds: RunDuration::Bounded(5),
            sample_interval_ms: 500,
        })
        .unwrap();

    let kill_slot_zero = |at: Duration| {
        thread::sleep(at.saturating_sub(started.elapsed()));
        let records = controller.worker_records();
        let current = records
            .iter()
            .rev()
            .find(|r| r.slot == 0 && r.state.is_live())
            .map(|r| r.worker_id)
            .expect("slot 0 should be occupied");
        assert!(controller.kill_worker(current));
    };
    kill_slot_zero(Duration::from_secs(1));
    assert!(eventually(Duration::from_secs(1), || controller.status().active_workers == 4
        && controller.worker_records().len() == 5));
    kill_slot_zero(Duration::from_secs(3));
    assert!(eventually(Duration::from_secs(1), || controller
        .worker_records()
        .len()
        == 6));

    let lineage = controller
        .worker_records()
        .into_iter()
        .filter(|r| r.slot == 0)
        .last()
        .unwrap();
    assert_eq!(lineage.termination_count, 2);

    let report = controller
        .wait(Duration::from_secs(10))
        .expect("run should finish on its own");
    assert_eq!(report.final_active_workers, 4);
    assert_eq!(report.unexpected_termination_total, 2);
    assert_eq!(report.respawn_total, 2);
    assert_eq!(report.verdict, StabilityVerdict::Volatile);

    let respawns = events
        .try_iter()
        .filter(|e| matches!(e, RunEvent::WorkerRespawned { slot: 0, .. }))
        .count();
    assert_eq!(respawns, 2);
}
