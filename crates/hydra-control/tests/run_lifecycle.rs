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


mod common;

use common::{controller, eventually, run_config};
use hydra_control::{EngineConfig, RunController, StopOutcome};
use hydra_core::{
    ControlError, DutyCycle, RunDuration, RunEvent, RunPhase, SpawnError, StateError, WorkerId,
    WorkerSignal, WorkerSpawner, WorkerUnit,
};
use hydra_telemetry::ScriptedSource;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Worker that keeps running for a while after being told to stop, so the
/// controller stays in `Stopping` long enough to be observed.
struct LingeringWorker {
    id: WorkerId,
    stop_at: Option<Instant>,
    linger: Duration,
}

impl WorkerUnit for LingeringWorker {
    fn is_alive(&mut self) -> bool {
        match self.stop_at {
            Some(at) => at.elapsed() < self.linger,
            None => true,
        }
    }

    fn signal(&mut self, signal: WorkerSignal) -> bool {
        if signal == WorkerSignal::Stop && self.stop_at.is_none() {
            self.stop_at = Some(Instant::now());
        }
        true
    }

    fn terminate(&mut self) {
        self.linger = Duration::ZERO;
    }

    fn describe(&self) -> String {
        format!("{} (lingering)", self.id)
    }
}

struct LingeringSpawner(Duration);

impl WorkerSpawner for LingeringSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        _duty: DutyCycle,
        _interval: Duration,
    ) -> Result<Box<dyn WorkerUnit>, SpawnError> {
        Ok(Box::new(LingeringWorker {
            id,
            stop_at: None,
            linger: self.0,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "lingering"
    }
}

fn lingering_controller() -> (RunController, crossbeam_channel::Receiver<RunEvent>) {
    RunController::new(
        EngineConfig::fast(),
        Arc::new(ScriptedSource::idle_host()),
        Arc::new(LingeringSpawner(Duration::from_millis(300))),
    )
}

/// Worker that remembers the last pause or resume it was sent.
struct RecordingWorker {
    id: WorkerId,
    last: Arc<Mutex<Option<WorkerSignal>>>,
    stopped: bool,
}

impl WorkerUnit for RecordingWorker {
    fn is_alive(&mut self) -> bool {
        !self.stopped
    }

    fn signal(&mut self, signal: WorkerSignal) -> bool {
        match signal {
            WorkerSignal::Stop => self.stopped = true,
            other => *self.last.lock().unwrap() = Some(other),
        }
        true
    }

    fn terminate(&mut self) {
        self.stopped = true;
    }

    fn describe(&self) -> String {
        format!("{} (recording)", self.id)
    }
}

#[derive(Default)]
struct RecordingSpawner {
    workers: Mutex<Vec<Arc<Mutex<Option<WorkerSignal>>>>>,
}

impl RecordingSpawner {
    fn last_signals(&self) -> Vec<Option<WorkerSignal>> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .map(|w| *w.lock().unwrap())
            .collect()
    }
}

impl WorkerSpawner for RecordingSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        _duty: DutyCycle,
        _interval: Duration,
    ) -> Result<Box<dyn WorkerUnit>, SpawnError> {
        let last = Arc::new(Mutex::new(None));
        self.workers.lock().unwrap().push(Arc::clone(&last));
        Ok(Box::new(RecordingWorker {
            id,
            last,
            stopped: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

fn finished_events(events: &crossbeam_channel::Receiver<RunEvent>) -> usize {
    events
        .try_iter()
        .filter(|e| matches!(e, RunEvent::Finished { .. }))
        .count()
}

#[test]
fn start_then_stop_reaches_finished_with_a_report() {
    let (controller, events) = controller();
    let started = controller
        .start(run_config(2, true, RunDuration::Bounded(60)))
        .unwrap();
    assert_eq!(started.spawn.spawned, 2);
    assert_eq!(controller.phase(), RunPhase::Running);

    let StopOutcome::Finished(report) = controller.stop().unwrap() else {
        panic!("first stop must finish the run");
    };
    assert_eq!(controller.phase(), RunPhase::Finished);
    assert_eq!(controller.report().as_ref(), Some(report.as_ref()));
    assert_eq!(report.unexpected_termination_total, 0);
    assert_eq!(report.final_active_workers, 2);

    let events: Vec<RunEvent> = events.try_iter().collect();
    assert!(matches!(events.first(), Some(RunEvent::Started { workers: 2, .. })));
    assert!(matches!(events.last(), Some(RunEvent::Finished { .. })));
}

#[test]
fn finished_run_rejects_every_command() {
    let (controller, _events) = controller();
    controller
        .start(run_config(1, false, RunDuration::Unbounded))
        .unwrap();
    controller.stop().unwrap();

    let finished = Err(ControlError::State(StateError::Finished));
    assert_eq!(controller.stop(), finished);
    assert_eq!(controller.pause(), Err(ControlError::State(StateError::Finished)));
    assert_eq!(controller.resume(), Err(ControlError::State(StateError::Finished)));
    assert!(matches!(
        controller.start(run_config(1, false, RunDuration::Unbounded)),
        Err(ControlError::State(StateError::Finished))
    ));
}

#[test]
fn commands_before_start_are_state_errors() {
    let (controller, _events) = controller();
    assert_eq!(controller.stop(), Err(ControlError::State(StateError::NotRunning)));
    assert_eq!(controller.pause(), Err(ControlError::State(StateError::NotRunning)));
    assert_eq!(controller.phase(), RunPhase::Idle);
    assert_eq!(controller.status().active_workers, 0);
}

#[test]
fn second_start_is_rejected() {
    let (controller, _events) = controller();
    controller
        .start(run_config(1, false, RunDuration::Unbounded))
        .unwrap();
    assert!(matches!(
        controller.start(run_config(1, false, RunDuration::Unbounded)),
        Err(ControlError::State(StateError::AlreadyStarted(RunPhase::Running)))
    ));
}

#[test]
fn paused_time_is_excluded_from_active_time() {
    let (controller, _events) = controller();
    controller
        .start(run_config(2, false, RunDuration::Unbounded))
        .unwrap();
    thread::sleep(Duration::from_millis(100));

    controller.pause().unwrap();
    assert_eq!(controller.phase(), RunPhase::Paused);
    let frozen = controller.status().run.elapsed_active;
    thread::sleep(Duration::from_millis(300));
    assert_eq!(controller.status().run.elapsed_active, frozen);
    assert!(controller.status().run.paused_at.is_some());

    controller.resume().unwrap();
    thread::sleep(Duration::from_millis(100));
    let StopOutcome::Finished(report) = controller.stop().unwrap() else {
        panic!("stop must finish the run");
    };
    assert!(report.elapsed_active >= Duration::from_millis(200));
    assert!(report.elapsed_active < Duration::from_millis(450));
}

#[test]
fn pause_is_rejected_twice_and_resume_needs_a_pause() {
    let (controller, _events) = controller();
    controller
        .start(run_config(1, false, RunDuration::Unbounded))
        .unwrap();
    assert_eq!(
        controller.resume(),
        Err(ControlError::State(StateError::NotPaused(RunPhase::Running)))
    );
    controller.pause().unwrap();
    assert!(controller.pause().is_err());
    assert_eq!(controller.toggle_pause(), Ok(RunPhase::Running));
    assert_eq!(controller.toggle_pause(), Ok(RunPhase::Paused));
    controller.stop().unwrap();
}

#[test]
fn stop_from_paused_finishes() {
    let (controller, _events) = controller();
    controller
        .start(run_config(2, true, RunDuration::Unbounded))
        .unwrap();
    controller.pause().unwrap();
    assert!(matches!(controller.stop(), Ok(StopOutcome::Finished(_))));
    assert_eq!(controller.phase(), RunPhase::Finished);
}

#[test]
fn duration_expiry_stops_the_run() {
    let (controller, events) = controller();
    controller
        .start(run_config(2, false, RunDuration::Bounded(1)))
        .unwrap();
    let report = controller
        .wait(Duration::from_secs(5))
        .expect("the watchdog should finish the run");
    assert_eq!(controller.phase(), RunPhase::Finished);
    assert!(report.elapsed_active >= Duration::from_secs(1));
    assert!(report.elapsed_active < Duration::from_millis(1500));
    assert_eq!(controller.stop(), Err(ControlError::State(StateError::Finished)));
    assert!(events
        .try_iter()
        .any(|e| matches!(e, RunEvent::DurationElapsed(_))));
}

#[test]
fn status_tracks_the_run() {
    let (controller, _events) = controller();
    controller
        .start(run_config(3, false, RunDuration::Unbounded))
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || {
        let status = controller.status();
        status.latest_sample.is_some() && status.current_bytes == status.target_bytes
    }));
    let status = controller.status();
    assert_eq!(status.run.phase, RunPhase::Running);
    assert_eq!(status.active_workers, 3);
    assert_eq!(status.configured_workers, 3);
    assert!(controller
        .worker_records()
        .iter()
        .all(|r| r.state.is_live()));

    controller.stop().unwrap();
    let status = controller.status();
    assert_eq!(status.active_workers, 0);
    assert_eq!(status.current_bytes, 0);
    assert!(!controller.history().is_empty());
    assert!(controller.worker_records().is_empty());
}

#[test]
fn concurrent_stops_finish_the_run_once() {
    let (controller, events) = lingering_controller();
    controller
        .start(run_config(2, true, RunDuration::Unbounded))
        .unwrap();

    let barrier = Barrier::new(4);
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    controller.stop()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let finished = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(StopOutcome::Finished(_))))
        .count();
    let already = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(StopOutcome::AlreadyStopping)))
        .count();
    assert_eq!(finished, 1, "{outcomes:?}");
    assert_eq!(already, 3, "{outcomes:?}");
    assert_eq!(controller.phase(), RunPhase::Finished);
    assert_eq!(finished_events(&events), 1);
}

#[test]
fn user_stop_during_duration_stop_is_absorbed() {
    let (controller, events) = lingering_controller();
    controller
        .start(run_config(2, false, RunDuration::Bounded(1)))
        .unwrap();

    assert!(eventually(Duration::from_secs(3), || {
        controller.phase() == RunPhase::Stopping
    }));
    assert_eq!(controller.stop(), Ok(StopOutcome::AlreadyStopping));

    let report = controller
        .wait(Duration::from_secs(5))
        .expect("the watchdog should finish the run");
    assert!(report.elapsed_active >= Duration::from_secs(1));
    assert_eq!(controller.phase(), RunPhase::Finished);
    assert_eq!(finished_events(&events), 1);
}

#[test]
fn racing_pause_and_resume_leave_workers_matching_the_phase() {
    let spawner = Arc::new(RecordingSpawner::default());
    let (controller, _events) = RunController::new(
        EngineConfig::fast(),
        Arc::new(ScriptedSource::idle_host()),
        Arc::clone(&spawner) as Arc<dyn WorkerSpawner>,
    );
    controller
        .start(run_config(3, false, RunDuration::Unbounded))
        .unwrap();

    let barrier = Barrier::new(2);
    thread::scope(|scope| {
        scope.spawn(|| {
            barrier.wait();
            for _ in 0..200 {
                let _ = controller.pause();
            }
        });
        scope.spawn(|| {
            barrier.wait();
            for _ in 0..200 {
                let _ = controller.resume();
            }
        });
    });

    let expected = match controller.phase() {
        RunPhase::Paused => Some(WorkerSignal::Pause),
        RunPhase::Running => Some(WorkerSignal::Resume),
        other => panic!("unexpected phase {other:?}"),
    };
    let signals = spawner.last_signals();
    assert_eq!(signals.len(), 3);
    // A resume that never followed a pause leaves the workers untouched.
    assert!(
        signals
            .iter()
            .all(|s| *s == expected || (expected == Some(WorkerSignal::Resume) && s.is_none())),
        "{signals:?}"
    );
    controller.stop().unwrap();
}
