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


//! The worker supervisor and Hydra Mode.
//!
//! The supervisor owns every [`WorkerRecord`] of a run. A supervision thread
//! checks liveness once per tick; a worker found dead outside a stop sequence
//! is recorded as an unexpected termination and, in Hydra Mode, replaced in
//! the same tick by a fresh worker occupying the same slot.

use crate::config::SupervisorConfig;
use hydra_core::{
    ConfigError, ControlError, DutyCycle, EventSink, RunConfig, RunEvent, ServiceThread, WorkerId,
    WorkerRecord, WorkerSignal, WorkerSpawner, WorkerState, WorkerUnit,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the wait for workers to exit during a stop.
const EXIT_POLL: Duration = Duration::from_millis(5);

/// Outcome of the initial spawn of a run's workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnReport {
    /// Workers the run asked for.
    pub requested: usize,
    /// Workers that actually started.
    pub spawned: usize,
    /// Why the missing ones did not.
    pub failures: Vec<String>,
}

impl SpawnReport {
    /// Workers that never started.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.spawned)
    }
}

/// Outcome of [`SupervisorHandle::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Workers that exited within the grace period.
    pub stopped: usize,
    /// Workers that had to be forcibly terminated.
    pub forced: Vec<WorkerId>,
}

/// Live counters of a supervised run, readable without touching the roster.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    active: AtomicUsize,
    unexpected: AtomicU32,
    respawns: AtomicU32,
}

impl WorkerCounters {
    /// Workers currently alive, as of the last supervision pass.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Unexpected exits so far.
    pub fn unexpected_terminations(&self) -> u32 {
        self.unexpected.load(Ordering::Acquire)
    }

    /// Hydra Mode replacements so far.
    pub fn respawns(&self) -> u32 {
        self.respawns.load(Ordering::Acquire)
    }
}

struct Worker {
    record: usize,
    unit: Box<dyn WorkerUnit>,
}

#[derive(Default)]
struct Roster {
    records: Vec<WorkerRecord>,
    live: Vec<Worker>,
    next_id: u64,
    paused: bool,
    stopping: bool,
}

impl Roster {
    fn allocate_id(&mut self) -> WorkerId {
        self.next_id += 1;
        WorkerId(self.next_id)
    }

    fn find_live(&mut self, id: WorkerId) -> Option<&mut Worker> {
        let records = &self.records;
        self.live
            .iter_mut()
            .find(|w| records[w.record].worker_id == id)
    }
}

struct Shared {
    roster: Mutex<Roster>,
    spawner: Arc<dyn WorkerSpawner>,
    duty: DutyCycle,
    interval: Duration,
    hydra_mode: bool,
    events: EventSink,
    counters: Arc<WorkerCounters>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One supervision pass. At most one replacement per slot per pass.
    fn supervise(&self) {
        let mut guard = self.lock();
        let roster = &mut *guard;
        if roster.stopping {
            return;
        }
        let now = Instant::now();
        let mut index = 0;
        while index < roster.live.len() {
            let worker = &mut roster.live[index];
            if worker.unit.is_alive() {
                let record = &mut roster.records[worker.record];
                if record.state == WorkerState::Starting {
                    record.state = WorkerState::Running;
                }
                index += 1;
                continue;
            }

            let worker = roster.live.remove(index);
            let predecessor = self.record_unexpected_exit(roster, worker.record);
            drop(worker);
            if self.hydra_mode {
                if let Some(replacement) = self.respawn(roster, &predecessor, now) {
                    roster.live.insert(index, replacement);
                    index += 1;
                }
            }
        }
    }

    fn record_unexpected_exit(&self, roster: &mut Roster, record: usize) -> WorkerRecord {
        let record = &mut roster.records[record];
        record.state = WorkerState::TerminatedUnexpected;
        record.termination_count += 1;
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        self.counters.unexpected.fetch_add(1, Ordering::AcqRel);

        log::warn!(
            "Supervisor: {} (slot {}) exited unexpectedly ({} in this slot).",
            record.worker_id,
            record.slot,
            record.termination_count
        );
        self.events.emit(RunEvent::WorkerTerminated {
            worker_id: record.worker_id,
            slot: record.slot,
            termination_count: record.termination_count,
        });
        record.clone()
    }

    fn respawn(&self, roster: &mut Roster, predecessor: &WorkerRecord, now: Instant) -> Option<Worker> {
        let id = roster.allocate_id();
        match self.spawner.spawn(id, self.duty, self.interval) {
            Ok(mut unit) => {
                if roster.paused {
                    unit.signal(WorkerSignal::Pause);
                }
                roster
                    .records
                    .push(WorkerRecord::replacement(id, predecessor, now));
                self.counters.active.fetch_add(1, Ordering::AcqRel);
                self.counters.respawns.fetch_add(1, Ordering::AcqRel);
                log::info!(
                    "Hydra: Respawned slot {} ({} -> {}).",
                    predecessor.slot,
                    predecessor.worker_id,
                    id
                );
                self.events.emit(RunEvent::WorkerRespawned {
                    previous: predecessor.worker_id,
                    replacement: id,
                    slot: predecessor.slot,
                });
                Some(Worker {
                    record: roster.records.len() - 1,
                    unit,
                })
            }
            Err(err) => {
                log::warn!(
                    "Hydra: could not respawn slot {}: {}. The slot stays empty.",
                    predecessor.slot,
                    err
                );
                self.events.emit(RunEvent::Advisory(format!(
                    "respawn of slot {} failed: {err}",
                    predecessor.slot
                )));
                None
            }
        }
    }
}

/// Spawns and supervises the CPU-load workers of a run.
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    spawner: Arc<dyn WorkerSpawner>,
    events: EventSink,
}

impl WorkerSupervisor {
    /// Creates a supervisor using `spawner` as its worker backend.
    pub fn new(config: SupervisorConfig, spawner: Arc<dyn WorkerSpawner>, events: EventSink) -> Self {
        Self {
            config,
            spawner,
            events,
        }
    }

    /// Spawns `run.worker_count` workers and starts supervising them.
    ///
    /// Workers that fail to spawn only lower the active count; see
    /// [`SupervisorHandle::spawn_report`].
    pub fn start(&self, run: &RunConfig) -> Result<SupervisorHandle, ControlError> {
        if run.worker_count == 0 {
            return Err(ConfigError::NoWorkers.into());
        }
        let duty = run.duty()?;
        let shared = Arc::new(Shared {
            roster: Mutex::new(Roster::default()),
            spawner: Arc::clone(&self.spawner),
            duty,
            interval: self.config.duty_interval,
            hydra_mode: run.hydra_mode,
            events: self.events.clone(),
            counters: Arc::new(WorkerCounters::default()),
        });

        let mut report = SpawnReport {
            requested: run.worker_count,
            ..SpawnReport::default()
        };
        {
            let mut roster = shared.lock();
            let now = Instant::now();
            for slot in 0..run.worker_count {
                let id = roster.allocate_id();
                match self.spawner.spawn(id, duty, self.config.duty_interval) {
                    Ok(unit) => {
                        roster.records.push(WorkerRecord::spawned(id, slot, now));
                        let record = roster.records.len() - 1;
                        roster.live.push(Worker { record, unit });
                        report.spawned += 1;
                    }
                    Err(err) => {
                        log::warn!("Supervisor: failed to spawn {id} for slot {slot}: {err}");
                        report.failures.push(err.to_string());
                    }
                }
            }
            shared.counters.active.store(report.spawned, Ordering::Release);
        }

        if report.shortfall() > 0 {
            log::warn!(
                "Supervisor: only {} of {} workers started; continuing with a reduced count.",
                report.spawned,
                report.requested
            );
            self.events.emit(RunEvent::SpawnShortfall {
                requested: report.requested,
                spawned: report.spawned,
            });
        }
        log::info!(
            "Supervisor: {} {} workers at {:.0}% duty (hydra mode {}).",
            report.spawned,
            self.spawner.backend_name(),
            duty.get() * 100.0,
            if run.hydra_mode { "on" } else { "off" }
        );

        let mut handle = SupervisorHandle {
            shared,
            service: None,
            config: self.config,
            report,
        };
        let tick_shared = Arc::clone(&handle.shared);
        let service = ServiceThread::spawn("hydra-supervisor", self.config.tick, move || {
            tick_shared.supervise();
            ControlFlow::Continue(())
        })
        .map_err(|err| ControlError::service("supervisor", err))?;
        handle.service = Some(service);
        Ok(handle)
    }
}

/// A running set of supervised workers.
///
/// Dropping the handle stops the workers.
pub struct SupervisorHandle {
    shared: Arc<Shared>,
    service: Option<ServiceThread>,
    config: SupervisorConfig,
    report: SpawnReport,
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("active", &self.active_count())
            .field("hydra_mode", &self.shared.hydra_mode)
            .field("report", &self.report)
            .finish()
    }
}

impl SupervisorHandle {
    /// Outcome of the initial spawn.
    pub fn spawn_report(&self) -> &SpawnReport {
        &self.report
    }

    /// Shared counters, valid after the handle is gone.
    pub fn counters(&self) -> Arc<WorkerCounters> {
        Arc::clone(&self.shared.counters)
    }

    /// Workers currently alive, as of the last supervision pass.
    pub fn active_count(&self) -> usize {
        self.shared.counters.active()
    }

    /// Unexpected exits so far.
    pub fn unexpected_terminations(&self) -> u32 {
        self.shared.counters.unexpected_terminations()
    }

    /// Hydra Mode replacements so far.
    pub fn respawns(&self) -> u32 {
        self.shared.counters.respawns()
    }

    /// Snapshot of every record of the run, in creation order.
    pub fn poll(&self) -> Vec<WorkerRecord> {
        self.shared.lock().records.clone()
    }

    /// IDs of the workers currently considered alive.
    pub fn live_workers(&self) -> Vec<WorkerId> {
        let roster = self.shared.lock();
        roster
            .live
            .iter()
            .map(|w| roster.records[w.record].worker_id)
            .collect()
    }

    /// Runs one supervision pass immediately, outside the regular tick.
    pub fn supervise_now(&self) {
        self.shared.supervise();
    }

    /// Puts every worker into indefinite idle-sleep.
    pub fn pause(&self) {
        self.broadcast(WorkerSignal::Pause, true);
    }

    /// Brings paused workers back to their duty cycle.
    pub fn resume(&self) {
        self.broadcast(WorkerSignal::Resume, false);
    }

    fn broadcast(&self, signal: WorkerSignal, paused: bool) {
        let mut roster = self.shared.lock();
        roster.paused = paused;
        let delivered = roster
            .live
            .iter_mut()
            .map(|w| w.unit.signal(signal))
            .filter(|sent| *sent)
            .count();
        log::debug!("Supervisor: '{}' delivered to {} workers.", signal.as_str(), delivered);
    }

    /// Kills a worker from outside the stop sequence, as an OS or user would.
    ///
    /// Returns `false` if no live worker has this ID.
    pub fn kill_worker(&self, id: WorkerId) -> bool {
        let mut roster = self.shared.lock();
        match roster.find_live(id) {
            Some(worker) => {
                log::info!("Supervisor: killing {} on request.", worker.unit.describe());
                worker.unit.terminate();
                true
            }
            None => false,
        }
    }

    /// Stops supervision and every worker.
    ///
    /// Each worker gets the configured grace period to exit after the stop
    /// signal; stragglers are forcibly terminated. Calling it again is a no-op.
    pub fn stop(&mut self) -> ShutdownSummary {
        let mut live = {
            let mut roster = self.shared.lock();
            if roster.stopping {
                return ShutdownSummary::default();
            }
            roster.stopping = true;
            std::mem::take(&mut roster.live)
        };
        if let Some(mut service) = self.service.take() {
            service.stop();
        }

        let mut died_before_stop = Vec::new();
        let mut signalled = Vec::new();
        for mut worker in live.drain(..) {
            if worker.unit.is_alive() {
                worker.unit.signal(WorkerSignal::Stop);
                signalled.push(worker);
            } else {
                died_before_stop.push(worker.record);
            }
        }

        let deadline = Instant::now() + self.config.stop_grace;
        let mut summary = ShutdownSummary::default();
        let mut exited = Vec::new();
        let mut forced = Vec::new();
        for mut worker in signalled {
            while worker.unit.is_alive() && Instant::now() < deadline {
                thread::sleep(EXIT_POLL);
            }
            if worker.unit.is_alive() {
                worker.unit.terminate();
                forced.push(worker.record);
            } else {
                exited.push(worker.record);
            }
        }

        let mut roster = self.shared.lock();
        for record in died_before_stop {
            self.shared.record_unexpected_exit(&mut roster, record);
        }
        for record in exited {
            roster.records[record].state = WorkerState::TerminatedExpected;
            summary.stopped += 1;
        }
        for record in forced {
            let record = &mut roster.records[record];
            record.state = WorkerState::TerminatedExpected;
            record.forced_termination = true;
            summary.forced.push(record.worker_id);
        }
        drop(roster);
        self.shared.counters.active.store(0, Ordering::Release);

        if summary.forced.is_empty() {
            log::info!("Supervisor: {} workers stopped.", summary.stopped);
        } else {
            let detail = format!(
                "{} of {} workers did not exit within {:?} and were forcibly terminated",
                summary.forced.len(),
                summary.stopped + summary.forced.len(),
                self.config.stop_grace
            );
            log::warn!("Supervisor: {detail}.");
            self.shared.events.emit(RunEvent::ShutdownTimeout {
                component: "supervisor",
                detail,
            });
        }
        summary
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
