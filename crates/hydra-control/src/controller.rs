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


//! The run controller: the state machine that owns a stress run.
//!
//! `start` validates the configuration against one live reading of the host,
//! fixes the memory safety ceiling for the run, and brings up the sampler,
//! memory stressor and worker supervisor. A watchdog thread ends the run once
//! its active time reaches the configured duration. `stop` shuts everything
//! down in order, evaluates the run and moves it to `Finished`.

use crate::config::EngineConfig;
use crate::evaluation::{Evaluator, RunSnapshot};
use crate::memory::{MemoryGauge, MemoryStressor};
use crate::workers::{SpawnReport, SupervisorHandle, WorkerCounters, WorkerSupervisor};
use crossbeam_channel::Receiver;
use hydra_core::config::safety_ceiling;
use hydra_core::{
    ConfigError, ConfigWarning, ControlError, EvaluationReport, EventSink, RunConfig, RunDuration, RunEvent,
    RunPhase, RunState, ServiceThread, StateError, StatusSnapshot, SystemStats, TelemetrySource,
    WorkerId, WorkerRecord, WorkerSpawner, MIB,
};
use hydra_telemetry::{SamplerHandle, TelemetrySampler};
use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

/// What a successful `start` reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct StartReport {
    /// Advisories raised by validation.
    pub warnings: Vec<ConfigWarning>,
    /// Outcome of the initial worker spawn.
    pub spawn: SpawnReport,
    /// The memory ceiling fixed for this run.
    pub ceiling_bytes: u64,
}

/// Result of a `stop` request.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// This call stopped the run; here is its report.
    Finished(Box<EvaluationReport>),
    /// Another stop (or the duration watchdog) is already shutting the run down.
    AlreadyStopping,
}

/// The live components of a running run.
struct ActiveRun {
    sampler: TelemetrySampler,
    memory: MemoryStressor,
    supervisor: SupervisorHandle,
    logical_cpus: usize,
}

/// Lock-free views used by `status`.
#[derive(Clone)]
struct StatusViews {
    sampler: SamplerHandle,
    memory: MemoryGauge,
    workers: Arc<WorkerCounters>,
}

struct Inner {
    engine: EngineConfig,
    source: Arc<dyn TelemetrySource>,
    spawner: Arc<dyn WorkerSpawner>,
    events: EventSink,
    state: Mutex<RunState>,
    config: RwLock<Option<RunConfig>>,
    active: Mutex<Option<ActiveRun>>,
    views: RwLock<Option<StatusViews>>,
    watchdog: Mutex<Option<ServiceThread>>,
    report: Mutex<Option<EvaluationReport>>,
    finished: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn start(self: &Arc<Self>, config: RunConfig) -> Result<StartReport, ControlError> {
        let mut state = lock(&self.state);
        match state.phase() {
            RunPhase::Idle => {}
            RunPhase::Finished => return Err(StateError::Finished.into()),
            other => return Err(StateError::AlreadyStarted(other).into()),
        }

        let stats = self.source.read_system_stats();
        let margin = self.engine.memory.safety_margin;
        let warnings = config.validate(&stats, margin)?;
        let ceiling_bytes = safety_ceiling(&stats, margin);
        for warning in &warnings {
            log::warn!("RunController: {warning}.");
            self.events.emit(RunEvent::Advisory(warning.to_string()));
        }

        let mut sampler =
            TelemetrySampler::new(self.engine.sampler, Arc::clone(&self.source), self.events.clone());
        sampler
            .start(config.sample_interval())
            .map_err(|err| ControlError::service("sampler", err))?;

        let mut memory = MemoryStressor::new(self.engine.memory, self.events.clone());
        memory
            .start(config.target_memory_bytes, ceiling_bytes)
            .map_err(|err| ControlError::service("memory stressor", err))?;

        let supervisor = WorkerSupervisor::new(
            self.engine.supervisor,
            Arc::clone(&self.spawner),
            self.events.clone(),
        )
        .start(&config)?;
        let spawn = supervisor.spawn_report().clone();

        *self.views.write().unwrap_or_else(PoisonError::into_inner) = Some(StatusViews {
            sampler: sampler.handle(),
            memory: memory.gauge(),
            workers: supervisor.counters(),
        });
        *lock(&self.active) = Some(ActiveRun {
            sampler,
            memory,
            supervisor,
            logical_cpus: stats.logical_cpus,
        });
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        state.start(Instant::now())?;
        drop(state);

        if let Err(err) = self.spawn_watchdog() {
            log::error!("RunController: {err}; stopping the run.");
            let _ = self.stop();
            return Err(err);
        }

        log::info!(
            "RunController: run started ({} workers, {} MiB target, duration {}).",
            spawn.spawned,
            config.target_memory_bytes / MIB,
            config.duration_seconds
        );
        self.events.emit(RunEvent::Started {
            workers: spawn.spawned,
            hydra_mode: config.hydra_mode,
        });
        Ok(StartReport {
            warnings,
            spawn,
            ceiling_bytes,
        })
    }

    fn spawn_watchdog(self: &Arc<Self>) -> Result<(), ControlError> {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let service = ServiceThread::spawn("hydra-watchdog", self.engine.control_tick, move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            inner.watch()
        })
        .map_err(|err| ControlError::service("watchdog", err))?;
        *lock(&self.watchdog) = Some(service);
        Ok(())
    }

    /// One watchdog tick: stops the run once its duration has elapsed.
    fn watch(&self) -> ControlFlow<()> {
        let Some(duration) = self.run_config().map(|c| c.duration_seconds) else {
            return ControlFlow::Continue(());
        };
        if duration == RunDuration::Unbounded {
            return ControlFlow::Continue(());
        }
        let (phase, elapsed) = {
            let state = lock(&self.state);
            (state.phase(), state.elapsed_active(Instant::now()))
        };
        match phase {
            RunPhase::Running if duration.is_expired(elapsed) => {
                log::info!(
                    "RunController: duration of {} reached; stopping.",
                    duration
                );
                self.events.emit(RunEvent::DurationElapsed(elapsed));
                if let Err(err) = self.stop() {
                    log::debug!("RunController: watchdog stop rejected: {err}");
                }
                ControlFlow::Break(())
            }
            RunPhase::Running | RunPhase::Paused => ControlFlow::Continue(()),
            _ => ControlFlow::Break(()),
        }
    }

    fn run_config(&self) -> Option<RunConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pause(&self) -> Result<(), ControlError> {
        // The state guard is held across the signalling so a racing resume
        // cannot interleave with it.
        let mut state = lock(&self.state);
        state.pause(Instant::now())?;
        if let Some(run) = lock(&self.active).as_ref() {
            run.supervisor.pause();
            run.memory.pause();
        }
        drop(state);
        log::info!("RunController: paused.");
        self.events.emit(RunEvent::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<(), ControlError> {
        let mut state = lock(&self.state);
        state.resume(Instant::now())?;
        if let Some(run) = lock(&self.active).as_ref() {
            run.memory.resume();
            run.supervisor.resume();
        }
        drop(state);
        log::info!("RunController: resumed.");
        self.events.emit(RunEvent::Resumed);
        Ok(())
    }

    fn stop(&self) -> Result<StopOutcome, ControlError> {
        let elapsed_active = {
            let mut state = lock(&self.state);
            if state.phase() == RunPhase::Idle {
                return Err(StateError::NotRunning.into());
            }
            let now = Instant::now();
            if !state.begin_stop(now)? {
                return Ok(StopOutcome::AlreadyStopping);
            }
            state.elapsed_active(now)
        };
        log::info!("RunController: stopping after {:.1}s of active time.", elapsed_active.as_secs_f64());

        // Stops the watchdog; a no-op join when the watchdog itself is stopping the run.
        if let Some(mut watchdog) = lock(&self.watchdog).take() {
            watchdog.stop();
        }

        let active = lock(&self.active).take();
        let config = self.run_config();
        let report = match (active, config) {
            (Some(run), Some(config)) => self.shut_down(run, config, elapsed_active),
            _ => return Err(StateError::NotRunning.into()),
        };

        if let Err(err) = lock(&self.state).finish() {
            log::error!("RunController: could not finish the run: {err}");
        }
        log::info!(
            "RunController: finished. Stability {:.0}, score {:.0}.",
            report.stability_score,
            report.overall_stress_score
        );
        self.events.emit(RunEvent::Finished {
            stability_score: report.stability_score,
            overall_stress_score: report.overall_stress_score,
        });
        *lock(&self.report) = Some(report.clone());
        self.finished.notify_all();
        Ok(StopOutcome::Finished(Box::new(report)))
    }

    fn shut_down(&self, run: ActiveRun, config: RunConfig, elapsed_active: Duration) -> EvaluationReport {
        let ActiveRun {
            mut sampler,
            mut memory,
            mut supervisor,
            logical_cpus,
        } = run;

        sampler.stop();
        let shutdown = supervisor.stop();
        if !shutdown.forced.is_empty() {
            log::warn!(
                "RunController: {} workers had to be forced down.",
                shutdown.forced.len()
            );
        }
        let peak_memory_bytes = memory.state().peak_bytes;
        if !memory.stop() {
            log::warn!("RunController: memory release timed out.");
        }

        let snapshot = RunSnapshot {
            records: supervisor.poll(),
            thermal: sampler.thermal_summary(),
            mean_cpu_percent: sampler.handle().mean_cpu(),
            peak_memory_bytes: Some(peak_memory_bytes),
            elapsed_active,
            spawn_shortfall: supervisor.spawn_report().shortfall(),
            logical_cpus,
            config,
        };
        Evaluator::new(self.engine.evaluator).evaluate(&snapshot)
    }

    fn status(&self) -> StatusSnapshot {
        let run = lock(&self.state).status(Instant::now());
        let configured_workers = self.run_config().map_or(0, |c| c.worker_count);
        let views = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match views {
            Some(views) => StatusSnapshot {
                run,
                latest_sample: views.sampler.latest(),
                active_workers: views.workers.active(),
                configured_workers,
                current_bytes: views.memory.current_bytes(),
                target_bytes: views.memory.target_bytes(),
            },
            None => StatusSnapshot {
                run,
                latest_sample: None,
                active_workers: 0,
                configured_workers,
                current_bytes: 0,
                target_bytes: 0,
            },
        }
    }
}

/// Owns one stress run from `Idle` to `Finished`.
///
/// A controller runs exactly once; a new run needs a new controller.
/// Dropping a controller whose run is still active stops it.
pub struct RunController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("phase", &self.phase())
            .field("backend", &self.inner.spawner.backend_name())
            .finish()
    }
}

impl RunController {
    /// Creates an idle controller and the receiving end of its event stream.
    pub fn new(
        engine: EngineConfig,
        source: Arc<dyn TelemetrySource>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> (Self, Receiver<RunEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(engine.event_buffer_size.max(1));
        let inner = Arc::new(Inner {
            engine,
            source,
            spawner,
            events: EventSink::new(tx),
            state: Mutex::new(RunState::new()),
            config: RwLock::new(None),
            active: Mutex::new(None),
            views: RwLock::new(None),
            watchdog: Mutex::new(None),
            report: Mutex::new(None),
            finished: Condvar::new(),
        });
        (Self { inner }, rx)
    }

    /// Validates `config` against a live reading of the host without starting anything.
    pub fn preflight(&self, config: &RunConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
        let stats = self.inner.source.read_system_stats();
        config.validate(&stats, self.inner.engine.memory.safety_margin)
    }

    /// One reading of the telemetry source.
    pub fn probe(&self) -> SystemStats {
        self.inner.source.read_system_stats()
    }

    /// `Idle → Running`.
    ///
    /// A [`ConfigError`] leaves the controller `Idle` with nothing started.
    pub fn start(&self, config: RunConfig) -> Result<StartReport, ControlError> {
        self.inner.start(config)
    }

    /// `Running → Paused`: workers idle, memory frozen, clock stopped.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.inner.pause()
    }

    /// `Paused → Running`.
    pub fn resume(&self) -> Result<(), ControlError> {
        self.inner.resume()
    }

    /// Pauses a running run or resumes a paused one. Returns the new phase.
    pub fn toggle_pause(&self) -> Result<RunPhase, ControlError> {
        match self.phase() {
            RunPhase::Paused => self.resume().map(|()| RunPhase::Running),
            _ => self.pause().map(|()| RunPhase::Paused),
        }
    }

    /// `Running | Paused → Stopping → Finished`, evaluating the run.
    ///
    /// Blocks until every component has shut down or been forced down.
    pub fn stop(&self) -> Result<StopOutcome, ControlError> {
        self.inner.stop()
    }

    /// Waits up to `timeout` for the run to finish, by any means.
    pub fn wait(&self, timeout: Duration) -> Option<EvaluationReport> {
        let guard = lock(&self.inner.report);
        let (guard, _) = self
            .inner
            .finished
            .wait_timeout_while(guard, timeout, |report| report.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// The report, once `Finished`.
    pub fn report(&self) -> Option<EvaluationReport> {
        lock(&self.inner.report).clone()
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        lock(&self.inner.state).phase()
    }

    /// Read-only status projection. Never waits on workers.
    pub fn status(&self) -> StatusSnapshot {
        self.inner.status()
    }

    /// The configuration of the current run, once started.
    pub fn config(&self) -> Option<RunConfig> {
        self.inner.run_config()
    }

    /// Snapshot of the telemetry history, oldest first.
    pub fn history(&self) -> Vec<hydra_core::TelemetrySample> {
        self.inner
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|v| v.sampler.history())
            .unwrap_or_default()
    }

    /// Snapshot of the worker records while the run is active.
    pub fn worker_records(&self) -> Vec<WorkerRecord> {
        lock(&self.inner.active)
            .as_ref()
            .map(|run| run.supervisor.poll())
            .unwrap_or_default()
    }

    /// IDs of the workers currently alive.
    pub fn live_workers(&self) -> Vec<WorkerId> {
        lock(&self.inner.active)
            .as_ref()
            .map(|run| run.supervisor.live_workers())
            .unwrap_or_default()
    }

    /// Kills a worker from outside the stop sequence, for fault injection.
    pub fn kill_worker(&self, id: WorkerId) -> bool {
        lock(&self.inner.active)
            .as_ref()
            .is_some_and(|run| run.supervisor.kill_worker(id))
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if self.phase().is_active() {
            log::debug!("RunController: dropped while active; stopping.");
            let _ = self.stop();
        }
    }
}
