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

//! The telemetry sampler service.

use crate::history::SampleHistory;
use crate::sensors::SensorTracker;
use crate::trend::TrendDetector;
use hydra_core::{
    EventSink, RunEvent, ServiceThread, TelemetrySample, TelemetrySource, ThermalSummary, Trend,
};
use serde::Deserialize;
use std::io;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Tuning for the [`TelemetrySampler`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Maximum number of retained samples (an hour at 1 Hz).
    pub history_capacity: usize,
    /// Samples per trend window.
    pub trend_window: usize,
    /// Temperature difference (°C) inside which the trend is stable.
    pub trend_tolerance: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 3600,
            trend_window: 10,
            trend_tolerance: 1.5,
        }
    }
}

#[derive(Debug)]
struct SamplerState {
    history: SampleHistory,
    sensors: SensorTracker,
}

/// Cheap, clonable read access to the sampler's state.
///
/// Reads take a shared lock that the sampler only holds for the duration of
/// a single push, so they never wait on a poll of the telemetry source.
#[derive(Debug, Clone)]
pub struct SamplerHandle {
    state: Arc<RwLock<SamplerState>>,
    detector: TrendDetector,
}

impl SamplerHandle {
    fn read(&self) -> RwLockReadGuard<'_, SamplerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SamplerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.read().history.latest().copied()
    }

    /// Snapshot of the retained history, oldest first.
    pub fn history(&self) -> Vec<TelemetrySample> {
        self.read().history.to_vec()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.read().history.len()
    }

    /// Returns `true` before the first sample.
    pub fn is_empty(&self) -> bool {
        self.read().history.is_empty()
    }

    /// Hottest aggregate temperature of the run.
    pub fn peak_temperature(&self) -> Option<f32> {
        self.read().history.peak_temperature()
    }

    /// Mean CPU utilisation over the run.
    pub fn mean_cpu(&self) -> Option<f64> {
        self.read().history.mean_cpu()
    }

    /// Current thermal trend.
    pub fn trend(&self) -> Trend {
        let temperatures = self.read().history.temperatures();
        self.detector.classify(&temperatures)
    }

    /// Thermal summary of the run so far.
    pub fn thermal_summary(&self) -> ThermalSummary {
        let state = self.read();
        let temperatures = state.history.temperatures();
        let peak = state.history.peak_temperature();
        let initial = state.history.initial_temperature();
        ThermalSummary {
            peak_celsius: peak,
            mean_celsius: state.history.mean_temperature(),
            initial_celsius: initial,
            delta_celsius: peak.zip(initial).map(|(p, i)| p - i),
            trend: self.detector.classify(&temperatures),
            peak_status: state.sensors.peak_status(),
            sensor_peaks: state.sensors.peaks(),
            sample_count: state.history.temperature_sample_count(),
        }
    }
}

/// Polls a [`TelemetrySource`] on a fixed interval and owns the sample history.
#[derive(Debug)]
pub struct TelemetrySampler {
    source: Arc<dyn TelemetrySource>,
    handle: SamplerHandle,
    events: EventSink,
    epoch: Instant,
    service: Option<ServiceThread>,
}

impl TelemetrySampler {
    /// Creates an idle sampler. Timestamps are measured from this call.
    pub fn new(config: SamplerConfig, source: Arc<dyn TelemetrySource>, events: EventSink) -> Self {
        let state = SamplerState {
            history: SampleHistory::new(config.history_capacity),
            sensors: SensorTracker::new(),
        };
        Self {
            source,
            handle: SamplerHandle {
                state: Arc::new(RwLock::new(state)),
                detector: TrendDetector::new(config.trend_window, config.trend_tolerance),
            },
            events,
            epoch: Instant::now(),
            service: None,
        }
    }

    /// Read-only view that stays valid after the sampler is stopped.
    pub fn handle(&self) -> SamplerHandle {
        self.handle.clone()
    }

    /// Starts sampling every `interval` on a dedicated thread.
    pub fn start(&mut self, interval: Duration) -> io::Result<()> {
        if self.service.as_ref().is_some_and(ServiceThread::is_running) {
            return Ok(());
        }
        let source = Arc::clone(&self.source);
        let handle = self.handle.clone();
        let events = self.events.clone();
        let epoch = self.epoch;
        self.service = Some(ServiceThread::spawn(
            "hydra-sampler",
            interval,
            move || {
                record(&*source, &handle, &events, epoch);
                ControlFlow::Continue(())
            },
        )?);
        log::debug!("Sampler: started with a {:?} interval.", interval);
        Ok(())
    }

    /// Stops the sampling thread. The history remains readable.
    pub fn stop(&mut self) {
        if let Some(mut service) = self.service.take() {
            service.stop();
            log::debug!("Sampler: stopped after {} samples.", self.handle.len());
        }
    }

    /// Returns `true` while the sampling thread runs.
    pub fn is_running(&self) -> bool {
        self.service.as_ref().is_some_and(ServiceThread::is_running)
    }

    /// Takes one sample immediately and records it.
    pub fn sample(&self) -> TelemetrySample {
        record(&*self.source, &self.handle, &self.events, self.epoch)
    }

    /// See [`SamplerHandle::latest`].
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.handle.latest()
    }

    /// See [`SamplerHandle::history`].
    pub fn history(&self) -> Vec<TelemetrySample> {
        self.handle.history()
    }

    /// See [`SamplerHandle::peak_temperature`].
    pub fn peak_temperature(&self) -> Option<f32> {
        self.handle.peak_temperature()
    }

    /// See [`SamplerHandle::trend`].
    pub fn trend(&self) -> Trend {
        self.handle.trend()
    }

    /// See [`SamplerHandle::thermal_summary`].
    pub fn thermal_summary(&self) -> ThermalSummary {
        self.handle.thermal_summary()
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record(
    source: &dyn TelemetrySource,
    handle: &SamplerHandle,
    events: &EventSink,
    epoch: Instant,
) -> TelemetrySample {
    let stats = source.read_system_stats();
    let mut state = handle.write();
    // Stamp under the lock so concurrent callers push in timestamp order.
    let mut timestamp = epoch.elapsed();
    if let Some(last) = state.history.latest() {
        if timestamp <= last.timestamp {
            timestamp = last.timestamp + Duration::from_nanos(1);
        }
    }
    let sample = TelemetrySample::from_stats(timestamp, &stats);
    state.history.push(sample);
    let escalation = state.sensors.observe(&stats);
    drop(state);

    log::trace!(
        "Sampler: cpu {:.1}% ram {:.1}% temp {:?}",
        sample.cpu_percent,
        sample.ram_percent,
        sample.temperature_celsius
    );
    if let Some((status, celsius)) = escalation {
        log::warn!("Sampler: temperature reached {status} ({celsius:.1}°C).");
        events.emit(RunEvent::ThermalAdvisory { status, celsius });
    }
    sample
}
