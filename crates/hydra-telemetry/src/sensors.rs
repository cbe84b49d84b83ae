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

//! Per-sensor thermal bookkeeping.

use hydra_core::{SensorReading, SystemStats, ThermalStatus};

#[derive(Debug, Clone)]
struct SensorEntry {
    label: String,
    peak: f32,
}

/// Remembers the hottest reading of each sensor, and the hottest
/// advisory band seen so far.
#[derive(Debug, Clone, Default)]
pub struct SensorTracker {
    entries: Vec<SensorEntry>,
    status: Option<ThermalStatus>,
}

impl SensorTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a poll.
    ///
    /// Returns the new band and the reading that caused it when the run gets
    /// hotter than any band seen before. The first observation only reports a
    /// band above `Cool`.
    pub fn observe(&mut self, stats: &SystemStats) -> Option<(ThermalStatus, f32)> {
        for reading in stats.sensors.iter().filter(|r| r.celsius.is_finite()) {
            match self.entries.iter_mut().find(|e| e.label == reading.label) {
                Some(entry) => entry.peak = entry.peak.max(reading.celsius),
                None => self.entries.push(SensorEntry {
                    label: reading.label.clone(),
                    peak: reading.celsius,
                }),
            }
        }

        let hottest = stats
            .sensors
            .iter()
            .map(|r| r.celsius)
            .filter(|c| c.is_finite())
            .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))))
            .or(stats.temperature_celsius.filter(|t| t.is_finite()))?;

        let status = ThermalStatus::from_celsius(hottest);
        let escalated = match self.status {
            Some(previous) => status > previous,
            None => status > ThermalStatus::Cool,
        };
        if escalated || self.status.is_none() {
            self.status = Some(status);
        }
        escalated.then_some((status, hottest))
    }

    /// Hottest band seen, or `None` if no temperature was ever observed.
    pub fn peak_status(&self) -> Option<ThermalStatus> {
        self.status
    }

    /// Peak reading of each sensor, in discovery order.
    pub fn peaks(&self) -> Vec<SensorReading> {
        self.entries
            .iter()
            .map(|e| SensorReading {
                label: e.label.clone(),
                celsius: e.peak,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(readings: &[(&str, f32)]) -> SystemStats {
        let sensors: Vec<SensorReading> = readings
            .iter()
            .map(|(label, celsius)| SensorReading {
                label: label.to_string(),
                celsius: *celsius,
            })
            .collect();
        SystemStats {
            temperature_celsius: SystemStats::aggregate_temperature(&sensors),
            sensors,
            ..Default::default()
        }
    }

    #[test]
    fn test_tracks_peak_per_sensor() {
        let mut tracker = SensorTracker::new();
        tracker.observe(&stats(&[("cpu", 40.0), ("gpu", 35.0)]));
        tracker.observe(&stats(&[("cpu", 70.0), ("gpu", 33.0)]));
        tracker.observe(&stats(&[("cpu", 65.0), ("nvme", 45.0)]));

        let peaks = tracker.peaks();
        assert_eq!(peaks.len(), 3);
        assert_eq!(peaks[0].celsius, 70.0);
        assert_eq!(peaks[1].celsius, 35.0);
        assert_eq!(peaks[2].label, "nvme");
    }

    #[test]
    fn test_escalation_is_reported_once_per_band() {
        let mut tracker = SensorTracker::new();
        assert_eq!(tracker.observe(&stats(&[("cpu", 50.0)])), None);
        assert_eq!(
            tracker.observe(&stats(&[("cpu", 82.0)])),
            Some((ThermalStatus::Throttling, 82.0))
        );
        assert_eq!(tracker.observe(&stats(&[("cpu", 85.0)])), None);
        // Cooling down and heating back up does not repeat the advisory.
        assert_eq!(tracker.observe(&stats(&[("cpu", 50.0)])), None);
        assert_eq!(tracker.observe(&stats(&[("cpu", 84.0)])), None);
        assert_eq!(tracker.peak_status(), Some(ThermalStatus::Throttling));
    }

    #[test]
    fn test_hottest_sensor_drives_status() {
        let mut tracker = SensorTracker::new();
        // Mean is 62.5 (Warm) but one sensor is Critical.
        let event = tracker.observe(&stats(&[("cpu", 95.0), ("board", 30.0)]));
        assert_eq!(event, Some((ThermalStatus::Critical, 95.0)));
    }

    #[test]
    fn test_no_temperature_means_no_status() {
        let mut tracker = SensorTracker::new();
        assert_eq!(tracker.observe(&SystemStats::default()), None);
        assert_eq!(tracker.peak_status(), None);
        assert!(tracker.peaks().is_empty());
    }
}
