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

//! Windowed trend classification.

use hydra_core::Trend;

/// Classifies a series by comparing its most recent window with the window before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendDetector {
    /// Samples per window.
    pub window: usize,
    /// Mean difference below which the series is considered stable.
    pub tolerance: f32,
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self {
            window: 10,
            tolerance: 1.5,
        }
    }
}

impl TrendDetector {
    /// Creates a detector. A zero window is treated as one sample.
    pub fn new(window: usize, tolerance: f32) -> Self {
        Self {
            window: window.max(1),
            tolerance: tolerance.abs(),
        }
    }

    /// Mean of the recent window minus mean of the earlier window.
    ///
    /// With fewer than `2 * window` values both windows shrink to half the
    /// series. Returns `None` for fewer than two values.
    pub fn delta(&self, values: &[f32]) -> Option<f32> {
        let n = values.len();
        if n < 2 {
            return None;
        }
        let window = self.window.max(1).min(n / 2);
        let recent = &values[n - window..];
        let earlier = &values[n - 2 * window..n - window];
        Some(mean(recent) - mean(earlier))
    }

    /// Labels the series as rising, falling or stable.
    pub fn classify(&self, values: &[f32]) -> Trend {
        match self.delta(values) {
            Some(delta) if delta > self.tolerance => Trend::Rising,
            Some(delta) if delta < -self.tolerance => Trend::Falling,
            _ => Trend::Stable,
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}
