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


//! The duty-cycle loop every CPU-load worker runs, whatever its backend.

use hydra_core::{DutyCycle, WorkerSignal};
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Iterations of busy work between two clock reads.
const SPIN_BATCH: u32 = 4096;

/// Control flags shared between a worker and whoever drives it.
///
/// The worker only ever reads them; the owner only ever writes them.
#[derive(Debug, Default)]
pub struct WorkerFlags {
    paused: AtomicBool,
    stop: AtomicBool,
    killed: AtomicBool,
}

impl WorkerFlags {
    /// Applies a supervisor signal.
    pub fn apply(&self, signal: WorkerSignal) {
        match signal {
            WorkerSignal::Pause => self.paused.store(true, Ordering::Release),
            WorkerSignal::Resume => self.paused.store(false, Ordering::Release),
            WorkerSignal::Stop => self.stop.store(true, Ordering::Release),
        }
    }

    /// Makes the loop exit at its next check as if it had crashed.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Whether the worker is idling indefinitely.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether [`kill`](Self::kill) was called.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    fn exit(&self) -> Option<LoopExit> {
        if self.is_killed() {
            Some(LoopExit::Killed)
        } else if self.stop.load(Ordering::Acquire) {
            Some(LoopExit::Stopped)
        } else {
            None
        }
    }
}

/// Why the duty-cycle loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A stop signal was received.
    Stopped,
    /// The worker was killed.
    Killed,
}

/// Busy-spin for `duty × interval`, idle for the rest, until told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleLoop {
    busy: Duration,
    idle: Duration,
    pause_poll: Duration,
}

impl DutyCycleLoop {
    /// Creates a loop for `duty` over cycles of `interval`.
    pub fn new(duty: DutyCycle, interval: Duration, pause_poll: Duration) -> Self {
        let (busy, idle) = duty.split(interval);
        Self {
            busy,
            idle,
            pause_poll: pause_poll.max(Duration::from_millis(1)),
        }
    }

    /// Busy part of one cycle.
    pub fn busy(&self) -> Duration {
        self.busy
    }

    /// Idle part of one cycle.
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Runs until `flags` request an exit. A pause takes effect at the next cycle.
    pub fn run(&self, flags: &WorkerFlags) -> LoopExit {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        loop {
            if let Some(exit) = flags.exit() {
                return exit;
            }
            if flags.is_paused() {
                thread::sleep(self.pause_poll);
                continue;
            }

            let busy_until = Instant::now() + self.busy;
            while Instant::now() < busy_until {
                for _ in 0..SPIN_BATCH {
                    state = black_box(state.rotate_left(5) ^ state.wrapping_mul(0x2545_F491_4F6C_DD1D));
                }
                if flags.exit().is_some() {
                    break;
                }
            }
            if !self.idle.is_zero() {
                thread::sleep(self.idle);
            }
        }
    }
}
