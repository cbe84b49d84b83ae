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


//! The memory stressor.
//!
//! Memory is held as a stack of chunks of at most `step_bytes` each, grown or
//! shrunk by one chunk per tick. All allocation happens on the stressor's own
//! thread; other components send it commands and read a published snapshot.

use crate::config::MemoryStressorConfig;
use crossbeam_channel::{Receiver, Sender};
use hydra_core::{EventSink, RunEvent, ServiceThread, MIB};
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Byte written across every allocated chunk so the OS actually commits it.
const FILL_BYTE: u8 = 0xA5;

/// Snapshot of the stressor's allocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocationState {
    /// Bytes currently held.
    pub current_bytes: u64,
    /// Bytes the stressor is working towards.
    pub target_bytes: u64,
    /// Size of one allocation or release step.
    pub step_bytes: u64,
    /// When `current_bytes` last changed.
    pub last_adjustment_time: Option<Instant>,
    /// Hard limit for `current_bytes`, fixed at start.
    pub ceiling_bytes: u64,
    /// Most bytes held at any point of the run.
    pub peak_bytes: u64,
    /// Set once the allocator refused a step; growth stops there.
    pub allocation_failed: bool,
    /// Whether the stressor is frozen.
    pub paused: bool,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    AdjustTarget(u64),
    Pause,
    Resume,
    Shutdown,
}

/// Lock-free view of the stressor for status reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryGauge {
    current: Arc<AtomicU64>,
    target: Arc<AtomicU64>,
}

impl MemoryGauge {
    /// Bytes currently held.
    pub fn current_bytes(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Bytes the stressor is working towards.
    pub fn target_bytes(&self) -> u64 {
        self.target.load(Ordering::Acquire)
    }
}

/// The allocation loop's private state.
struct Allocator {
    chunks: Vec<Box<[u8]>>,
    state: MemoryAllocationState,
    shutting_down: bool,
    commands: Receiver<Command>,
    published: Arc<Mutex<MemoryAllocationState>>,
    gauge: MemoryGauge,
    events: EventSink,
}

impl Allocator {
    fn tick(&mut self) -> ControlFlow<()> {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        if !self.state.paused {
            let limit = self.state.target_bytes.min(self.state.ceiling_bytes);
            if self.state.current_bytes < limit && !self.state.allocation_failed {
                let step = self.state.step_bytes.min(limit - self.state.current_bytes);
                self.grow(step);
            } else if self.state.current_bytes > self.state.target_bytes {
                self.shrink();
            }
        }
        self.publish();

        if self.shutting_down && self.state.current_bytes == 0 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AdjustTarget(bytes) => {
                if bytes > self.state.target_bytes {
                    self.state.allocation_failed = false;
                }
                self.state.target_bytes = bytes;
                if bytes > self.state.ceiling_bytes {
                    log::warn!(
                        "MemoryStressor: target {} MiB clamped to the {} MiB safety ceiling.",
                        bytes / MIB,
                        self.state.ceiling_bytes / MIB
                    );
                    self.events.emit(RunEvent::MemoryCeilingReached {
                        target_bytes: bytes,
                        ceiling_bytes: self.state.ceiling_bytes,
                    });
                }
            }
            Command::Pause => self.state.paused = true,
            Command::Resume => self.state.paused = false,
            Command::Shutdown => {
                self.shutting_down = true;
                self.state.target_bytes = 0;
                self.state.paused = false;
            }
        }
    }

    fn grow(&mut self, step: u64) {
        match allocate_chunk(step) {
            Some(chunk) => {
                self.chunks.push(chunk);
                self.state.current_bytes += step;
                self.state.peak_bytes = self.state.peak_bytes.max(self.state.current_bytes);
                self.state.last_adjustment_time = Some(Instant::now());
                log::trace!(
                    "MemoryStressor: holding {} MiB.",
                    self.state.current_bytes / MIB
                );
            }
            None => {
                self.state.allocation_failed = true;
                log::warn!(
                    "MemoryStressor: allocation of {} bytes refused at {} MiB held; growth stopped.",
                    step,
                    self.state.current_bytes / MIB
                );
                self.events.emit(RunEvent::AllocationFailed {
                    current_bytes: self.state.current_bytes,
                    step_bytes: step,
                });
            }
        }
    }

    fn shrink(&mut self) {
        if let Some(chunk) = self.chunks.pop() {
            self.state.current_bytes -= chunk.len() as u64;
            self.state.last_adjustment_time = Some(Instant::now());
        }
    }

    fn publish(&self) {
        self.gauge
            .current
            .store(self.state.current_bytes, Ordering::Release);
        self.gauge
            .target
            .store(self.state.target_bytes, Ordering::Release);
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = self.state;
    }
}

fn allocate_chunk(bytes: u64) -> Option<Box<[u8]>> {
    let len = usize::try_from(bytes).ok()?;
    let mut chunk = Vec::new();
    chunk.try_reserve_exact(len).ok()?;
    chunk.resize(len, FILL_BYTE);
    Some(chunk.into_boxed_slice())
}

/// Grows memory usage towards a target in bounded steps, never past a fixed ceiling.
pub struct MemoryStressor {
    config: MemoryStressorConfig,
    events: EventSink,
    commands: Sender<Command>,
    pending: Option<Receiver<Command>>,
    published: Arc<Mutex<MemoryAllocationState>>,
    gauge: MemoryGauge,
    service: Option<ServiceThread>,
}

impl std::fmt::Debug for MemoryStressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStressor")
            .field("state", &self.state())
            .field("running", &self.service.is_some())
            .finish()
    }
}

impl MemoryStressor {
    /// Creates an idle stressor.
    pub fn new(config: MemoryStressorConfig, events: EventSink) -> Self {
        let (commands, pending) = crossbeam_channel::unbounded();
        let step_bytes = config.step_bytes.max(1);
        Self {
            config: MemoryStressorConfig {
                step_bytes,
                ..config
            },
            events,
            commands,
            pending: Some(pending),
            published: Arc::new(Mutex::new(MemoryAllocationState {
                current_bytes: 0,
                target_bytes: 0,
                step_bytes,
                last_adjustment_time: None,
                ceiling_bytes: 0,
                peak_bytes: 0,
                allocation_failed: false,
                paused: false,
            })),
            gauge: MemoryGauge::default(),
            service: None,
        }
    }

    /// Starts the allocation loop towards `target_bytes`, never holding more than `ceiling_bytes`.
    ///
    /// A stressor runs once; later calls only adjust the target.
    pub fn start(&mut self, target_bytes: u64, ceiling_bytes: u64) -> io::Result<()> {
        let Some(commands) = self.pending.take() else {
            log::warn!("MemoryStressor: already started; adjusting the target instead.");
            self.adjust_target(target_bytes);
            return Ok(());
        };

        let mut state = self.state();
        state.ceiling_bytes = ceiling_bytes;
        let mut allocator = Allocator {
            chunks: Vec::new(),
            state,
            shutting_down: false,
            commands,
            published: Arc::clone(&self.published),
            gauge: self.gauge.clone(),
            events: self.events.clone(),
        };
        allocator.apply(Command::AdjustTarget(target_bytes));
        allocator.publish();

        log::info!(
            "MemoryStressor: target {} MiB, ceiling {} MiB, step {} MiB.",
            target_bytes / MIB,
            ceiling_bytes / MIB,
            self.config.step_bytes / MIB
        );
        self.service = Some(ServiceThread::spawn(
            "hydra-memory",
            self.config.tick,
            move || allocator.tick(),
        )?);
        Ok(())
    }

    /// Moves the target. Lowering it releases memory one step per tick.
    pub fn adjust_target(&self, bytes: u64) {
        let _ = self.commands.send(Command::AdjustTarget(bytes));
    }

    /// Releases everything, gradually.
    pub fn release_all(&self) {
        self.adjust_target(0);
    }

    /// Freezes the allocation at its current size.
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    /// Unfreezes the allocation loop.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Latest published allocation state.
    pub fn state(&self) -> MemoryAllocationState {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock-free view for status reads.
    pub fn gauge(&self) -> MemoryGauge {
        self.gauge.clone()
    }

    /// Releases all memory step by step and stops the loop.
    ///
    /// If the release does not finish within the configured timeout the loop
    /// is stopped and the remaining chunks are freed at once. Returns `false`
    /// in that case.
    pub fn stop(&mut self) -> bool {
        let Some(mut service) = self.service.take() else {
            return true;
        };
        let _ = self.commands.send(Command::Shutdown);
        if service.join_within(self.config.release_timeout) {
            log::debug!("MemoryStressor: released all memory and stopped.");
            return true;
        }

        let held = self.gauge.current_bytes();
        let detail = format!(
            "{} MiB still held after {:?}; freed at once",
            held / MIB,
            self.config.release_timeout
        );
        log::warn!("MemoryStressor: {detail}.");
        self.events.emit(RunEvent::ShutdownTimeout {
            component: "memory stressor",
            detail,
        });
        // Stopping drops the allocator and with it every remaining chunk.
        service.stop();
        self.gauge.current.store(0, Ordering::Release);
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_bytes = 0;
        false
    }
}

impl Drop for MemoryStressor {
    fn drop(&mut self) {
        self.stop();
    }
}
