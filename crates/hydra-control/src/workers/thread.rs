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


//! In-process worker backend: one OS thread per worker.

use super::duty::{DutyCycleLoop, LoopExit, WorkerFlags};
use hydra_core::{DutyCycle, SpawnError, WorkerId, WorkerSignal, WorkerSpawner, WorkerUnit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Spawns workers as threads of the current process.
///
/// A thread cannot be killed from outside. Killing a worker (on purpose or
/// through [`WorkerUnit::terminate`]) raises a flag the loop checks between
/// spin batches; the unit reports itself dead as soon as the flag is set.
#[derive(Debug)]
pub struct ThreadSpawner {
    pause_poll: Duration,
    spawn_limit: Option<usize>,
    spawned: AtomicUsize,
}

impl ThreadSpawner {
    /// Creates a spawner whose paused workers wake every `pause_poll`.
    pub fn new(pause_poll: Duration) -> Self {
        Self {
            pause_poll,
            spawn_limit: None,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Refuses every spawn past the first `limit`, to simulate an OS thread limit.
    pub fn with_spawn_limit(mut self, limit: usize) -> Self {
        self.spawn_limit = Some(limit);
        self
    }

    /// Workers spawned so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        duty: DutyCycle,
        interval: Duration,
    ) -> Result<Box<dyn WorkerUnit>, SpawnError> {
        if let Some(limit) = self.spawn_limit {
            let reserved = self
                .spawned
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1));
            if reserved.is_err() {
                return Err(SpawnError::Rejected(format!("thread limit of {limit} reached")));
            }
        } else {
            self.spawned.fetch_add(1, Ordering::AcqRel);
        }

        let flags = Arc::new(WorkerFlags::default());
        let cycle = DutyCycleLoop::new(duty, interval, self.pause_poll);
        let worker_flags = Arc::clone(&flags);
        let handle = thread::Builder::new()
            .name(format!("hydra-{id}"))
            .spawn(move || {
                let exit = cycle.run(&worker_flags);
                log::trace!("{id} left its duty loop: {exit:?}");
                exit
            })?;

        Ok(Box::new(ThreadWorker {
            id,
            flags,
            handle: Some(handle),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "thread"
    }
}

/// A worker running on a thread of this process.
#[derive(Debug)]
pub struct ThreadWorker {
    id: WorkerId,
    flags: Arc<WorkerFlags>,
    handle: Option<JoinHandle<LoopExit>>,
}

impl WorkerUnit for ThreadWorker {
    fn is_alive(&mut self) -> bool {
        if self.flags.is_killed() {
            return false;
        }
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn signal(&mut self, signal: WorkerSignal) -> bool {
        if self.handle.is_none() {
            return false;
        }
        self.flags.apply(signal);
        true
    }

    fn terminate(&mut self) {
        self.flags.kill();
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
            // Otherwise the handle is dropped and the thread detached; it exits
            // at its next flag check.
        }
    }

    fn describe(&self) -> String {
        format!("{} (thread)", self.id)
    }
}
