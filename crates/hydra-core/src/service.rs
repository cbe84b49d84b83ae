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

//! A named background thread running a body on a fixed tick.
//!
//! Every periodic component of the engine (sampler, memory stressor,
//! supervisor, duration watchdog) runs on one of these. Waiting happens on a
//! channel rather than in `thread::sleep`, so a stop request wakes the thread
//! immediately instead of after the current tick.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io;
use std::ops::ControlFlow;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Polling granularity while waiting for a thread to finish with a deadline.
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Handle to a periodic background thread.
#[derive(Debug)]
pub struct ServiceThread {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceThread {
    /// Spawns a thread that calls `body` immediately and then once per `tick`,
    /// until `body` breaks or [`stop`](Self::stop) is called.
    pub fn spawn<F>(name: impl Into<String>, tick: Duration, mut body: F) -> io::Result<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::debug!("Service thread started.");
            loop {
                let started = Instant::now();
                if body().is_break() {
                    break;
                }
                let remaining = tick.saturating_sub(started.elapsed());
                match stop_rx.recv_timeout(remaining) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("Service thread stopped.");
        })?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Name the thread was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` while the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Service thread '{}' panicked.", self.name);
            }
        }
    }

    /// Waits up to `timeout` for the body to end the loop by itself, without
    /// signalling it.
    ///
    /// Returns `false` if the thread is still running at the deadline; the
    /// handle is kept so the caller can escalate.
    pub fn join_within(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            return true;
        };
        if handle.thread().id() == thread::current().id() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Service thread '{}' panicked.", self.name);
            }
        }
        true
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_body_runs_immediately_and_stop_wakes_thread() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut service = ServiceThread::spawn("test-service", Duration::from_secs(3600), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while ticks.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        let started = Instant::now();
        service.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!service.is_running());
    }

    #[test]
    fn test_body_can_end_the_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut service = ServiceThread::spawn("test-break", Duration::from_millis(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        service.stop();
        assert!(ticks.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_join_within_waits_for_the_body_to_finish() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut service = ServiceThread::spawn("test-join", Duration::from_millis(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) >= 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert!(service.join_within(Duration::from_secs(2)));
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }
}
