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

//! The duty-cycle loop as run inside a child process.

use hydra_control::{DutyCycleLoop, LoopExit, WorkerFlags};
use hydra_core::WorkerSignal;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

/// Runs the duty-cycle loop of a child-process worker until told to stop.
///
/// Signals are read line by line from `input` on a helper thread. End of
/// input counts as `stop`. Unknown lines are logged and ignored.
pub fn run_child_worker<R>(cycle: DutyCycleLoop, input: R) -> io::Result<LoopExit>
where
    R: BufRead + Send + 'static,
{
    let flags = Arc::new(WorkerFlags::default());
    let reader_flags = Arc::clone(&flags);
    thread::Builder::new()
        .name("hydra-worker-stdin".to_string())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else {
                    break;
                };
                match WorkerSignal::parse(&line) {
                    Some(signal) => {
                        log::trace!("Worker: received {}.", signal.as_str());
                        reader_flags.apply(signal);
                        if signal == WorkerSignal::Stop {
                            return;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => log::warn!("Worker: ignoring unknown command '{}'.", line.trim()),
                }
            }
            reader_flags.apply(WorkerSignal::Stop);
        })?;

    Ok(cycle.run(&flags))
}
