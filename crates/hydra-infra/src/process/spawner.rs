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

//! Spawning and signalling child-process workers.

use hydra_core::{DutyCycle, SpawnError, WorkerId, WorkerSignal, WorkerSpawner, WorkerUnit};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

/// Spawns each worker as a child process.
///
/// The child is started as `program [args..] --id N --duty D --interval-ms I
/// --pause-poll-ms P`. For the `hydrahog` binary that is its hidden `worker`
/// subcommand.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    pause_poll: Duration,
}

impl ProcessSpawner {
    /// Runs `program` with `args` followed by the worker options.
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        pause_poll: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            pause_poll,
        }
    }

    /// Re-executes the current binary with `subcommand` as its first argument.
    pub fn current_exe(subcommand: &str, pause_poll: Duration) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, [subcommand], pause_poll))
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        duty: DutyCycle,
        interval: Duration,
    ) -> Result<Box<dyn WorkerUnit>, SpawnError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--id")
            .arg(id.0.to_string())
            .arg("--duty")
            .arg(duty.get().to_string())
            .arg("--interval-ms")
            .arg(interval.as_millis().to_string())
            .arg("--pause-poll-ms")
            .arg(self.pause_poll.as_millis().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take();
        log::debug!("Spawned {} as pid {}.", id, child.id());
        Ok(Box::new(ProcessWorker {
            id,
            child,
            stdin,
            exited: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "process"
    }
}

/// A worker running as a child process.
#[derive(Debug)]
pub struct ProcessWorker {
    id: WorkerId,
    child: Child,
    stdin: Option<ChildStdin>,
    exited: bool,
}

impl ProcessWorker {
    /// OS process id of the child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl WorkerUnit for ProcessWorker {
    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::debug!("{} (pid {}) exited: {}.", self.id, self.child.id(), status);
                self.exited = true;
                false
            }
            Err(err) => {
                log::warn!("Cannot query {} (pid {}): {}.", self.id, self.child.id(), err);
                false
            }
        }
    }

    fn signal(&mut self, signal: WorkerSignal) -> bool {
        let Some(stdin) = self.stdin.as_mut() else {
            return false;
        };
        let sent = writeln!(stdin, "{}", signal.as_str()).and_then(|()| stdin.flush());
        match sent {
            Ok(()) => true,
            Err(err) => {
                log::debug!("Cannot signal {}: {}.", self.id, err);
                self.stdin = None;
                false
            }
        }
    }

    fn terminate(&mut self) {
        self.stdin = None;
        if self.exited {
            return;
        }
        if let Err(err) = self.child.kill() {
            log::debug!("Kill of {} failed: {}.", self.id, err);
        }
        // Reap the child so it does not linger as a zombie.
        if self.child.wait().is_ok() {
            self.exited = true;
        }
    }

    fn describe(&self) -> String {
        format!("{} (pid {})", self.id, self.child.id())
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if !self.exited {
            self.terminate();
        }
    }
}
