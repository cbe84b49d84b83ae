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


//! The hidden `worker` subcommand: one CPU-load worker in its own process.

use crate::cli::WorkerArgs;
use anyhow::{Context, Result};
use hydra_control::DutyCycleLoop;
use hydra_core::DutyCycle;
use hydra_infra::run_child_worker;
use std::io::{self, BufReader};
use std::time::Duration;

pub fn execute(args: WorkerArgs) -> Result<()> {
    let duty = DutyCycle::new(args.duty).context("Invalid duty cycle")?;
    let cycle = DutyCycleLoop::new(
        duty,
        Duration::from_millis(args.interval_ms.max(1)),
        Duration::from_millis(args.pause_poll_ms),
    );
    log::debug!("worker-{} running as pid {}.", args.id, std::process::id());
    let exit = run_child_worker(cycle, BufReader::new(io::stdin()))
        .context("Failed to start the signal reader")?;
    log::debug!("worker-{} exiting: {:?}.", args.id, exit);
    Ok(())
}
