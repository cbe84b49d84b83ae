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


//! Command line definition.

use clap::{Args, Parser, Subcommand};
use hydra_core::RunDuration;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hydrahog")]
#[command(author, version, about = "Self-healing CPU and memory stress tester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a stress test and print its evaluation
    Run(RunArgs),

    /// Print the current host readings and the memory safety ceiling
    Probe(ProbeArgs),

    /// Child-process worker loop, driven over stdin by `run --process-workers`
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML file with a [run] table and optional [engine] overrides
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of CPU-load workers (default: logical CPU count)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Busy fraction of each worker cycle, in (0, 1]
    #[arg(short, long)]
    pub duty_cycle: Option<f64>,

    /// Memory to allocate, in MiB
    #[arg(short, long, value_name = "MIB")]
    pub memory_mib: Option<u64>,

    /// Active seconds before stopping, or "unbounded"
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub duration: Option<RunDuration>,

    /// Respawn workers that die during the run
    #[arg(long, value_name = "BOOL")]
    pub hydra_mode: Option<bool>,

    /// Telemetry sampling interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub sample_interval_ms: Option<u64>,

    /// Run each worker as a child process instead of a thread
    #[arg(long)]
    pub process_workers: bool,

    /// How often to print a status line, in milliseconds
    #[arg(long, value_name = "MS", default_value = "1000")]
    pub status_every_ms: u64,

    /// Write the report and telemetry history to this JSON file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Check the configuration against the host and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Print the readings as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub id: u64,

    #[arg(long)]
    pub duty: f64,

    #[arg(long, default_value = "100")]
    pub interval_ms: u64,

    #[arg(long, default_value = "50")]
    pub pause_poll_ms: u64,
}

/// Parses a number of seconds or the keyword `unbounded`.
pub fn parse_duration(value: &str) -> Result<RunDuration, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(RunDuration::Unbounded);
    }
    value
        .parse::<u64>()
        .map(RunDuration::Bounded)
        .map_err(|_| format!("expected a number of seconds or \"unbounded\", got '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30"), Ok(RunDuration::Bounded(30)));
        assert_eq!(parse_duration("Unbounded"), Ok(RunDuration::Unbounded));
        assert!(parse_duration("forever").is_err());
        assert!(parse_duration("-1").is_err());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "hydrahog",
            "run",
            "--workers",
            "3",
            "--duration",
            "unbounded",
            "--hydra-mode",
            "false",
            "-m",
            "256",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.duration, Some(RunDuration::Unbounded));
        assert_eq!(args.hydra_mode, Some(false));
        assert_eq!(args.memory_mib, Some(256));
        assert_eq!(args.status_every_ms, 1000);
    }
}
