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


//! The `run` subcommand: start a run, relay its events and status, print the report.

use crate::cli::RunArgs;
use crate::settings::Settings;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use hydra_control::{RunController, StopOutcome, ThreadSpawner};
use hydra_core::{
    EvaluationReport, RunConfig, RunEvent, StatusSnapshot, TelemetrySample, WorkerSpawner, MIB,
};
use hydra_infra::{ProcessSpawner, SysinfoSource};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Lines typed on stdin while a run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    TogglePause,
    Stop,
}

impl InputCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" | "resume" => Some(InputCommand::TogglePause),
            "s" | "stop" | "q" | "quit" => Some(InputCommand::Stop),
            _ => None,
        }
    }
}

/// What `--json` writes.
#[derive(Serialize)]
struct ExportedRun<'a> {
    config: &'a RunConfig,
    report: &'a EvaluationReport,
    history: &'a [TelemetrySample],
}

pub fn execute(args: RunArgs) -> Result<()> {
    let settings = Settings::resolve(&args)?;
    let engine = settings.engine;
    let config = settings.run;

    let source = Arc::new(SysinfoSource::new());
    let spawner: Arc<dyn WorkerSpawner> = if args.process_workers {
        Arc::new(
            ProcessSpawner::current_exe("worker", engine.supervisor.pause_poll)
                .context("Failed to locate the hydrahog executable")?,
        )
    } else {
        Arc::new(ThreadSpawner::new(engine.supervisor.pause_poll))
    };
    let backend = spawner.backend_name();
    let (controller, events) = RunController::new(engine, source, spawner);

    if args.dry_run {
        let warnings = controller
            .preflight(&config)
            .context("Configuration rejected")?;
        for warning in &warnings {
            println!("Warning: {warning}");
        }
        println!("Configuration OK: {}", describe(&config));
        return Ok(());
    }

    let started = controller
        .start(config.clone())
        .context("Run did not start")?;
    println!("HydraHog: {} ({} workers)", describe(&config), backend);
    println!(
        "Memory ceiling {} MiB. Type 'p' + Enter to pause/resume, 's' + Enter to stop.",
        started.ceiling_bytes / MIB
    );

    let input = spawn_input_reader();
    let input_closed = crossbeam_channel::never();
    let mut input_open = true;
    let ticker = crossbeam_channel::tick(Duration::from_millis(args.status_every_ms.max(100)));

    let report = loop {
        let input_rx = if input_open { &input } else { &input_closed };
        let mut stopped = None;
        crossbeam_channel::select! {
            recv(events) -> event => {
                if let Ok(event) = event {
                    print_event(&event);
                }
            }
            recv(input_rx) -> command => match command {
                Ok(InputCommand::TogglePause) => match controller.toggle_pause() {
                    Ok(phase) => println!("Run {phase}"),
                    Err(err) => println!("{err}"),
                },
                Ok(InputCommand::Stop) => match controller.stop() {
                    Ok(StopOutcome::Finished(report)) => stopped = Some(*report),
                    Ok(StopOutcome::AlreadyStopping) => {}
                    Err(err) => log::debug!("Stop ignored: {err}."),
                },
                Err(_) => input_open = false,
            },
            recv(ticker) -> _ => print_status(&controller.status()),
        }
        if let Some(report) = stopped.or_else(|| controller.report()) {
            break report;
        }
    };

    for event in events.try_iter() {
        print_event(&event);
    }
    println!("\n{report}");

    if let Some(path) = &args.json {
        let history = controller.history();
        export(
            path,
            &ExportedRun {
                config: &config,
                report: &report,
                history: &history,
            },
        )?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn describe(config: &RunConfig) -> String {
    format!(
        "{} workers at {:.0}% duty, {} MiB, duration {}, hydra mode {}",
        config.worker_count,
        config.duty_cycle * 100.0,
        config.target_memory_bytes / MIB,
        config.duration_seconds,
        if config.hydra_mode { "on" } else { "off" }
    )
}

/// Forwards recognised stdin lines. The thread ends with stdin or with the receiver.
fn spawn_input_reader() -> Receiver<InputCommand> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("hydrahog-input".to_string())
        .spawn(move || read_commands(io::stdin().lock(), &tx));
    if let Err(err) = spawned {
        log::warn!("Interactive controls unavailable: {err}.");
    }
    rx
}

fn read_commands(input: impl BufRead, tx: &Sender<InputCommand>) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match InputCommand::parse(&line) {
            Some(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => println!("Unknown command '{}': use 'p' or 's'.", line.trim()),
        }
    }
}

fn print_event(event: &RunEvent) {
    println!(">> {event}");
}

fn print_status(status: &StatusSnapshot) {
    let sample = status.latest_sample;
    let cpu = sample.map_or_else(|| "n/a".to_string(), |s| format!("{:.1}%", s.cpu_percent));
    let ram = sample.map_or_else(|| "n/a".to_string(), |s| format!("{:.1}%", s.ram_percent));
    let temp = sample
        .and_then(|s| s.temperature_celsius)
        .map_or_else(|| "n/a".to_string(), |t| format!("{t:.1}°C"));
    println!(
        "[{:>7.1}s] {:<8} workers {}/{} | cpu {} | ram {} | temp {} | mem {}/{} MiB",
        status.run.elapsed_active_seconds(),
        status.run.phase.to_string(),
        status.active_workers,
        status.configured_workers,
        cpu,
        ram,
        temp,
        status.current_bytes / MIB,
        status.target_bytes / MIB
    );
}

fn export(path: &Path, run: &ExportedRun<'_>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file '{}'", path.display()))?;
    write_export(file, run).with_context(|| format!("Failed to write report to '{}'", path.display()))
}

fn write_export(out: impl Write, run: &ExportedRun<'_>) -> Result<()> {
    let mut writer = BufWriter::new(out);
    serde_json::to_writer_pretty(&mut writer, run)?;
    writer.flush()?;
    Ok(())
}
