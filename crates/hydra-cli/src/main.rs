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


// HydraHog: a self-healing CPU and memory stress tester.
// Run with: hydrahog run --duration 60

mod cli;
mod commands;
mod settings;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn init_logging(verbose: bool) {
    use env_logger::{Builder, Env};

    let default_filter = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Probe(args) => commands::probe::execute(args),
        Commands::Worker(args) => commands::worker::execute(args),
    }
}
