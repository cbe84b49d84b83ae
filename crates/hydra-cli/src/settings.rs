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


//! Run settings: defaults, then the TOML file, then command-line flags.

use crate::cli::RunArgs;
use anyhow::{Context, Result};
use hydra_control::EngineConfig;
use hydra_core::{RunConfig, MIB};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Layout of a `hydrahog.toml` file.
///
/// ```toml
/// [run]
/// worker_count = 8
/// duration_seconds = "unbounded"
///
/// [engine.memory]
/// step_bytes = 104857600
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub run: RunConfig,
    pub engine: EngineConfig,
}

impl Settings {
    /// Parses a settings file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))
    }

    /// Loads the file named by `--config`, if any, and applies the flags on top.
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        settings.apply(args);
        Ok(settings)
    }

    /// Overrides file values with the flags that were given.
    pub fn apply(&mut self, args: &RunArgs) {
        let run = &mut self.run;
        if let Some(workers) = args.workers {
            run.worker_count = workers;
        }
        if let Some(duty) = args.duty_cycle {
            run.duty_cycle = duty;
        }
        if let Some(mib) = args.memory_mib {
            run.target_memory_bytes = mib.saturating_mul(MIB);
        }
        if let Some(duration) = args.duration {
            run.duration_seconds = duration;
        }
        if let Some(hydra_mode) = args.hydra_mode {
            run.hydra_mode = hydra_mode;
        }
        if let Some(interval) = args.sample_interval_ms {
            run.sample_interval_ms = interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_core::RunDuration;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_a_file() {
        let settings = Settings::resolve(&RunArgs::default()).unwrap();
        assert_eq!(settings.run, RunConfig::default());
        assert_eq!(settings.run.target_memory_bytes, 1024 * MIB);
        assert_eq!(settings.run.duration_seconds, RunDuration::Bounded(60));
        assert!(settings.run.hydra_mode);
    }

    #[test]
    fn test_file_values_and_flag_overrides() {
        let file = write_config(
            r#"
            [run]
            worker_count = 6
            duty_cycle = 0.5
            duration_seconds = "unbounded"
            hydra_mode = false

            [engine]
            control_tick_ms = 250

            [engine.supervisor]
            stop_grace_ms = 5000
            "#,
        );
        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            workers: Some(2),
            memory_mib: Some(128),
            ..Default::default()
        };
        let settings = Settings::resolve(&args).unwrap();

        assert_eq!(settings.run.worker_count, 2);
        assert_eq!(settings.run.duty_cycle, 0.5);
        assert_eq!(settings.run.duration_seconds, RunDuration::Unbounded);
        assert!(!settings.run.hydra_mode);
        assert_eq!(settings.run.target_memory_bytes, 128 * MIB);
        assert_eq!(settings.run.sample_interval_ms, 500);
        assert_eq!(settings.engine.control_tick, Duration::from_millis(250));
        assert_eq!(settings.engine.supervisor.stop_grace, Duration::from_secs(5));
        assert_eq!(settings.engine.memory, EngineConfig::default().memory);
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let file = write_config("[runn]\nworker_count = 2\n");
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse TOML"));
    }

    #[test]
    fn test_bad_duration_keyword_is_rejected() {
        let file = write_config("[run]\nduration_seconds = \"forever\"\n");
        assert!(Settings::from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let args = RunArgs {
            config: Some("/nonexistent/hydrahog.toml".into()),
            ..Default::default()
        };
        let err = Settings::resolve(&args).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hydrahog.toml"));
    }
}
