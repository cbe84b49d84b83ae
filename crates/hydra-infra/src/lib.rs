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


//! Concrete implementations of the engine's platform contracts.
//!
//! - [`SysinfoSource`] reads CPU, memory and temperature from the host through
//!   `sysinfo` and implements [`TelemetrySource`](hydra_core::TelemetrySource).
//! - [`ProcessSpawner`] runs each CPU-load worker as a child process driven
//!   over its stdin, and [`run_child_worker`] is the loop such a child runs.

pub mod platform;
pub mod process;

pub use platform::SysinfoSource;
pub use process::{run_child_worker, ProcessSpawner, ProcessWorker};
