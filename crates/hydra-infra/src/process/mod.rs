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


//! Child-process worker backend.
//!
//! The parent writes one signal keyword per line (`pause`, `resume`, `stop`)
//! to the child's stdin. A child that sees its stdin close stops on its own,
//! so workers never outlive a parent that died without cleaning up.

mod child;
mod spawner;

pub use child::run_child_worker;
pub use spawner::{ProcessSpawner, ProcessWorker};
