//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Companion Common Types
//!
//! This crate defines the types shared between the companion engine and its hosts:
//! - Memory and pattern records
//! - The persisted snapshot wire format
//! - The companion lifecycle state machine
//! - Host notifications

pub mod event;
pub mod memory;
pub mod pattern;
pub mod snapshot;
pub mod state;

pub use event::CompanionEvent;
pub use memory::{MemoryEntry, MemorySnapshot};
pub use pattern::{PatternRecord, PatternSnapshot};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::CompanionState;
