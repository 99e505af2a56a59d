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

//! Memory data types

use crate::snapshot::{SnapshotError, check_unit};
use serde::{Deserialize, Serialize};

/// A single remembered action performed on a companion.
///
/// Entries are immutable once recorded. The `timestamp` is a unix time in
/// milliseconds and is strictly increasing within one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// What the actor did
    pub action: String,
    /// Free-form context supplied by the host
    pub context: String,
    /// When it happened (unix millis)
    pub timestamp: i64,
    /// Importance score in `[0, 1]`
    pub importance: f32,
}

impl MemoryEntry {
    /// Create a new memory entry
    pub fn new(
        action: impl Into<String>,
        context: impl Into<String>,
        timestamp: i64,
        importance: f32,
    ) -> Self {
        Self {
            action: action.into(),
            context: context.into(),
            timestamp,
            importance: importance.clamp(0.0, 1.0),
        }
    }
}

/// The memory and trait portion of a persisted [`Snapshot`](crate::snapshot::Snapshot).
///
/// Traits serialize as `[[name, value], ...]` and keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub memories: Vec<MemoryEntry>,
    pub traits: Vec<(String, f32)>,
}

impl MemorySnapshot {
    /// Check that every importance and trait value lies in `[0, 1]`.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for entry in &self.memories {
            check_unit("importance", entry.importance)?;
        }
        for (name, value) in &self.traits {
            check_unit(name, *value)?;
        }
        Ok(())
    }

    /// Parse and validate the memory portion of a snapshot document.
    ///
    /// Unknown fields (such as `patterns`) are ignored so a full snapshot
    /// document can be passed directly.
    pub fn from_json(data: &str) -> Result<Self, SnapshotError> {
        let snapshot: MemorySnapshot = serde_json::from_str(data)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }
}
