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

//! Persisted companion snapshot
//!
//! The wire format is a single JSON document:
//!
//! ```json
//! {
//!   "memories": [{"action": "...", "context": "...", "timestamp": 0, "importance": 0.5}],
//!   "traits": [["generous", 0.29]],
//!   "patterns": [{"category": "gift", "count": 3, "weight": 0.6, "lastSeen": 0}],
//!   "timestamp": 0
//! }
//! ```

use crate::memory::{MemoryEntry, MemorySnapshot};
use crate::pattern::{PatternRecord, PatternSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing snapshot documents
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Value out of range for '{field}': {value}")]
    OutOfRange { field: String, value: f32 },

    #[error("Pattern '{category}' has a zero count")]
    InvalidCount { category: String },
}

/// Reject NaN and values outside `[0, 1]`.
pub(crate) fn check_unit(field: &str, value: f32) -> Result<(), SnapshotError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SnapshotError::OutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

/// Complete serializable state of one companion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub memories: Vec<MemoryEntry>,
    pub traits: Vec<(String, f32)>,
    pub patterns: Vec<PatternRecord>,
    /// When the snapshot was taken (unix millis)
    pub timestamp: i64,
}

impl Snapshot {
    /// Assemble a snapshot from its memory and pattern portions
    pub fn compose(memory: MemorySnapshot, patterns: PatternSnapshot, timestamp: i64) -> Self {
        Self {
            memories: memory.memories,
            traits: memory.traits,
            patterns: patterns.patterns,
            timestamp,
        }
    }

    /// Split into the memory and pattern portions
    pub fn into_parts(self) -> (MemorySnapshot, PatternSnapshot) {
        (
            MemorySnapshot {
                memories: self.memories,
                traits: self.traits,
            },
            PatternSnapshot {
                patterns: self.patterns,
            },
        )
    }

    /// Validate every value in the document
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for entry in &self.memories {
            check_unit("importance", entry.importance)?;
        }
        for (name, value) in &self.traits {
            check_unit(name, *value)?;
        }
        PatternSnapshot {
            patterns: self.patterns.clone(),
        }
        .validate()
    }

    /// Parse and validate a snapshot document
    pub fn from_json(data: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(data)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }
}
