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

//! Pattern data types

use crate::snapshot::{SnapshotError, check_unit};
use serde::{Deserialize, Serialize};

/// A tracked category of repeated behavior.
///
/// `significant` is derived from `count` and `weight` by the tracker that owns
/// the record and is not part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    /// Action category (e.g. "gift", "attack")
    pub category: String,
    /// Number of times the category has been observed, always at least 1
    pub count: u32,
    /// Decaying weight in `[0, 1]`
    pub weight: f32,
    /// When the category was last observed (unix millis)
    pub last_seen: i64,
    #[serde(skip)]
    pub significant: bool,
}

impl PatternRecord {
    /// Create a record for a first observation
    pub fn new(category: impl Into<String>, weight: f32, last_seen: i64) -> Self {
        Self {
            category: category.into(),
            count: 1,
            weight: weight.clamp(0.0, 1.0),
            last_seen,
            significant: false,
        }
    }
}

/// The pattern portion of a persisted [`Snapshot`](crate::snapshot::Snapshot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub patterns: Vec<PatternRecord>,
}

impl PatternSnapshot {
    /// Check counts and weights
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for record in &self.patterns {
            if record.count == 0 {
                return Err(SnapshotError::InvalidCount {
                    category: record.category.clone(),
                });
            }
            check_unit("weight", record.weight)?;
        }
        Ok(())
    }

    /// Parse and validate the pattern portion of a snapshot document.
    pub fn from_json(data: &str) -> Result<Self, SnapshotError> {
        let snapshot: PatternSnapshot = serde_json::from_str(data)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }
}
