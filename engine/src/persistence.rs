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

//! Key-value persistence for companion snapshots
//!
//! The engine stores each companion's snapshot as an opaque string under a
//! key derived from its identity. Providers acquire and release their
//! underlying storage on every call.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum size of a stored value, in bytes
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1_000_000;

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid key: '{0}'")]
    InvalidKey(String),

    #[error("Value of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage collaborator used to persist companion snapshots
#[cfg_attr(test, mockall::automock)]
pub trait SaveProvider: Send + Sync {
    /// Store a value, replacing any previous one
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Load a value, `None` if nothing is stored under the key
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Remove a value; removing a missing key succeeds
    fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    /// Check whether a value is stored under the key
    fn exists(&self, key: &str) -> bool;
}

fn validate_key(key: &str) -> Result<(), PersistenceError> {
    if key.trim().is_empty() {
        return Err(PersistenceError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn validate_size(value: &str, limit: usize) -> Result<(), PersistenceError> {
    if value.len() > limit {
        return Err(PersistenceError::TooLarge {
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

/// Process-local provider backed by a map
#[derive(Debug)]
pub struct InMemorySaveProvider {
    values: RwLock<HashMap<String, String>>,
    max_value_bytes: usize,
}

impl InMemorySaveProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }

    /// Set the maximum value size
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySaveProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveProvider for InMemorySaveProvider {
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        validate_size(value, self.max_value_bytes)?;
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        validate_key(key)?;
        let values = self
            .values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(values.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        values.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.values
            .read()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }
}

/// Provider storing one JSON file per key in a directory.
///
/// Alongside each value file a `.saved_at` file records when it was written.
#[derive(Debug, Clone)]
pub struct FileSaveProvider {
    directory: PathBuf,
    max_value_bytes: usize,
}

impl FileSaveProvider {
    /// Create a provider rooted at `directory`; the directory is created on first save
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }

    /// Set the maximum value size
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Injective file stem for a key: `[A-Za-z0-9.-]` pass through and every
    /// other byte, `_` included, becomes `_XX`.
    fn file_stem(key: &str) -> String {
        let mut stem = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("_{:02X}", byte));
            }
        }
        stem
    }

    fn path_for(&self, key: &str, extension: &str) -> PathBuf {
        let name = format!("{}.{}", Self::file_stem(key), extension);
        self.directory.join(name)
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.path_for(key, "json")
    }

    fn staging_path(&self, key: &str) -> PathBuf {
        self.path_for(key, "json.tmp")
    }

    fn saved_at_path(&self, key: &str) -> PathBuf {
        self.path_for(key, "saved_at")
    }

    /// When the value under `key` was last saved, if known
    pub fn saved_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let text = fs::read_to_string(self.saved_at_path(key)).ok()?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }
}

fn remove_if_present(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl SaveProvider for FileSaveProvider {
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        validate_size(value, self.max_value_bytes)?;

        fs::create_dir_all(&self.directory)?;
        let path = self.value_path(key);
        let staging = self.staging_path(key);
        fs::write(&staging, value)?;
        if let Err(e) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!("Saved {} bytes to {}", value.len(), path.display());

        // The value is already stored; a missing stamp only loses `saved_at`
        if let Err(e) = fs::write(self.saved_at_path(key), Utc::now().to_rfc3339()) {
            warn!("Failed to record save time for '{}': {}", key, e);
        }
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        validate_key(key)?;
        match fs::read_to_string(self.value_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        validate_key(key)?;
        remove_if_present(&self.value_path(key))?;
        remove_if_present(&self.saved_at_path(key))
    }

    fn exists(&self, key: &str) -> bool {
        !key.trim().is_empty() && self.value_path(key).is_file()
    }
}
