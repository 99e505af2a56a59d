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

//! Companion Engine Library
//!
//! Adaptive companion behavior: a bounded memory of observed actions with
//! inferred traits, recurring pattern recognition with decay, and response
//! selection over templates and generative backends, sequenced by a
//! per-companion orchestrator.

pub mod companion;
pub mod config;
pub mod events;
pub mod llm;
pub mod memory;
pub mod pattern;
pub mod persistence;
pub mod response;
pub mod tables;

// Re-export commonly used types
pub use companion::{CompanionError, CompanionOrchestrator};
pub use config::{CompanionConfig, Configuration, PersistenceConfig};
pub use events::CompanionEvents;
pub use memory::{MemoryStore, TraitVector};
pub use pattern::PatternTracker;
pub use persistence::{FileSaveProvider, InMemorySaveProvider, PersistenceError, SaveProvider};
pub use response::{ResponseRequest, ResponseSelector, StrategyKind, TemplateCatalog};
pub use tables::BehaviorTables;

pub use companion_common::{CompanionEvent, CompanionState, PatternRecord, Snapshot};
