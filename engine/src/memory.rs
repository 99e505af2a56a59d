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

//! # Memory Store
//!
//! Bounded memory of the actions performed on a companion, and the traits the
//! companion infers about whoever performed them.
//!
//! ## Retention
//!
//! Every recorded action receives an importance score from the
//! [`ImportanceTable`](crate::tables::ImportanceTable). When the store grows
//! past `max_memories`, the least important entries are evicted first, oldest
//! first among equals. Survivors keep their insertion order.
//!
//! ## Trait Inference
//!
//! Each action is mapped to a category which reinforces a set of traits with
//! diminishing returns:
//!
//! ```text
//! new = clamp01(old + k * (1 - old * d))
//! ```
//!
//! Reinforcing a trait then decays each of its configured opposites by a
//! multiplicative factor.

use crate::tables::BehaviorTables;
use chrono::Utc;
use companion_common::{MemoryEntry, MemorySnapshot, SnapshotError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary returned before anything has been recorded
pub const FIRST_ENCOUNTER: &str = "First encounter";

/// Number of recent actions listed in a summary
const SUMMARY_RECENT_ACTIONS: usize = 3;

/// Trait name to strength mapping, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraitVector {
    traits: Vec<(String, f32)>,
}

impl TraitVector {
    /// Strength of a trait, if it has ever been set
    pub fn get(&self, name: &str) -> Option<f32> {
        self.traits
            .iter()
            .find(|(trait_name, _)| trait_name == name)
            .map(|(_, value)| *value)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut f32> {
        self.traits
            .iter_mut()
            .find(|(trait_name, _)| trait_name == name)
            .map(|(_, value)| value)
    }

    /// Apply one diminishing-returns reinforcement, inserting the trait at zero if new
    fn reinforce(&mut self, name: &str, gain: f32, damping: f32) -> f32 {
        let index = match self.traits.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.traits.push((name.to_string(), 0.0));
                self.traits.len() - 1
            }
        };
        let value = &mut self.traits[index].1;
        *value = (*value + gain * (1.0 - *value * damping)).clamp(0.0, 1.0);
        *value
    }

    fn decay(&mut self, name: &str, factor: f32) {
        if let Some(value) = self.get_mut(name) {
            *value = (*value * factor).clamp(0.0, 1.0);
        }
    }

    /// Highest trait; ties go to the trait inserted first
    pub fn dominant(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (name, value) in &self.traits {
            match best {
                Some((_, best_value)) if *value <= best_value => {}
                _ => best = Some((name.as_str(), *value)),
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.traits
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    fn clear(&mut self) {
        self.traits.clear();
    }
}

/// Bounded memory of observed actions plus inferred traits
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Vec<MemoryEntry>,
    traits: TraitVector,
    max_memories: usize,
    tables: Arc<BehaviorTables>,
    /// Last issued timestamp; keeps entry timestamps strictly increasing
    clock: i64,
}

impl MemoryStore {
    /// Create an empty store holding at most `max_memories` entries
    pub fn new(max_memories: usize, tables: Arc<BehaviorTables>) -> Self {
        Self {
            entries: Vec::new(),
            traits: TraitVector::default(),
            max_memories: max_memories.max(1),
            tables,
            clock: 0,
        }
    }

    fn next_timestamp(&mut self) -> i64 {
        self.clock = Utc::now().timestamp_millis().max(self.clock + 1);
        self.clock
    }

    /// Record an action, evict down to capacity, then update traits.
    pub fn record_action(&mut self, action: &str, context: &str) {
        let importance = self.tables.importance.score(action, context);
        let timestamp = self.next_timestamp();
        self.entries
            .push(MemoryEntry::new(action, context, timestamp, importance));

        self.evict_to_capacity();
        self.update_traits(action);

        debug!(
            "Recorded action '{}' (importance {:.2}), {} memories held",
            action,
            importance,
            self.entries.len()
        );
    }

    /// Evict lowest importance, then oldest, until at capacity
    fn evict_to_capacity(&mut self) {
        let excess = self.entries.len().saturating_sub(self.max_memories);
        if excess == 0 {
            return;
        }

        let mut ranked: Vec<usize> = (0..self.entries.len()).collect();
        ranked.sort_by(|&a, &b| {
            let (a, b) = (&self.entries[a], &self.entries[b]);
            a.importance
                .total_cmp(&b.importance)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut keep = vec![true; self.entries.len()];
        for &index in ranked.iter().take(excess) {
            keep[index] = false;
        }
        let mut flags = keep.into_iter();
        self.entries.retain(|_| flags.next().unwrap_or(true));
        debug!("Evicted {} low-importance memories", excess);
    }

    fn update_traits(&mut self, action: &str) {
        let tables = Arc::clone(&self.tables);
        let table = &tables.traits;
        let category = table.categorize(action);

        let reinforced = table.traits_for(category);
        for name in reinforced {
            self.traits.reinforce(name, table.gain, table.damping);
        }
        for name in reinforced {
            for opposite in table.opposites_of(name) {
                // A trait reinforced by this action is never decayed by it
                if !reinforced.contains(opposite) {
                    self.traits.decay(opposite, table.opposite_decay);
                }
            }
        }
    }

    /// Human readable relationship summary
    pub fn get_summary(&self) -> String {
        if self.entries.is_empty() {
            return FIRST_ENCOUNTER.to_string();
        }

        let (trait_name, value) = self.traits.dominant().unwrap_or(("neutral", 0.0));

        // Newest first
        let mut recent: Vec<&MemoryEntry> = self.entries.iter().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let recent: Vec<&str> = recent
            .iter()
            .take(SUMMARY_RECENT_ACTIONS)
            .map(|entry| entry.action.as_str())
            .collect();

        format!(
            "Interactions: {}, Dominant trait: {} ({:.0}%), Recent: {}",
            self.entries.len(),
            trait_name,
            value * 100.0,
            recent.join(", ")
        )
    }

    /// Highest trait, if any
    pub fn dominant_trait(&self) -> Option<(&str, f32)> {
        self.traits.dominant()
    }

    pub fn traits(&self) -> &TraitVector {
        &self.traits
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_memories(&self) -> usize {
        self.max_memories
    }

    /// Forget every entry and trait
    pub fn clear(&mut self) {
        self.entries.clear();
        self.traits.clear();
    }

    /// Typed copy of the memory portion of a snapshot
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            memories: self.entries.clone(),
            traits: self.traits.traits.clone(),
        }
    }

    /// Replace state with a validated snapshot
    pub fn restore(&mut self, snapshot: MemorySnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;

        let mut entries = snapshot.memories;
        entries.sort_by_key(|entry| entry.timestamp);

        self.clock = entries.last().map(|entry| entry.timestamp).unwrap_or(0);
        self.entries = entries;
        self.traits = TraitVector {
            traits: snapshot.traits,
        };
        self.evict_to_capacity();
        Ok(())
    }

    /// Serialize the memory portion of a snapshot to JSON
    pub fn serialize(&self) -> String {
        match self.snapshot().to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("[MemoryStore] Failed to serialize: {}", e);
                String::new()
            }
        }
    }

    /// Load state from JSON.
    ///
    /// Empty input is a no-op. Malformed input is logged and leaves the
    /// current state untouched.
    pub fn deserialize(&mut self, data: &str) {
        if data.trim().is_empty() {
            return;
        }

        match MemorySnapshot::from_json(data).and_then(|snapshot| self.restore(snapshot)) {
            Ok(()) => debug!("[MemoryStore] Restored {} memories", self.entries.len()),
            Err(e) => warn!("[MemoryStore] Failed to deserialize: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn store(max: usize) -> MemoryStore {
        MemoryStore::new(max, Arc::new(BehaviorTables::default()))
    }

    #[test]
    fn test_first_encounter() {
        assert_eq!(store(10).get_summary(), FIRST_ENCOUNTER);
    }

    #[test]
    fn test_gift_summary() {
        let mut memory = store(10);
        for _ in 0..3 {
            memory.record_action("gave gift", "");
        }

        let summary = memory.get_summary();
        assert!(summary.contains("generous"), "{}", summary);
        assert!(summary.contains("Interactions: 3"), "{}", summary);
    }

    #[test]
    fn test_summary_lists_three_most_recent() {
        let mut memory = store(10);
        for action in ["waved", "talk", "gave gift", "help", "trade"] {
            memory.record_action(action, "");
        }

        let summary = memory.get_summary();
        assert!(
            summary.ends_with("Recent: trade, help, gave gift"),
            "{}",
            summary
        );
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut memory = store(5);
        for i in 0..40 {
            let action = if i % 3 == 0 { "talk" } else { "gave gift" };
            memory.record_action(action, "");
            assert!(memory.len() <= 5);
        }
        assert_eq!(memory.len(), 5);
    }

    #[test]
    fn test_eviction_prefers_low_importance_then_oldest() {
        let mut memory = store(3);
        memory.record_action("talk first", "");
        memory.record_action("rescued a cat", "");
        memory.record_action("talk second", "");
        memory.record_action("gave gift", "");

        let actions: Vec<&str> = memory.entries().iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["rescued a cat", "talk second", "gave gift"]);
    }

    #[test]
    fn test_diminishing_returns() {
        let mut memory = store(50);
        let mut previous = 0.0;
        let mut previous_step = f32::MAX;

        for _ in 0..10 {
            memory.record_action("help", "");
            let value = memory.traits().get("helpful").unwrap();
            let step = value - previous;
            assert!(value > previous);
            assert!(step < previous_step);
            previous = value;
            previous_step = step;
        }
        assert!(previous <= 1.0);
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let mut memory = store(20);
        for i in 0..200 {
            let action = ["gave gift", "attack", "insult", "help", "quest", "steal"][i % 6];
            memory.record_action(action, "important quest");
        }

        for (_, value) in memory.traits().iter() {
            assert!((0.0..=1.0).contains(&value));
        }
        for entry in memory.entries() {
            assert!((0.0..=1.0).contains(&entry.importance));
        }
    }

    #[test]
    fn test_opposite_traits_decay() {
        let mut memory = store(50);
        memory.record_action("attack", "");
        let hostile = memory.traits().get("hostile").unwrap();

        memory.record_action("gave gift", "");
        let decayed = memory.traits().get("hostile").unwrap();
        assert!((decayed - hostile * 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_dominant_tie_goes_to_first_inserted() {
        let mut memory = store(50);
        memory.record_action("gave gift", "");
        assert_eq!(memory.dominant_trait().unwrap().0, "generous");
    }

    #[test]
    fn test_clear() {
        let mut memory = store(50);
        memory.record_action("gave gift", "");
        memory.clear();

        assert!(memory.is_empty());
        assert!(memory.traits().is_empty());
        assert_eq!(memory.get_summary(), FIRST_ENCOUNTER);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut memory = store(10);
        memory.record_action("gave gift", "market");
        memory.record_action("attack", "");
        memory.record_action("help", "quest");

        let mut restored = store(10);
        restored.deserialize(&memory.serialize());

        assert_eq!(restored.get_summary(), memory.get_summary());
        assert_eq!(restored.entries(), memory.entries());
        assert_eq!(restored.traits(), memory.traits());
    }

    #[test]
    fn test_restored_store_keeps_recording_in_order() {
        let mut memory = store(10);
        memory.record_action("gave gift", "");
        let mut restored = store(10);
        restored.deserialize(&memory.serialize());

        restored.record_action("trade", "");
        assert!(restored.get_summary().contains("Recent: trade, gave gift"));
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut memory = store(10);
        memory.record_action("gave gift", "");
        memory.deserialize("");
        memory.deserialize("   ");
        assert_eq!(memory.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_malformed_input_keeps_state() {
        let mut memory = store(10);
        memory.record_action("gave gift", "");
        let before = memory.get_summary();

        memory.deserialize("{\"memories\": [oops");
        memory.deserialize(r#"{"memories":[],"traits":[["generous",7.0]]}"#);

        assert_eq!(memory.get_summary(), before);
        assert!(logs_contain("Failed to deserialize"));
    }
}
