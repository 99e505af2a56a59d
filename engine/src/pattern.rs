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

//! # Pattern Tracker
//!
//! Classifies actions into categories and tracks how often, and how recently,
//! each category recurs.
//!
//! Each observation of a category grows its weight
//! (`weight = min(1, weight * growth + increment)`) while every other tracked
//! category decays multiplicatively. Categories that decay below the floor
//! before they were seen often enough are forgotten, and when more than
//! `max_patterns` categories are tracked the least recently seen one is
//! evicted.

use crate::tables::{BehaviorTables, PatternTable};
use chrono::Utc;
use companion_common::{PatternRecord, PatternSnapshot, SnapshotError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Recognizes recurring behavior
#[derive(Debug, Clone)]
pub struct PatternTracker {
    patterns: BTreeMap<String, PatternRecord>,
    max_patterns: usize,
    tables: Arc<BehaviorTables>,
    clock: i64,
}

impl PatternTracker {
    /// Create an empty tracker holding at most `max_patterns` categories
    pub fn new(max_patterns: usize, tables: Arc<BehaviorTables>) -> Self {
        Self {
            patterns: BTreeMap::new(),
            max_patterns: max_patterns.max(1),
            tables,
            clock: 0,
        }
    }

    fn table(&self) -> &PatternTable {
        &self.tables.patterns
    }

    fn next_timestamp(&mut self) -> i64 {
        self.clock = Utc::now().timestamp_millis().max(self.clock + 1);
        self.clock
    }

    /// Category an action falls into
    pub fn categorize(&self, action: &str) -> &str {
        self.table().categorize(action)
    }

    /// Record one observation of an action and return its category's updated record
    pub fn analyze_action(&mut self, action: &str) -> PatternRecord {
        let tables = Arc::clone(&self.tables);
        let table = &tables.patterns;
        let category = table.categorize(action).to_string();
        let now = self.next_timestamp();

        let record = self
            .patterns
            .entry(category.clone())
            .and_modify(|record| {
                record.count = record.count.saturating_add(1);
                record.weight = (record.weight * table.growth + table.increment).clamp(0.0, 1.0);
                record.last_seen = now;
            })
            .or_insert_with(|| PatternRecord::new(category.as_str(), table.initial_weight, now));
        record.significant = table.is_significant(record.count, record.weight);
        let record = record.clone();

        // Neither step touches the observed category
        self.decay_others(&category, table);
        if self.patterns.len() > self.max_patterns {
            self.evict_oldest(&category);
        }

        debug!(
            "Pattern '{}' seen {} times (weight {:.2}, significant: {})",
            record.category, record.count, record.weight, record.significant
        );
        record
    }

    fn decay_others(&mut self, except: &str, table: &PatternTable) {
        self.patterns.retain(|category, record| {
            if category == except {
                return true;
            }
            record.weight = (record.weight * table.decay).clamp(0.0, 1.0);
            record.significant = table.is_significant(record.count, record.weight);
            !(record.weight < table.prune_floor && record.count < table.prune_min_count)
        });
    }

    /// Drop the least recently seen record, lowest weight first among equals
    fn evict_oldest(&mut self, except: &str) {
        let oldest = self
            .patterns
            .values()
            .filter(|record| record.category != except)
            .min_by(|a, b| {
                a.last_seen
                    .cmp(&b.last_seen)
                    .then(a.weight.total_cmp(&b.weight))
            })
            .map(|record| record.category.clone());

        if let Some(category) = oldest {
            debug!("Evicting pattern '{}'", category);
            self.patterns.remove(&category);
        }
    }

    /// Up to `n` records by weight, then count, descending
    pub fn get_top_patterns(&self, n: usize) -> Vec<PatternRecord> {
        let mut records: Vec<&PatternRecord> = self.patterns.values().collect();
        records.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(b.count.cmp(&a.count)));
        records.into_iter().take(n).cloned().collect()
    }

    /// Whether a category is seen repeatedly with a rising weight
    pub fn is_pattern_emerging(&self, category: &str) -> bool {
        let table = self.table();
        self.patterns.get(category).is_some_and(|record| {
            record.count >= table.emerging_count && record.weight > table.emerging_weight
        })
    }

    /// Current record for a category
    pub fn record(&self, category: &str) -> Option<&PatternRecord> {
        self.patterns.get(category)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Typed copy of the pattern portion of a snapshot
    pub fn snapshot(&self) -> PatternSnapshot {
        PatternSnapshot {
            patterns: self.patterns.values().cloned().collect(),
        }
    }

    /// Replace state with a validated snapshot
    pub fn restore(&mut self, snapshot: PatternSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;

        let tables = Arc::clone(&self.tables);
        let table = &tables.patterns;
        let mut patterns = BTreeMap::new();
        for mut record in snapshot.patterns {
            record.significant = table.is_significant(record.count, record.weight);
            patterns.insert(record.category.clone(), record);
        }

        self.clock = patterns
            .values()
            .map(|record| record.last_seen)
            .max()
            .unwrap_or(0);
        self.patterns = patterns;
        while self.patterns.len() > self.max_patterns {
            self.evict_oldest("");
        }
        Ok(())
    }

    /// Serialize the pattern portion of a snapshot to JSON
    pub fn serialize(&self) -> String {
        match self.snapshot().to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("[PatternTracker] Failed to serialize: {}", e);
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

        match PatternSnapshot::from_json(data).and_then(|snapshot| self.restore(snapshot)) {
            Ok(()) => debug!("[PatternTracker] Restored {} patterns", self.patterns.len()),
            Err(e) => warn!("[PatternTracker] Failed to deserialize: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn tracker(max: usize) -> PatternTracker {
        PatternTracker::new(max, Arc::new(BehaviorTables::default()))
    }

    #[test]
    fn test_gift_becomes_significant_on_third_observation() {
        let mut patterns = tracker(20);

        let first = patterns.analyze_action("gave gift");
        assert_eq!(first.count, 1);
        assert!((first.weight - 0.3).abs() < 1e-6);
        assert!(!first.significant);

        assert!(!patterns.analyze_action("gave gift").significant);

        let third = patterns.analyze_action("gave gift");
        assert_eq!(third.category, "gift");
        assert_eq!(third.count, 3);
        assert!(third.significant);
    }

    #[test]
    fn test_weight_growth() {
        let mut patterns = tracker(20);
        patterns.analyze_action("talk");
        let second = patterns.analyze_action("talk");
        assert!((second.weight - (0.3 * 1.1 + 0.1)).abs() < 1e-6);

        for _ in 0..50 {
            let record = patterns.analyze_action("talk");
            assert!(record.weight <= 1.0);
        }
    }

    #[test]
    fn test_other_categories_decay() {
        let mut patterns = tracker(20);
        patterns.analyze_action("talk");
        patterns.analyze_action("trade");
        patterns.analyze_action("attack");

        let before: Vec<(String, f32)> = patterns
            .get_top_patterns(10)
            .into_iter()
            .map(|r| (r.category, r.weight))
            .collect();

        patterns.analyze_action("attack");

        for (category, weight) in before {
            if category != "attack" {
                assert!(patterns.record(&category).unwrap().weight <= weight);
            }
        }
    }

    #[test]
    fn test_faded_one_off_patterns_are_pruned() {
        let mut patterns = tracker(20);
        patterns.analyze_action("explored the cave");
        patterns.analyze_action("trade");
        patterns.analyze_action("trade");

        for _ in 0..30 {
            patterns.analyze_action("talk");
        }

        assert!(patterns.record("explore").is_none());
        // Seen twice, so it survives even though its weight faded
        assert!(patterns.record("trade").is_some());
        assert!(
            patterns
                .get_top_patterns(20)
                .iter()
                .all(|record| record.category != "explore")
        );
    }

    #[test]
    fn test_capacity_evicts_least_recently_seen() {
        let mut patterns = tracker(3);
        patterns.analyze_action("gift");
        patterns.analyze_action("attack");
        patterns.analyze_action("talk");
        patterns.analyze_action("trade");

        assert_eq!(patterns.len(), 3);
        assert!(patterns.record("gift").is_none());
        assert!(patterns.record("trade").is_some());
    }

    #[test]
    fn test_top_patterns_ordering() {
        let mut patterns = tracker(20);
        patterns.analyze_action("talk");
        patterns.analyze_action("gift");
        patterns.analyze_action("gift");
        patterns.analyze_action("attack");

        let top = patterns.get_top_patterns(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].category, "gift");
        assert!(top[0].weight >= top[1].weight);
        assert!(patterns.get_top_patterns(0).is_empty());
    }

    #[test]
    fn test_emerging_pattern() {
        let mut patterns = tracker(20);
        patterns.analyze_action("help");
        assert!(!patterns.is_pattern_emerging("help"));

        patterns.analyze_action("help");
        assert!(patterns.is_pattern_emerging("help"));
        assert!(!patterns.is_pattern_emerging("steal"));
    }

    #[test]
    fn test_serialize_round_trip_preserves_counts() {
        let mut patterns = tracker(20);
        patterns.analyze_action("gave gift");
        patterns.analyze_action("gave gift");
        patterns.analyze_action("talk");

        let mut restored = tracker(20);
        restored.deserialize(&patterns.serialize());

        assert_eq!(restored.get_top_patterns(5), patterns.get_top_patterns(5));
        let record = restored.analyze_action("gave gift");
        assert_eq!(record.count, 3);
        assert!(record.significant);
    }

    #[test]
    #[traced_test]
    fn test_malformed_input_keeps_state() {
        let mut patterns = tracker(20);
        patterns.analyze_action("gift");

        patterns.deserialize("[1, 2");
        let zero_count =
            r#"{"patterns":[{"category":"gift","count":0,"weight":0.3,"lastSeen":1}]}"#;
        patterns.deserialize(zero_count);
        patterns.deserialize("");

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns.record("gift").unwrap().count, 1);
        assert!(logs_contain("Failed to deserialize"));
    }

    #[test]
    fn test_clear() {
        let mut patterns = tracker(20);
        patterns.analyze_action("gift");
        patterns.clear();
        assert!(patterns.is_empty());
        assert_eq!(patterns.analyze_action("gift").count, 1);
    }
}
