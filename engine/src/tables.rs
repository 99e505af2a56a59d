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

//! Behavior tables
//!
//! Keyword rules and tuning constants used by the memory store, the pattern
//! tracker and the orchestrator. Tables are plain configuration data: they are
//! loaded once (from YAML or [`Default`]) and shared immutably behind an `Arc`.
//!
//! All keyword matching is case-insensitive substring matching on the action
//! (and, for importance markers, the context).

use serde::{Deserialize, Serialize};

/// All behavior tables for one companion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorTables {
    pub importance: ImportanceTable,
    pub traits: TraitTable,
    pub patterns: PatternTable,
}

/// Returns true if `haystack` contains any of `keywords`
fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && haystack.contains(keyword.as_str()))
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// One ranked importance rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRule {
    pub keywords: Vec<String>,
    pub importance: f32,
    /// A terminal rule returns its importance directly, skipping the context bonus
    #[serde(default)]
    pub terminal: bool,
}

impl ImportanceRule {
    fn new(keywords: &[&str], importance: f32, terminal: bool) -> Self {
        Self {
            keywords: words(keywords),
            importance,
            terminal,
        }
    }
}

/// Keyword-ranked importance scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceTable {
    /// Rules in priority order; the first matching rule wins
    pub rules: Vec<ImportanceRule>,
    /// Importance when no rule matches
    pub default_importance: f32,
    /// Context markers that earn the bonus
    pub context_markers: Vec<String>,
    pub context_bonus: f32,
}

impl Default for ImportanceTable {
    fn default() -> Self {
        Self {
            rules: vec![
                ImportanceRule::new(&["save", "rescue"], 1.0, true),
                ImportanceRule::new(&["kill", "murder"], 0.95, true),
                ImportanceRule::new(&["insult", "attack"], 0.8, false),
                ImportanceRule::new(&["gift", "help"], 0.7, false),
                ImportanceRule::new(&["talk"], 0.3, false),
            ],
            default_importance: 0.5,
            context_markers: words(&["quest", "important"]),
            context_bonus: 0.2,
        }
    }
}

impl ImportanceTable {
    /// Score an action in `[0, 1]`
    pub fn score(&self, action: &str, context: &str) -> f32 {
        let action = action.to_lowercase();
        let context = context.to_lowercase();

        let mut importance = self.default_importance;
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| contains_any(&action, &rule.keywords))
        {
            if rule.terminal {
                return rule.importance.clamp(0.0, 1.0);
            }
            importance = rule.importance;
        }

        if contains_any(&context, &self.context_markers) {
            importance += self.context_bonus;
        }

        importance.clamp(0.0, 1.0)
    }
}

/// A memory category and the traits it reinforces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitCategory {
    pub category: String,
    pub keywords: Vec<String>,
    pub traits: Vec<String>,
}

impl TraitCategory {
    fn new(category: &str, traits: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: vec![category.to_string()],
            traits: words(traits),
        }
    }
}

/// Traits that fade when `reinforced` is strengthened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OppositeTraits {
    pub reinforced: String,
    pub opposites: Vec<String>,
}

impl OppositeTraits {
    fn new(reinforced: &str, opposites: &[&str]) -> Self {
        Self {
            reinforced: reinforced.to_string(),
            opposites: words(opposites),
        }
    }
}

/// Trait inference rules for the memory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitTable {
    /// Categories in match order
    pub categories: Vec<TraitCategory>,
    pub opposites: Vec<OppositeTraits>,
    pub default_category: String,
    /// Base gain `k` in `old + k * (1 - old * d)`
    pub gain: f32,
    /// Damping `d` in `old + k * (1 - old * d)`
    pub damping: f32,
    /// Multiplicative decay applied to opposite traits
    pub opposite_decay: f32,
}

impl Default for TraitTable {
    fn default() -> Self {
        Self {
            categories: vec![
                TraitCategory::new("gift", &["generous", "friendly"]),
                TraitCategory::new("help", &["helpful", "kind"]),
                TraitCategory::new("attack", &["aggressive", "hostile"]),
                TraitCategory::new("insult", &["rude", "mean"]),
                TraitCategory::new("steal", &["dishonest", "sneaky"]),
                TraitCategory::new("talk", &["social", "talkative"]),
                TraitCategory::new("trade", &["merchant", "trader"]),
                TraitCategory::new("quest", &["adventurous", "helpful"]),
            ],
            opposites: vec![
                OppositeTraits::new("generous", &["greedy", "selfish"]),
                OppositeTraits::new("friendly", &["hostile", "rude"]),
                OppositeTraits::new("helpful", &["selfish", "indifferent"]),
                OppositeTraits::new("kind", &["mean", "rude"]),
                OppositeTraits::new("aggressive", &["peaceful", "calm"]),
                OppositeTraits::new("hostile", &["friendly", "kind"]),
                OppositeTraits::new("rude", &["friendly", "kind"]),
                OppositeTraits::new("dishonest", &["honest"]),
            ],
            default_category: "misc".to_string(),
            gain: 0.1,
            damping: 0.5,
            opposite_decay: 0.9,
        }
    }
}

impl TraitTable {
    /// Category of an action by first keyword match
    pub fn categorize(&self, action: &str) -> &str {
        let action = action.to_lowercase();
        self.categories
            .iter()
            .find(|entry| contains_any(&action, &entry.keywords))
            .map(|entry| entry.category.as_str())
            .unwrap_or(self.default_category.as_str())
    }

    /// Traits reinforced by a category
    pub fn traits_for(&self, category: &str) -> &[String] {
        self.categories
            .iter()
            .find(|entry| entry.category == category)
            .map(|entry| entry.traits.as_slice())
            .unwrap_or(&[])
    }

    /// Traits that decay when `reinforced` is strengthened
    pub fn opposites_of(&self, reinforced: &str) -> &[String] {
        self.opposites
            .iter()
            .find(|entry| entry.reinforced == reinforced)
            .map(|entry| entry.opposites.as_slice())
            .unwrap_or(&[])
    }
}

/// Extra keyword mapped onto a pattern category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAlias {
    pub keyword: String,
    pub category: String,
}

/// Pattern recognition rules and constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTable {
    /// Categories matched by name, in order
    pub categories: Vec<String>,
    /// Aliases checked after every category name failed to match
    pub aliases: Vec<CategoryAlias>,
    pub default_category: String,
    pub initial_weight: f32,
    pub growth: f32,
    pub increment: f32,
    /// Multiplicative decay applied to every other category per observation
    pub decay: f32,
    /// Records under this weight and under `prune_min_count` are dropped
    pub prune_floor: f32,
    pub prune_min_count: u32,
    pub significant_count: u32,
    pub significant_weight: f32,
    pub emerging_count: u32,
    pub emerging_weight: f32,
    /// Counts that always trigger a (rich) response
    pub milestones: Vec<u32>,
}

impl Default for PatternTable {
    fn default() -> Self {
        let alias = |keyword: &str, category: &str| CategoryAlias {
            keyword: keyword.to_string(),
            category: category.to_string(),
        };

        Self {
            categories: words(&[
                "gift", "attack", "talk", "trade", "help", "insult", "steal", "quest", "explore",
                "craft",
            ]),
            aliases: vec![
                alias("give", "gift"),
                alias("gave", "gift"),
                alias("fight", "attack"),
                alias("hit", "attack"),
                alias("speak", "talk"),
                alias("chat", "talk"),
            ],
            default_category: "misc".to_string(),
            initial_weight: 0.3,
            growth: 1.1,
            increment: 0.1,
            decay: 0.95,
            prune_floor: 0.1,
            prune_min_count: 2,
            significant_count: 3,
            significant_weight: 0.7,
            emerging_count: 2,
            emerging_weight: 0.5,
            milestones: vec![3, 10],
        }
    }
}

impl PatternTable {
    /// Category of an action
    pub fn categorize(&self, action: &str) -> &str {
        let action = action.to_lowercase();

        if let Some(category) = self
            .categories
            .iter()
            .find(|category| !category.is_empty() && action.contains(category.as_str()))
        {
            return category;
        }

        self.aliases
            .iter()
            .find(|alias| !alias.keyword.is_empty() && action.contains(alias.keyword.as_str()))
            .map(|alias| alias.category.as_str())
            .unwrap_or(self.default_category.as_str())
    }

    /// Whether a count/weight pair is significant
    pub fn is_significant(&self, count: u32, weight: f32) -> bool {
        count >= self.significant_count || weight > self.significant_weight
    }

    /// Whether a count is a milestone
    pub fn is_milestone(&self, count: u32) -> bool {
        self.milestones.contains(&count)
    }
}
