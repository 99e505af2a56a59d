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

//! Offline phrase selection
//!
//! Phrase sets are consulted in priority order:
//!
//! 1. Significant pattern phrases for (category, frequency tier)
//! 2. Context phrases for (category, context keyword)
//! 3. Action phrases for the category
//! 4. Generic phrases
//!
//! Phrases may contain `{name}`, `{action}`, `{count}` and `{category}` tokens.

use super::ResponseRequest;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How often a pattern has been seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyTier {
    /// Fewer than 5 observations
    Low,
    /// 5 to 9 observations
    Medium,
    /// 10 or more observations
    High,
}

impl FrequencyTier {
    pub fn from_count(count: u32) -> Self {
        match count {
            0..=4 => FrequencyTier::Low,
            5..=9 => FrequencyTier::Medium,
            _ => FrequencyTier::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrequencyTier::Low => "low",
            FrequencyTier::Medium => "medium",
            FrequencyTier::High => "high",
        }
    }
}

/// Phrases for a significant pattern at a frequency tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPhrases {
    pub category: String,
    pub tier: FrequencyTier,
    pub phrases: Vec<String>,
}

/// Phrases for a category when the context mentions a keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPhrases {
    pub category: String,
    pub context: String,
    pub phrases: Vec<String>,
}

/// Phrases for a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPhrases {
    pub category: String,
    pub phrases: Vec<String>,
}

/// All phrase sets available to the template strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCatalog {
    pub patterns: Vec<PatternPhrases>,
    pub contexts: Vec<ContextPhrases>,
    pub actions: Vec<ActionPhrases>,
    pub generic: Vec<String>,
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn pattern(category: &str, tier: FrequencyTier, items: &[&str]) -> PatternPhrases {
    PatternPhrases {
        category: category.to_string(),
        tier,
        phrases: phrases(items),
    }
}

fn context(category: &str, keyword: &str, items: &[&str]) -> ContextPhrases {
    ContextPhrases {
        category: category.to_string(),
        context: keyword.to_string(),
        phrases: phrases(items),
    }
}

fn action(category: &str, items: &[&str]) -> ActionPhrases {
    ActionPhrases {
        category: category.to_string(),
        phrases: phrases(items),
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        use FrequencyTier::{High, Low, Medium};
        Self {
            patterns: vec![
                pattern("gift", Low, &[
                    "You really like giving gifts, don't you?",
                    "Your generosity knows no bounds.",
                    "Always the charitable one.",
                ]),
                pattern("gift", Medium, &[
                    "That's {count} gifts now. I'm running out of ways to say thanks.",
                    "You spoil me. I won't complain.",
                ]),
                pattern("gift", High, &[
                    "{count} gifts! I should start keeping a ledger.",
                    "At this point I'd worry if you came empty-handed.",
                ]),
                pattern("attack", Low, &[
                    "You're quite aggressive today.",
                    "Always choosing violence...",
                    "Maybe try talking instead?",
                ]),
                pattern("attack", Medium, &[
                    "That's {count} times now. I'm keeping count.",
                    "Is this how you treat everyone?",
                ]),
                pattern("attack", High, &[
                    "{count} attacks. I've stopped being surprised.",
                    "I'm starting to think you enjoy this.",
                ]),
                pattern("talk", Low, &[
                    "You're quite the conversationalist.",
                    "Always eager for a chat, aren't you?",
                    "I enjoy our talks.",
                ]),
                pattern("talk", Medium, &[
                    "We've talked {count} times. I feel like I know you.",
                    "Our chats are becoming a habit.",
                ]),
                pattern("talk", High, &[
                    "{count} conversations and you still surprise me.",
                    "I'd miss these talks if they stopped.",
                ]),
                pattern("help", Low, &[
                    "You keep helping me out. I appreciate it.",
                    "Always there when I need a hand.",
                ]),
                pattern("insult", Low, &[
                    "Another insult? You're consistent, I'll give you that.",
                    "Do you ever say anything nice?",
                ]),
                pattern("steal", Low, &[
                    "Things keep going missing when you're around.",
                    "I'm starting to keep my pockets closed.",
                ]),
                pattern("trade", Low, &[
                    "Always looking for a deal, aren't you?",
                    "You drive a hard bargain.",
                ]),
            ],
            contexts: vec![
                context("gift", "food", &[
                    "Food? You know the way to my heart.",
                    "This smells wonderful.",
                ]),
                context(
                    "gift",
                    "gold",
                    &["Gold! That's very generous.", "I'll put it to good use."],
                ),
                context(
                    "attack",
                    "weapon",
                    &["Put that weapon away!", "Careful with that thing!"],
                ),
                context("help", "quest", &[
                    "Together we'll finish this quest.",
                    "Thanks for helping with the quest.",
                ]),
                context(
                    "talk",
                    "weather",
                    &["Lovely weather we're having.", "Looks like rain later."],
                ),
            ],
            actions: vec![
                action("gift", &[
                    "That's kind of you.",
                    "A gift? How thoughtful.",
                    "You're quite generous.",
                ]),
                action("attack", &[
                    "Hey! What was that for?",
                    "Violence isn't the answer!",
                    "That was uncalled for.",
                ]),
                action("talk", &[
                    "Good to talk with you.",
                    "What's on your mind?",
                    "I'm listening.",
                ]),
                action("help", &[
                    "Thanks for the help!",
                    "I couldn't have done it without you.",
                ]),
                action("insult", &["That's hurtful.", "Was that necessary?"]),
                action("steal", &["Hey, that's mine!", "I saw that."]),
                action(
                    "trade",
                    &["Let's see what you've got.", "A fair trade, I think."],
                ),
                action("quest", &["Another adventure awaits.", "Lead the way."]),
                action("explore", &[
                    "What did you find out there?",
                    "Let's see what's over there.",
                ]),
                action("craft", &["You made that yourself?", "Nice handiwork."]),
            ],
            generic: phrases(&["Interesting...", "I see.", "Hmm, noted."]),
        }
    }
}

impl TemplateCatalog {
    fn pattern_set(&self, category: &str, tier: FrequencyTier) -> Option<&[String]> {
        self.patterns
            .iter()
            .find(|set| set.category == category && set.tier == tier && !set.phrases.is_empty())
            .map(|set| set.phrases.as_slice())
    }

    fn context_set(&self, category: &str, context: &str) -> Option<(&str, &[String])> {
        let context = context.to_lowercase();
        self.contexts
            .iter()
            .find(|set| {
                set.category == category
                    && !set.phrases.is_empty()
                    && !set.context.is_empty()
                    && context.contains(&set.context.to_lowercase())
            })
            .map(|set| (set.context.as_str(), set.phrases.as_slice()))
    }

    fn action_set(&self, category: &str) -> Option<&[String]> {
        self.actions
            .iter()
            .find(|set| set.category == category && !set.phrases.is_empty())
            .map(|set| set.phrases.as_slice())
    }
}

/// Deterministic-given-seed template responder
#[derive(Debug, Clone)]
pub struct TemplateStrategy {
    catalog: Arc<TemplateCatalog>,
    rng: StdRng,
    last_picked: HashMap<String, usize>,
}

impl TemplateStrategy {
    /// Create a new template strategy seeded from the OS
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self::with_rng(catalog, StdRng::from_os_rng())
    }

    /// Create a template strategy with a fixed seed
    pub fn seeded(catalog: Arc<TemplateCatalog>, seed: u64) -> Self {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Arc<TemplateCatalog>, rng: StdRng) -> Self {
        Self {
            catalog,
            rng,
            last_picked: HashMap::new(),
        }
    }

    /// Choose a phrase for the request, `None` only when the catalog has no usable set
    pub fn select(&mut self, request: &ResponseRequest) -> Option<String> {
        let catalog = Arc::clone(&self.catalog);
        let (key, set) = Self::choose_set(&catalog, request)?;
        let index = self.pick(&key, set.len());
        Some(substitute(&set[index], request))
    }

    fn choose_set<'a>(
        catalog: &'a TemplateCatalog,
        request: &ResponseRequest,
    ) -> Option<(String, &'a [String])> {
        if let Some(pattern) = &request.pattern {
            let category = pattern.category.as_str();

            if pattern.significant {
                let tier = FrequencyTier::from_count(pattern.count);
                if let Some(set) = catalog.pattern_set(category, tier) {
                    return Some((format!("pattern:{}:{}", category, tier.as_str()), set));
                }
            }
            if let Some((keyword, set)) = catalog.context_set(category, &request.context) {
                return Some((format!("context:{}:{}", category, keyword), set));
            }
            if let Some(set) = catalog.action_set(category) {
                return Some((format!("action:{}", category), set));
            }
        }

        if catalog.generic.is_empty() {
            None
        } else {
            Some(("generic".to_string(), catalog.generic.as_slice()))
        }
    }

    /// Uniform pick avoiding the set's previous pick: one retry, then the next entry
    fn pick(&mut self, key: &str, len: usize) -> usize {
        let mut index = self.rng.random_range(0..len);
        if len > 1 {
            if let Some(&last) = self.last_picked.get(key) {
                if index == last {
                    index = self.rng.random_range(0..len);
                }
                if index == last {
                    index = (index + 1) % len;
                }
            }
        }
        self.last_picked.insert(key.to_string(), index);
        index
    }
}

fn substitute(phrase: &str, request: &ResponseRequest) -> String {
    let (count, category) = request
        .pattern
        .as_ref()
        .map(|pattern| (pattern.count.to_string(), pattern.category.as_str()))
        .unwrap_or_else(|| ("0".to_string(), ""));

    phrase
        .replace("{name}", &request.companion_name)
        .replace("{action}", &request.action)
        .replace("{count}", &count)
        .replace("{category}", category)
}
