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

//! # Response Selection
//!
//! A companion voices its reactions through exactly one of three strategies,
//! chosen when it is built:
//!
//! - **Template**: offline phrase sets, see [`template`]
//! - **Generative**: a [`GenerativeBackend`](crate::llm::GenerativeBackend)
//!   bounded by a timeout, with templates behind it
//! - **Hybrid**: the backend for significant or milestone patterns and a
//!   random share of other observations, templates otherwise
//!
//! Selection never fails. Backend errors degrade to templates, and an empty
//! template catalog degrades to [`PLACEHOLDER_RESPONSE`].

pub mod generative;
pub mod hybrid;
pub mod template;

pub use generative::GenerativeStrategy;
pub use hybrid::HybridStrategy;
pub use template::{FrequencyTier, TemplateCatalog, TemplateStrategy};

use crate::llm::{GenerativeBackend, PromptContext};
use crate::tables::BehaviorTables;
use companion_common::PatternRecord;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Returned when no strategy produced any text
pub const PLACEHOLDER_RESPONSE: &str = "...";

/// Read-only view of one observation handed to a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRequest {
    pub action: String,
    pub context: String,
    pub pattern: Option<PatternRecord>,
    pub memory_summary: String,
    pub personality: String,
    pub companion_name: String,
}

impl ResponseRequest {
    /// Prompt handed to a generative backend
    pub fn prompt(&self) -> PromptContext {
        PromptContext {
            companion_name: self.companion_name.clone(),
            personality: self.personality.clone(),
            memory_summary: self.memory_summary.clone(),
            action: self.action.clone(),
            context: self.context.clone(),
            pattern: self.pattern.clone(),
        }
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Template,
    Generative,
    Placeholder,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Template => "template",
            ResponseSource::Generative => "generative",
            ResponseSource::Placeholder => "placeholder",
        }
    }
}

/// A chosen response
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedResponse {
    pub text: String,
    pub source: ResponseSource,
}

/// Strategy installed on a companion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Template,
    Generative,
    #[default]
    Hybrid,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Template => write!(f, "template"),
            StrategyKind::Generative => write!(f, "generative"),
            StrategyKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Tuning shared by the strategies
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSettings {
    pub ai_threshold: f32,
    pub recent_history: usize,
    pub generation_timeout: Duration,
    pub seed: Option<u64>,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            ai_threshold: 0.7,
            recent_history: hybrid::DEFAULT_RECENT_HISTORY,
            generation_timeout: generative::DEFAULT_GENERATION_TIMEOUT,
            seed: None,
        }
    }
}

/// The response strategy of one companion
#[derive(Debug)]
pub enum ResponseSelector {
    Template(TemplateStrategy),
    Generative {
        generative: GenerativeStrategy,
        fallback: TemplateStrategy,
    },
    Hybrid(HybridStrategy),
}

impl ResponseSelector {
    /// Build the selector for a strategy kind. A generative selector without
    /// a backend is built as a template selector.
    pub fn build(
        kind: StrategyKind,
        catalog: Arc<TemplateCatalog>,
        backend: Option<Arc<dyn GenerativeBackend>>,
        tables: Arc<BehaviorTables>,
        settings: &SelectorSettings,
    ) -> Self {
        let template = match settings.seed {
            Some(seed) => TemplateStrategy::seeded(catalog, seed),
            None => TemplateStrategy::new(catalog),
        };
        let generative = backend.map(|backend| {
            GenerativeStrategy::new(backend).with_timeout(settings.generation_timeout)
        });

        match (kind, generative) {
            (StrategyKind::Template, _) => ResponseSelector::Template(template),
            (StrategyKind::Generative, Some(generative)) => ResponseSelector::Generative {
                generative,
                fallback: template,
            },
            (StrategyKind::Generative, None) => {
                warn!("Generative strategy requested without a backend, using templates");
                ResponseSelector::Template(template)
            }
            (StrategyKind::Hybrid, generative) => {
                let mut hybrid = HybridStrategy::new(template, generative, tables)
                    .with_ai_threshold(settings.ai_threshold)
                    .with_recent_history(settings.recent_history);
                if let Some(seed) = settings.seed {
                    hybrid = hybrid.with_seed(seed.wrapping_add(1));
                }
                ResponseSelector::Hybrid(hybrid)
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            ResponseSelector::Template(_) => StrategyKind::Template,
            ResponseSelector::Generative { .. } => StrategyKind::Generative,
            ResponseSelector::Hybrid(_) => StrategyKind::Hybrid,
        }
    }

    /// Choose a response; always yields text
    pub async fn select(&mut self, request: &ResponseRequest) -> SelectedResponse {
        let response = match self {
            ResponseSelector::Template(template) => template_or_placeholder(template, request),
            ResponseSelector::Generative {
                generative,
                fallback,
            } => match generative.generate(request).await {
                Ok(text) => SelectedResponse {
                    text,
                    source: ResponseSource::Generative,
                },
                Err(e) => {
                    warn!("Generative response failed, falling back to template: {}", e);
                    template_or_placeholder(fallback, request)
                }
            },
            ResponseSelector::Hybrid(hybrid) => hybrid.respond(request).await,
        };

        counter!("companion.responses", "source" => response.source.as_str()).increment(1);
        response
    }
}

fn template_or_placeholder(
    template: &mut TemplateStrategy,
    request: &ResponseRequest,
) -> SelectedResponse {
    match template.select(request) {
        Some(text) => SelectedResponse {
            text,
            source: ResponseSource::Template,
        },
        None => SelectedResponse {
            text: PLACEHOLDER_RESPONSE.to_string(),
            source: ResponseSource::Placeholder,
        },
    }
}
