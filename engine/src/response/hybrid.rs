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

//! Generative responses for notable moments, templates otherwise

use super::generative::GenerativeStrategy;
use super::template::TemplateStrategy;
use super::{PLACEHOLDER_RESPONSE, ResponseRequest, ResponseSource, SelectedResponse};
use crate::tables::BehaviorTables;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of recent responses remembered for anti-repetition
pub const DEFAULT_RECENT_HISTORY: usize = 5;

/// Chooses between a generative backend and templates
#[derive(Debug)]
pub struct HybridStrategy {
    template: TemplateStrategy,
    generative: Option<GenerativeStrategy>,
    tables: Arc<BehaviorTables>,
    ai_threshold: f32,
    rng: StdRng,
    recent: VecDeque<String>,
    recent_capacity: usize,
}

impl HybridStrategy {
    /// Create a new hybrid strategy. Without a generative strategy every
    /// response comes from templates.
    pub fn new(
        template: TemplateStrategy,
        generative: Option<GenerativeStrategy>,
        tables: Arc<BehaviorTables>,
    ) -> Self {
        Self {
            template,
            generative,
            tables,
            ai_threshold: 0.7,
            rng: StdRng::from_os_rng(),
            recent: VecDeque::with_capacity(DEFAULT_RECENT_HISTORY),
            recent_capacity: DEFAULT_RECENT_HISTORY,
        }
    }

    /// Probability of using the backend for an ordinary observation, clamped to [0, 1]
    pub fn with_ai_threshold(mut self, ai_threshold: f32) -> Self {
        self.ai_threshold = if ai_threshold.is_nan() {
            0.0
        } else {
            ai_threshold.clamp(0.0, 1.0)
        };
        self
    }

    /// Number of recent responses to avoid repeating
    pub fn with_recent_history(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity.max(1);
        self
    }

    /// Fix the seed of the attempt draw
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn ai_threshold(&self) -> f32 {
        self.ai_threshold
    }

    /// Responses remembered for anti-repetition, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    /// Whether this request warrants a generative attempt
    pub fn should_attempt_generative(&mut self, request: &ResponseRequest) -> bool {
        let notable = request.pattern.as_ref().is_some_and(|pattern| {
            pattern.significant || self.tables.patterns.is_milestone(pattern.count)
        });
        // Always draw so the sequence does not depend on the request
        let draw = self.rng.random::<f32>();
        notable || draw < self.ai_threshold
    }

    pub async fn respond(&mut self, request: &ResponseRequest) -> SelectedResponse {
        let attempt = self.should_attempt_generative(request);

        if attempt {
            if let Some(generative) = self.generative.as_ref().filter(|g| g.is_configured()) {
                let result = generative.generate(request).await;
                match result {
                    Ok(text) if self.recent.contains(&text) => {
                        debug!("Generated response repeats recent history, using a template");
                    }
                    Ok(text) => return self.remember(text, ResponseSource::Generative),
                    Err(e) => warn!("Generative response failed, falling back to template: {}", e),
                }
            }
        }

        self.template_response(request)
    }

    fn template_response(&mut self, request: &ResponseRequest) -> SelectedResponse {
        let mut text = self.template.select(request);
        if text.is_some() && text.as_deref() == self.recent.back().map(String::as_str) {
            text = self.template.select(request);
        }

        match text {
            Some(text) => self.remember(text, ResponseSource::Template),
            None => self.remember(PLACEHOLDER_RESPONSE.to_string(), ResponseSource::Placeholder),
        }
    }

    fn remember(&mut self, text: String, source: ResponseSource) -> SelectedResponse {
        self.recent.push_back(text.clone());
        while self.recent.len() > self.recent_capacity {
            self.recent.pop_front();
        }
        SelectedResponse { text, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationError, MockGenerativeBackend};
    use crate::response::template::TemplateCatalog;
    use companion_common::PatternRecord;

    fn request(count: u32, significant: bool) -> ResponseRequest {
        let mut pattern = PatternRecord::new("gift", 0.4, 1);
        pattern.count = count;
        pattern.significant = significant;
        ResponseRequest {
            action: "gave gift".to_string(),
            context: String::new(),
            pattern: Some(pattern),
            memory_summary: "Interactions: 3".to_string(),
            personality: "friendly".to_string(),
            companion_name: "Rex".to_string(),
        }
    }

    fn template() -> TemplateStrategy {
        TemplateStrategy::seeded(Arc::new(TemplateCatalog::default()), 11)
    }

    fn generative(backend: MockGenerativeBackend) -> GenerativeStrategy {
        GenerativeStrategy::new(Arc::new(backend))
    }

    fn configured() -> MockGenerativeBackend {
        let mut backend = MockGenerativeBackend::new();
        backend.expect_is_configured().return_const(true);
        backend.expect_name().return_const("Mock");
        backend
    }

    fn strategy(generative: Option<GenerativeStrategy>) -> HybridStrategy {
        HybridStrategy::new(template(), generative, Arc::new(BehaviorTables::default()))
    }

    #[test]
    fn test_milestones_force_attempt() {
        let mut hybrid = strategy(None).with_ai_threshold(0.0).with_seed(3);

        assert!(hybrid.should_attempt_generative(&request(3, false)));
        assert!(hybrid.should_attempt_generative(&request(10, false)));
        assert!(hybrid.should_attempt_generative(&request(4, true)));
        assert!(!hybrid.should_attempt_generative(&request(4, false)));
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(strategy(None).with_ai_threshold(1.5).ai_threshold(), 1.0);
        assert_eq!(strategy(None).with_ai_threshold(-1.0).ai_threshold(), 0.0);
        assert_eq!(
            strategy(None).with_ai_threshold(f32::NAN).ai_threshold(),
            0.0
        );
    }

    #[tokio::test]
    async fn test_significant_pattern_without_backend_uses_template() {
        let mut hybrid = strategy(None).with_ai_threshold(0.0);

        let response = hybrid.respond(&request(3, true)).await;
        assert_eq!(response.source, ResponseSource::Template);
        assert!(!response.text.is_empty());
    }

    #[tokio::test]
    async fn test_generative_used_when_notable() {
        let mut backend = configured();
        backend
            .expect_generate()
            .times(1)
            .returning(|_| Ok("What a lovely gift!".to_string()));

        let mut hybrid = strategy(Some(generative(backend))).with_ai_threshold(0.0);

        let response = hybrid.respond(&request(3, true)).await;
        assert_eq!(response.source, ResponseSource::Generative);
        assert_eq!(response.text, "What a lovely gift!");
    }

    #[tokio::test]
    async fn test_failing_backend_always_falls_back() {
        let mut backend = configured();
        backend
            .expect_generate()
            .returning(|_| Err(GenerationError::Network("connection refused".to_string())));

        let mut hybrid = strategy(Some(generative(backend))).with_ai_threshold(1.0);

        for count in 1..20 {
            let response = hybrid.respond(&request(count, count >= 3)).await;
            assert_eq!(response.source, ResponseSource::Template);
            assert!(!response.text.is_empty());
        }
    }

    #[tokio::test]
    async fn test_repeated_generation_is_replaced() {
        let mut backend = configured();
        backend
            .expect_generate()
            .returning(|_| Ok("Same thing again.".to_string()));

        let mut hybrid = strategy(Some(generative(backend))).with_ai_threshold(1.0);

        let first = hybrid.respond(&request(1, false)).await;
        let second = hybrid.respond(&request(1, false)).await;
        assert_eq!(first.source, ResponseSource::Generative);
        assert_eq!(second.source, ResponseSource::Template);
        assert_ne!(first.text, second.text);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut hybrid = strategy(None).with_recent_history(2);

        for _ in 0..6 {
            hybrid.respond(&request(1, false)).await;
        }
        assert_eq!(hybrid.recent().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_placeholder() {
        let catalog = TemplateCatalog {
            patterns: Vec::new(),
            contexts: Vec::new(),
            actions: Vec::new(),
            generic: Vec::new(),
        };
        let template = TemplateStrategy::seeded(Arc::new(catalog), 1);
        let mut hybrid = HybridStrategy::new(template, None, Arc::new(BehaviorTables::default()));

        let response = hybrid.respond(&request(1, false)).await;
        assert_eq!(response.text, PLACEHOLDER_RESPONSE);
        assert_eq!(response.source, ResponseSource::Placeholder);
    }
}
