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

//! Backend-voiced responses bounded by a timeout

use super::ResponseRequest;
use crate::llm::{GenerationError, GenerativeBackend};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default bound on a single generation
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Delegates to a generative backend
#[derive(Clone)]
pub struct GenerativeStrategy {
    backend: Arc<dyn GenerativeBackend>,
    timeout: Duration,
}

impl GenerativeStrategy {
    /// Create a new generative strategy with the default timeout
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Set the generation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    /// Generate a response. The backend's text is returned verbatim;
    /// blank text, errors and timeouts are failures.
    pub async fn generate(&self, request: &ResponseRequest) -> Result<String, GenerationError> {
        let start = Instant::now();
        let result = self.attempt(request).await;
        histogram!("companion.generation.duration").record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            counter!("companion.generation.failures", "reason" => e.reason()).increment(1);
        }
        result
    }

    async fn attempt(&self, request: &ResponseRequest) -> Result<String, GenerationError> {
        if !self.backend.is_configured() {
            return Err(GenerationError::Unavailable(format!(
                "{} is not configured",
                self.backend.name()
            )));
        }

        let prompt = request.prompt();
        let text = tokio::time::timeout(self.timeout, self.backend.generate(&prompt))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        debug!("{} generated {} chars", self.backend.name(), text.len());
        Ok(text)
    }
}

impl std::fmt::Debug for GenerativeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeStrategy")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockGenerativeBackend, PromptContext};

    fn request() -> ResponseRequest {
        ResponseRequest {
            action: "gave gift".to_string(),
            context: String::new(),
            pattern: None,
            memory_summary: "First encounter".to_string(),
            personality: "friendly".to_string(),
            companion_name: "Rex".to_string(),
        }
    }

    fn backend() -> MockGenerativeBackend {
        let mut backend = MockGenerativeBackend::new();
        backend.expect_is_configured().return_const(true);
        backend.expect_name().return_const("Mock");
        backend
    }

    #[tokio::test]
    async fn test_returns_backend_text_verbatim() {
        let mut backend = backend();
        backend
            .expect_generate()
            .withf(|prompt| prompt.companion_name == "Rex" && prompt.action == "gave gift")
            .returning(|_| Ok(" Why, thank you! ".to_string()));

        let strategy = GenerativeStrategy::new(Arc::new(backend));
        let text = strategy.generate(&request()).await.unwrap();
        assert_eq!(text, " Why, thank you! ");
    }

    #[tokio::test]
    async fn test_blank_text_is_a_failure() {
        let mut backend = backend();
        backend
            .expect_generate()
            .returning(|_| Ok("   ".to_string()));

        let strategy = GenerativeStrategy::new(Arc::new(backend));
        assert!(matches!(
            strategy.generate(&request()).await,
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_not_called() {
        let mut backend = MockGenerativeBackend::new();
        backend.expect_is_configured().return_const(false);
        backend.expect_name().return_const("Mock");
        backend.expect_generate().never();

        let strategy = GenerativeStrategy::new(Arc::new(backend));
        assert!(matches!(
            strategy.generate(&request()).await,
            Err(GenerationError::Unavailable(_))
        ));
    }

    struct StalledBackend;

    #[async_trait::async_trait]
    impl GenerativeBackend for StalledBackend {
        async fn generate(&self, _prompt: &PromptContext) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "Stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let strategy = GenerativeStrategy::new(Arc::new(StalledBackend))
            .with_timeout(Duration::from_secs(10));

        assert!(matches!(
            strategy.generate(&request()).await,
            Err(GenerationError::Timeout(timeout)) if timeout == Duration::from_secs(10)
        ));
    }
}
