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

//! Generative backend implementations

mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use super::types::{GenerationError, GeneratorConfig, GeneratorProvider, PromptContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for generative text backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Produce a response for the prompt
    async fn generate(&self, prompt: &PromptContext) -> Result<String, GenerationError>;

    /// Whether the backend has everything it needs to make requests
    fn is_configured(&self) -> bool;

    /// Get backend name
    fn name(&self) -> &'static str;
}

/// Build the backend described by a configuration
pub fn build_backend(
    config: &GeneratorConfig,
) -> Result<Arc<dyn GenerativeBackend>, GenerationError> {
    let backend: Arc<dyn GenerativeBackend> = match config.provider {
        GeneratorProvider::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        GeneratorProvider::Ollama => Arc::new(OllamaBackend::new(config)?),
    };
    Ok(backend)
}

/// HTTP client honoring the configured timeout
fn http_client(config: &GeneratorConfig) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| GenerationError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport failure onto a generation error
fn request_error(error: reqwest::Error) -> GenerationError {
    let kind = if error.is_timeout() { "timed out" } else { "failed" };
    GenerationError::Network(format!("Request {}: {}", kind, error))
}

/// Trimmed content, or an error when there is none
fn non_empty(content: Option<String>) -> Result<String, GenerationError> {
    content
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}
