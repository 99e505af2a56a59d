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

use super::{GenerativeBackend, http_client, non_empty, request_error};
use crate::llm::types::{ChatMessage, GenerationError, GeneratorConfig, PromptContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ollama chat backend
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: config.endpoint().to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl GenerativeBackend for OllamaBackend {
    async fn generate(&self, prompt: &PromptContext) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage>,
            stream: bool,
            options: OllamaOptions,
        }

        #[derive(Serialize)]
        struct OllamaOptions {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            message: Option<ChatMessage>,
        }

        let request = OllamaRequest {
            model: &self.model,
            messages: prompt.messages(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Api(format!("Failed to parse response: {}", e)))?;

        non_empty(body.message.map(|message| message.content))
    }

    // Local servers need no credentials
    fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }
}
