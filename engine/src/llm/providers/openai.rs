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

/// OpenAI compatible chat completions backend
pub struct OpenAiBackend {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new OpenAI backend
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            endpoint: config.endpoint().to_string(),
            api_key: config.api_key().map(str::to_string),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn generate(&self, prompt: &PromptContext) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct OpenAiRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct OpenAiResponse {
            #[serde(default)]
            choices: Vec<OpenAiChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAiChoice {
            message: Option<ChatMessage>,
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GenerationError::Config("No API key configured".to_string()))?;

        let request = OpenAiRequest {
            model: &self.model,
            messages: prompt.messages(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
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

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Api(format!("Failed to parse response: {}", e)))?;

        non_empty(
            body.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message)
                .map(|message| message.content),
        )
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}
