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

//! Common types for generative backends

use companion_common::PatternRecord;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Everything a backend needs to voice one response
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub companion_name: String,
    pub personality: String,
    pub memory_summary: String,
    pub action: String,
    pub context: String,
    pub pattern: Option<PatternRecord>,
}

impl PromptContext {
    /// System prompt describing the companion and the observed action
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}, {}.\nPlayer info: {}\nThe player just: {}\nContext: {}\n",
            self.companion_name, self.personality, self.memory_summary, self.action, self.context
        );
        if let Some(pattern) = self.pattern.as_ref().filter(|pattern| pattern.significant) {
            prompt.push_str(&format!(
                "They have done this ({}) {} times.\n",
                pattern.category, pattern.count
            ));
        }
        prompt.push_str("Respond briefly and naturally (1-2 sentences):");
        prompt
    }

    /// Chat messages for a completion request
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.action.clone()),
        ]
    }
}

/// Generative backend errors
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend returned an empty response")]
    EmptyResponse,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Short label used when counting failures
    pub fn reason(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Network(_) => "network",
            GenerationError::Api(_) => "api",
            GenerationError::Config(_) => "config",
            GenerationError::EmptyResponse => "empty",
            GenerationError::Unavailable(_) => "unavailable",
        }
    }
}

/// Backend flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    /// OpenAI compatible chat completions, including LM Studio
    #[default]
    OpenAi,
    Ollama,
}

impl GeneratorProvider {
    /// Endpoint used when none is configured
    pub fn default_endpoint(self) -> &'static str {
        match self {
            GeneratorProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
            GeneratorProvider::Ollama => "http://localhost:11434/api/chat",
        }
    }
}

/// Generative backend configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    /// Chat endpoint, provider default when absent
    pub endpoint: Option<String>,
    /// API key, may reference an environment variable such as `${OPENAI_API_KEY}`
    pub api_key: Option<EnvField<String>>,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GeneratorConfig {
    /// Create OpenAI configuration
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: GeneratorProvider::OpenAi,
            api_key: Some(EnvField::from(api_key.into())),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Create Ollama configuration
    pub fn ollama(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: GeneratorProvider::Ollama,
            endpoint: Some(endpoint.into()),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Endpoint to post to
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    /// Non-empty API key, if configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.as_str())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::OpenAi,
            endpoint: None,
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            timeout_seconds: 10,
            max_tokens: 60,
            temperature: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(pattern: Option<PatternRecord>) -> PromptContext {
        PromptContext {
            companion_name: "Rex".to_string(),
            personality: "loyal and brave".to_string(),
            memory_summary: "Interactions: 2".to_string(),
            action: "gave gift".to_string(),
            context: "bone".to_string(),
            pattern,
        }
    }

    #[test]
    fn test_system_prompt() {
        let text = prompt(None).system_prompt();
        let opening = "You are Rex, loyal and brave.\nPlayer info: Interactions: 2";
        assert!(text.starts_with(opening));
        assert!(text.contains("The player just: gave gift"));
        assert!(text.contains("Context: bone"));
        assert!(text.ends_with("(1-2 sentences):"));
    }

    #[test]
    fn test_significant_pattern_in_prompt() {
        let mut record = PatternRecord::new("gift", 0.6, 1);
        record.count = 3;
        record.significant = true;

        let context = prompt(Some(record));
        assert!(context.system_prompt().contains("(gift) 3 times"));

        let messages = context.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1], ChatMessage::user("gave gift"));
    }

    #[test]
    fn test_generator_config() {
        let openai = GeneratorConfig::openai("sk-test", "gpt-4");
        assert_eq!(openai.provider, GeneratorProvider::OpenAi);
        assert_eq!(openai.api_key(), Some("sk-test"));
        assert_eq!(
            openai.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );

        let ollama = GeneratorConfig::ollama("http://localhost:11434/api/chat", "llama2");
        assert!(ollama.api_key().is_none());
        assert_eq!(ollama.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_generator_config_from_yaml() {
        let config: GeneratorConfig =
            serde_yaml::from_str("provider: ollama\nmodel: llama3\nmax_tokens: 40\n").unwrap();
        assert_eq!(config.provider, GeneratorProvider::Ollama);
        assert_eq!(config.endpoint(), "http://localhost:11434/api/chat");
        assert_eq!(config.max_tokens, 40);
        assert_eq!(config.timeout_seconds, 10);
    }
}
