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

use crate::companion::CompanionOrchestrator;
use crate::llm::{GeneratorConfig, build_backend};
use crate::persistence::{DEFAULT_MAX_VALUE_BYTES, FileSaveProvider};
use crate::response::{StrategyKind, TemplateCatalog};
use crate::tables::BehaviorTables;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "engine/config.yaml"
    )]
    pub config_file: String,

    #[arg(
        short = 'e',
        long = "env",
        help = "Path to environment file",
        default_value = "engine/.env"
    )]
    pub env_file: Option<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            env_file: Some(".env".to_string()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub companion: CompanionConfig,
    pub persistence: PersistenceConfig,
    pub generator: Option<GeneratorConfig>,
    pub tables: BehaviorTables,
    pub templates: TemplateCatalog,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Configuration, String> {
        let conf = serde_yaml::from_reader(
            std::fs::File::open(path).map_err(|e| format!("Failed to open config file: {}", e))?,
        )
        .map_err(|e| format!("Failed to parse config file: {}", e))?;

        Ok(conf)
    }

    /// Build an uninitialized companion wired to the configured collaborators
    pub fn build_companion(&self) -> Result<CompanionOrchestrator, String> {
        let mut companion = CompanionOrchestrator::new(self.companion.clone())
            .with_tables(Arc::new(self.tables.clone()))
            .with_templates(Arc::new(self.templates.clone()));

        if self.persistence.enabled {
            companion = companion.with_save_provider(Arc::new(
                FileSaveProvider::new(&self.persistence.directory)
                    .with_max_value_bytes(self.persistence.max_value_bytes),
            ));
        }

        if let Some(generator) = &self.generator {
            let backend = build_backend(generator)
                .map_err(|e| format!("Failed to create generative backend: {}", e))?;
            companion = companion
                .with_backend(backend)
                .with_generation_timeout(generator.timeout());
        }

        Ok(companion)
    }
}

/// Identity and behavior of one companion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub name: String,
    pub personality: String,
    /// Identity of the hosting application, part of the persistence key
    pub application_id: String,
    pub strategy: StrategyKind,
    /// Chance of a generative attempt for ordinary observations
    pub ai_threshold: f32,
    /// Base chance of responding to an observation
    pub response_frequency: f32,
    pub max_memories: usize,
    pub max_patterns: usize,
    pub recent_history: usize,
    /// Fixed RNG seed for reproducible behavior
    pub seed: Option<u64>,
}

impl CompanionConfig {
    /// Create a configuration with a name and defaults otherwise
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Key the companion's snapshot is stored under
    pub fn persistence_key(&self) -> String {
        format!("{}.{}", self.application_id, self.name)
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            name: "Companion".to_string(),
            personality: "friendly and helpful".to_string(),
            application_id: "companion".to_string(),
            strategy: StrategyKind::Hybrid,
            ai_threshold: 0.7,
            response_frequency: 0.3,
            max_memories: 50,
            max_patterns: 20,
            recent_history: 5,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub directory: String,
    pub max_value_bytes: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "saves".to_string(),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}
