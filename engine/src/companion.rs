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

//! # Companion Orchestrator
//!
//! Sequences one companion's observation loop:
//!
//! ```text
//! observe_action -> MemoryStore -> PatternTracker -> decide -> response worker -> Response event
//! ```
//!
//! The memory and pattern updates and the respond decision happen
//! synchronously inside [`CompanionOrchestrator::observe_action`]. Responses
//! are produced by a worker task that owns the [`ResponseSelector`] and
//! handles requests one at a time, so responses complete in the order they
//! were requested and never race on the anti-repetition history.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Updating -> Deciding -> (Responding) -> Ready
//!                                    \-> Destroyed
//! ```
//!
//! Only a `Ready` companion accepts observations. Destroying or suspending a
//! companion with a save provider persists its snapshot.

use crate::config::CompanionConfig;
use crate::events::CompanionEvents;
use crate::llm::GenerativeBackend;
use crate::memory::{FIRST_ENCOUNTER, MemoryStore};
use crate::pattern::PatternTracker;
use crate::persistence::SaveProvider;
use crate::response::{
    ResponseRequest, ResponseSelector, SelectorSettings, TemplateCatalog,
    generative::DEFAULT_GENERATION_TIMEOUT,
};
use crate::tables::BehaviorTables;
use chrono::Utc;
use companion_common::{CompanionEvent, CompanionState, PatternRecord, Snapshot, SnapshotError};
use metrics::counter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Orchestrator errors. Every error leaves the companion unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompanionError {
    #[error("Companion is not ready (state: {0})")]
    NotReady(CompanionState),

    #[error("Action must not be empty")]
    EmptyAction,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: CompanionState,
        to: CompanionState,
    },

    #[error("No tokio runtime is available for the response worker")]
    NoRuntime,
}

/// Components built during initialization
struct CompanionCore {
    memory: MemoryStore,
    patterns: PatternTracker,
}

impl CompanionCore {
    /// Update memory and patterns; also reports whether the pattern just became significant
    fn record_observation(&mut self, action: &str, context: &str) -> (PatternRecord, bool) {
        self.memory.record_action(action, context);

        let was_significant = {
            let category = self.patterns.categorize(action);
            self.patterns
                .record(category)
                .is_some_and(|record| record.significant)
        };
        let record = self.patterns.analyze_action(action);
        let became_significant = record.significant && !was_significant;
        (record, became_significant)
    }
}

/// One adaptive companion
pub struct CompanionOrchestrator {
    config: CompanionConfig,
    state: CompanionState,
    tables: Arc<BehaviorTables>,
    templates: Arc<TemplateCatalog>,
    backend: Option<Arc<dyn GenerativeBackend>>,
    generation_timeout: Duration,
    save_provider: Option<Arc<dyn SaveProvider>>,
    events: CompanionEvents,
    rng: StdRng,
    core: Option<CompanionCore>,
    jobs: Option<mpsc::UnboundedSender<ResponseRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl CompanionOrchestrator {
    /// Create a new, uninitialized companion
    pub fn new(config: CompanionConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(2)),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            state: CompanionState::Uninitialized,
            tables: Arc::new(BehaviorTables::default()),
            templates: Arc::new(TemplateCatalog::default()),
            backend: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            save_provider: None,
            events: CompanionEvents::new(),
            rng,
            core: None,
            jobs: None,
            worker: None,
        }
    }

    /// Use custom behavior tables
    pub fn with_tables(mut self, tables: Arc<BehaviorTables>) -> Self {
        self.tables = tables;
        self
    }

    /// Use a custom template catalog
    pub fn with_templates(mut self, templates: Arc<TemplateCatalog>) -> Self {
        self.templates = templates;
        self
    }

    /// Set the generative backend used by generative and hybrid strategies
    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the bound on a single generation
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Enable persistence through a save provider
    pub fn with_save_provider(mut self, provider: Arc<dyn SaveProvider>) -> Self {
        self.save_provider = Some(provider);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> CompanionState {
        self.state
    }

    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    /// Subscribe to events with a handler function
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&CompanionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Subscribe to events through a channel
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<CompanionEvent> {
        self.events.subscribe_channel()
    }

    fn transition(&mut self, next: CompanionState) -> Result<(), CompanionError> {
        let from = self.state;
        self.state
            .transition(next)
            .map_err(|_| CompanionError::InvalidTransition { from, to: next })
    }

    /// Build components, start the response worker and restore saved state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&mut self) -> Result<(), CompanionError> {
        if self.state != CompanionState::Uninitialized {
            return Err(CompanionError::InvalidTransition {
                from: self.state,
                to: CompanionState::Initializing,
            });
        }
        let Ok(runtime) = Handle::try_current() else {
            error!(
                "[{}] Cannot initialize outside a tokio runtime",
                self.config.name
            );
            return Err(CompanionError::NoRuntime);
        };
        self.transition(CompanionState::Initializing)?;

        self.core = Some(CompanionCore {
            memory: MemoryStore::new(self.config.max_memories, Arc::clone(&self.tables)),
            patterns: PatternTracker::new(self.config.max_patterns, Arc::clone(&self.tables)),
        });

        let settings = SelectorSettings {
            ai_threshold: self.config.ai_threshold,
            recent_history: self.config.recent_history,
            generation_timeout: self.generation_timeout,
            seed: self.config.seed,
        };
        let selector = ResponseSelector::build(
            self.config.strategy,
            Arc::clone(&self.templates),
            self.backend.clone(),
            Arc::clone(&self.tables),
            &settings,
        );
        let strategy = selector.kind();
        let (jobs, worker) = spawn_response_worker(&runtime, selector, self.events.clone());
        self.jobs = Some(jobs);
        self.worker = Some(worker);

        self.restore();

        self.transition(CompanionState::Ready)?;
        info!(
            "[{}] Companion ready ({} strategy)",
            self.config.name, strategy
        );
        Ok(())
    }

    fn restore(&mut self) {
        let Some(provider) = self.save_provider.clone() else {
            return;
        };
        let key = self.config.persistence_key();

        match provider.load(&key) {
            Ok(Some(data)) if data.trim().is_empty() => {
                debug!("[{}] Saved state is empty", self.config.name);
            }
            Ok(Some(data)) => match self.apply_snapshot(&data) {
                Ok(()) => {
                    info!("[{}] Restored saved state", self.config.name);
                    self.events.emit(CompanionEvent::Restored);
                }
                Err(e) => warn!(
                    "[{}] Failed to deserialize saved state: {}",
                    self.config.name, e
                ),
            },
            Ok(None) => debug!("[{}] No saved state under '{}'", self.config.name, key),
            Err(e) => error!("[{}] Failed to load saved state: {}", self.config.name, e),
        }
    }

    fn apply_snapshot(&mut self, data: &str) -> Result<(), SnapshotError> {
        let snapshot = Snapshot::from_json(data)?;
        snapshot.validate()?;

        // Validated as a whole so neither half is applied alone
        if let Some(core) = self.core.as_mut() {
            let (memory, patterns) = snapshot.into_parts();
            core.memory.restore(memory)?;
            core.patterns.restore(patterns)?;
        }
        Ok(())
    }

    /// Observe an action performed on the companion.
    ///
    /// Updates memory and patterns, emits a pattern notification when a
    /// pattern becomes significant, and may queue a response. Never waits
    /// for the response.
    pub fn observe_action(&mut self, action: &str, context: &str) -> Result<(), CompanionError> {
        if !self.state.accepts_observations() {
            warn!(
                "[{}] Ignoring '{}': companion is not ready (state: {})",
                self.config.name, action, self.state
            );
            return Err(CompanionError::NotReady(self.state));
        }
        if action.trim().is_empty() {
            error!(
                "[{}] Ignoring observation with an empty action",
                self.config.name
            );
            return Err(CompanionError::EmptyAction);
        }

        self.transition(CompanionState::Updating)?;
        counter!("companion.observations").increment(1);
        let Some((record, became_significant)) = self
            .core
            .as_mut()
            .map(|core| core.record_observation(action, context))
        else {
            self.state = CompanionState::Ready;
            return Err(CompanionError::NotReady(self.state));
        };

        if became_significant {
            info!(
                "[{}] Pattern recognized: {} x{}",
                self.config.name, record.category, record.count
            );
            counter!("companion.patterns.significant").increment(1);
            self.events.emit(CompanionEvent::PatternRecognized {
                category: record.category.clone(),
                count: record.count,
            });
        }

        self.transition(CompanionState::Deciding)?;
        if self.should_respond(action, context, &record) {
            self.transition(CompanionState::Responding)?;
            self.request_response(action, context, record);
        }
        self.transition(CompanionState::Ready)
    }

    /// Base chance, forced on milestones, otherwise importance against a second draw
    fn should_respond(&mut self, action: &str, context: &str, record: &PatternRecord) -> bool {
        let base = self.rng.random::<f32>();
        let chance = self.rng.random::<f32>();
        let importance = self.tables.importance.score(action, context);

        base < self.config.response_frequency
            || self.tables.patterns.is_milestone(record.count)
            || importance > chance
    }

    fn request_response(&mut self, action: &str, context: &str, pattern: PatternRecord) {
        let memory_summary = self.get_relationship_summary();
        let request = ResponseRequest {
            action: action.to_string(),
            context: context.to_string(),
            pattern: Some(pattern),
            memory_summary,
            personality: self.config.personality.clone(),
            companion_name: self.config.name.clone(),
        };

        let queued = self
            .jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(request).is_ok());
        if !queued {
            warn!("[{}] Response worker is not running", self.config.name);
        }
    }

    /// Relationship summary from memory
    pub fn get_relationship_summary(&self) -> String {
        self.core
            .as_ref()
            .map(|core| core.memory.get_summary())
            .unwrap_or_else(|| FIRST_ENCOUNTER.to_string())
    }

    /// Up to `n` of the strongest patterns
    pub fn top_patterns(&self, n: usize) -> Vec<PatternRecord> {
        self.core
            .as_ref()
            .map(|core| core.patterns.get_top_patterns(n))
            .unwrap_or_default()
    }

    /// Forget everything and delete the saved snapshot
    pub fn reset_companion(&mut self) -> Result<(), CompanionError> {
        let core = match self.core.as_mut() {
            Some(core) if self.state != CompanionState::Destroyed => core,
            _ => {
                warn!(
                    "[{}] Nothing to reset (state: {})",
                    self.config.name, self.state
                );
                return Err(CompanionError::NotReady(self.state));
            }
        };

        core.memory.clear();
        core.patterns.clear();

        if let Some(provider) = &self.save_provider {
            if let Err(e) = provider.delete(&self.config.persistence_key()) {
                error!("[{}] Failed to delete saved state: {}", self.config.name, e);
            }
        }
        info!("[{}] Companion reset", self.config.name);
        Ok(())
    }

    /// Persist state in response to a host pause
    pub fn suspend(&mut self) {
        if self.state == CompanionState::Ready {
            self.persist();
        } else {
            debug!(
                "[{}] Suspend ignored in state {}",
                self.config.name, self.state
            );
        }
    }

    /// Write a snapshot through the save provider. Failures are logged.
    fn persist(&self) -> bool {
        let (Some(provider), Some(core)) = (&self.save_provider, &self.core) else {
            return false;
        };

        let snapshot = Snapshot::compose(
            core.memory.snapshot(),
            core.patterns.snapshot(),
            Utc::now().timestamp_millis(),
        );
        let result = snapshot
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| {
                provider
                    .save(&self.config.persistence_key(), &json)
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => {
                counter!("companion.persistence.writes", "outcome" => "success").increment(1);
                debug!("[{}] Saved state", self.config.name);
                self.events.emit(CompanionEvent::Persisted);
                true
            }
            Err(e) => {
                counter!("companion.persistence.writes", "outcome" => "failure").increment(1);
                error!("[{}] Failed to save state: {}", self.config.name, e);
                false
            }
        }
    }

    /// Persist and tear down. Queued responses still complete.
    pub fn destroy(&mut self) {
        if self.state == CompanionState::Destroyed {
            return;
        }
        if self.state != CompanionState::Uninitialized {
            self.persist();
        }

        // Closing the queue lets the worker finish what it has and exit
        self.jobs = None;
        self.state = CompanionState::Destroyed;
        info!("[{}] Companion destroyed", self.config.name);
    }

    /// Destroy, then wait for queued responses to be delivered
    pub async fn shutdown(&mut self) {
        self.destroy();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("[{}] Response worker failed: {}", self.config.name, e);
            }
        }
    }
}

impl Drop for CompanionOrchestrator {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Start the task that owns the selector and answers requests in order
fn spawn_response_worker(
    runtime: &Handle,
    mut selector: ResponseSelector,
    events: CompanionEvents,
) -> (mpsc::UnboundedSender<ResponseRequest>, JoinHandle<()>) {
    let (jobs, mut requests) = mpsc::unbounded_channel::<ResponseRequest>();
    let worker = runtime.spawn(async move {
        while let Some(request) = requests.recv().await {
            let response = selector.select(&request).await;
            debug!(
                "Responding from {}: {}",
                response.source.as_str(), response.text
            );
            events.emit(CompanionEvent::Response {
                text: response.text,
            });
        }
        debug!("Response worker stopped");
    });
    (jobs, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemorySaveProvider, MockSaveProvider, PersistenceError};
    use crate::response::StrategyKind;
    use tracing_test::traced_test;

    fn config(response_frequency: f32) -> CompanionConfig {
        CompanionConfig {
            name: "Rex".to_string(),
            strategy: StrategyKind::Template,
            response_frequency,
            seed: Some(5),
            ..CompanionConfig::default()
        }
    }

    fn ready(config: CompanionConfig) -> CompanionOrchestrator {
        let mut companion = CompanionOrchestrator::new(config);
        companion.initialize().unwrap();
        companion
    }

    fn saving(provider: Arc<dyn SaveProvider>) -> CompanionOrchestrator {
        CompanionOrchestrator::new(config(0.0)).with_save_provider(provider)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_uninitialized_rejects_observations() {
        let mut companion = CompanionOrchestrator::new(config(0.0));

        assert_eq!(
            companion.observe_action("gave gift", ""),
            Err(CompanionError::NotReady(CompanionState::Uninitialized))
        );
        assert_eq!(companion.get_relationship_summary(), FIRST_ENCOUNTER);
        assert!(logs_contain("not ready"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_action_is_rejected() {
        let mut companion = ready(config(0.0));

        assert_eq!(
            companion.observe_action("   ", "quest"),
            Err(CompanionError::EmptyAction)
        );
        assert_eq!(companion.get_relationship_summary(), FIRST_ENCOUNTER);
        assert_eq!(companion.state(), CompanionState::Ready);
        assert!(logs_contain("empty action"));
    }

    #[test]
    fn test_initialize_requires_runtime() {
        let mut companion = CompanionOrchestrator::new(config(0.0));
        assert_eq!(companion.initialize(), Err(CompanionError::NoRuntime));
        assert_eq!(companion.state(), CompanionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let mut companion = ready(config(0.0));
        assert_eq!(
            companion.initialize(),
            Err(CompanionError::InvalidTransition {
                from: CompanionState::Ready,
                to: CompanionState::Initializing,
            })
        );
    }

    #[tokio::test]
    async fn test_pattern_recognized_once() {
        let mut companion = ready(config(0.0));
        let mut events = companion.subscribe_channel();

        for _ in 0..5 {
            companion.observe_action("gave gift", "").unwrap();
        }
        assert_eq!(companion.state(), CompanionState::Ready);
        companion.shutdown().await;

        let mut recognized = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CompanionEvent::PatternRecognized { category, count } = event {
                recognized.push((category, count));
            }
        }
        assert_eq!(recognized, vec![("gift".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_milestone_always_responds() {
        let mut companion = ready(config(0.0));
        let mut events = companion.subscribe_channel();

        for _ in 0..3 {
            companion.observe_action("talk", "").unwrap();
        }
        companion.shutdown().await;

        let mut responses = 0;
        while let Ok(event) = events.try_recv() {
            if let CompanionEvent::Response { text } = event {
                assert!(!text.is_empty());
                responses += 1;
            }
        }
        assert!(responses >= 1);
    }

    #[tokio::test]
    async fn test_restores_saved_state() {
        let provider = Arc::new(InMemorySaveProvider::new());
        {
            let mut first = ready(config(0.0)).with_save_provider(provider.clone());
            first.observe_action("gave gift", "").unwrap();
            first.observe_action("gave gift", "").unwrap();
            first.shutdown().await;
        }
        assert!(provider.exists("companion.Rex"));

        let mut second = saving(provider.clone());
        let mut events = second.subscribe_channel();
        second.initialize().unwrap();

        assert_eq!(events.try_recv().unwrap(), CompanionEvent::Restored);
        let summary = second.get_relationship_summary();
        assert!(summary.contains("Interactions: 2"));
        assert_eq!(second.top_patterns(1)[0].count, 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_corrupt_saved_state_is_ignored() {
        let mut provider = MockSaveProvider::new();
        provider
            .expect_load()
            .returning(|_| Ok(Some("{\"memories\": 7".to_string())));
        provider.expect_save().returning(|_, _| Ok(()));

        let mut companion = saving(Arc::new(provider));
        companion.initialize().unwrap();

        assert_eq!(companion.state(), CompanionState::Ready);
        assert_eq!(companion.get_relationship_summary(), FIRST_ENCOUNTER);
        assert!(logs_contain("Failed to deserialize"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_save_failure_is_not_fatal() {
        let mut provider = MockSaveProvider::new();
        provider.expect_load().returning(|_| Ok(None));
        provider.expect_save().times(1).returning(|_, _| {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        });

        let mut companion = saving(Arc::new(provider));
        companion.initialize().unwrap();
        companion.observe_action("help", "").unwrap();
        companion.destroy();

        assert_eq!(companion.state(), CompanionState::Destroyed);
        assert!(logs_contain("Failed to save state"));
        assert_eq!(
            companion.observe_action("help", ""),
            Err(CompanionError::NotReady(CompanionState::Destroyed))
        );
    }

    #[tokio::test]
    async fn test_suspend_persists() {
        let mut provider = MockSaveProvider::new();
        provider.expect_load().returning(|_| Ok(None));
        provider
            .expect_save()
            .withf(|key, value| key == "companion.Rex" && value.contains("\"patterns\""))
            .times(2)
            .returning(|_, _| Ok(()));

        let mut companion = saving(Arc::new(provider));
        let mut events = companion.subscribe_channel();
        companion.initialize().unwrap();
        companion.observe_action("trade", "").unwrap();

        companion.suspend();
        let mut received = std::iter::from_fn(|| events.try_recv().ok());
        assert!(received.any(|event| event == CompanionEvent::Persisted));
        companion.destroy();
    }

    #[tokio::test]
    async fn test_reset_deletes_saved_state() {
        let mut provider = MockSaveProvider::new();
        provider.expect_load().returning(|_| Ok(None));
        provider
            .expect_delete()
            .withf(|key| key == "companion.Rex")
            .times(1)
            .returning(|_| Ok(()));
        provider.expect_save().returning(|_, _| Ok(()));

        let mut companion = saving(Arc::new(provider));
        companion.initialize().unwrap();
        companion.observe_action("attack", "").unwrap();

        companion.reset_companion().unwrap();
        assert_eq!(companion.get_relationship_summary(), FIRST_ENCOUNTER);
        assert!(companion.top_patterns(5).is_empty());
    }
}
