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

//! Integration tests for companion persistence
//!
//! These tests cover:
//! - Saving on shutdown and restoring on the next initialize
//! - Recovering from corrupt saved state
//! - Deleting saved state on reset
//! - Keeping companions with similar names apart

use companion_engine::{
    CompanionConfig, CompanionEvent, CompanionOrchestrator, FileSaveProvider, SaveProvider,
    StrategyKind,
};
use std::path::Path;
use std::sync::Arc;

/// Build a template companion saving under `directory`
fn companion(directory: &Path) -> (CompanionOrchestrator, Arc<FileSaveProvider>) {
    named(directory, "Rex")
}

/// Build a named template companion saving under `directory`
fn named(directory: &Path, name: &str) -> (CompanionOrchestrator, Arc<FileSaveProvider>) {
    let provider = Arc::new(FileSaveProvider::new(directory));
    let companion = CompanionOrchestrator::new(CompanionConfig {
        name: name.to_string(),
        strategy: StrategyKind::Template,
        seed: Some(3),
        ..CompanionConfig::default()
    })
    .with_save_provider(provider.clone());
    (companion, provider)
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (mut first, provider) = companion(dir.path());
    first.initialize().unwrap();
    for _ in 0..3 {
        first.observe_action("gave gift", "food").unwrap();
    }
    first.observe_action("talked", "weather").unwrap();
    first.shutdown().await;

    assert!(provider.exists("companion.Rex"));
    assert!(provider.saved_at("companion.Rex").is_some());

    let (mut second, _) = companion(dir.path());
    let mut events = second.subscribe_channel();
    second.initialize().unwrap();
    assert_eq!(events.try_recv().ok(), Some(CompanionEvent::Restored));

    let summary = second.get_relationship_summary();
    assert!(summary.contains("Interactions: 4"), "{}", summary);
    assert!(
        summary.contains("Recent: talked, gave gift, gave gift"),
        "{}",
        summary
    );

    let gift = second
        .top_patterns(5)
        .into_iter()
        .find(|pattern| pattern.category == "gift")
        .unwrap();
    assert_eq!(gift.count, 3);
    assert!(gift.significant);

    // Already significant before the restart, so no second notification
    second.observe_action("gave gift", "").unwrap();
    second.shutdown().await;
    let recognized = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(event, CompanionEvent::PatternRecognized { .. }));
    assert!(!recognized);
}

#[tokio::test]
async fn test_corrupt_save_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("companion.Rex.json"), "{ not json").unwrap();

    let (mut companion, _) = companion(dir.path());
    let mut events = companion.subscribe_channel();
    companion.initialize().unwrap();

    assert!(events.try_recv().is_err());
    assert_eq!(companion.get_relationship_summary(), "First encounter");

    companion.observe_action("helped", "").unwrap();
    let summary = companion.get_relationship_summary();
    assert!(summary.contains("Interactions: 1"));
}

#[tokio::test]
async fn test_reset_deletes_saved_state() {
    let dir = tempfile::tempdir().unwrap();

    let (mut companion, provider) = companion(dir.path());
    companion.initialize().unwrap();
    companion.observe_action("traded", "gold").unwrap();
    companion.suspend();
    assert!(provider.exists("companion.Rex"));

    companion.reset_companion().unwrap();
    assert!(!provider.exists("companion.Rex"));
    assert!(provider.saved_at("companion.Rex").is_none());
}

#[tokio::test]
async fn test_similar_names_do_not_share_state() {
    let dir = tempfile::tempdir().unwrap();

    let (mut spaced, _) = named(dir.path(), "Sir Rex");
    spaced.initialize().unwrap();
    spaced.observe_action("attacked", "").unwrap();
    spaced.shutdown().await;

    let (mut underscored, _) = named(dir.path(), "Sir_Rex");
    let mut events = underscored.subscribe_channel();
    underscored.initialize().unwrap();
    assert!(events.try_recv().is_err());
    assert_eq!(underscored.get_relationship_summary(), "First encounter");
    underscored.observe_action("helped", "").unwrap();
    underscored.shutdown().await;

    let (mut restored, _) = named(dir.path(), "Sir Rex");
    restored.initialize().unwrap();
    let summary = restored.get_relationship_summary();
    assert!(summary.ends_with("Recent: attacked"), "{}", summary);
}
