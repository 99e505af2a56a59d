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

use clap::Parser;
use companion_engine::config::{Arguments, Configuration};
use companion_engine::{CompanionEvent, CompanionOrchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            tracing::debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        tracing::debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    let config = if std::path::Path::new(&arguments.config_file).exists() {
        Configuration::load(&arguments.config_file)?
    } else {
        tracing::info!(
            "No configuration at {}, using defaults",
            arguments.config_file
        );
        Configuration::default()
    };
    tracing::debug!("Configuration loaded: {:?}", config);

    let mut companion = config.build_companion()?;
    let name = companion.name().to_string();

    let mut events = companion.subscribe_channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                CompanionEvent::Response { text } => println!("{}: {}", name, text),
                CompanionEvent::PatternRecognized { category, count } => {
                    println!(
                        "* {} noticed a pattern: {} ({} times)",
                        name, category, count
                    )
                }
                CompanionEvent::Restored => println!("* {} remembers you", name),
                CompanionEvent::Persisted => tracing::debug!("State saved"),
            }
        }
    });

    companion.initialize()?;
    println!("Enter `action | context`, or :summary :patterns :reset :suspend :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&mut companion, &line) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    companion.shutdown().await;
    Ok(())
}

/// Apply one line of input; false ends the session
fn handle_line(companion: &mut CompanionOrchestrator, line: &str) -> bool {
    match line.trim() {
        "" => {}
        ":quit" => return false,
        ":summary" => println!("{}", companion.get_relationship_summary()),
        ":patterns" => {
            for pattern in companion.top_patterns(5) {
                println!(
                    "{:<10} count {:>3}  weight {:.2}{}",
                    pattern.category,
                    pattern.count,
                    pattern.weight,
                    if pattern.significant { "  (significant)" } else { "" }
                );
            }
        }
        ":reset" => {
            if companion.reset_companion().is_ok() {
                println!("* {} forgot everything", companion.name());
            }
        }
        ":suspend" => companion.suspend(),
        input => {
            let (action, context) = input.split_once('|').unwrap_or((input, ""));
            // Rejections are logged by the companion
            let _ = companion.observe_action(action.trim(), context.trim());
        }
    }
    true
}
