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

//! Notification channel from a companion to its host

use companion_common::CompanionEvent;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

pub type EventHandler = Arc<dyn Fn(&CompanionEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    handlers: Vec<EventHandler>,
    channels: Vec<mpsc::UnboundedSender<CompanionEvent>>,
}

/// Fire-and-forget event delivery.
///
/// Events reach every subscriber in emission order. Handlers run on the
/// emitting thread without any lock held, so a handler may emit or subscribe;
/// an event emitted from a handler is delivered before the outer event
/// reaches channel subscribers. Handlers added during an emission see the
/// next event.
#[derive(Clone, Default)]
pub struct CompanionEvents {
    subscribers: Arc<RwLock<Subscribers>>,
}

impl CompanionEvents {
    /// Create a new event channel
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Subscribers> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Subscribers> {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to events with a handler function
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&CompanionEvent) + Send + Sync + 'static,
    {
        self.write().handlers.push(Arc::new(handler));
    }

    /// Subscribe to events through an unbounded channel
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<CompanionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.write().channels.push(sender);
        receiver
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, event: CompanionEvent) {
        let handlers = self.read().handlers.clone();
        for handler in handlers.iter() {
            handler(&event);
        }

        // Receivers that were dropped are forgotten
        self.write()
            .channels
            .retain(|channel| channel.send(event.clone()).is_ok());
    }

    /// Number of handlers and open channels
    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.read();
        subscribers.handlers.len() + subscribers.channels.len()
    }
}
