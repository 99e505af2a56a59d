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

//! Companion lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Companion lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanionState {
    /// Created but components not yet built
    Uninitialized,

    /// Building components and restoring persisted state
    Initializing,

    /// Idle and accepting observations
    Ready,

    /// Recording an observation into memory and patterns
    Updating,

    /// Deciding whether to respond
    Deciding,

    /// Handing a response request to the response worker
    Responding,

    /// Torn down; accepts nothing
    Destroyed,
}

impl CompanionState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition(self, next: CompanionState) -> bool {
        use CompanionState::*;

        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Ready, Updating)
                | (Updating, Deciding)
                | (Deciding, Responding)
                | (Deciding, Ready)
                | (Responding, Ready)
                | (Uninitialized, Destroyed)
                | (Ready, Destroyed)
                | (Updating, Destroyed)
                | (Deciding, Destroyed)
                | (Responding, Destroyed)
        )
    }

    /// Transition to a new state
    pub fn transition(&mut self, next: CompanionState) -> Result<(), String> {
        if self.can_transition(next) {
            *self = next;
            Ok(())
        } else {
            Err(format!(
                "Invalid state transition from {:?} to {:?}",
                self, next
            ))
        }
    }

    /// Only `Ready` accepts new observations
    pub fn accepts_observations(self) -> bool {
        self == CompanionState::Ready
    }
}

impl Default for CompanionState {
    fn default() -> Self {
        CompanionState::Uninitialized
    }
}

impl fmt::Display for CompanionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_cycle() {
        let mut state = CompanionState::default();

        assert!(state.transition(CompanionState::Initializing).is_ok());
        assert!(state.transition(CompanionState::Ready).is_ok());
        assert!(state.accepts_observations());

        assert!(state.transition(CompanionState::Updating).is_ok());
        assert!(!state.accepts_observations());
        assert!(state.transition(CompanionState::Deciding).is_ok());
        assert!(state.transition(CompanionState::Responding).is_ok());
        assert!(state.transition(CompanionState::Ready).is_ok());

        assert!(state.transition(CompanionState::Destroyed).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = CompanionState::Uninitialized;
        assert!(state.transition(CompanionState::Ready).is_err());
        assert_eq!(state, CompanionState::Uninitialized);

        let mut state = CompanionState::Destroyed;
        assert!(state.transition(CompanionState::Ready).is_err());
        assert!(state.transition(CompanionState::Destroyed).is_err());

        let mut state = CompanionState::Ready;
        assert!(state.transition(CompanionState::Responding).is_err());

        let state = CompanionState::Initializing;
        assert!(!state.can_transition(CompanionState::Uninitialized));
    }
}
