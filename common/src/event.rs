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

//! Notifications a companion delivers to its host

use serde::{Deserialize, Serialize};

/// All notifications emitted by a companion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompanionEvent {
    /// The companion produced a response
    Response { text: String },

    /// A behavior pattern just became significant
    PatternRecognized { category: String, count: u32 },

    /// State was written to the save provider
    Persisted,

    /// State was restored from the save provider
    Restored,
}
