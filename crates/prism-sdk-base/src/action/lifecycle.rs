// Copyright 2024 The prism-sdk Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session lifecycle and sync-loop actions.

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

use crate::sync_types::{DeviceLists, EventList, Rooms};

/// Actions concerned with authentication and the sync loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LifecycleAction {
    /// Authenticate against a homeserver with a password.
    Login {
        /// Homeserver base URL.
        server: String,
        /// Localpart or fully-qualified user id.
        user: String,
        /// Password.
        password: String,
        /// Device display name to register, if any.
        device_name: Option<String>,
    },
    /// Fetch this user's profile (display name, avatar) after login.
    LoadUserInfo {
        /// The user id to load.
        user_id: String,
    },
    /// Discard the current session.
    Logout,
    /// Issue (or re-issue) a `/sync` long-poll request.
    Sync,
    /// A `/sync` response arrived and should be folded into the model.
    LoadSyncResult {
        /// The `next_batch` token to resume from next time.
        next_batch: String,
        /// The `rooms` object from the sync response, if present.
        rooms: Option<Rooms>,
        /// The `presence` object from the sync response, if present.
        presence: Option<EventList>,
        /// The top-level `account_data` object, if present.
        account_data: Option<EventList>,
        /// The `to_device` object, if present.
        to_device: Option<EventList>,
        /// The `device_lists` object (`changed`/`left`), if present.
        device_lists: Option<DeviceLists>,
        /// The `device_one_time_keys_count` object, if present.
        device_otk_counts: Option<JsonValue>,
    },
}
