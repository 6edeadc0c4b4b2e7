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

//! The typed shape of a `/sync` response body, grounded on the
//! `SyncResponse`/`Rooms`/`JoinedRoom`/`LeftRoom`/`Timeline` split used by
//! the reference sync-folding code this workspace's sync driver is modeled
//! on. Event payloads themselves stay `JsonValue` -- this crate never
//! hand-rolls the full generated wire schema (spec §1 Non-goal: "the
//! exhaustive generated wire-schema of every endpoint").

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

/// The top-level body of a `/sync` response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncResponseBody {
    /// The token to pass as `since` on the next `/sync` call.
    pub next_batch: String,
    /// Per-membership room updates.
    #[serde(default)]
    pub rooms: Option<Rooms>,
    /// Global presence updates.
    #[serde(default)]
    pub presence: Option<EventList>,
    /// Global account-data updates.
    #[serde(default)]
    pub account_data: Option<EventList>,
    /// To-device messages delivered since the last sync.
    #[serde(default)]
    pub to_device: Option<EventList>,
    /// Device-list change notifications (`changed`/`left`).
    #[serde(default)]
    pub device_lists: Option<DeviceLists>,
    /// Remaining one-time-key counts per algorithm.
    #[serde(default)]
    pub device_one_time_keys_count: Option<JsonValue>,
}

/// A bare list of events, the shape `presence`/`account_data`/`to_device`
/// all share.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventList {
    /// The events themselves.
    #[serde(default)]
    pub events: Vec<JsonValue>,
}

/// Room updates grouped by this client's membership in each room.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Rooms {
    /// Rooms this client is joined to.
    #[serde(default)]
    pub join: std::collections::BTreeMap<String, JoinedRoom>,
    /// Rooms this client has been invited to.
    #[serde(default)]
    pub invite: std::collections::BTreeMap<String, InvitedRoom>,
    /// Rooms this client has left.
    #[serde(default)]
    pub leave: std::collections::BTreeMap<String, LeftRoom>,
}

/// One joined room's delta since the last sync.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JoinedRoom {
    /// New timeline events, plus gap information.
    #[serde(default)]
    pub timeline: Timeline,
    /// State events that changed.
    #[serde(default)]
    pub state: EventList,
    /// Room-scoped account data.
    #[serde(default)]
    pub account_data: EventList,
    /// Ephemeral events (typing, read receipts).
    #[serde(default)]
    pub ephemeral: EventList,
}

/// One invited room's delta: stripped state only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InvitedRoom {
    /// The stripped state events describing the invite.
    #[serde(default)]
    pub invite_state: EventList,
}

/// One left room's final delta.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeftRoom {
    /// The room's final timeline events.
    #[serde(default)]
    pub timeline: Timeline,
    /// The room's final account data.
    #[serde(default)]
    pub account_data: EventList,
}

/// A room's timeline delta.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Timeline {
    /// The new events, oldest first.
    #[serde(default)]
    pub events: Vec<JsonValue>,
    /// Whether the server omitted earlier events, leaving a gap.
    #[serde(default)]
    pub limited: bool,
    /// The pagination token to fetch the events before this delta, if
    /// `limited` is set.
    #[serde(default)]
    pub prev_batch: Option<String>,
}

/// Which users' device lists changed or dropped out of this client's view
/// since the last sync.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceLists {
    /// Users whose device list should be re-queried.
    #[serde(default)]
    pub changed: Vec<String>,
    /// Users no longer sharing an encrypted room with this client.
    #[serde(default)]
    pub left: Vec<String>,
}
