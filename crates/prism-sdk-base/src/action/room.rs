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

//! Room membership and timeline actions.

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

use crate::sync_types::Rooms;

/// Either a room id or a room alias, used wherever the original engine lets
/// either identify the target of a join: `JoinRoomById` and `JoinRoomByAlias`
/// both resolve to the same `JoinRoom` job server-side, and this enum is the
/// `extra_data` threaded through that job so the response router can tell
/// which form the caller used without parsing the path back out of the
/// query string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomIdOrAlias {
    /// A room id, e.g. `!abc:example.org`.
    Id(String),
    /// A room alias, e.g. `#general:example.org`.
    Alias(String),
}

/// Actions concerned with room membership, timelines, and room-scoped
/// ephemeral state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RoomAction {
    /// Create a new room.
    CreateRoom {
        /// The `m.room.create`-adjacent request body (name, topic,
        /// preset, invite list, ...), passed through verbatim.
        request: JsonValue,
    },
    /// Invite a user to a room this client is joined to.
    InviteToRoom {
        /// The room to invite into.
        room_id: String,
        /// The user id to invite.
        user_id: String,
    },
    /// Join a room by its canonical id.
    JoinRoomById {
        /// The room id to join.
        room_id: String,
    },
    /// Join a room by one of its aliases.
    JoinRoomByAlias {
        /// The alias to resolve and join.
        alias: String,
    },
    /// Leave a joined room.
    LeaveRoom {
        /// The room to leave.
        room_id: String,
    },
    /// Forget a left room, removing it from the room list.
    ForgetRoom {
        /// The room to forget.
        room_id: String,
    },
    /// Fetch earlier timeline events to close a gap.
    PaginateTimeline {
        /// The room to paginate.
        room_id: String,
        /// The edge event id the gap is recorded against.
        event_id: String,
        /// How many events to request, if bounded.
        limit: Option<u32>,
    },
    /// Send a message event to a room, encrypting first if the room is
    /// encrypted.
    SendMessage {
        /// The target room.
        room_id: String,
        /// The event content to send (type-erased; `type` is carried
        /// inside this value).
        event: JsonValue,
    },
    /// Send a state event to a room.
    SendStateEvent {
        /// The target room.
        room_id: String,
        /// The state event type.
        event_type: String,
        /// The state key (possibly empty).
        state_key: String,
        /// The event content.
        content: JsonValue,
    },
    /// Fetch the full current state of a room.
    GetRoomStates {
        /// The room to fetch state for.
        room_id: String,
    },
    /// Fetch a single state event.
    GetStateEvent {
        /// The room to fetch from.
        room_id: String,
        /// The state event type.
        event_type: String,
        /// The state key (possibly empty).
        state_key: String,
    },
    /// Notify the room that this user is (or is not) typing.
    SetTyping {
        /// The target room.
        room_id: String,
        /// Whether typing is starting or stopping.
        typing: bool,
        /// How long the typing notification should remain active, in
        /// milliseconds, when `typing` is `true`.
        timeout_ms: Option<u32>,
    },
    /// Post a read receipt for an event.
    PostReceipt {
        /// The target room.
        room_id: String,
        /// The event being acknowledged.
        event_id: String,
    },
    /// Move the fully-read marker.
    SetReadMarker {
        /// The target room.
        room_id: String,
        /// The event to mark as fully read.
        event_id: String,
    },
    /// A room-list sub-reducer action, folding sync deltas in.
    SyncRooms {
        /// The `rooms` object from a sync response.
        rooms: Rooms,
    },
}
