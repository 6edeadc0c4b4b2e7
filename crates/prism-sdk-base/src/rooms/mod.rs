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

//! The room model: timeline, state map, account data, and the room list
//! that owns every room the client has ever observed.

use std::collections::HashMap;

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::Event;

/// A room's membership state from the point of view of this client's user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Membership {
    /// We have been invited but have not joined.
    Invite,
    /// We are a member of the room.
    Join,
    /// We have left (or been banned from) the room.
    Leave,
}

/// A single room's state.
///
/// Invariants upheld by every constructor and mutator on this type:
///
/// - at most one state entry per `(type, state_key)` pair,
/// - the timeline is only ever extended, never shortened, except by
///   [`Room::forget`]-adjacent flows that the room list, not the room
///   itself, performs,
/// - once `encrypted` is set it never clears,
/// - a gap entry is removed only when [`Room::close_gap`] is called after a
///   successful paginate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    room_id: String,
    membership: Membership,
    timeline: Vec<String>,
    events: HashMap<String, Event>,
    state: HashMap<(String, String), Event>,
    account_data: HashMap<String, JsonValue>,
    ephemeral: HashMap<String, JsonValue>,
    invite_state: Vec<Event>,
    encrypted: bool,
    members_fully_loaded: bool,
    should_rotate_session_key: bool,
    /// Maps the event id at the edge of a known gap to the pagination token
    /// needed to fetch the events before it.
    timeline_gaps: HashMap<String, String>,
}

impl Room {
    /// Create a brand-new, empty room in the given membership state.
    pub fn new(room_id: impl Into<String>, membership: Membership) -> Self {
        Self {
            room_id: room_id.into(),
            membership,
            timeline: Vec::new(),
            events: HashMap::new(),
            state: HashMap::new(),
            account_data: HashMap::new(),
            ephemeral: HashMap::new(),
            invite_state: Vec::new(),
            encrypted: false,
            members_fully_loaded: false,
            should_rotate_session_key: false,
            timeline_gaps: HashMap::new(),
        }
    }

    /// The room's id.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current membership.
    pub fn membership(&self) -> Membership {
        self.membership
    }

    /// Set the membership, e.g. in response to a sync delta.
    pub fn set_membership(&mut self, membership: Membership) {
        self.membership = membership;
    }

    /// The ordered sequence of event ids making up the timeline.
    pub fn timeline(&self) -> &[String] {
        &self.timeline
    }

    /// Look up an event by id, whether or not it's on the timeline (state
    /// events that aren't in the timeline are also stored here).
    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    /// Append events to the live (newest) end of the timeline, in order.
    pub fn append_timeline(&mut self, events: Vec<Event>) {
        for event in events {
            self.timeline.push(event.event_id().to_owned());
            self.events.insert(event.event_id().to_owned(), event);
        }
    }

    /// Prepend events to the historical (oldest) end of the timeline, as
    /// happens when a pagination request fills in a gap.
    pub fn prepend_timeline(&mut self, events: Vec<Event>) {
        let mut ids: Vec<String> = Vec::with_capacity(events.len());
        for event in events {
            ids.push(event.event_id().to_owned());
            self.events.insert(event.event_id().to_owned(), event);
        }
        ids.extend(std::mem::take(&mut self.timeline));
        self.timeline = ids;
    }

    /// Apply a state event, replacing any previous entry at the same
    /// `(type, state_key)` slot.
    pub fn apply_state_event(&mut self, event: Event) {
        if let Some(key) = event.state_map_key() {
            self.state.insert(key, event.clone());
        }
        self.events.insert(event.event_id().to_owned(), event);
    }

    /// Look up a state entry by `(type, state_key)`.
    pub fn state_event(&self, event_type: &str, state_key: &str) -> Option<&Event> {
        self.state.get(&(event_type.to_owned(), state_key.to_owned()))
    }

    /// Every state event currently held, as `(type, state_key) -> Event`
    /// pairs.
    pub fn state(&self) -> impl Iterator<Item = (&(String, String), &Event)> {
        self.state.iter()
    }

    /// Merge an account data entry, replacing any prior entry with the same
    /// event type.
    pub fn set_account_data(&mut self, event_type: impl Into<String>, content: JsonValue) {
        self.account_data.insert(event_type.into(), content);
    }

    /// Look up account data by event type.
    pub fn account_data(&self, event_type: &str) -> Option<&JsonValue> {
        self.account_data.get(event_type)
    }

    /// Merge an ephemeral event (e.g. typing, receipts), replacing any prior
    /// entry with the same event type.
    pub fn set_ephemeral(&mut self, event_type: impl Into<String>, content: JsonValue) {
        self.ephemeral.insert(event_type.into(), content);
    }

    /// The invite-state events for a room we've been invited to but not
    /// joined.
    pub fn invite_state(&self) -> &[Event] {
        &self.invite_state
    }

    /// Replace the invite state wholesale -- invite state for a room is
    /// supplied in full on every invite sync, not merged incrementally.
    pub fn set_invite_state(&mut self, events: Vec<Event>) {
        self.invite_state = events;
    }

    /// Whether the room is (or has ever been) end-to-end encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Mark the room as encrypted. Sticky: once set, calling this again with
    /// `false` has no effect, since `encrypted` is monotonic.
    pub fn mark_encrypted(&mut self) {
        self.encrypted = true;
    }

    /// Whether the full member list for this room has been loaded (required
    /// before a megolm send can compute its recipient set).
    pub fn members_fully_loaded(&self) -> bool {
        self.members_fully_loaded
    }

    /// Record that the member list has been loaded (e.g. after a successful
    /// `GetRoomStates`).
    pub fn set_members_fully_loaded(&mut self, loaded: bool) {
        self.members_fully_loaded = loaded;
    }

    /// Whether the outbound megolm session for this room should be rotated
    /// before the next send, e.g. because the device list changed.
    pub fn should_rotate_session_key(&self) -> bool {
        self.should_rotate_session_key
    }

    /// Flag the room's outbound megolm session for rotation.
    pub fn flag_session_rotation(&mut self) {
        self.should_rotate_session_key = true;
    }

    /// Clear the rotation flag -- called once a rotation has happened.
    pub fn clear_session_rotation_flag(&mut self) {
        self.should_rotate_session_key = false;
    }

    /// Record a timeline gap: `edge_event_id` is the oldest event we know
    /// about, and `pagination_token` is what a paginate-backwards request
    /// needs to fetch the events before it.
    pub fn record_gap(&mut self, edge_event_id: impl Into<String>, pagination_token: impl Into<String>) {
        self.timeline_gaps.insert(edge_event_id.into(), pagination_token.into());
    }

    /// The pagination token for the gap at `edge_event_id`, if any.
    pub fn gap_token(&self, edge_event_id: &str) -> Option<&str> {
        self.timeline_gaps.get(edge_event_id).map(String::as_str)
    }

    /// Close a gap after a successful paginate, removing its entry.
    pub fn close_gap(&mut self, edge_event_id: &str) -> Result<()> {
        self.timeline_gaps
            .remove(edge_event_id)
            .map(|_| ())
            .ok_or_else(|| Error::NoSuchGap(edge_event_id.to_owned()))
    }
}

/// The set of every room this client has ever observed, keyed by room id.
///
/// Rooms are created on first observation and never deleted except by an
/// explicit [`RoomList::forget`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoomList {
    rooms: HashMap<String, Room>,
}

impl RoomList {
    /// An empty room list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room by id.
    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Look up a room by id, mutably.
    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Get the room with the given id, creating it (in `Join` membership,
    /// the most common case for first observation via sync) if it doesn't
    /// exist yet.
    pub fn get_or_create(&mut self, room_id: &str, default_membership: Membership) -> &mut Room {
        self.rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| Room::new(room_id, default_membership))
    }

    /// Iterate over every room.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Room)> {
        self.rooms.iter()
    }

    /// Number of rooms tracked (of any membership).
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether any room is tracked.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Forget a room, removing it entirely. The only removal path for a
    /// room; only meaningful once its membership is `Leave`, matching the
    /// Matrix semantics that forgetting a joined room is a client error.
    pub fn forget(&mut self, room_id: &str) -> bool {
        match self.rooms.get(room_id).map(Room::membership) {
            Some(Membership::Leave) => self.rooms.remove(room_id).is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{Membership, Room, RoomList};
    use crate::event::Event;

    fn event(id: &str, event_type: &str) -> Event {
        Event::new(json!({"event_id": id, "type": event_type, "sender": "@a:h"})).unwrap()
    }

    #[test]
    fn timeline_only_grows() {
        let mut room = Room::new("!r:h", Membership::Join);
        room.append_timeline(vec![event("$1", "m.room.message"), event("$2", "m.room.message")]);
        assert_eq!(room.timeline(), ["$1", "$2"]);

        room.prepend_timeline(vec![event("$0", "m.room.create")]);
        assert_eq!(room.timeline(), ["$0", "$1", "$2"]);
    }

    #[test]
    fn encrypted_flag_is_sticky() {
        let mut room = Room::new("!r:h", Membership::Join);
        assert!(!room.is_encrypted());
        room.mark_encrypted();
        assert!(room.is_encrypted());
        // There is deliberately no `unmark_encrypted` method.
    }

    #[test]
    fn state_map_keeps_one_entry_per_slot() {
        let mut room = Room::new("!r:h", Membership::Join);
        let e1 = Event::new(json!({"event_id": "$1", "type": "m.room.name", "state_key": "", "content": {"name": "a"}})).unwrap();
        let e2 = Event::new(json!({"event_id": "$2", "type": "m.room.name", "state_key": "", "content": {"name": "b"}})).unwrap();
        room.apply_state_event(e1);
        room.apply_state_event(e2.clone());
        assert_eq!(room.state_event("m.room.name", ""), Some(&e2));
        assert_eq!(room.state().count(), 1);
    }

    #[test]
    fn forget_requires_leave_membership() {
        let mut rooms = RoomList::new();
        rooms.get_or_create("!r:h", Membership::Join);
        assert!(!rooms.forget("!r:h"), "can't forget a joined room");

        rooms.get_mut("!r:h").unwrap().set_membership(Membership::Leave);
        assert!(rooms.forget("!r:h"));
        assert!(rooms.get("!r:h").is_none());
    }

    #[test]
    fn gaps_close_exactly_once() {
        let mut room = Room::new("!r:h", Membership::Join);
        room.record_gap("$old", "tok123");
        assert_eq!(room.gap_token("$old"), Some("tok123"));
        room.close_gap("$old").unwrap();
        assert!(room.close_gap("$old").is_err());
    }
}
