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

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether an event's content has been decrypted yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecryptionStatus {
    /// The event is still showing its (possibly encrypted) original body.
    NotDecrypted,
    /// The event's content has been replaced with the decrypted body.
    Decrypted,
}

/// An immutable protocol event.
///
/// Identity is the `event_id` field inside `original`. Events are created
/// once, on receipt, and never mutated in place: decrypting an event
/// produces a *new* `Event` value via [`Event::with_decrypted`]. Two events
/// are equal iff their `original` JSON is equal -- decryption status and
/// decrypted body are derived, not part of identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    original: JsonValue,
    decrypted: Option<JsonValue>,
    status: DecryptionStatus,
    encrypted: bool,
}

impl Event {
    /// Build an event from its original wire JSON.
    ///
    /// Fails if the JSON has no string `event_id` field, since that's the
    /// only source of identity an event has.
    pub fn new(original: JsonValue) -> Result<Self> {
        let id = original.get("event_id").and_then(JsonValue::as_str);
        if id.is_none() {
            return Err(Error::MissingEventId);
        }

        let encrypted = original.get("type").and_then(JsonValue::as_str) == Some("m.room.encrypted");

        Ok(Self { original, decrypted: None, status: DecryptionStatus::NotDecrypted, encrypted })
    }

    /// The event's id.
    pub fn event_id(&self) -> &str {
        self.original
            .get("event_id")
            .and_then(JsonValue::as_str)
            .expect("constructor guarantees event_id is present")
    }

    /// The event's `type` field, if present.
    pub fn event_type(&self) -> Option<&str> {
        self.original.get("type").and_then(JsonValue::as_str)
    }

    /// The event's `sender` field, if present.
    pub fn sender(&self) -> Option<&str> {
        self.original.get("sender").and_then(JsonValue::as_str)
    }

    /// The event's `state_key`, if it is a state event.
    pub fn state_key(&self) -> Option<&str> {
        self.original.get("state_key").and_then(JsonValue::as_str)
    }

    /// Whether this event carries a (possibly empty) state key, making it a
    /// state event that occupies a slot in a room's state map.
    pub fn is_state_event(&self) -> bool {
        self.original.get("state_key").is_some()
    }

    /// The `(type, state_key)` pair this event would occupy in a room's
    /// state map, if it is a state event.
    pub fn state_map_key(&self) -> Option<(String, String)> {
        let event_type = self.event_type()?.to_owned();
        let state_key = self.state_key()?.to_owned();
        Some((event_type, state_key))
    }

    /// The original (possibly still encrypted) JSON body.
    pub fn original(&self) -> &JsonValue {
        &self.original
    }

    /// The decrypted JSON body, if decryption has happened.
    pub fn decrypted(&self) -> Option<&JsonValue> {
        self.decrypted.as_ref()
    }

    /// Whichever body is most useful to display: the decrypted body if
    /// present, otherwise the original.
    pub fn best_effort_content(&self) -> &JsonValue {
        self.decrypted.as_ref().unwrap_or(&self.original)
    }

    /// Whether this event's outer type is `m.room.encrypted`.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Current decryption status.
    pub fn decryption_status(&self) -> DecryptionStatus {
        self.status
    }

    /// Produce a new `Event` with `body` recorded as the decrypted content.
    ///
    /// The original JSON, and therefore the event's identity and equality,
    /// is unchanged -- this is why decryption can't be observed as a mutation
    /// of an existing value.
    pub fn with_decrypted(&self, body: JsonValue) -> Self {
        Self {
            original: self.original.clone(),
            decrypted: Some(body),
            status: DecryptionStatus::Decrypted,
            encrypted: self.encrypted,
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.original == other.original
    }
}

impl Eq for Event {}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::Event;

    #[test]
    fn requires_event_id() {
        let err = Event::new(json!({"type": "m.room.message"})).unwrap_err();
        assert_eq!(err, super::Error::MissingEventId);
    }

    #[test]
    fn equality_follows_original_json() {
        let a = Event::new(json!({"event_id": "$1", "type": "m.room.message"})).unwrap();
        let b = Event::new(json!({"event_id": "$1", "type": "m.room.message"})).unwrap();
        assert_eq!(a, b);

        let decrypted = a.with_decrypted(json!({"body": "hello"}));
        assert_eq!(decrypted, b, "decrypting must not change identity/equality");
        assert_ne!(decrypted.decrypted(), b.decrypted());
    }

    #[test]
    fn state_event_detection() {
        let msg = Event::new(json!({"event_id": "$1", "type": "m.room.message"})).unwrap();
        assert!(!msg.is_state_event());

        let state = Event::new(
            json!({"event_id": "$2", "type": "m.room.name", "state_key": ""}),
        )
        .unwrap();
        assert!(state.is_state_event());
        assert_eq!(state.state_map_key(), Some(("m.room.name".to_owned(), "".to_owned())));
    }
}
