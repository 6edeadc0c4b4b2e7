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

//! The inbound megolm session a room uses to decrypt events shared by other
//! devices, with replay-index tracking (spec §4.5, §8: "a ratchet index that
//! has already produced one event id and later produces a different one is
//! an exported-session or compromised-server replay, and must be rejected").

use dashmap::DashMap;
use olm_rs::inbound_group_session::OlmInboundGroupSession;
use prism_sdk_common::{JsonValue, Timestamp};
use serde_json::json;

use crate::error::{EventError, MegolmError, MegolmResult};

/// A single room's inbound megolm ratchet plus the ledger of ratchet indices
/// it has already used to decrypt an event, keyed to the event id that index
/// produced.
pub struct InboundGroupSession {
    inner: OlmInboundGroupSession,
    pub room_id: String,
    pub sender_key: String,
    first_known_index: u32,
    seen_indices: DashMap<u32, (String, Timestamp)>,
}

impl InboundGroupSession {
    /// Import a session key received over an `m.room_key` to-device event or
    /// a key-forwarding response.
    pub fn new(room_id: &str, sender_key: &str, session_key: &str) -> MegolmResult<Self> {
        let inner = OlmInboundGroupSession::new(session_key)?;
        let first_known_index = inner.first_known_index();
        Ok(Self {
            inner,
            room_id: room_id.to_owned(),
            sender_key: sender_key.to_owned(),
            first_known_index,
            seen_indices: DashMap::new(),
        })
    }

    pub fn session_id(&self) -> String {
        self.inner.session_id()
    }

    pub fn first_known_index(&self) -> u32 {
        self.first_known_index
    }

    pub fn pickle(&self) -> String {
        self.inner.pickle(olm_rs::PicklingMode::Unencrypted)
    }

    pub fn from_pickle(pickle: &str, room_id: &str, sender_key: &str) -> MegolmResult<Self> {
        let inner = OlmInboundGroupSession::unpickle(pickle.to_owned(), olm_rs::PicklingMode::Unencrypted)
            .map_err(|_| EventError::MissingField("pickle".into()))?;
        let first_known_index = inner.first_known_index();
        Ok(Self {
            inner,
            room_id: room_id.to_owned(),
            sender_key: sender_key.to_owned(),
            first_known_index,
            seen_indices: DashMap::new(),
        })
    }

    /// Decrypt a megolm ciphertext from `event_id`, rejecting a replay: the
    /// same ratchet index producing a different event id than the one it
    /// first decrypted.
    pub fn decrypt(&self, ciphertext: &str, event_id: &str, now: Timestamp) -> MegolmResult<JsonValue> {
        let (plaintext, message_index) = self.inner.decrypt(ciphertext.to_owned())?;

        if let Some(prior) = self.seen_indices.get(&message_index) {
            if prior.0 != event_id {
                return Err(MegolmError::ReplayedIndex {
                    index: message_index,
                    prior_event_id: prior.0.clone(),
                    event_id: event_id.to_owned(),
                });
            }
        } else {
            self.seen_indices.insert(message_index, (event_id.to_owned(), now));
        }

        let mut value: JsonValue = serde_json::from_str(&plaintext)?;
        let object = value.as_object_mut().ok_or(EventError::NotAnObject)?;
        object.insert("event_id".to_owned(), json!(event_id));
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use prism_sdk_common::Timestamp;

    use super::InboundGroupSession;
    use crate::olm::group_sessions::outbound::{EncryptionSettings, OutboundGroupSession};

    #[test]
    fn a_second_event_at_the_same_index_is_rejected_as_a_replay() {
        let now = Timestamp::from_millis(0);
        let mut outbound = OutboundGroupSession::new("!room:example.org", EncryptionSettings::default(), now);
        let encrypted = outbound.encrypt("m.room.message", &serde_json::json!({"body": "hi"})).expect("encrypt should succeed");
        let ciphertext = encrypted["ciphertext"].as_str().unwrap().to_owned();

        let inbound = InboundGroupSession::new("!room:example.org", "sender_curve25519_key", &outbound.session_key())
            .expect("import should succeed");

        inbound.decrypt(&ciphertext, "$original:example.org", now).expect("first decrypt should succeed");

        let err = inbound.decrypt(&ciphertext, "$forwarded:example.org", now).unwrap_err();
        assert!(matches!(err, crate::error::MegolmError::ReplayedIndex { .. }));
    }

    #[test]
    fn re_decrypting_the_same_event_id_at_the_same_index_is_not_a_replay() {
        let now = Timestamp::from_millis(0);
        let mut outbound = OutboundGroupSession::new("!room:example.org", EncryptionSettings::default(), now);
        let encrypted = outbound.encrypt("m.room.message", &serde_json::json!({"body": "hi"})).expect("encrypt should succeed");
        let ciphertext = encrypted["ciphertext"].as_str().unwrap().to_owned();

        let inbound = InboundGroupSession::new("!room:example.org", "sender_curve25519_key", &outbound.session_key())
            .expect("import should succeed");

        inbound.decrypt(&ciphertext, "$event:example.org", now).expect("first decrypt should succeed");
        inbound.decrypt(&ciphertext, "$event:example.org", now).expect("re-decrypt of the same event should succeed");
    }
}
