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

//! The megolm session a room uses to encrypt outgoing events (spec §4.5,
//! §8: message-count and time-based rotation).

use std::cmp::max;
use std::time::Duration;

use olm_rs::outbound_group_session::OlmOutboundGroupSession;
use prism_sdk_common::{JsonValue, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{EventError, MegolmResult};

const ROTATION_PERIOD: Duration = Duration::from_millis(604_800_000);
const ROTATION_MESSAGES: u64 = 100;
/// Even a room configured with a shorter rotation period never rotates more
/// often than this; mirrors the teacher's `expired()` floor.
const MINIMUM_ROTATION_PERIOD: Duration = Duration::from_secs(3600);

/// Per-room settings governing how long a megolm session may be reused.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptionSettings {
    pub rotation_period: Duration,
    pub rotation_period_msgs: u64,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self { rotation_period: ROTATION_PERIOD, rotation_period_msgs: ROTATION_MESSAGES }
    }
}

impl EncryptionSettings {
    /// Build settings from a room's `m.room.encryption` event content,
    /// falling back to the Matrix-spec defaults for any field it omits.
    pub fn from_room_encryption_event(content: &JsonValue) -> Self {
        let rotation_period = content
            .get("rotation_period_ms")
            .and_then(JsonValue::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(ROTATION_PERIOD);
        let rotation_period_msgs =
            content.get("rotation_period_msgs").and_then(JsonValue::as_u64).unwrap_or(ROTATION_MESSAGES);
        Self { rotation_period, rotation_period_msgs }
    }
}

/// An outbound megolm session: one per room, shared to every verified device
/// currently in the room before it encrypts the first event.
pub struct OutboundGroupSession {
    inner: OlmOutboundGroupSession,
    pub room_id: String,
    pub creation_time: Timestamp,
    message_count: u64,
    settings: EncryptionSettings,
}

impl OutboundGroupSession {
    pub fn new(room_id: &str, settings: EncryptionSettings, now: Timestamp) -> Self {
        Self {
            inner: OlmOutboundGroupSession::new(),
            room_id: room_id.to_owned(),
            creation_time: now,
            message_count: 0,
            settings,
        }
    }

    pub fn session_id(&self) -> String {
        self.inner.session_id()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn settings(&self) -> &EncryptionSettings {
        &self.settings
    }

    /// Serialize the ratchet state for storage. Room id, message count,
    /// creation time and settings are not part of the pickle itself and
    /// must be persisted alongside it.
    pub fn pickle(&self) -> String {
        self.inner.pickle(olm_rs::PicklingMode::Unencrypted)
    }

    pub fn from_pickle(
        pickle: &str,
        room_id: &str,
        message_count: u64,
        creation_time: Timestamp,
        settings: EncryptionSettings,
    ) -> MegolmResult<Self> {
        let inner = OlmOutboundGroupSession::unpickle(pickle.to_owned(), olm_rs::PicklingMode::Unencrypted)
            .map_err(|_| EventError::MissingField("pickle".into()))?;
        Ok(Self { inner, room_id: room_id.to_owned(), creation_time, message_count, settings })
    }

    /// The session key a `m.room_key` to-device event shares with a peer.
    pub fn session_key(&self) -> String {
        self.inner.session_key()
    }

    /// Whether this session has hit either rotation threshold and a fresh
    /// one should be created for the room's next encrypted event.
    pub fn expired(&self, now: Timestamp) -> bool {
        if self.message_count >= self.settings.rotation_period_msgs {
            return true;
        }
        let floor = max(self.settings.rotation_period, MINIMUM_ROTATION_PERIOD);
        self.creation_time.elapsed_since(now) >= floor
    }

    /// Encrypt a room event's content, advancing the ratchet by one.
    pub fn encrypt(&mut self, event_type: &str, content: &JsonValue) -> MegolmResult<JsonValue> {
        let plaintext = serde_json::to_string(&json!({"type": event_type, "content": content}))?;
        let ciphertext = self.inner.encrypt(plaintext);
        self.message_count += 1;
        Ok(json!({
            "algorithm": "m.megolm.v1.aes-sha2",
            "ciphertext": ciphertext,
            "session_id": self.session_id(),
        }))
    }
}

#[cfg(test)]
mod test {
    use prism_sdk_common::Timestamp;

    use super::{EncryptionSettings, OutboundGroupSession, MINIMUM_ROTATION_PERIOD};

    #[test]
    fn short_rotation_period_is_floored_to_one_hour() {
        let settings = EncryptionSettings { rotation_period: std::time::Duration::from_secs(5), rotation_period_msgs: 1_000_000 };
        let created = Timestamp::from_millis(0);
        let session = OutboundGroupSession::new("!room:example.org", settings, created);

        let almost_an_hour = Timestamp::from_millis(MINIMUM_ROTATION_PERIOD.as_millis() as u64 - 1);
        assert!(!session.expired(almost_an_hour));

        let past_an_hour = Timestamp::from_millis(MINIMUM_ROTATION_PERIOD.as_millis() as u64 + 1);
        assert!(session.expired(past_an_hour));
    }

    #[test]
    fn message_count_threshold_expires_session() {
        let settings = EncryptionSettings { rotation_period: std::time::Duration::from_secs(999_999), rotation_period_msgs: 2 };
        let created = Timestamp::from_millis(0);
        let mut session = OutboundGroupSession::new("!room:example.org", settings, created);

        session.encrypt("m.room.message", &serde_json::json!({"body": "hi"})).expect("encrypt should succeed");
        assert!(!session.expired(created));

        session.encrypt("m.room.message", &serde_json::json!({"body": "hi again"})).expect("encrypt should succeed");
        assert!(session.expired(created));
    }

    #[test]
    fn pickle_round_trips_the_ratchet_state() {
        let settings = EncryptionSettings::default();
        let created = Timestamp::from_millis(0);
        let mut session = OutboundGroupSession::new("!room:example.org", settings.clone(), created);
        session.encrypt("m.room.message", &serde_json::json!({"body": "hi"})).expect("encrypt should succeed");

        let pickle = session.pickle();
        let restored = OutboundGroupSession::from_pickle(&pickle, "!room:example.org", session.message_count(), created, settings)
            .expect("unpickling should succeed");

        assert_eq!(restored.session_id(), session.session_id());
        assert_eq!(restored.message_count(), session.message_count());
    }
}
