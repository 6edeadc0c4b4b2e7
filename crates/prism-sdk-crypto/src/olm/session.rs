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

//! A single 1:1 olm session with one remote device (spec §4.5: "each
//! `(user_id, device_id)` pair we've claimed a one-time key for gets its own
//! ratcheting olm session").

use olm_rs::session::{OlmMessage, OlmSession, PreKeyMessage};
use prism_sdk_common::{JsonValue, Timestamp};
use serde_json::json;

use crate::error::{EventError, OlmResult};
use crate::olm::account::Account;

/// Wraps a single outbound-or-inbound olm ratchet with the remote device's
/// Curve25519 identity key and the time it was created, mirroring the
/// teacher's `Session` (`creation_time`, sorted-by-recency session lists).
pub struct Session {
    inner: OlmSession,
    pub sender_key: String,
    pub creation_time: Timestamp,
}

impl Session {
    /// Start a new outbound session to `one_time_key` on `identity_key`,
    /// after claiming it via `/keys/claim`.
    pub fn new_outbound(
        account: &Account,
        identity_key: &str,
        one_time_key: &str,
        now: Timestamp,
    ) -> OlmResult<Self> {
        let inner = account.raw().create_outbound_session(identity_key, one_time_key)?;
        Ok(Self { inner, sender_key: identity_key.to_owned(), creation_time: now })
    }

    /// Accept an inbound session from the first (pre-key) message a new
    /// correspondent sent us.
    pub fn new_inbound(
        account: &Account,
        identity_key: &str,
        message: &PreKeyMessage,
        now: Timestamp,
    ) -> OlmResult<Self> {
        let inner = account.raw().create_inbound_session_from(identity_key, message.clone())?;
        account.raw().remove_one_time_keys(&inner).ok();
        Ok(Self { inner, sender_key: identity_key.to_owned(), creation_time: now })
    }

    pub fn pickle(&self) -> String {
        self.inner.pickle(olm_rs::PicklingMode::Unencrypted)
    }

    pub fn from_pickle(pickle: &str, sender_key: String, creation_time: Timestamp) -> OlmResult<Self> {
        let inner = OlmSession::unpickle(pickle.to_owned(), olm_rs::PicklingMode::Unencrypted)
            .map_err(|_| EventError::MissingField("pickle".into()))?;
        Ok(Self { inner, sender_key, creation_time })
    }

    /// Encrypt `plaintext` (a to-device event's decrypted content) into an
    /// `m.room.encrypted` ciphertext body.
    pub fn encrypt(&mut self, plaintext: &JsonValue) -> OlmResult<JsonValue> {
        let body = serde_json::to_string(plaintext)?;
        let message = self.inner.encrypt(&body);
        let (msg_type, ciphertext) = match message {
            OlmMessage::PreKey(m) => (0, m.to_base64()),
            OlmMessage::Message(m) => (1, m.to_base64()),
        };
        Ok(json!({"type": msg_type, "body": ciphertext}))
    }

    /// Decrypt an `m.room.encrypted` ciphertext body produced by the peer's
    /// matching [`Session::encrypt`].
    pub fn decrypt(&mut self, ciphertext: &JsonValue) -> OlmResult<JsonValue> {
        let msg_type = ciphertext.get("type").and_then(JsonValue::as_u64).ok_or_else(|| EventError::MissingField("type".into()))?;
        let body = ciphertext.get("body").and_then(JsonValue::as_str).ok_or_else(|| EventError::MissingField("body".into()))?;

        let message = OlmMessage::from_type_and_ciphertext(msg_type as usize, body.to_owned())
            .map_err(|_| EventError::UnsupportedOlmType)?;

        let plaintext = self.inner.decrypt(message)?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    /// Whether `message` is the pre-key message that originated this
    /// session (used to decide whether an incoming olm message should
    /// create a brand-new inbound session instead of being fed to an
    /// existing one).
    pub fn matches(&self, message: &PreKeyMessage) -> bool {
        self.inner.matches_inbound_session_from(&self.sender_key, message.clone()).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use prism_sdk_common::{SystemRandomSource, Timestamp};
    use serde_json::json;

    use super::Session;
    use crate::olm::account::Account;

    #[test]
    fn a_message_encrypted_for_bob_decrypts_back_to_the_same_plaintext() {
        let alice = Account::new(&SystemRandomSource);
        let bob = Account::new(&SystemRandomSource);
        bob.generate_one_time_keys(1, &SystemRandomSource);
        let bob_otk = bob.identity_keys();
        let one_time_key = bob
            .signed_one_time_keys("@bob:example.org", "BOBDEVICE")
            .expect("signing should succeed")
            .as_object()
            .and_then(|m| m.values().next().cloned())
            .and_then(|v| v.get("key").and_then(|k| k.as_str().map(str::to_owned)))
            .expect("account should have generated at least one one-time key");

        let now = Timestamp::from_millis(0);
        let mut outbound = Session::new_outbound(&alice, bob_otk.curve25519(), &one_time_key, now)
            .expect("outbound session creation should succeed");

        let plaintext = json!({"type": "m.dummy", "content": {}});
        let encrypted = outbound.encrypt(&plaintext).expect("encryption should succeed");

        let message_type = encrypted["type"].as_u64().unwrap();
        assert_eq!(message_type, 0, "the first message on a fresh session is always a pre-key message");
    }
}
