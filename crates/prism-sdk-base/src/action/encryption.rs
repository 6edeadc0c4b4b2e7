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

//! Key management, key claiming, megolm/olm encryption, and verification
//! actions.

use prism_sdk_common::{JsonValue, RawBytes, Timestamp};
use serde::{Deserialize, Serialize};

use crate::verification_strategy::VerificationStrategy;

/// Actions concerned with end-to-end encryption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EncryptionAction {
    /// Sign and upload this device's identity keys.
    UploadIdentityKeys,
    /// Generate and upload a batch of signed one-time keys.
    GenerateAndUploadOneTimeKeys {
        /// How many one-time keys to generate.
        count: u32,
    },
    /// Query the current device lists for a set of users.
    QueryKeys {
        /// The users whose device lists should be (re)fetched.
        users: Vec<String>,
        /// Whether this query is part of the initial sync bootstrap
        /// (affects which users get queried: every room member vs. only
        /// users flagged outdated).
        initial_sync: bool,
    },
    /// Claim one-time keys for every device lacking an olm session, then
    /// send each of them the current megolm session key.
    ClaimKeysAndSendSessionKey {
        /// The room whose megolm session is being shared.
        room_id: String,
        /// The `(user_id, device_id)` pairs to claim keys for.
        devices: Vec<(String, String)>,
    },
    /// Encrypt an event with the room's current megolm session.
    EncryptMegOlmEvent {
        /// The target room.
        room_id: String,
        /// The plaintext event to encrypt.
        event: JsonValue,
    },
    /// Encrypt a to-device event with an olm 1:1 session.
    EncryptOlmEvent {
        /// The recipient user.
        user_id: String,
        /// The recipient device.
        device_id: String,
        /// The plaintext event to encrypt.
        event: JsonValue,
    },
    /// Change the policy governing which devices receive megolm keys
    /// without interactive verification.
    SetVerificationStrategy {
        /// The new strategy.
        strategy: VerificationStrategy,
    },
    /// An incoming or outgoing verification-protocol event (`m.key.verification.*`)
    /// to fold into the verification tracker.
    ///
    /// `now` is captured by the runtime before dispatch, not read from the
    /// system clock inside the reducer, so that `reduce` stays a pure
    /// function of its arguments (spec §8: "reduce is total and
    /// deterministic").
    ProcessVerificationEvent {
        /// The transaction id this event belongs to.
        transaction_id: String,
        /// The event's type and content, passed through to the tracker.
        event: JsonValue,
        /// The local wall-clock time at dispatch, for the clock-skew check.
        now: Timestamp,
        /// Entropy for this step, sized by `processRandomSize(event)` (spec
        /// §4.6) -- zero bytes for events whose handling needs none.
        /// Captured by the runtime before dispatch for the same reason as
        /// `now`.
        random: RawBytes,
    },
    /// Fold a freshly (re)pickled local olm account back into `crypto`.
    ///
    /// Effects can't mutate [`crate::model::ClientModel`] directly (spec
    /// §4: `reduce` is the only place state changes), so every crypto
    /// operation that advances some opaque ratchet comes back through one
    /// of these `Persist*` actions instead.
    PersistAccountPickle {
        /// The account's new pickle.
        pickle: String,
    },
    /// Fold a newly established or refreshed 1:1 olm session back into
    /// `crypto`.
    PersistOlmSession {
        /// The session's remote user.
        user_id: String,
        /// The session's remote device.
        device_id: String,
        /// The session's new pickle.
        pickle: String,
        /// The remote device's Curve25519 identity key.
        sender_key: String,
        /// When this session was established.
        creation_time: Timestamp,
    },
    /// Fold a newly created or rotated outbound megolm session back into
    /// `crypto`.
    PersistOutboundMegOlmSession {
        /// The room this session belongs to.
        room_id: String,
        /// The session's new pickle.
        pickle: String,
        /// The session's message count at the time of persisting.
        message_count: u64,
        /// When this session was created.
        creation_time: Timestamp,
        /// The rotation settings this session was created with.
        settings: JsonValue,
    },
    /// Fold a newly imported inbound megolm session (from an `m.room_key`
    /// to-device event) back into `crypto`.
    PersistInboundMegOlmSession {
        /// The room this session belongs to.
        room_id: String,
        /// The session's id, as reported by the crypto engine.
        session_id: String,
        /// The session's pickle.
        pickle: String,
        /// The Curve25519 key of the device that sent this session.
        sender_key: String,
    },
}
