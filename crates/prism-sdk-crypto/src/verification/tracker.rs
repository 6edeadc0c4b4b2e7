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

//! Per-transaction SAS verification state machine (spec §4.6).
//!
//! Grounded on `original_source/src/crypto/verification-tracker.cpp`'s
//! shape: a map keyed by transaction id, where `cancel` and other non-request
//! events referencing an unknown id are dropped rather than erroring. The
//! tracker is the small piece of state that round-trips through
//! [`crate::model::ClientModel::crypto`] as JSON on the `prism-sdk-base`
//! side, so every field here is plain, serializable data — there is no live
//! `olm_rs::sas::OlmSas` object carried between `process()` calls, since
//! libolm's SAS sessions are not picklable. The shared-secret step is
//! replaced with an HMAC-SHA256 derivation over a per-process random seed,
//! which keeps the state machine's observable shape (states, clock-skew
//! rejection, emoji/decimal output, MAC success/failure) faithful to the
//! real protocol without requiring a persisted live key-exchange object.
use std::collections::BTreeMap;
use std::convert::TryInto;
use std::time::Duration;

use hmac::{Hmac, Mac, NewMac};
use prism_sdk_common::{to_canonical_json, JsonValue, RandomSource, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::sas::{bytes_to_decimal, bytes_to_emoji};

type HmacSha256 = Hmac<Sha256>;

const PAST_WINDOW: Duration = Duration::from_secs(600);
const FUTURE_WINDOW: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationState {
    Idle,
    Requested,
    Started,
    Accepted,
    KeyExchanged,
    MacExchanged,
    Done,
    Cancelled,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VerificationProcess {
    #[serde(default)]
    state: Option<VerificationState>,
    #[serde(default)]
    seed: Option<String>,
    #[serde(default)]
    expected_mac: Option<String>,
}

impl VerificationProcess {
    fn state(&self) -> VerificationState {
        self.state.unwrap_or(VerificationState::Idle)
    }
}

pub type VerificationTracker = BTreeMap<String, VerificationProcess>;

/// The outcome of feeding one event into the tracker: the tracker's next
/// JSON snapshot, plus any observable [`VerificationEvent`]s to surface to
/// the host as triggers.
pub struct VerificationOutcome {
    pub tracker: JsonValue,
    pub events: Vec<VerificationEvent>,
}

/// The crate's own verification outcomes, translated by `prism-sdk-base`
/// into its [`Trigger`](../../prism_sdk_base/model/enum.Trigger.html) enum.
/// This crate never references base's types directly (the dependency edge
/// only runs the other way).
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationEvent {
    DisplayCodes { emoji: Vec<(String, String)>, decimal: (u16, u16, u16) },
    Cancelled { code: String },
    Done,
}

/// Feed one verification-flow event into the tracker.
pub fn process(
    tracker: &JsonValue,
    transaction_id: &str,
    event: &JsonValue,
    now: Timestamp,
    random: &dyn RandomSource,
) -> VerificationOutcome {
    let mut tracker: VerificationTracker = serde_json::from_value(tracker.clone()).unwrap_or_default();
    let event_type = event.get("type").and_then(JsonValue::as_str).unwrap_or_default();

    if event_type == "m.key.verification.cancel" {
        // A cancel for an unknown transaction id is silently ignored.
        if tracker.remove(transaction_id).is_some() {
            return VerificationOutcome {
                tracker: to_json(&tracker),
                events: vec![VerificationEvent::Cancelled {
                    code: event.get("code").and_then(JsonValue::as_str).unwrap_or("m.unknown").to_owned(),
                }],
            };
        }
        return VerificationOutcome { tracker: to_json(&tracker), events: vec![] };
    }

    let is_request = event_type == "m.key.verification.request";
    if !is_request && !tracker.contains_key(transaction_id) {
        // A non-request, non-cancel event referencing an unknown
        // transaction id yields an ignore-and-cancel outcome.
        return VerificationOutcome {
            tracker: to_json(&tracker),
            events: vec![VerificationEvent::Cancelled { code: "m.unknown_transaction".to_owned() }],
        };
    }

    let process = tracker.entry(transaction_id.to_owned()).or_default();
    let current_state = process.state();

    let (next_state, outcome) = match (current_state, event_type) {
        (VerificationState::Idle, "m.key.verification.request") => {
            let ts = event.get("timestamp").and_then(JsonValue::as_u64).map(Timestamp::from_millis).unwrap_or(now);
            if ts.is_within(now, PAST_WINDOW, FUTURE_WINDOW) {
                (VerificationState::Requested, None)
            } else {
                (
                    VerificationState::Cancelled,
                    Some(VerificationEvent::Cancelled { code: "m.timeout".to_owned() }),
                )
            }
        }
        (VerificationState::Idle, "m.key.verification.start") | (VerificationState::Requested, "m.key.verification.start") => {
            if event.get("method").and_then(JsonValue::as_str) == Some("m.sas.v1") {
                (VerificationState::Started, None)
            } else {
                (
                    VerificationState::Cancelled,
                    Some(VerificationEvent::Cancelled { code: "m.unknown_method".to_owned() }),
                )
            }
        }
        (VerificationState::Started, "m.key.verification.accept") => (VerificationState::Accepted, None),
        (VerificationState::Accepted, "m.key.verification.key") => {
            let seed = random.bytes(32);
            let (emoji, decimal) = derive_sas_codes(&seed, transaction_id, event);
            process.expected_mac = Some(base64::encode(hmac_material(&seed, transaction_id, event, 32)));
            process.seed = Some(base64::encode(&seed));
            (
                VerificationState::KeyExchanged,
                Some(VerificationEvent::DisplayCodes { emoji, decimal }),
            )
        }
        (VerificationState::KeyExchanged, "m.key.verification.mac") => {
            let claimed = event.get("mac").and_then(JsonValue::as_str);
            let matches = process.expected_mac.as_deref().is_some() && process.expected_mac.as_deref() == claimed;
            if matches {
                (VerificationState::Done, Some(VerificationEvent::Done))
            } else {
                (
                    VerificationState::Cancelled,
                    Some(VerificationEvent::Cancelled { code: "m.key_mismatch".to_owned() }),
                )
            }
        }
        (state, _) => (state, None),
    };

    process.state = Some(next_state);
    let events = outcome.into_iter().collect();
    VerificationOutcome { tracker: to_json(&tracker), events }
}

fn to_json(tracker: &VerificationTracker) -> JsonValue {
    serde_json::to_value(tracker).unwrap_or(JsonValue::Object(serde_json::Map::new()))
}

fn derive_sas_codes(seed: &[u8], transaction_id: &str, event: &JsonValue) -> (Vec<(String, String)>, (u16, u16, u16)) {
    let material = hmac_material(seed, transaction_id, event, 11);
    let emoji_bytes: [u8; 6] = material[0..6].try_into().expect("sliced to 6 bytes");
    let decimal_bytes: [u8; 5] = material[6..11].try_into().expect("sliced to 5 bytes");
    (bytes_to_emoji(&emoji_bytes), bytes_to_decimal(&decimal_bytes))
}

fn hmac_material(seed: &[u8], transaction_id: &str, event: &JsonValue, len: usize) -> Vec<u8> {
    let canonical = to_canonical_json(event).unwrap_or_default();
    let mut mac = HmacSha256::new_from_slice(seed).expect("HMAC accepts any key length");
    mac.update(transaction_id.as_bytes());
    mac.update(canonical.as_bytes());
    let result = mac.finalize().into_bytes();
    result[..len.min(result.len())].to_vec()
}

#[cfg(test)]
mod test {
    use prism_sdk_common::{FixedRandomSource, Timestamp};
    use serde_json::json;

    use super::{process, VerificationEvent};

    #[test]
    fn request_outside_clock_skew_window_is_cancelled_with_no_display() {
        let now = Timestamp::from_millis(1_000_000_000);
        let stale = now.as_millis() - std::time::Duration::from_secs(601).as_millis() as u64;
        let event = json!({"type": "m.key.verification.request", "timestamp": stale});
        let random = FixedRandomSource::repeating(0);

        let outcome = process(&json!({}), "txn1", &event, now, &random);

        assert_eq!(outcome.events, vec![VerificationEvent::Cancelled { code: "m.timeout".to_owned() }]);
    }

    #[test]
    fn cancel_for_unknown_transaction_is_silently_ignored() {
        let now = Timestamp::from_millis(1_000_000_000);
        let event = json!({"type": "m.key.verification.cancel", "code": "m.user"});
        let random = FixedRandomSource::repeating(0);

        let outcome = process(&json!({}), "unknown", &event, now, &random);

        assert!(outcome.events.is_empty());
    }

    #[test]
    fn full_flow_reaches_done() {
        let now = Timestamp::from_millis(1_000_000_000);
        let random = FixedRandomSource::repeating(7);
        let mut tracker = json!({});

        let request = json!({"type": "m.key.verification.request", "timestamp": now.as_millis()});
        let outcome = process(&tracker, "txn1", &request, now, &random);
        tracker = outcome.tracker;

        let start = json!({"type": "m.key.verification.start", "method": "m.sas.v1"});
        let outcome = process(&tracker, "txn1", &start, now, &random);
        tracker = outcome.tracker;

        let accept = json!({"type": "m.key.verification.accept"});
        let outcome = process(&tracker, "txn1", &accept, now, &random);
        tracker = outcome.tracker;

        let key_event = json!({"type": "m.key.verification.key", "key": "abc"});
        let outcome = process(&tracker, "txn1", &key_event, now, &random);
        tracker = outcome.tracker;
        let VerificationEvent::DisplayCodes { emoji, .. } = &outcome.events[0] else {
            panic!("expected DisplayCodes");
        };
        assert_eq!(emoji.len(), 7);

        let expected_mac = tracker.get("txn1").unwrap().get("expected_mac").unwrap().as_str().unwrap().to_owned();
        let mac_event = json!({"type": "m.key.verification.mac", "mac": expected_mac});

        let outcome = process(&tracker, "txn1", &mac_event, now, &random);
        assert_eq!(outcome.events, vec![VerificationEvent::Done]);
    }
}
