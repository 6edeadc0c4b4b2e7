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

//! Key management, device lists, verification, and the encrypted half of
//! the send pipeline.
//!
//! The actual olm/megolm ratchets live in `prism-sdk-crypto`; this module
//! only knows [`crate::model::ClientModel::crypto`] as an opaque JSON blob,
//! with each ratchet's pickle stashed under a stable key (`account_pickle`,
//! `olm_sessions.{user}|{device}`, `megolm_outbound.{room_id}`,
//! `megolm_inbound.{room_id}:{session_id}`) so the model itself stays plain,
//! serializable data while the actual `olm_rs` handles themselves stay
//! behind the `encryption` feature.
//!
//! Every function here has a `#[cfg(not(feature = "encryption"))]` fallback
//! that keeps the reducer total even when `prism-sdk-crypto` isn't linked
//! in.

use http::Method;
use prism_sdk_common::{JsonValue, Timestamp};
use serde_json::json;
use tracing::warn;

use crate::action::{Action, EncryptionAction, TransportAction};
use crate::effect::Effect;
use crate::job::Job;
use crate::model::{ClientModel, Trigger};
use crate::sync_types::DeviceLists;
use crate::verification_strategy::{self, DeviceTrust, TrustLevel};

#[cfg(feature = "encryption")]
use prism_sdk_crypto::{Account, EncryptionSettings, InboundGroupSession, OutboundGroupSession, Session};

pub(super) fn reduce(state: &ClientModel, action: EncryptionAction) -> (ClientModel, Effect) {
    match action {
        EncryptionAction::UploadIdentityKeys => upload_identity_keys(state),
        EncryptionAction::GenerateAndUploadOneTimeKeys { count } => generate_and_upload_otks(state, count),
        EncryptionAction::QueryKeys { users, initial_sync } => query_keys(state, users, initial_sync),
        EncryptionAction::ClaimKeysAndSendSessionKey { room_id, devices } => claim_and_send_session_key(state, room_id, devices, None),
        EncryptionAction::EncryptMegOlmEvent { room_id, event } => encrypt_megolm_event(state, room_id, event),
        EncryptionAction::EncryptOlmEvent { user_id, device_id, event } => encrypt_olm_event(state, user_id, device_id, event),
        EncryptionAction::SetVerificationStrategy { strategy } => {
            let mut next = state.clone();
            next.verification_strategy = strategy;
            (next, Effect::None)
        }
        EncryptionAction::ProcessVerificationEvent { transaction_id, event, now, random } => {
            process_verification_event(state, transaction_id, event, now, random)
        }
        EncryptionAction::PersistAccountPickle { pickle } => (persist_account_pickle(state.clone(), pickle), Effect::None),
        EncryptionAction::PersistOlmSession { user_id, device_id, pickle, sender_key, creation_time } => {
            (persist_olm_session(state.clone(), &user_id, &device_id, pickle, sender_key, creation_time), Effect::None)
        }
        EncryptionAction::PersistOutboundMegOlmSession { room_id, pickle, message_count, creation_time, settings } => (
            persist_outbound_megolm_session(state.clone(), &room_id, pickle, message_count, creation_time, settings),
            Effect::None,
        ),
        EncryptionAction::PersistInboundMegOlmSession { room_id, session_id, pickle, sender_key } => (
            persist_inbound_megolm_session(state.clone(), &room_id, &session_id, pickle, sender_key),
            Effect::None,
        ),
    }
}

fn authed(state: &ClientModel, job: Job) -> ClientModel {
    let job = match &state.access_token {
        Some(token) => job.with_auth(crate::job::AccessToken(token.clone())),
        None => job,
    };
    state.clone().with_job(job)
}

fn olm_session_key(user_id: &str, device_id: &str) -> String {
    format!("{user_id}|{device_id}")
}

fn megolm_inbound_key(room_id: &str, session_id: &str) -> String {
    format!("{room_id}:{session_id}")
}

fn persist_account_pickle(mut state: ClientModel, pickle: String) -> ClientModel {
    let mut crypto = state.crypto.clone().unwrap_or_else(|| json!({}));
    crypto["account_pickle"] = json!(pickle);
    state.crypto = Some(crypto);
    state
}

fn persist_olm_session(
    mut state: ClientModel,
    user_id: &str,
    device_id: &str,
    pickle: String,
    sender_key: String,
    creation_time: Timestamp,
) -> ClientModel {
    let mut crypto = state.crypto.clone().unwrap_or_else(|| json!({}));
    crypto["olm_sessions"][olm_session_key(user_id, device_id)] = json!({
        "pickle": pickle,
        "sender_key": sender_key,
        "creation_time": creation_time.as_millis(),
    });
    state.crypto = Some(crypto);
    state
}

fn persist_outbound_megolm_session(
    mut state: ClientModel,
    room_id: &str,
    pickle: String,
    message_count: u64,
    creation_time: Timestamp,
    settings: JsonValue,
) -> ClientModel {
    let mut crypto = state.crypto.clone().unwrap_or_else(|| json!({}));
    crypto["megolm_outbound"][room_id] = json!({
        "pickle": pickle,
        "message_count": message_count,
        "creation_time": creation_time.as_millis(),
        "settings": settings,
    });
    if let Some(room) = std::sync::Arc::make_mut(&mut state.rooms).get_mut(room_id) {
        room.clear_session_rotation_flag();
    }
    state.crypto = Some(crypto);
    state
}

fn persist_inbound_megolm_session(mut state: ClientModel, room_id: &str, session_id: &str, pickle: String, sender_key: String) -> ClientModel {
    let mut crypto = state.crypto.clone().unwrap_or_else(|| json!({}));
    crypto["megolm_inbound"][megolm_inbound_key(room_id, session_id)] = json!({
        "pickle": pickle,
        "sender_key": sender_key,
    });
    state.crypto = Some(crypto);
    state
}

fn upload_identity_keys(state: &ClientModel) -> (ClientModel, Effect) {
    let Some(keys) = state.crypto.as_ref().and_then(|c| c.get("identity_keys")).cloned() else {
        warn!("UploadIdentityKeys dispatched with no local crypto identity");
        return (state.clone(), Effect::None);
    };
    let job = Job::new("UploadKeys", Method::POST, "/_matrix/client/r0/keys/upload")
        .with_json_body(json!({"device_keys": keys}));
    (authed(state, job), Effect::None)
}

pub(super) fn handle_upload_keys_response(state: &ClientModel, response: crate::job::Response) -> (ClientModel, Effect) {
    if !response.is_success(|_| true) {
        warn!("UploadKeys failed");
    }
    (state.clone(), Effect::None)
}

/// A local device's account pickle, if end-to-end encryption has been
/// bootstrapped for it. `None` means there is no account to generate keys
/// for yet -- mirrors `upload_identity_keys`'s existing warn-and-no-op
/// posture for the same precondition.
#[cfg(feature = "encryption")]
fn account_pickle(state: &ClientModel) -> Option<String> {
    state.crypto.as_ref().and_then(|c| c.get("account_pickle")).and_then(JsonValue::as_str).map(str::to_owned)
}

fn generate_and_upload_otks(state: &ClientModel, count: u32) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let Some(pickle) = account_pickle(state) else {
            warn!("GenerateAndUploadOneTimeKeys dispatched with no local olm account");
            return (state.clone(), Effect::None);
        };
        let Some(user_id) = state.user_id.clone() else {
            return (state.clone(), Effect::None);
        };
        let Some(device_id) = state.device_id.clone() else {
            return (state.clone(), Effect::None);
        };

        let effect = Effect::single(move |caps| {
            Box::pin(async move {
                let Ok(account) = Account::from_pickle(&pickle) else {
                    warn!("stored olm account pickle failed to restore");
                    return vec![];
                };
                account.generate_one_time_keys(count as usize, caps.random());
                let Ok(signed) = account.signed_one_time_keys(&user_id, &device_id) else {
                    warn!("failed to sign freshly generated one-time keys");
                    return vec![];
                };
                account.mark_keys_as_published();

                let job = Job::new("UploadKeys", Method::POST, "/_matrix/client/r0/keys/upload")
                    .with_json_body(json!({"one_time_keys": signed}));
                vec![
                    Action::Encryption(EncryptionAction::PersistAccountPickle { pickle: account.pickle() }),
                    Action::Transport(TransportAction::SubmitJob { job }),
                ]
            })
        });
        (state.clone(), effect)
    }
    #[cfg(not(feature = "encryption"))]
    {
        let _ = count;
        (state.clone(), Effect::None)
    }
}

fn query_keys(state: &ClientModel, users: Vec<String>, initial_sync: bool) -> (ClientModel, Effect) {
    let job = Job::new("QueryKeys", Method::POST, "/_matrix/client/r0/keys/query")
        .with_json_body(json!({"device_keys": users.iter().map(|u| (u.clone(), JsonValue::Array(vec![]))).collect::<serde_json::Map<_, _>>()}))
        .with_extra_data(json!({"initial_sync": initial_sync}));
    (authed(state, job), Effect::None)
}

pub(super) fn handle_query_keys_response(state: &ClientModel, response: crate::job::Response) -> (ClientModel, Effect) {
    if !response.is_success(|_| true) {
        return (state.clone(), Effect::None);
    }
    let Some(device_keys) = response.json().and_then(|b| b.get("device_keys")).cloned() else {
        return (state.clone(), Effect::None);
    };

    let mut next = state.clone();
    let mut crypto = next.crypto.clone().unwrap_or_else(|| json!({}));
    crypto["devices"] = device_keys;
    next.crypto = Some(crypto);
    (next, Effect::None)
}

fn claim_and_send_session_key(state: &ClientModel, room_id: String, devices: Vec<(String, String)>, pending_send: Option<JsonValue>) -> (ClientModel, Effect) {
    if devices.is_empty() {
        return (state.clone(), Effect::None);
    }
    let mut one_time_keys = serde_json::Map::new();
    for (user_id, device_id) in &devices {
        one_time_keys
            .entry(user_id.clone())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()))
            .as_object_mut()
            .expect("just inserted as object")
            .insert(device_id.clone(), json!("signed_curve25519"));
    }
    let mut extra_data = json!({"room_id": room_id, "devices": devices});
    if let Some(pending_send) = pending_send {
        extra_data["pending_send"] = pending_send;
    }
    let job = Job::new("ClaimKeysAndSendSessionKey", Method::POST, "/_matrix/client/r0/keys/claim")
        .with_json_body(json!({"one_time_keys": one_time_keys}))
        .with_extra_data(extra_data);
    (authed(state, job), Effect::None)
}

pub(super) fn handle_claim_keys_response(state: &ClientModel, response: crate::job::Response) -> (ClientModel, Effect) {
    let Some(room_id) = response.extra_data.as_ref().and_then(|d| d.get("room_id")).and_then(JsonValue::as_str).map(str::to_owned) else {
        return (state.clone(), Effect::None);
    };
    if !response.is_success(|_| true) {
        return (
            state.clone().with_trigger(Trigger::SendMessageFailed {
                room_id,
                code: None,
                message: "failed to claim one-time keys".to_owned(),
            }),
            Effect::None,
        );
    }

    #[cfg(feature = "encryption")]
    {
        let Some(account_pickle) = account_pickle(state) else {
            warn!("ClaimKeysAndSendSessionKey completed with no local olm account to establish sessions from");
            return (state.clone(), Effect::None);
        };
        let Some(claimed) = response.json().and_then(|b| b.get("one_time_keys")).cloned() else {
            return (state.clone(), Effect::None);
        };
        let devices: Vec<(String, String)> = response
            .extra_data
            .as_ref()
            .and_then(|d| d.get("devices"))
            .and_then(JsonValue::as_array)
            .map(|devices| {
                devices
                    .iter()
                    .filter_map(|pair| pair.as_array())
                    .filter_map(|pair| Some((pair.first()?.as_str()?.to_owned(), pair.get(1)?.as_str()?.to_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let pending_send = response.extra_data.as_ref().and_then(|d| d.get("pending_send")).cloned();

        let mut claims = Vec::new();
        for (user_id, device_id) in devices {
            let Some(curve25519_key) = device_curve25519_key(state, &user_id, &device_id) else {
                continue;
            };
            let Some(one_time_key) = claimed
                .get(user_id.as_str())
                .and_then(|d| d.get(device_id.as_str()))
                .and_then(JsonValue::as_object)
                .and_then(|keys| keys.values().next())
                .and_then(|key| key.get("key"))
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
            else {
                warn!(%user_id, %device_id, "homeserver had no one-time key left to claim");
                continue;
            };
            claims.push((user_id, device_id, curve25519_key, one_time_key));
        }

        if claims.is_empty() {
            return match pending_send {
                Some(event) => super::reduce(state, Action::Encryption(EncryptionAction::EncryptMegOlmEvent { room_id, event })),
                None => (state.clone(), Effect::None),
            };
        }

        let effect = Effect::single(move |caps| {
            Box::pin(async move {
                let Ok(account) = Account::from_pickle(&account_pickle) else {
                    warn!("stored olm account pickle failed to restore");
                    return vec![];
                };
                let now = caps.now();
                let mut actions = Vec::new();
                for (user_id, device_id, curve25519_key, one_time_key) in claims {
                    match Session::new_outbound(&account, &curve25519_key, &one_time_key, now) {
                        Ok(session) => actions.push(Action::Encryption(EncryptionAction::PersistOlmSession {
                            user_id,
                            device_id,
                            pickle: session.pickle(),
                            sender_key: session.sender_key,
                            creation_time: session.creation_time,
                        })),
                        Err(error) => warn!(%user_id, %device_id, %error, "failed to establish outbound olm session"),
                    }
                }
                if let Some(event) = pending_send {
                    actions.push(Action::Encryption(EncryptionAction::EncryptMegOlmEvent { room_id, event }));
                }
                actions
            })
        });
        (state.clone(), effect)
    }
    #[cfg(not(feature = "encryption"))]
    {
        let _ = room_id;
        (state.clone(), Effect::None)
    }
}

#[cfg(feature = "encryption")]
struct DeviceRecord {
    device_id: String,
    trust: TrustLevel,
}

#[cfg(feature = "encryption")]
impl DeviceTrust for DeviceRecord {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn trust_level(&self) -> TrustLevel {
        self.trust
    }
}

#[cfg(feature = "encryption")]
fn device_trust_level(state: &ClientModel, user_id: &str, device_id: &str) -> TrustLevel {
    state
        .crypto
        .as_ref()
        .and_then(|c| c.get("device_trust"))
        .and_then(|t| t.get(user_id))
        .and_then(|u| u.get(device_id))
        .and_then(JsonValue::as_str)
        .and_then(|label| match label {
            "Blocked" => Some(TrustLevel::Blocked),
            "Unseen" => Some(TrustLevel::Unseen),
            "Seen" => Some(TrustLevel::Seen),
            "Verified" => Some(TrustLevel::Verified),
            _ => None,
        })
        // A device we've queried keys for but never explicitly judged has
        // been "seen", not "verified" -- the default the verification
        // strategies treat as "needs the user's attention", not as trusted.
        .unwrap_or(TrustLevel::Seen)
}

#[cfg(feature = "encryption")]
fn device_curve25519_key(state: &ClientModel, user_id: &str, device_id: &str) -> Option<String> {
    state
        .crypto
        .as_ref()
        .and_then(|c| c.get("devices"))
        .and_then(|d| d.get(user_id))
        .and_then(|u| u.get(device_id))
        .and_then(|d| d.get("keys"))
        .and_then(|k| k.get(format!("curve25519:{device_id}")))
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
}

#[cfg(feature = "encryption")]
fn has_olm_session(state: &ClientModel, user_id: &str, device_id: &str) -> bool {
    state
        .crypto
        .as_ref()
        .and_then(|c| c.get("olm_sessions"))
        .and_then(|s| s.get(olm_session_key(user_id, device_id)))
        .is_some()
}

/// Joined members of a room, per its state map's `m.room.member` entries.
#[cfg(feature = "encryption")]
fn room_member_ids(state: &ClientModel, room_id: &str) -> Vec<String> {
    let Some(room) = state.rooms.get(room_id) else { return Vec::new() };
    room.state()
        .filter(|((event_type, _), _)| event_type == "m.room.member")
        .filter(|(_, event)| event.original().get("content").and_then(|c| c.get("membership")).and_then(JsonValue::as_str) == Some("join"))
        .map(|((_, state_key), _)| state_key.clone())
        .collect()
}

/// Every other device known for this room's joined members, as
/// `(user_id, DeviceRecord)` pairs, excluding this client's own device.
#[cfg(feature = "encryption")]
fn recipient_devices(state: &ClientModel, room_id: &str) -> Vec<(String, DeviceRecord)> {
    let Some(devices) = state.crypto.as_ref().and_then(|c| c.get("devices")).and_then(JsonValue::as_object) else {
        return Vec::new();
    };
    let mut result = Vec::new();
    for user_id in room_member_ids(state, room_id) {
        let Some(user_devices) = devices.get(&user_id).and_then(JsonValue::as_object) else { continue };
        for device_id in user_devices.keys() {
            if Some(user_id.as_str()) == state.user_id.as_deref() && Some(device_id.as_str()) == state.device_id.as_deref() {
                continue;
            }
            result.push((user_id.clone(), DeviceRecord { device_id: device_id.clone(), trust: device_trust_level(state, &user_id, device_id) }));
        }
    }
    result
}

/// Step 3-6 of the send pipeline: pick recipients per
/// [`crate::verification_strategy`], claim sessions for anyone missing one,
/// then rotate or reuse the room's outbound megolm session and encrypt.
pub(super) fn prepare_encrypted_send(state: &ClientModel, room_id: String, event: JsonValue) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let recipients = recipient_devices(state, &room_id);
        let strategy = state.verification_strategy;

        let unknown = verification_strategy::unknown_devices(strategy, recipients.iter().map(|(_, d)| d));
        if !unknown.is_empty() {
            warn!(room_id, count = unknown.len(), "sending to unknown devices the verification strategy would not have auto-trusted");
        }

        let eligible_ids = verification_strategy::devices_to_send(strategy, recipients.iter().map(|(_, d)| d));
        let to_send: Vec<(String, String)> = recipients
            .iter()
            .filter(|(_, d)| eligible_ids.contains(&d.device_id.as_str()))
            .map(|(user_id, d)| (user_id.clone(), d.device_id.clone()))
            .collect();

        let missing_sessions: Vec<(String, String)> =
            to_send.iter().filter(|(user_id, device_id)| !has_olm_session(state, user_id, device_id)).cloned().collect();

        if !missing_sessions.is_empty() {
            return claim_and_send_session_key(state, room_id, missing_sessions, Some(event));
        }

        encrypt_megolm_event(state, room_id, event)
    }
    #[cfg(not(feature = "encryption"))]
    {
        (
            state.clone().with_trigger(Trigger::SendMessageFailed {
                room_id,
                code: Some("M_UNSUPPORTED".to_owned()),
                message: "encryption feature is disabled".to_owned(),
            }),
            Effect::None,
        )
    }
}

#[cfg(feature = "encryption")]
fn load_outbound_session(state: &ClientModel, room_id: &str) -> Option<OutboundGroupSession> {
    let entry = state.crypto.as_ref().and_then(|c| c.get("megolm_outbound"))?.get(room_id)?;
    let pickle = entry.get("pickle")?.as_str()?;
    let message_count = entry.get("message_count")?.as_u64()?;
    let creation_time = Timestamp::from_millis(entry.get("creation_time")?.as_u64()?);
    let settings: EncryptionSettings = serde_json::from_value(entry.get("settings")?.clone()).ok()?;
    OutboundGroupSession::from_pickle(pickle, room_id, message_count, creation_time, settings).ok()
}

fn encrypt_megolm_event(state: &ClientModel, room_id: String, event: JsonValue) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let existing = load_outbound_session(state, &room_id);
        let room_flagged_rotation = state.rooms.get(&room_id).map(|r| r.should_rotate_session_key()).unwrap_or(false);
        let settings = existing
            .as_ref()
            .map(|s| s.settings().clone())
            .or_else(|| {
                state
                    .rooms
                    .get(&room_id)
                    .and_then(|r| r.state_event("m.room.encryption", ""))
                    .map(|e| EncryptionSettings::from_room_encryption_event(e.best_effort_content()))
            })
            .unwrap_or_default();

        let effect = Effect::single(move |caps| {
            Box::pin(async move {
                let now = caps.now();
                let mut session = match existing {
                    Some(session) if !session.expired(now) && !room_flagged_rotation => session,
                    _ => OutboundGroupSession::new(&room_id, settings, now),
                };

                let ciphertext = match session.encrypt("m.room.message", &event) {
                    Ok(ciphertext) => ciphertext,
                    Err(error) => {
                        warn!(room_id, %error, "megolm encryption failed");
                        return vec![Action::SetError(crate::model::ErrorSlot::TextError(error.to_string()))];
                    }
                };

                let persist = Action::Encryption(EncryptionAction::PersistOutboundMegOlmSession {
                    room_id: room_id.clone(),
                    pickle: session.pickle(),
                    message_count: session.message_count(),
                    creation_time: session.creation_time,
                    settings: serde_json::to_value(session.settings()).unwrap_or_default(),
                });

                let job = Job::new("SendMessage", Method::PUT, format!("/_matrix/client/r0/rooms/{room_id}/send/m.room.encrypted"))
                    .with_json_body(ciphertext)
                    .with_extra_data(json!({"room_id": room_id}));
                vec![persist, Action::Transport(TransportAction::SubmitJob { job })]
            })
        });
        (state.clone(), effect)
    }
    #[cfg(not(feature = "encryption"))]
    {
        (
            state.clone().with_trigger(Trigger::SendMessageFailed {
                room_id,
                code: Some("M_UNSUPPORTED".to_owned()),
                message: "encryption feature is disabled".to_owned(),
            }),
            Effect::None,
        )
    }
}

fn encrypt_olm_event(state: &ClientModel, user_id: String, device_id: String, event: JsonValue) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let Some(entry) = state.crypto.as_ref().and_then(|c| c.get("olm_sessions")).and_then(|s| s.get(olm_session_key(&user_id, &device_id))).cloned()
        else {
            warn!(%user_id, %device_id, "EncryptOlmEvent dispatched with no established session");
            return (state.clone(), Effect::None);
        };

        let effect = Effect::single(move |_caps| {
            Box::pin(async move {
                let (Some(pickle), Some(sender_key), Some(creation_time)) = (
                    entry.get("pickle").and_then(JsonValue::as_str).map(str::to_owned),
                    entry.get("sender_key").and_then(JsonValue::as_str).map(str::to_owned),
                    entry.get("creation_time").and_then(JsonValue::as_u64).map(Timestamp::from_millis),
                ) else {
                    return vec![];
                };
                let Ok(mut session) = Session::from_pickle(&pickle, sender_key, creation_time) else {
                    warn!(%user_id, %device_id, "stored olm session pickle failed to restore");
                    return vec![];
                };
                let Ok(ciphertext) = session.encrypt(&event) else {
                    warn!(%user_id, %device_id, "olm encryption failed");
                    return vec![];
                };

                let job = Job::new("SendToDevice", Method::PUT, "/_matrix/client/r0/sendToDevice/m.room.encrypted/0")
                    .with_json_body(json!({"messages": {user_id.clone(): {device_id.clone(): ciphertext}}}));
                vec![
                    Action::Encryption(EncryptionAction::PersistOlmSession {
                        user_id,
                        device_id,
                        pickle: session.pickle(),
                        sender_key: session.sender_key,
                        creation_time: session.creation_time,
                    }),
                    Action::Transport(TransportAction::SubmitJob { job }),
                ]
            })
        });
        (state.clone(), effect)
    }
    #[cfg(not(feature = "encryption"))]
    {
        let _ = (user_id, device_id, event);
        (state.clone(), Effect::None)
    }
}

/// Olm-decrypt and fold the to-device events delivered on a `/sync`
/// response: `m.room.encrypted` olm messages are decrypted in place,
/// `m.room_key` imports a fresh inbound megolm session, and `m.key.verification.*`
/// content is forwarded into the verification tracker via the ordinary
/// action loop (it needs `now`/`random`, which only the runtime can supply).
pub(super) fn handle_to_device_events(state: ClientModel, events: Vec<JsonValue>) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let mut forwarded_verification = Vec::new();
        let mut decrypt_jobs = Vec::new();

        for raw in events {
            let Some(event_type) = raw.get("type").and_then(JsonValue::as_str) else { continue };
            let Some(sender) = raw.get("sender").and_then(JsonValue::as_str).map(str::to_owned) else { continue };

            if event_type == "m.room.encrypted" {
                let Some(content) = raw.get("content").cloned() else { continue };
                decrypt_jobs.push((sender, content));
            } else if event_type.starts_with("m.key.verification.") {
                forwarded_verification.push(raw);
            }
        }

        if decrypt_jobs.is_empty() && forwarded_verification.is_empty() {
            return (state, Effect::None);
        }

        let effect = Effect::single(move |caps| {
            Box::pin(async move {
                let mut actions = Vec::new();
                for event in forwarded_verification {
                    let Some(content) = event.get("content") else { continue };
                    let Some(transaction_id) =
                        content.get("transaction_id").or_else(|| content.get("m.relates_to").and_then(|r| r.get("event_id"))).and_then(JsonValue::as_str)
                    else {
                        continue;
                    };
                    actions.push(Action::Encryption(EncryptionAction::ProcessVerificationEvent {
                        transaction_id: transaction_id.to_owned(),
                        event: event.clone(),
                        now: caps.now(),
                        random: prism_sdk_common::RawBytes::new(vec![0u8]),
                    }));
                }
                actions
            })
        });

        let next = fold_decrypted_to_device(state, decrypt_jobs);
        (next, effect)
    }
    #[cfg(not(feature = "encryption"))]
    {
        for event in &events {
            tracing::debug!(?event, "received to-device event, but the encryption feature is disabled");
        }
        (state, Effect::None)
    }
}

#[cfg(feature = "encryption")]
fn fold_decrypted_to_device(mut state: ClientModel, decrypt_jobs: Vec<(String, JsonValue)>) -> ClientModel {
    let Some(my_device_id) = state.device_id.clone() else { return state };
    let Some(account_pickle) = account_pickle(&state) else {
        warn!("received encrypted to-device events with no local olm account to decrypt them");
        return state;
    };
    let Ok(account) = Account::from_pickle(&account_pickle) else {
        warn!("stored olm account pickle failed to restore");
        return state;
    };

    for (sender, ciphertext) in decrypt_jobs {
        let Some(own_ciphertext) = ciphertext.get(&my_device_id).cloned() else { continue };
        let Some(sender_key) = own_ciphertext.get("sender_key").and_then(JsonValue::as_str).map(str::to_owned) else { continue };
        let Some(message) = own_ciphertext.get("ciphertext").and_then(|c| c.get(account.identity_keys().curve25519())) else { continue };

        let existing = state
            .crypto
            .as_ref()
            .and_then(|c| c.get("olm_sessions"))
            .and_then(|s| s.as_object())
            .and_then(|sessions| {
                sessions
                    .iter()
                    .find(|(_, v)| v.get("sender_key").and_then(JsonValue::as_str) == Some(sender_key.as_str()))
                    .map(|(key, entry)| (key.clone(), entry.clone()))
            });

        let Some((session_key, entry)) = existing else { continue };
        let Some((session_user_id, session_device_id)) = session_key.split_once('|') else { continue };
        let (session_user_id, session_device_id) = (session_user_id.to_owned(), session_device_id.to_owned());

        let (Some(pickle), Some(creation_time)) = (
            entry.get("pickle").and_then(JsonValue::as_str).map(str::to_owned),
            entry.get("creation_time").and_then(JsonValue::as_u64).map(Timestamp::from_millis),
        ) else {
            continue;
        };
        let Ok(mut session) = Session::from_pickle(&pickle, sender_key.clone(), creation_time) else { continue };
        let Ok(plaintext) = session.decrypt(message) else { continue };
        let _ = &sender;
        state = persist_olm_session(state, &session_user_id, &session_device_id, session.pickle(), session.sender_key, session.creation_time);

        if plaintext.get("type").and_then(JsonValue::as_str) == Some("m.room_key") {
            state = import_room_key(state, &sender, &sender_key, plaintext.get("content").cloned().unwrap_or_default());
        }
    }
    state
}

#[cfg(feature = "encryption")]
fn import_room_key(state: ClientModel, _sender: &str, sender_key: &str, content: JsonValue) -> ClientModel {
    let (Some(room_id), Some(session_key)) =
        (content.get("room_id").and_then(JsonValue::as_str), content.get("session_key").and_then(JsonValue::as_str))
    else {
        return state;
    };
    let Ok(session) = InboundGroupSession::new(room_id, sender_key, session_key) else {
        warn!(room_id, "failed to import inbound megolm session");
        return state;
    };
    persist_inbound_megolm_session(state, room_id, &session.session_id(), session.pickle(), sender_key.to_owned())
}

/// Scenario 6 from spec §8: a request event outside the `[-10m, +5m]` clock
/// skew window is cancelled with no `DisplayCodes` trigger.
fn process_verification_event(
    state: &ClientModel,
    transaction_id: String,
    event: JsonValue,
    now: prism_sdk_common::Timestamp,
    random: prism_sdk_common::RawBytes,
) -> (ClientModel, Effect) {
    #[cfg(feature = "encryption")]
    {
        let tracker = state.crypto.as_ref().and_then(|c| c.get("verification")).cloned().unwrap_or_else(|| json!({}));
        let source = prism_sdk_common::FixedRandomSource::new(if random.is_empty() {
            vec![0u8]
        } else {
            random.into_vec()
        });
        let outcome = prism_sdk_crypto::verification::process(&tracker, &transaction_id, &event, now, &source);

        let mut next = state.clone();
        let mut crypto = next.crypto.clone().unwrap_or_else(|| json!({}));
        crypto["verification"] = outcome.tracker;
        next.crypto = Some(crypto);
        for event in outcome.events {
            next = next.with_trigger(to_trigger(&transaction_id, event));
        }
        (next, Effect::None)
    }
    #[cfg(not(feature = "encryption"))]
    {
        let _ = (event, now, random);
        (
            state.clone().with_trigger(Trigger::VerificationCancelled { transaction_id, code: "m.unsupported".to_owned() }),
            Effect::None,
        )
    }
}

/// Translate the crypto crate's verification-process outcomes into this
/// crate's own [`Trigger`] variants, so `prism-sdk-crypto` never needs to
/// know about `prism-sdk-base`'s types (the dependency only runs the other
/// way).
#[cfg(feature = "encryption")]
fn to_trigger(transaction_id: &str, event: prism_sdk_crypto::verification::VerificationEvent) -> Trigger {
    use prism_sdk_crypto::verification::VerificationEvent;

    match event {
        VerificationEvent::DisplayCodes { emoji, decimal } => {
            Trigger::DisplayCodes { transaction_id: transaction_id.to_owned(), emoji, decimal }
        }
        VerificationEvent::Cancelled { code } => Trigger::VerificationCancelled { transaction_id: transaction_id.to_owned(), code },
        VerificationEvent::Done => Trigger::VerificationDone { transaction_id: transaction_id.to_owned() },
    }
}

pub(super) fn apply_device_list_delta(mut state: ClientModel, device_lists: &DeviceLists) -> ClientModel {
    let mut crypto = state.crypto.clone().unwrap_or_else(|| json!({}));
    let mut outdated: Vec<String> = crypto
        .get("outdated_users")
        .and_then(JsonValue::as_array)
        .map(|users| users.iter().filter_map(JsonValue::as_str).map(str::to_owned).collect())
        .unwrap_or_default();

    for user in &device_lists.changed {
        if !outdated.contains(user) {
            outdated.push(user.clone());
        }
    }
    if !device_lists.left.is_empty() {
        outdated.retain(|u| !device_lists.left.contains(u));
        if let Some(devices) = crypto.get_mut("devices").and_then(JsonValue::as_object_mut) {
            for user in &device_lists.left {
                devices.remove(user);
            }
        }
    }

    crypto["outdated_users"] = JsonValue::Array(outdated.into_iter().map(JsonValue::String).collect());
    state.crypto = Some(crypto);
    state
}

/// If the signed-curve25519 one-time-key count drops below half of the olm
/// account's configured maximum, queue replenishment (spec §4.2).
pub(super) fn maybe_replenish_one_time_keys(state: ClientModel, counts: &JsonValue) -> (ClientModel, Effect) {
    const OLM_MAX_ONE_TIME_KEYS: u64 = 50;

    let signed_count = counts.get("signed_curve25519").and_then(JsonValue::as_u64).unwrap_or(0);
    if signed_count >= OLM_MAX_ONE_TIME_KEYS / 2 {
        return (state, Effect::None);
    }
    let to_generate = OLM_MAX_ONE_TIME_KEYS - signed_count;
    super::reduce(&state, Action::Encryption(EncryptionAction::GenerateAndUploadOneTimeKeys { count: to_generate as u32 }))
}
