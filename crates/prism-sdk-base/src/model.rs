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

//! The aggregate root state, plus the error and trigger side-channels that
//! ride alongside every transition.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::rooms::RoomList;
use crate::verification_strategy::VerificationStrategy;

/// The model's error slot: a tagged union set by `SetError`, cleared by
/// whichever action implies recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ErrorSlot {
    /// No error outstanding.
    NoError,
    /// A structured (JSON) error, typically a homeserver error body.
    JsonError(JsonValue),
    /// A free-text error with no structured payload.
    TextError(String),
}

impl Default for ErrorSlot {
    fn default() -> Self {
        ErrorSlot::NoError
    }
}

/// An observable outcome of the last `reduce` transition, queued for the
/// runtime to drain and forward to the host application's event emitter.
///
/// Triggers are not part of model equality: they describe what *happened*,
/// not what the state *is*.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// `CreateRoom` succeeded; the room id assigned by the server.
    CreateRoomSuccessful {
        /// The newly created room's id.
        room_id: String,
    },
    /// A `SendMessage` job failed.
    SendMessageFailed {
        /// The room the message was addressed to.
        room_id: String,
        /// The homeserver's `errcode`, if the failure carried one.
        code: Option<String>,
        /// A human-readable description of the failure.
        message: String,
    },
    /// A new timeline event arrived in a joined room via sync.
    ReceivingRoomTimelineEvent {
        /// The room the event landed in.
        room_id: String,
        /// The event's id.
        event_id: String,
    },
    /// A job response was routed by a job id with no registered handler.
    UnrecognizedResponse {
        /// The job id the response named.
        job_id: String,
    },
    /// A verification process derived a short authentication string that
    /// should be shown to the user for comparison.
    DisplayCodes {
        /// The verification transaction this SAS run belongs to.
        transaction_id: String,
        /// The emoji representation, one `(glyph, description)` pair per
        /// segment.
        emoji: Vec<(String, String)>,
        /// The decimal representation, three groups per the SAS spec.
        decimal: (u16, u16, u16),
    },
    /// A verification process reached `Cancelled`.
    VerificationCancelled {
        /// The transaction that was cancelled.
        transaction_id: String,
        /// The machine-readable cancellation code.
        code: String,
    },
    /// A verification process reached `Done`.
    VerificationDone {
        /// The transaction that completed.
        transaction_id: String,
    },
    /// Login succeeded and the model now holds a usable access token.
    LoggedIn {
        /// The fully-qualified user id the homeserver assigned.
        user_id: String,
        /// The device id the homeserver assigned or accepted.
        device_id: String,
    },
    /// The client was logged out, deliberately or by a rejected token.
    LoggedOut,
    /// A `Login` job failed; the model never picked up an access token.
    LoginFailed {
        /// The homeserver's `errcode`, if the failure carried one.
        code: Option<String>,
        /// A human-readable description of the failure.
        message: String,
    },
}

/// The aggregate root state threaded through every `reduce` call.
///
/// Ownership is by value: every substructure belongs to exactly one
/// `ClientModel`, and transitions produce a new `ClientModel` rather than
/// mutating one in place. Large substructures (`rooms`, `account_data`,
/// `pending_jobs`) are wrapped in [`Arc`] so that cloning a model to produce
/// its successor is cheap when a transition only touches a few fields --
/// the same cheap-clone-by-sharing posture the teacher crate's `BaseClient`
/// takes with its internal store handle, generalized here to the model
/// itself since this engine has no separate persistence layer to delegate
/// to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientModel {
    /// The homeserver's base URL, once known (set by `Login`).
    pub server_base_url: Option<String>,
    /// This client's fully-qualified user id.
    pub user_id: Option<String>,
    /// This client's device id.
    pub device_id: Option<String>,
    /// The current access token, if logged in.
    pub access_token: Option<String>,
    /// The most recent sync token (`next_batch`), if any sync has
    /// completed.
    pub sync_token: Option<String>,
    /// Every room this client has ever observed.
    pub rooms: Arc<RoomList>,
    /// Global (non-room) account data, keyed by event type.
    pub account_data: Arc<HashMap<String, JsonValue>>,
    /// Presence state, keyed by user id.
    pub presence: Arc<HashMap<String, JsonValue>>,
    /// The crypto identity and sessions for this device, present once
    /// end-to-end encryption has been bootstrapped. Opaque at this layer;
    /// concretely a `prism_sdk_crypto::CryptoState` behind the
    /// `encryption` feature, represented here as JSON so `prism-sdk-base`
    /// need not depend on the crypto crate's types directly in its public
    /// field list.
    pub crypto: Option<JsonValue>,
    /// Pending outbound job descriptors, in submission order.
    pub pending_jobs: Arc<VecDeque<Job>>,
    /// Outcomes of the last transition, drained by the runtime.
    pub triggers: Arc<Vec<Trigger>>,
    /// The policy governing which devices receive megolm keys without
    /// interactive verification.
    pub verification_strategy: VerificationStrategy,
    /// The current error slot.
    pub error: ErrorSlot,
}

impl ClientModel {
    /// A fresh, logged-out model with no rooms, jobs, or triggers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this model holds a usable access token.
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some()
    }

    /// Append one trigger, returning the model with it queued.
    ///
    /// Used by sub-reducers building up the successor state; since
    /// `triggers` is `Arc`-wrapped this clones the vector only when more
    /// than one reference exists, which in practice is never during a
    /// single `reduce` call's sub-reducer chain.
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        Arc::make_mut(&mut self.triggers).push(trigger);
        self
    }

    /// Return a model identical to `self` but with its trigger buffer
    /// drained, for the runtime to call once it has collected them.
    pub fn drain_triggers(mut self) -> (Self, Vec<Trigger>) {
        let drained = Arc::make_mut(&mut self.triggers).drain(..).collect();
        (self, drained)
    }

    /// Enqueue a job, returning the model with it appended to
    /// `pending_jobs`.
    pub fn with_job(mut self, job: Job) -> Self {
        Arc::make_mut(&mut self.pending_jobs).push_back(job);
        self
    }

    /// Pop the oldest pending job, if any, alongside the resulting model.
    pub fn pop_job(mut self) -> (Self, Option<Job>) {
        let job = Arc::make_mut(&mut self.pending_jobs).pop_front();
        (self, job)
    }

    /// Set the error slot.
    pub fn with_error(mut self, error: ErrorSlot) -> Self {
        self.error = error;
        self
    }
}

#[cfg(test)]
mod test {
    use super::{ClientModel, ErrorSlot, Trigger};

    #[test]
    fn fresh_model_is_logged_out() {
        let model = ClientModel::new();
        assert!(!model.is_logged_in());
        assert_eq!(model.error, ErrorSlot::NoError);
        assert!(model.rooms.is_empty());
    }

    #[test]
    fn triggers_accumulate_and_drain() {
        let model = ClientModel::new()
            .with_trigger(Trigger::LoggedOut)
            .with_trigger(Trigger::UnrecognizedResponse { job_id: "Bogus".into() });
        assert_eq!(model.triggers.len(), 2);

        let (model, drained) = model.drain_triggers();
        assert_eq!(drained.len(), 2);
        assert!(model.triggers.is_empty());
    }

    #[test]
    fn jobs_are_fifo() {
        use crate::job::Job;
        use http::Method;

        let model = ClientModel::new()
            .with_job(Job::new("A", Method::GET, "/a"))
            .with_job(Job::new("B", Method::GET, "/b"));
        let (model, first) = model.pop_job();
        assert_eq!(first.unwrap().job_id, "A");
        let (_model, second) = model.pop_job();
        assert_eq!(second.unwrap().job_id, "B");
    }
}
