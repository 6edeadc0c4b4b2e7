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

//! The four-enum error split this crate keeps: one for olm (1:1)
//! operations, one for megolm (group) operations, one for malformed
//! encrypted-event shapes, and one for canonical-JSON signature failures.

use olm_rs::errors::{OlmGroupSessionError, OlmSessionError};
use serde_json::Error as SerdeError;
use thiserror::Error;

pub type OlmResult<T> = Result<T, OlmError>;
pub type MegolmResult<T> = Result<T, MegolmError>;
pub type SignatureResult<T> = Result<T, SignatureError>;

/// A failure during a device-to-device (olm) cryptographic operation.
#[derive(Error, Debug)]
pub enum OlmError {
    #[error(transparent)]
    EventError(#[from] EventError),

    #[error(transparent)]
    JsonError(#[from] SerdeError),

    #[error("olm session operation failed: {0}")]
    OlmSession(#[from] OlmSessionError),

    #[error("no olm session exists with sender key {0}")]
    MissingSession(String),

    #[error("olm message from sender key {0} was replayed")]
    ReplayedMessage(String),
}

/// A failure during a group (megolm) encryption or decryption operation.
#[derive(Error, Debug)]
pub enum MegolmError {
    #[error(transparent)]
    EventError(#[from] EventError),

    #[error(transparent)]
    JsonError(#[from] SerdeError),

    #[error("no megolm session exists to decrypt this event")]
    MissingSession,

    #[error("megolm group session operation failed: {0}")]
    OlmGroupSession(#[from] OlmGroupSessionError),

    #[error(
        "message at ratchet index {index} was already decrypted from event {prior_event_id}, \
         this is a different event: {event_id}"
    )]
    ReplayedIndex { index: u32, prior_event_id: String, event_id: String },

    #[error("the room where this group session should be shared is not encrypted")]
    EncryptionNotEnabled,
}

/// A malformed encrypted event payload.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("unsupported olm message type")]
    UnsupportedOlmType,

    #[error("unsupported encryption algorithm")]
    UnsupportedAlgorithm,

    #[error("the provided JSON value isn't an object")]
    NotAnObject,

    #[error("the encrypted event has no ciphertext for our device")]
    MissingCiphertext,

    #[error("the encrypted event is missing required field {0}")]
    MissingField(String),
}

/// A failure checking or creating a canonical-JSON ed25519 signature.
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("the signature used an unsupported algorithm")]
    UnsupportedAlgorithm,

    #[error("the signing key is missing from the signed object")]
    MissingSigningKey,

    #[error("the provided JSON value isn't an object")]
    NotAnObject,

    #[error("the provided JSON object has no signatures field")]
    NoSignatureFound,

    #[error("the signature didn't match the provided key")]
    VerificationError,

    #[error(transparent)]
    JsonError(#[from] SerdeError),
}
