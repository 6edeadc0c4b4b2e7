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

//! Canonical-JSON signing and verification (spec §4.5: "every uploaded key
//! bundle is canonicalized ... and signed with ed25519 before upload").
//!
//! This wraps `olm_rs`'s own ed25519 signing/verification rather than
//! hand-rolling one, the same way the teacher leans on `olm_rs::PkSigning`/
//! `OlmUtility::ed25519_verify`; canonicalization itself is
//! [`prism_sdk_common::to_canonical_json`], shared with SAS commitment
//! hashing.

use olm_rs::account::OlmAccount;
use olm_rs::utility::OlmUtility;
use prism_sdk_common::{to_canonical_json, JsonValue};

use crate::error::{SignatureError, SignatureResult};

/// Sign `value` (after stripping `signatures`/`unsigned`, per the Matrix
/// signing algorithm) with `account`'s ed25519 key, returning the base64
/// signature.
pub fn sign_json(account: &OlmAccount, value: &JsonValue) -> SignatureResult<String> {
    let stripped = strip_signing_fields(value)?;
    let canonical = to_canonical_json(&stripped).map_err(|_| SignatureError::NotAnObject)?;
    Ok(account.sign(&canonical))
}

/// Verify that `signature` over `value`'s canonical form was produced by
/// `ed25519_public_key`.
pub fn verify_json(ed25519_public_key: &str, signature: &str, value: &JsonValue) -> SignatureResult<()> {
    let stripped = strip_signing_fields(value)?;
    let canonical = to_canonical_json(&stripped).map_err(|_| SignatureError::NotAnObject)?;
    let utility = OlmUtility::new();
    utility
        .ed25519_verify(ed25519_public_key, &canonical, signature)
        .map_err(|_| SignatureError::VerificationError)
}

fn strip_signing_fields(value: &JsonValue) -> SignatureResult<JsonValue> {
    let object = value.as_object().ok_or(SignatureError::NotAnObject)?;
    let mut stripped = object.clone();
    stripped.remove("signatures");
    stripped.remove("unsigned");
    Ok(JsonValue::Object(stripped))
}

#[cfg(test)]
mod test {
    use olm_rs::account::OlmAccount;
    use serde_json::json;

    use super::{sign_json, verify_json};

    #[test]
    fn round_trips_a_signature() {
        let account = OlmAccount::new();
        let keys = account.parsed_identity_keys();
        let body = json!({"user_id": "@alice:example.org", "device_id": "ABCDEF"});

        let signature = sign_json(&account, &body).expect("signing should succeed");
        verify_json(keys.ed25519(), &signature, &body).expect("signature should verify");
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let account = OlmAccount::new();
        let keys = account.parsed_identity_keys();
        let body = json!({"user_id": "@alice:example.org"});
        let signature = sign_json(&account, &body).expect("signing should succeed");

        let tampered = json!({"user_id": "@mallory:example.org"});
        assert!(verify_json(keys.ed25519(), &signature, &tampered).is_err());
    }
}
