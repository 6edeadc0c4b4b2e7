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

//! The local olm account: identity keys and one-time keys.
//!
//! Spec §4.5 asks for a caller-supplied random buffer of a fixed size
//! (`constructRandomSize()`, `genOneTimeKeysRandomSize(n)`) for every
//! stateful operation. `olm_rs`'s safe wrapper draws its own entropy from
//! the OS CSPRNG internally and has no hook to inject an external buffer,
//! so the `&dyn RandomSource` parameters here exist for API symmetry with
//! that contract and to make the entropy requirement visible at the call
//! site, but the actual bytes are not threaded into libolm -- a deviation
//! recorded in `DESIGN.md`.

use std::sync::Arc;

use olm_rs::account::{IdentityKeys, OlmAccount, OneTimeKeys};
use prism_sdk_common::{JsonValue, RandomSource};
use serde_json::json;

use crate::error::SignatureError;
use crate::signing::sign_json;

/// A local olm account: one per logged-in device.
#[derive(Clone)]
pub struct Account {
    inner: Arc<OlmAccount>,
}

impl Account {
    /// Create a fresh account. `_random` documents the entropy this step
    /// consumes (`constructRandomSize()`); see the module note above.
    pub fn new(_random: &dyn RandomSource) -> Self {
        Self { inner: Arc::new(OlmAccount::new()) }
    }

    /// Restore an account from a pickle produced by [`Account::pickle`].
    pub fn from_pickle(pickle: &str) -> Result<Self, olm_rs::errors::OlmAccountError> {
        let inner = OlmAccount::unpickle(pickle.to_owned(), olm_rs::PicklingMode::Unencrypted)?;
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Serialize this account's state for storage.
    pub fn pickle(&self) -> String {
        self.inner.pickle(olm_rs::PicklingMode::Unencrypted)
    }

    pub fn identity_keys(&self) -> IdentityKeys {
        self.inner.parsed_identity_keys()
    }

    /// Access the underlying `olm_rs` account for session establishment.
    pub(crate) fn raw(&self) -> &OlmAccount {
        &self.inner
    }

    /// Sign a JSON value (canonicalized, `signatures`/`unsigned` stripped)
    /// with this account's ed25519 key.
    pub fn sign_json(&self, value: &JsonValue) -> Result<String, SignatureError> {
        sign_json(&self.inner, value)
    }

    /// Build this device's signed `device_keys` upload body (spec §4.5:
    /// "every uploaded key bundle is canonicalized ... and signed").
    pub fn device_keys_body(&self, user_id: &str, device_id: &str) -> Result<JsonValue, SignatureError> {
        let keys = self.identity_keys();
        let mut body = json!({
            "user_id": user_id,
            "device_id": device_id,
            "algorithms": ["m.olm.v1.curve25519-aes-sha2", "m.megolm.v1.aes-sha2"],
            "keys": {
                format!("curve25519:{device_id}"): keys.curve25519(),
                format!("ed25519:{device_id}"): keys.ed25519(),
            },
        });
        let signature = self.sign_json(&body)?;
        body["signatures"] = json!({user_id: {format!("ed25519:{device_id}"): signature}});
        Ok(body)
    }

    /// Generate `count` one-time keys. `_random` documents the entropy
    /// consumed (`genOneTimeKeysRandomSize(count)`); see the module note.
    pub fn generate_one_time_keys(&self, count: usize, _random: &dyn RandomSource) -> OneTimeKeys {
        self.inner.generate_one_time_keys(count);
        self.inner.parsed_one_time_keys()
    }

    /// Mark this account's currently published one-time keys as used up,
    /// so the next `generate_one_time_keys` call produces a fresh batch.
    pub fn mark_keys_as_published(&self) {
        self.inner.mark_keys_as_published();
    }

    /// Sign and format this account's currently unpublished one-time keys
    /// for a `/keys/upload` body.
    pub fn signed_one_time_keys(&self, user_id: &str, device_id: &str) -> Result<JsonValue, SignatureError> {
        let otks = self.inner.parsed_one_time_keys();
        let mut signed = serde_json::Map::new();
        for (key_id, key) in otks.curve25519() {
            let mut body = json!({"key": key});
            let signature = self.sign_json(&body)?;
            body["signatures"] = json!({user_id: {format!("ed25519:{device_id}"): signature}});
            signed.insert(format!("signed_curve25519:{key_id}"), body);
        }
        Ok(JsonValue::Object(signed))
    }
}

#[cfg(test)]
mod test {
    use prism_sdk_common::SystemRandomSource;

    use super::Account;

    #[test]
    fn device_keys_body_is_self_signed() {
        let account = Account::new(&SystemRandomSource);
        let body = account.device_keys_body("@alice:example.org", "DEVICE1").expect("signing should succeed");
        assert!(body.get("signatures").is_some());
        assert_eq!(body["user_id"], "@alice:example.org");
    }

    #[test]
    fn pickle_round_trips() {
        let account = Account::new(&SystemRandomSource);
        let pickle = account.pickle();
        let restored = Account::from_pickle(&pickle).expect("pickle should restore");
        assert_eq!(account.identity_keys().ed25519(), restored.identity_keys().ed25519());
    }
}
