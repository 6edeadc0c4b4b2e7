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

//! Per-device key records and the signature check gating whether a
//! `/keys/query` response entry is trusted enough to store at all.

use std::collections::BTreeMap;

use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::signing::verify_json;

/// A single device's uploaded key bundle, as returned by `/keys/query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeyInfo {
    pub user_id: String,
    pub device_id: String,
    pub algorithms: Vec<String>,
    pub keys: BTreeMap<String, String>,
    pub signatures: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub unsigned: JsonValue,
}

impl DeviceKeyInfo {
    /// The device's Curve25519 identity key, if present under the expected
    /// `curve25519:{device_id}` key id.
    pub fn curve25519_key(&self) -> Option<&str> {
        self.keys.get(&format!("curve25519:{}", self.device_id)).map(String::as_str)
    }

    /// The device's Ed25519 signing key, if present.
    pub fn ed25519_key(&self) -> Option<&str> {
        self.keys.get(&format!("ed25519:{}", self.device_id)).map(String::as_str)
    }

    /// Verify this device's self-signature (its own Ed25519 key signing its
    /// own key bundle). A device with no self-signature, or a signature
    /// that doesn't verify, is never stored: spec supplement grounded on
    /// the teacher's `SessionCreationError::InvalidSignature`.
    pub fn has_valid_self_signature(&self, raw: &JsonValue) -> bool {
        let Some(ed25519_key) = self.ed25519_key() else {
            warn!(user_id = %self.user_id, device_id = %self.device_id, "device key bundle has no ed25519 key");
            return false;
        };
        let Some(signature) = self
            .signatures
            .get(&self.user_id)
            .and_then(|by_user| by_user.get(&format!("ed25519:{}", self.device_id)))
        else {
            warn!(user_id = %self.user_id, device_id = %self.device_id, "device key bundle is unsigned");
            return false;
        };

        match verify_json(ed25519_key, signature, raw) {
            Ok(()) => true,
            Err(error) => {
                warn!(user_id = %self.user_id, device_id = %self.device_id, %error, "device key signature is invalid");
                false
            }
        }
    }
}

/// Parse and signature-check the `device_keys` object of a `/keys/query`
/// response, dropping entries that fail to parse or fail self-signature
/// verification.
pub fn filter_trusted_devices(device_keys: &JsonValue) -> BTreeMap<String, Vec<DeviceKeyInfo>> {
    let mut result = BTreeMap::new();
    let Some(by_user) = device_keys.as_object() else {
        return result;
    };

    for (user_id, devices) in by_user {
        let Some(devices) = devices.as_object() else { continue };
        let mut trusted = Vec::new();
        for (device_id, raw) in devices {
            let Ok(info) = serde_json::from_value::<DeviceKeyInfo>(raw.clone()) else {
                warn!(%user_id, %device_id, "malformed device key bundle, dropping");
                continue;
            };
            if info.user_id != *user_id || info.device_id != *device_id {
                warn!(%user_id, %device_id, "device key bundle user/device id mismatch, dropping");
                continue;
            }
            if info.has_valid_self_signature(raw) {
                trusted.push(info);
            }
        }
        if !trusted.is_empty() {
            result.insert(user_id.clone(), trusted);
        }
    }

    result
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::filter_trusted_devices;

    #[test]
    fn drops_unsigned_devices() {
        let device_keys = json!({
            "@alice:example.org": {
                "DEVICE1": {
                    "user_id": "@alice:example.org",
                    "device_id": "DEVICE1",
                    "algorithms": ["m.olm.v1.curve25519-aes-sha2"],
                    "keys": {"curve25519:DEVICE1": "abc", "ed25519:DEVICE1": "def"},
                    "signatures": {},
                },
            },
        });

        let trusted = filter_trusted_devices(&device_keys);
        assert!(trusted.is_empty());
    }
}
