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

//! Client configuration, mirroring the teacher's `matrix-sdk` builder-style
//! config (`ClientConfig` in the teacher's `lib.rs`) but covering the
//! options spec §6 enumerates: megolm rotation limits, the sync interval,
//! and the default verification strategy.

use std::time::Duration;

use prism_sdk_base::verification_strategy::VerificationStrategy;
use url::Url;

/// How long a megolm session may be reused before this client rotates it,
/// regardless of what the room's `m.room.encryption` event requests
/// (spec §6: these are ceilings, never floors the room can raise).
#[derive(Clone, Debug)]
pub struct EncryptionLimits {
    pub megolm_time_limit: Duration,
    pub megolm_message_limit: u64,
}

impl Default for EncryptionLimits {
    fn default() -> Self {
        Self { megolm_time_limit: Duration::from_secs(604_800), megolm_message_limit: 100 }
    }
}

/// Builder-style configuration for a [`crate::Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) homeserver_url: Url,
    pub(crate) device_display_name: Option<String>,
    pub(crate) sync_interval: Duration,
    pub(crate) encryption_limits: EncryptionLimits,
    pub(crate) verification_strategy: VerificationStrategy,
}

/// Matches `prism_sdk_base::reducer`'s own internal default; the reducer's
/// self-rescheduling `Sync` effect always sleeps this long between polls
/// regardless of what this config says, so this value is only a starting
/// point for callers who read it back for display purposes.
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(2000);

impl ClientConfig {
    /// Start a config pointed at `homeserver_url`.
    pub fn new(homeserver_url: Url) -> Self {
        Self {
            homeserver_url,
            device_display_name: None,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            encryption_limits: EncryptionLimits::default(),
            verification_strategy: VerificationStrategy::default(),
        }
    }

    pub fn device_display_name(mut self, name: impl Into<String>) -> Self {
        self.device_display_name = Some(name.into());
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn encryption_limits(mut self, limits: EncryptionLimits) -> Self {
        self.encryption_limits = limits;
        self
    }

    pub fn verification_strategy(mut self, strategy: VerificationStrategy) -> Self {
        self.verification_strategy = strategy;
        self
    }
}

#[cfg(test)]
mod test {
    use super::ClientConfig;

    #[test]
    fn builder_overrides_defaults() {
        let config = ClientConfig::new("https://example.org".parse().unwrap())
            .device_display_name("integration-test");
        assert_eq!(config.device_display_name.as_deref(), Some("integration-test"));
    }
}
