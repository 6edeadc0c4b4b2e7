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

//! Policy selecting which devices are acceptable megolm-key recipients
//! without interactive verification.
//!
//! Ported 1:1 from `verification-strategy.cpp`'s `devicesToSend` /
//! `unknownDevices` in the original libkazv source: the predicates on trust
//! level are identical, just expressed over a Rust iterator instead of a
//! `zug` transducer pipeline.

use serde::{Deserialize, Serialize};

/// A recipient device's trust level, ordered `Blocked < Unseen < Seen <
/// Verified` so that `>=Verified` and `>Blocked` comparisons read the same
/// way they do in the original C++.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Explicitly distrusted; never an eligible recipient.
    Blocked,
    /// Never seen before.
    Unseen,
    /// Seen (keys downloaded) but not interactively verified.
    Seen,
    /// Interactively verified via SAS or cross-signing.
    Verified,
}

/// Policy selecting which devices receive room keys without interactive
/// confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStrategy {
    /// Send to every non-blocked device.
    TrustAll,
    /// Send only to verified devices.
    VerifyAll,
    /// Per user: if no device of theirs is verified, behave like
    /// `TrustAll` for that user; otherwise behave like `VerifyAll`.
    TrustIfNeverVerified,
}

impl Default for VerificationStrategy {
    fn default() -> Self {
        VerificationStrategy::TrustIfNeverVerified
    }
}

/// A minimal view of one user's devices: device id plus trust level. Kept
/// generic over the caller's device id representation so this module has no
/// dependency on `prism-sdk-crypto`'s concrete device type.
pub trait DeviceTrust {
    /// The device's id.
    fn device_id(&self) -> &str;
    /// The device's current trust level.
    fn trust_level(&self) -> TrustLevel;
}

/// Devices a megolm send should target for one user, given `strategy` and
/// that user's device list.
pub fn devices_to_send<'a, D: DeviceTrust>(
    strategy: VerificationStrategy,
    devices: impl Iterator<Item = &'a D> + Clone,
) -> Vec<&'a str>
where
    D: 'a,
{
    match effective_strategy(strategy, devices.clone()) {
        VerificationStrategy::TrustAll => devices
            .filter(|d| d.trust_level() > TrustLevel::Blocked)
            .map(DeviceTrust::device_id)
            .collect(),
        _ => devices
            .filter(|d| d.trust_level() >= TrustLevel::Verified)
            .map(DeviceTrust::device_id)
            .collect(),
    }
}

/// Devices that are neither trusted recipients nor safely ignorable under
/// `strategy` -- i.e. devices the caller should report as "unknown" so the
/// host can warn the user before sending.
pub fn unknown_devices<'a, D: DeviceTrust>(
    strategy: VerificationStrategy,
    devices: impl Iterator<Item = &'a D> + Clone,
) -> Vec<&'a str>
where
    D: 'a,
{
    match effective_strategy(strategy, devices.clone()) {
        VerificationStrategy::TrustAll => Vec::new(),
        _ => devices
            .filter(|d| d.trust_level() == TrustLevel::Unseen)
            .map(DeviceTrust::device_id)
            .collect(),
    }
}

/// Resolve `TrustIfNeverVerified` into the concrete strategy it behaves as
/// for this particular device set: `TrustAll` if no device is `Verified`,
/// `VerifyAll` otherwise. `TrustAll`/`VerifyAll` pass through unchanged.
fn effective_strategy<'a, D: DeviceTrust>(
    strategy: VerificationStrategy,
    devices: impl Iterator<Item = &'a D>,
) -> VerificationStrategy
where
    D: 'a,
{
    match strategy {
        VerificationStrategy::TrustIfNeverVerified => {
            let any_verified = devices.into_iter().any(|d| d.trust_level() >= TrustLevel::Verified);
            if any_verified {
                VerificationStrategy::VerifyAll
            } else {
                VerificationStrategy::TrustAll
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::{devices_to_send, unknown_devices, DeviceTrust, TrustLevel, VerificationStrategy};

    struct Dev {
        id: &'static str,
        trust: TrustLevel,
    }

    impl DeviceTrust for Dev {
        fn device_id(&self) -> &str {
            self.id
        }

        fn trust_level(&self) -> TrustLevel {
            self.trust
        }
    }

    fn sample() -> Vec<Dev> {
        vec![
            Dev { id: "foo", trust: TrustLevel::Unseen },
            Dev { id: "bar", trust: TrustLevel::Seen },
            Dev { id: "baz", trust: TrustLevel::Blocked },
            Dev { id: "doge", trust: TrustLevel::Verified },
        ]
    }

    #[test]
    fn trust_all_includes_everything_but_blocked() {
        let devices = sample();
        let mut sent = devices_to_send(VerificationStrategy::TrustAll, devices.iter());
        sent.sort_unstable();
        assert_eq!(sent, vec!["bar", "doge", "foo"]);
        assert!(unknown_devices(VerificationStrategy::TrustAll, devices.iter()).is_empty());
    }

    #[test]
    fn verify_all_includes_only_verified() {
        let devices = sample();
        assert_eq!(devices_to_send(VerificationStrategy::VerifyAll, devices.iter()), vec!["doge"]);
        assert_eq!(unknown_devices(VerificationStrategy::VerifyAll, devices.iter()), vec!["foo"]);
    }

    #[test]
    fn trust_if_never_verified_switches_per_user() {
        let devices = sample();
        // This user has a verified device ("doge"), so it behaves like VerifyAll.
        assert_eq!(
            devices_to_send(VerificationStrategy::TrustIfNeverVerified, devices.iter()),
            vec!["doge"]
        );

        let never_verified =
            vec![Dev { id: "a", trust: TrustLevel::Unseen }, Dev { id: "b", trust: TrustLevel::Seen }];
        let mut sent =
            devices_to_send(VerificationStrategy::TrustIfNeverVerified, never_verified.iter());
        sent.sort_unstable();
        assert_eq!(sent, vec!["a", "b"], "no verified device anywhere -> behaves like TrustAll");
    }
}
