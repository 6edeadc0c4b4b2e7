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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as carried on every Matrix event's
/// `origin_server_ts` and used for megolm rotation and SAS clock-skew
/// checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Build a timestamp from a raw millisecond count.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// The millisecond count since the Unix epoch.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Duration elapsed between `self` and a later `now`, saturating at
    /// zero if `now` is before `self` (clock went backwards, or `self` is in
    /// the future).
    pub fn elapsed_since(&self, now: Timestamp) -> Duration {
        Duration::from_millis(now.0.saturating_sub(self.0))
    }

    /// Whether `self` falls within `[now - past, now + future]`.
    ///
    /// Used by the SAS verification tracker to reject a `request` event
    /// whose declared timestamp is implausibly old or ahead of the local
    /// clock (spec: older than 10 minutes in the past, or more than 5
    /// minutes in the future).
    pub fn is_within(&self, now: Timestamp, past: Duration, future: Duration) -> bool {
        let past_bound = now.0.saturating_sub(past.as_millis() as u64);
        let future_bound = now.0.saturating_add(future.as_millis() as u64);
        self.0 >= past_bound && self.0 <= future_bound
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Timestamp;

    #[test]
    fn within_window() {
        let now = Timestamp::from_millis(1_000_000);
        let ten_min_ago = Timestamp::from_millis(1_000_000 - Duration::from_secs(600).as_millis() as u64);
        assert!(ten_min_ago.is_within(now, Duration::from_secs(600), Duration::from_secs(300)));

        let just_past_window =
            Timestamp::from_millis(1_000_000 - Duration::from_secs(601).as_millis() as u64);
        assert!(!just_past_window.is_within(now, Duration::from_secs(600), Duration::from_secs(300)));
    }

    #[test]
    fn future_window() {
        let now = Timestamp::from_millis(1_000_000);
        let soon = Timestamp::from_millis(1_000_000 + Duration::from_secs(299).as_millis() as u64);
        assert!(soon.is_within(now, Duration::from_secs(600), Duration::from_secs(300)));

        let too_far = Timestamp::from_millis(1_000_000 + Duration::from_secs(301).as_millis() as u64);
        assert!(!too_far.is_within(now, Duration::from_secs(600), Duration::from_secs(300)));
    }
}
