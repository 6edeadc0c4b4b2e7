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

use std::fmt;
use std::sync::Mutex;

use rand::RngCore;

/// A source of uniformly random bytes.
///
/// Every stateful crypto operation in `prism-sdk-crypto` takes a
/// caller-supplied `&dyn RandomSource` sized by a `…_random_size()` query
/// (spec: `constructRandomSize()`, `genOneTimeKeysRandomSize(n)`,
/// `encryptOlmRandomSize(key)`, `createOutboundSessionRandomSize()`,
/// `rotateMegOlmSessionRandomSize()`) rather than reaching for a thread-local
/// RNG, so that the amount of entropy an operation consumes is always
/// visible at the call site and replayable in tests.
pub trait RandomSource: fmt::Debug + Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);

    /// Return a freshly allocated buffer of `len` random bytes.
    fn bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf
    }
}

/// Production [`RandomSource`] backed by the operating system CSPRNG via
/// `rand::rngs::OsRng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandomSource;

impl RandomSource for SystemRandomSource {
    fn fill(&self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// Test double that replays a fixed byte sequence, wrapping around if more
/// bytes are requested than were supplied. Used to make olm/megolm test
/// vectors deterministic without threading a seeded RNG through every call
/// site.
pub struct FixedRandomSource {
    bytes: Vec<u8>,
    cursor: Mutex<usize>,
}

impl FixedRandomSource {
    /// Build a source that replays `bytes`, wrapping around once exhausted.
    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(!bytes.is_empty(), "FixedRandomSource needs at least one byte to replay");
        Self { bytes, cursor: Mutex::new(0) }
    }

    /// Build a source that always returns the given repeated byte.
    pub fn repeating(byte: u8) -> Self {
        Self::new(vec![byte])
    }
}

impl fmt::Debug for FixedRandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedRandomSource").field("len", &self.bytes.len()).finish()
    }
}

impl RandomSource for FixedRandomSource {
    fn fill(&self, buf: &mut [u8]) {
        let mut cursor = self.cursor.lock().expect("FixedRandomSource mutex poisoned");
        for slot in buf.iter_mut() {
            *slot = self.bytes[*cursor % self.bytes.len()];
            *cursor += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::{FixedRandomSource, RandomSource, SystemRandomSource};

    #[test]
    fn fixed_source_wraps_around() {
        let source = FixedRandomSource::new(vec![1, 2, 3]);
        assert_eq!(source.bytes(7), vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn system_source_fills_requested_length() {
        let source = SystemRandomSource;
        assert_eq!(source.bytes(32).len(), 32);
    }
}
