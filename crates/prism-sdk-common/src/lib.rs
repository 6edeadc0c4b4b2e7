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

//! Value primitives shared by every layer of `prism-sdk`.
//!
//! This crate has no knowledge of rooms, events, or cryptography. It exists
//! so that `prism-sdk-base` and `prism-sdk-crypto` can agree on a timestamp
//! type, a canonical JSON encoder, and a source of randomness without either
//! depending on the other.

#![deny(missing_debug_implementations, unused_import_braces, unused_qualifications)]

mod bytes;
mod json;
mod random;
mod time;

pub use bytes::RawBytes;
pub use json::{to_canonical_json, CanonicalJsonError, JsonValue};
pub use random::{FixedRandomSource, RandomSource, SystemRandomSource};
pub use time::Timestamp;
