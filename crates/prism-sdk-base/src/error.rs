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

use thiserror::Error;

/// Errors that can occur while building or inspecting value types owned by
/// this crate. Deliberately small: the reducer itself never fails (spec
/// invariant -- `reduce` is total), so this enum only covers construction of
/// the value types that feed into it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// An event's JSON body didn't contain a string `event_id` field.
    #[error("event JSON is missing a string `event_id` field")]
    MissingEventId,

    /// A state event's JSON body didn't contain a `type` field.
    #[error("event JSON is missing a `type` field")]
    MissingEventType,

    /// Attempted to close a timeline gap that doesn't exist.
    #[error("no timeline gap recorded at event {0}")]
    NoSuchGap(String),
}

/// Convenience alias for this crate's fallible constructors.
pub type Result<T> = std::result::Result<T, Error>;
