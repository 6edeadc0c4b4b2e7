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

//! The error type this crate's own async surface can fail with, composed
//! with [`prism_sdk_base::Error`] the way the teacher's `matrix-sdk::Error`
//! wraps `matrix-sdk-base::Error`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// A failure in the transport/runtime layer, as opposed to a pure state
/// transition (which never fails -- see [`prism_sdk_base::reducer::reduce`]).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid homeserver URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to (de)serialize a job body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Base(#[from] prism_sdk_base::Error),

    #[error("the client's background engine has already shut down")]
    EngineStopped,

    #[error("the client isn't logged in yet")]
    NotLoggedIn,
}
