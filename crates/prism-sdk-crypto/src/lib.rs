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

//! Olm/megolm encryption, device-list trust tracking, and SAS interactive
//! verification.
//!
//! This crate is deliberately independent of `prism-sdk-base`: it knows
//! nothing of rooms, the reducer, or jobs, and every public type here is
//! plain data or a thin wrapper around `olm-rs`. `prism-sdk-base` is the
//! one that reaches down into this crate (behind its `encryption` feature),
//! never the other way around.

pub mod device_list;
pub mod error;
pub mod olm;
pub mod signing;
pub mod verification;

pub use device_list::{filter_trusted_devices, DeviceKeyInfo};
pub use error::{EventError, MegolmError, MegolmResult, OlmError, OlmResult, SignatureError, SignatureResult};
pub use olm::{Account, EncryptionSettings, InboundGroupSession, OutboundGroupSession, Session};
