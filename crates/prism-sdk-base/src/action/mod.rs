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

//! The action algebra, grouped into per-concern submodules the same way the
//! original engine splits `actions/sync.cpp`, `actions/membership.cpp`,
//! `actions/states.hpp`, and `actions/encryption.hpp`.

pub mod content;
pub mod encryption;
pub mod lifecycle;
pub mod room;
pub mod transport;

pub use content::ContentAction;
pub use encryption::EncryptionAction;
pub use lifecycle::LifecycleAction;
pub use room::RoomAction;
pub use transport::TransportAction;

use serde::{Deserialize, Serialize};

use crate::model::ErrorSlot;

/// The top-level action algebra dispatched into [`crate::reducer::reduce`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Action {
    /// A transport-concern action (job submission/response routing).
    Transport(TransportAction),
    /// A lifecycle-concern action (login, logout, sync).
    Lifecycle(LifecycleAction),
    /// A room-concern action (create/join/leave/send/paginate/...).
    Room(RoomAction),
    /// A content-concern action (media upload/download).
    Content(ContentAction),
    /// An encryption-concern action (keys, claims, verification strategy).
    Encryption(EncryptionAction),
    /// Set the model's error slot directly.
    SetError(ErrorSlot),
}

impl From<TransportAction> for Action {
    fn from(action: TransportAction) -> Self {
        Action::Transport(action)
    }
}

impl From<LifecycleAction> for Action {
    fn from(action: LifecycleAction) -> Self {
        Action::Lifecycle(action)
    }
}

impl From<RoomAction> for Action {
    fn from(action: RoomAction) -> Self {
        Action::Room(action)
    }
}

impl From<ContentAction> for Action {
    fn from(action: ContentAction) -> Self {
        Action::Content(action)
    }
}

impl From<EncryptionAction> for Action {
    fn from(action: EncryptionAction) -> Self {
        Action::Encryption(action)
    }
}
