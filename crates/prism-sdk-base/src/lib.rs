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

//! The pure core of the client engine.
//!
//! This crate owns the event/room/room-list value types, the aggregate
//! [`ClientModel`], the [`Action`] algebra, and the [`reduce`] function that
//! turns `(state, action)` pairs into `(state', Effect)` pairs. Nothing in
//! here touches a network socket, a clock, or a random number generator --
//! those capabilities are passed into an [`Effect`] by the runtime that
//! lives in the `prism-sdk` crate.

#![deny(missing_debug_implementations, unused_import_braces, unused_qualifications)]

#[cfg(feature = "encryption")]
pub use prism_sdk_crypto as crypto;

pub mod action;
pub mod effect;
pub mod error;
pub mod event;
pub mod job;
pub mod model;
pub mod reducer;
pub mod rooms;
pub mod sync_types;
pub mod verification_strategy;

pub use action::Action;
pub use effect::{Effect, EffectFn, RuntimeCapabilities};
pub use error::{Error, Result};
pub use event::Event;
pub use job::{Job, JobBody, QueueId, QueuePolicy, Response, ResponseBody};
pub use model::{ClientModel, ErrorSlot, Trigger};
pub use reducer::reduce;
pub use rooms::{Membership, Room, RoomList};
