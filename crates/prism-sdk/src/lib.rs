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

//! A high level federated end-to-end-encrypted chat client SDK.
//!
//! This crate is the async, I/O-performing shell around [`prism_sdk_base`]'s
//! pure reducer: it owns the background engine ([`sync`]) that drives
//! [`prism_sdk_base::effect::Effect`]s against a real `reqwest` client and a
//! real clock, dispatches [`prism_sdk_base::job::Job`]s honoring their queue
//! ordering ([`job::JobDispatcher`]), and exposes the result as a small
//! handle-style façade ([`Client`]).
//!
//! ```no_run
//! # async fn run() -> prism_sdk::Result<()> {
//! use prism_sdk::{Client, ClientConfig};
//!
//! let config = ClientConfig::new("https://example.org".parse()?);
//! let (client, mut triggers) = Client::new(config);
//! client.login("alice", "hunter2", Some("prism-sdk".into()));
//! client.start_syncing();
//!
//! while let Some(trigger) = triggers.recv().await {
//!     tracing::info!(?trigger, "client event");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod job;
mod runtime;
mod sync;

pub use client::Client;
pub use config::{ClientConfig, EncryptionLimits};
pub use error::{ClientError, Result};
pub use job::JobDispatcher;
pub use runtime::TokioCapabilities;

pub use prism_sdk_base::model::{ClientModel, Trigger};
