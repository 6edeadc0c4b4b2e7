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

//! The public façade: a cheaply-cloneable handle around the background
//! engine, in the same spirit as the teacher's `matrix_sdk::Client` wrapping
//! an `Arc`-shared inner client.

use prism_sdk_base::action::{LifecycleAction, RoomAction};
use prism_sdk_base::model::{ClientModel, Trigger};
use prism_sdk_common::JsonValue;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::ClientConfig;
use crate::runtime::TokioCapabilities;
use crate::sync::{self, EngineHandle};

/// A running client session: owns the background engine task and exposes
/// the handful of operations spec §2 names as the public surface (log in,
/// send, create/join/leave rooms, read the current room list, subscribe to
/// triggers).
#[derive(Clone)]
pub struct Client {
    engine: std::sync::Arc<EngineHandle>,
    homeserver_url: url::Url,
}

impl Client {
    /// Start a new client session, spawning its background engine.
    ///
    /// Returns the client plus the trigger stream the caller should drain
    /// (e.g. on its own spawned task) to learn about completed logins,
    /// incoming timeline events, and verification progress.
    pub fn new(config: ClientConfig) -> (Self, UnboundedReceiver<Trigger>) {
        let (trigger_tx, trigger_rx) = tokio::sync::mpsc::unbounded_channel();
        let capabilities = TokioCapabilities::new(config.homeserver_url.clone(), trigger_tx);
        let (engine, engine_triggers) = sync::spawn(capabilities);

        // Bridge the engine's own trigger stream (emitted by effects via
        // `RuntimeCapabilities::emit_trigger`) and the one drained straight
        // off `ClientModel::triggers` after each `reduce` call into a single
        // stream for callers, since both are "things that happened" from
        // the caller's point of view.
        let (merged_tx, merged_rx) = tokio::sync::mpsc::unbounded_channel();
        forward(engine_triggers, merged_tx.clone());
        forward(trigger_rx, merged_tx);

        let homeserver_url = config.homeserver_url.clone();
        (Self { engine: std::sync::Arc::new(engine), homeserver_url }, merged_rx)
    }

    /// Authenticate with a username and password.
    pub fn login(&self, user: impl Into<String>, password: impl Into<String>, device_name: Option<String>) {
        self.engine.dispatch(LifecycleAction::Login {
            server: self.homeserver_url.to_string(),
            user: user.into(),
            password: password.into(),
            device_name,
        });
    }

    /// Discard the current session.
    pub fn logout(&self) {
        self.engine.dispatch(LifecycleAction::Logout);
    }

    /// Kick off (or resume) the `/sync` long-poll loop.
    pub fn start_syncing(&self) {
        self.engine.dispatch(LifecycleAction::Sync);
    }

    /// Send a message event to a room, encrypting it first if the room is
    /// encrypted.
    pub fn send_message(&self, room_id: impl Into<String>, event: JsonValue) {
        self.engine.dispatch(RoomAction::SendMessage { room_id: room_id.into(), event });
    }

    /// Create a room from a raw `/createRoom` request body.
    pub fn create_room(&self, request: JsonValue) {
        self.engine.dispatch(RoomAction::CreateRoom { request });
    }

    /// Join a room by its canonical id.
    pub fn join_room(&self, room_id: impl Into<String>) {
        self.engine.dispatch(RoomAction::JoinRoomById { room_id: room_id.into() });
    }

    /// Join a room by one of its aliases.
    pub fn join_room_by_alias(&self, alias: impl Into<String>) {
        self.engine.dispatch(RoomAction::JoinRoomByAlias { alias: alias.into() });
    }

    /// Leave a joined room.
    pub fn leave_room(&self, room_id: impl Into<String>) {
        self.engine.dispatch(RoomAction::LeaveRoom { room_id: room_id.into() });
    }

    /// A snapshot of the model as of the last processed action. Cheap: the
    /// underlying `ClientModel` shares its large substructures via `Arc`.
    pub fn state(&self) -> ClientModel {
        self.engine.snapshot()
    }

    /// Whether this client currently holds a usable access token.
    pub fn is_logged_in(&self) -> bool {
        self.state().is_logged_in()
    }
}

fn forward(mut rx: UnboundedReceiver<Trigger>, tx: tokio::sync::mpsc::UnboundedSender<Trigger>) {
    tokio::spawn(async move {
        while let Some(trigger) = rx.recv().await {
            if tx.send(trigger).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn a_fresh_client_is_logged_out() {
        let config = ClientConfig::new("https://example.org".parse().unwrap());
        let (client, _triggers) = Client::new(config);
        assert!(!client.is_logged_in());
    }
}
