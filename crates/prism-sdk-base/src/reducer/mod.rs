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

//! The pure reducer: `reduce(state, action) -> (state', effect)`.
//!
//! `reduce` itself never fails. Every sub-reducer is a plain function from
//! `(&ClientModel, SomeAction)` to `(ClientModel, Effect)`; unrecognized or
//! malformed input is mapped to a [`crate::model::Trigger`], never to an
//! error return, per the "reducer failures are impossible" propagation
//! policy.

mod content;
mod encryption;
mod lifecycle;
mod room;
mod transport;

use crate::action::Action;
use crate::effect::Effect;
use crate::model::ClientModel;

/// Apply one action to `state`, producing the successor state and any
/// deferred effect the runtime should drive.
pub fn reduce(state: &ClientModel, action: Action) -> (ClientModel, Effect) {
    match action {
        Action::Transport(action) => transport::reduce(state, action),
        Action::Lifecycle(action) => lifecycle::reduce(state, action),
        Action::Room(action) => room::reduce(state, action),
        Action::Content(action) => content::reduce(state, action),
        Action::Encryption(action) => encryption::reduce(state, action),
        Action::SetError(error) => (state.clone().with_error(error), Effect::None),
    }
}

#[cfg(test)]
mod test {
    use super::reduce;
    use crate::action::{Action, LifecycleAction};
    use crate::model::ClientModel;

    #[test]
    fn reduce_is_total_for_every_action_variant() {
        // A smoke test, not exhaustive: every top-level variant must
        // produce a successor state without panicking.
        let state = ClientModel::new();
        let (next, _effect) = reduce(&state, Action::Lifecycle(LifecycleAction::Sync));
        assert!(!next.is_logged_in());
    }
}
