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

//! Job submission and response routing.
//!
//! `ProcessResponse` dispatches on the job id string, synthesizing the
//! typed handling for that endpoint. An unknown job id emits an
//! `UnrecognizedResponse` trigger and is otherwise a no-op -- it never
//! fails `reduce`.

use tracing::warn;

use crate::action::TransportAction;
use crate::effect::Effect;
use crate::job::Response;
use crate::model::{ClientModel, Trigger};

use super::{encryption, lifecycle, room};

pub(super) fn reduce(state: &ClientModel, action: TransportAction) -> (ClientModel, Effect) {
    match action {
        TransportAction::SubmitJob { job } | TransportAction::ResubmitJob { job } => {
            (state.clone().with_job(job), Effect::None)
        }
        TransportAction::ProcessResponse { job_id, response } => process_response(state, job_id, response),
    }
}

fn process_response(state: &ClientModel, job_id: &'static str, response: Response) -> (ClientModel, Effect) {
    match job_id {
        "Login" => lifecycle::handle_login_response(state, response),
        "Sync" => lifecycle::handle_sync_response(state, response),
        "CreateRoom" => room::handle_create_room_response(state, response),
        "SendMessage" => room::handle_send_message_response(state, response),
        "JoinRoom" => room::handle_join_room_response(state, response),
        "GetRoomStates" => room::handle_get_room_states_response(state, response),
        "InviteToRoom" => room::handle_invite_response(state, response),
        "LeaveRoom" => room::handle_leave_room_response(state, response),
        "ForgetRoom" => room::handle_forget_room_response(state, response),
        "PaginateTimeline" => room::handle_paginate_timeline_response(state, response),
        "SendStateEvent" => room::handle_send_state_event_response(state, response),
        "GetStateEvent" => room::handle_get_state_event_response(state, response),
        "SetTyping" => room::handle_set_typing_response(state, response),
        "PostReceipt" => room::handle_post_receipt_response(state, response),
        "SetReadMarker" => room::handle_set_read_marker_response(state, response),
        "LoadUserInfo" => lifecycle::handle_load_user_info_response(state, response),
        "QueryKeys" => encryption::handle_query_keys_response(state, response),
        "ClaimKeysAndSendSessionKey" => encryption::handle_claim_keys_response(state, response),
        "UploadKeys" => encryption::handle_upload_keys_response(state, response),
        unknown => {
            warn!(job_id = unknown, "unrecognized job id in ProcessResponse");
            (state.clone().with_trigger(Trigger::UnrecognizedResponse { job_id: unknown.to_owned() }), Effect::None)
        }
    }
}
