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

//! Media upload/download. Decoding bytes is out of scope (spec §1
//! Non-goals: "media decoding"); this layer only shapes the jobs.

use http::Method;

use crate::action::ContentAction;
use crate::effect::Effect;
use crate::job::{AccessToken, Job, JobBody};
use crate::model::ClientModel;

pub(super) fn reduce(state: &ClientModel, action: ContentAction) -> (ClientModel, Effect) {
    match action {
        ContentAction::UploadContent { bytes, content_type, filename } => {
            let mut job = Job::new("UploadContent", Method::POST, "/_matrix/media/r0/upload");
            job.body = JobBody::Bytes(bytes);
            if let Some(name) = filename {
                job.query.push(("filename".to_owned(), name));
            }
            job.query.push(("content_type".to_owned(), content_type.to_string()));
            (authed(state, job), Effect::None)
        }
        ContentAction::GetContent { mxc_uri } => {
            let (server, media_id) = split_mxc(&mxc_uri);
            let job = Job::new("GetContent", Method::GET, format!("/_matrix/media/r0/download/{server}/{media_id}"));
            (authed(state, job), Effect::None)
        }
        ContentAction::GetContentThumbnail { mxc_uri, width, height } => {
            let (server, media_id) = split_mxc(&mxc_uri);
            let mut job = Job::new("GetContentThumbnail", Method::GET, format!("/_matrix/media/r0/thumbnail/{server}/{media_id}"));
            job.query.push(("width".to_owned(), width.to_string()));
            job.query.push(("height".to_owned(), height.to_string()));
            (authed(state, job), Effect::None)
        }
    }
}

fn authed(state: &ClientModel, job: Job) -> ClientModel {
    let job = match &state.access_token {
        Some(token) => job.with_auth(AccessToken(token.clone())),
        None => job,
    };
    state.clone().with_job(job)
}

/// Split an `mxc://server/media_id` URI into its two path components.
fn split_mxc(mxc_uri: &str) -> (&str, &str) {
    let rest = mxc_uri.strip_prefix("mxc://").unwrap_or(mxc_uri);
    rest.split_once('/').unwrap_or((rest, ""))
}

#[cfg(test)]
mod test {
    use super::split_mxc;

    #[test]
    fn splits_server_and_media_id() {
        assert_eq!(split_mxc("mxc://example.org/abc123"), ("example.org", "abc123"));
    }
}
