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

//! The concrete [`RuntimeCapabilities`] implementation: the one place this
//! crate touches a socket, a clock, or a random number generator.
//!
//! Grounded on the teacher's choice of `reqwest` for transport
//! (`matrix-sdk/Cargo.toml`'s `[dependencies.reqwest]`) and `tokio`'s `time`
//! feature for `setTimeout` (`tokio::time::sleep`), with randomness routed
//! through `prism_sdk_common::SystemRandomSource` rather than a bare
//! `rand::thread_rng()` call, so every crypto effect's entropy source is the
//! same trait object the pure crates already take.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prism_sdk_base::effect::{JobFuture, RuntimeCapabilities, SleepFuture};
use prism_sdk_base::job::{Job, JobBody, Response, ResponseBody};
use prism_sdk_base::model::Trigger;
use prism_sdk_common::{RandomSource, SystemRandomSource, Timestamp};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};
use url::Url;

/// Drives every [`prism_sdk_base::Effect`] against the real world: HTTP via
/// `reqwest`, timers via `tokio::time`, entropy via the OS CSPRNG, and
/// triggers forwarded to whoever is listening on `triggers`.
pub struct TokioCapabilities {
    http: reqwest::Client,
    base_url: Url,
    random: SystemRandomSource,
    triggers: UnboundedSender<Trigger>,
}

impl TokioCapabilities {
    pub fn new(base_url: Url, triggers: UnboundedSender<Trigger>) -> Self {
        Self { http: reqwest::Client::new(), base_url, random: SystemRandomSource, triggers }
    }

    fn build_request(&self, job: &Job) -> reqwest::RequestBuilder {
        let mut url = self.base_url.clone();
        url.set_path(&job.path);
        for (key, value) in &job.query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let mut request = self.http.request(job.method.clone(), url);
        for (name, value) in job.headers.iter() {
            request = request.header(name, value);
        }
        if let Some(auth) = &job.auth {
            request = request.bearer_auth(&auth.0);
        }
        request = match &job.body {
            JobBody::Empty => request,
            JobBody::Bytes(bytes) => request.body(bytes.clone()),
            JobBody::Json(value) => request.json(value),
            JobBody::File { path, mime } => {
                request.header(reqwest::header::CONTENT_TYPE, mime.as_ref()).body(reqwest::Body::from(
                    std::fs::read(path).unwrap_or_default(),
                ))
            }
        };
        request
    }
}

impl RuntimeCapabilities for TokioCapabilities {
    fn submit_job(&self, job: Job) -> JobFuture {
        let request = self.build_request(&job);
        let job_id = job.job_id;
        let extra_data = job.extra_data.clone();
        Box::pin(async move {
            trace!(job_id, "submitting job");
            let outcome = request.send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers = response.headers().clone();
                    let bytes = response.bytes().await.unwrap_or_default();
                    let body = if bytes.is_empty() {
                        ResponseBody::Empty
                    } else {
                        match serde_json::from_slice(&bytes) {
                            Ok(value) => ResponseBody::Json(value),
                            Err(_) => ResponseBody::Bytes(bytes.to_vec()),
                        }
                    };
                    Response { status, body, headers, extra_data }
                }
                Err(error) => {
                    warn!(job_id, %error, "job transport failure");
                    Response { status: 0, body: ResponseBody::Empty, headers: Default::default(), extra_data }
                }
            }
        })
    }

    fn random(&self) -> &dyn RandomSource {
        &self.random
    }

    fn now(&self) -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Timestamp::from_millis(millis as u64)
    }

    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }

    fn emit_trigger(&self, trigger: Trigger) {
        let _ = self.triggers.send(trigger);
    }
}
