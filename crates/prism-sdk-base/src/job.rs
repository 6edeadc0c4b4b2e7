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

//! The value representation of one outbound request (a "job") and its
//! eventual response.
//!
//! A job is a plain value, not a trait object: the reducer builds jobs and
//! stashes them on [`crate::model::ClientModel`] without knowing anything
//! about HTTP. The `prism-sdk` crate's job dispatcher is what turns a `Job`
//! into an actual `reqwest` call and turns the resulting bytes back into a
//! [`Response`].

use std::path::PathBuf;

use http::{HeaderMap, Method};
use mime::Mime;
use prism_sdk_common::JsonValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The body of an outbound job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JobBody {
    /// No body (most `GET`/`DELETE` requests).
    Empty,
    /// An opaque byte body (e.g. an already-encrypted media upload).
    Bytes(Vec<u8>),
    /// A JSON body.
    Json(JsonValue),
    /// A file to stream from disk, with its declared content type.
    File {
        /// Path to the file on disk.
        path: PathBuf,
        /// Declared MIME type of the file's contents.
        #[serde(with = "mime_serde")]
        mime: Mime,
    },
}

mod mime_serde {
    use std::str::FromStr;

    use mime::Mime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mime: &Mime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(mime.as_ref())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mime, D::Error> {
        let s = String::deserialize(deserializer)?;
        Mime::from_str(&s).map_err(D::Error::custom)
    }
}

/// Identifies a queue that orders a family of jobs relative to one another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub Uuid);

/// What should happen to a queue's still-pending jobs when one of them
/// fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuePolicy {
    /// Keep submitting the rest of the queue regardless of this failure.
    AlwaysContinue,
    /// Drop every job still queued behind this one, reporting each as
    /// cancelled.
    CancelFutureIfFailed,
}

/// A bearer token attached to a job's `Authorization` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(pub String);

/// One outbound request, as a plain value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// The stable id of the endpoint this job targets, e.g. `"Sync"` or
    /// `"CreateRoom"`. Used to route the eventual [`Response`] back to the
    /// handler that issued the job.
    pub job_id: &'static str,
    /// HTTP method.
    #[serde(with = "method_serde")]
    pub method: Method,
    /// Path relative to the homeserver base URL.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Extra headers beyond `Authorization` and whatever the body implies.
    #[serde(with = "header_serde")]
    pub headers: HeaderMap,
    /// The request body.
    pub body: JobBody,
    /// Caller-supplied data that should be threaded back into the
    /// [`Response`]'s `extra_data`, used to correlate a response with the
    /// action that triggered it (e.g. which room a `SendMessage` targeted).
    pub extra_data: Option<JsonValue>,
    /// If set, this job participates in ordered queue execution.
    pub queue: Option<(QueueId, QueuePolicy)>,
    /// Bearer token to attach, if the endpoint requires authentication.
    pub auth: Option<AccessToken>,
}

mod method_serde {
    use std::str::FromStr;

    use http::Method;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
        let s = String::deserialize(deserializer)?;
        Method::from_str(&s).map_err(D::Error::custom)
    }
}

mod header_serde {
    use http::{HeaderMap, HeaderName, HeaderValue};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_owned()))
            .collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HeaderMap, D::Error> {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            let name = HeaderName::try_from(k).map_err(D::Error::custom)?;
            let value = HeaderValue::try_from(v).map_err(D::Error::custom)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl Job {
    /// Start building a job for the given stable job id and path, with an
    /// empty body and no queue/auth.
    pub fn new(job_id: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            job_id,
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: JobBody::Empty,
            extra_data: None,
            queue: None,
            auth: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_json_body(mut self, body: JsonValue) -> Self {
        self.body = JobBody::Json(body);
        self
    }

    /// Attach caller correlation data.
    pub fn with_extra_data(mut self, data: JsonValue) -> Self {
        self.extra_data = Some(data);
        self
    }

    /// Place the job on an ordered queue.
    pub fn with_queue(mut self, queue: QueueId, policy: QueuePolicy) -> Self {
        self.queue = Some((queue, policy));
        self
    }

    /// Attach a bearer token.
    pub fn with_auth(mut self, token: AccessToken) -> Self {
        self.auth = Some(token);
        self
    }
}

/// The body of a [`Response`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ResponseBody {
    /// No body, or a body that was discarded.
    Empty,
    /// Opaque bytes (media downloads).
    Bytes(Vec<u8>),
    /// A parsed JSON body.
    Json(JsonValue),
}

/// The result of executing a [`Job`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: ResponseBody,
    /// Response headers.
    #[serde(with = "header_serde")]
    pub headers: HeaderMap,
    /// The `extra_data` carried over from the originating [`Job`].
    pub extra_data: Option<JsonValue>,
}

impl Response {
    /// A response is successful iff its status is below 400 *and* the given
    /// endpoint-specific predicate over the body holds (e.g. "has a
    /// `next_batch` field", "content-type is `application/json`").
    pub fn is_success(&self, predicate: impl FnOnce(&ResponseBody) -> bool) -> bool {
        self.status < 400 && predicate(&self.body)
    }

    /// Convenience accessor for a JSON body, if any.
    pub fn json(&self) -> Option<&JsonValue> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use http::Method;
    use serde_json::json;

    use super::{Job, Response, ResponseBody};

    #[test]
    fn success_requires_status_and_predicate() {
        let ok = Response { status: 200, body: ResponseBody::Json(json!({"next_batch": "s1"})), headers: Default::default(), extra_data: None };
        assert!(ok.is_success(|b| matches!(b, ResponseBody::Json(v) if v.get("next_batch").is_some())));

        let bad_status = Response { status: 500, ..ok.clone() };
        assert!(!bad_status.is_success(|_| true));

        let missing_field = Response { status: 200, body: ResponseBody::Json(json!({})), headers: Default::default(), extra_data: None };
        assert!(!missing_field.is_success(|b| matches!(b, ResponseBody::Json(v) if v.get("next_batch").is_some())));
    }

    #[test]
    fn job_builder_roundtrips_through_json() {
        let job = Job::new("Sync", Method::GET, "/_matrix/client/r0/sync")
            .with_extra_data(json!({"since": "s1"}));
        let encoded = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back.job_id, "Sync");
        assert_eq!(back.extra_data, Some(json!({"since": "s1"})));
    }
}
