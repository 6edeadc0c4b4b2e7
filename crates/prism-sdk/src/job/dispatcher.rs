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

//! Enforces [`QueuePolicy`] ordering over jobs popped off
//! [`prism_sdk_base::model::ClientModel::pending_jobs`].
//!
//! `prism-sdk-base`'s reducer only ever appends jobs to a flat FIFO queue;
//! it has no notion of "wait for the job ahead of this one on the same
//! queue to finish first". That discipline belongs to the runtime, per
//! spec §4.3, and lives here rather than in the pure reducer.

use std::collections::{HashMap, VecDeque};

use prism_sdk_base::job::{Job, QueueId, QueuePolicy, Response, ResponseBody};
use tracing::warn;

/// Tracks, per [`QueueId`], whether a job from that queue is currently in
/// flight and what should run next once it completes.
#[derive(Default)]
pub struct JobDispatcher {
    in_flight: HashMap<QueueId, QueuePolicy>,
    backlog: HashMap<QueueId, VecDeque<Job>>,
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a job popped from `pending_jobs`. Returns it immediately if it
    /// has no queue, or if it's the first job seen for its queue; otherwise
    /// it is buffered until the job ahead of it on that queue completes.
    pub fn admit(&mut self, job: Job) -> Option<Job> {
        let Some((queue_id, policy)) = job.queue else {
            return Some(job);
        };
        if self.in_flight.contains_key(&queue_id) {
            self.backlog.entry(queue_id).or_default().push_back(job);
            None
        } else {
            self.in_flight.insert(queue_id, policy);
            Some(job)
        }
    }

    /// Report that the in-flight job for `queue_id` finished. Returns the
    /// next job on that queue that should be submitted now (if any), plus
    /// any jobs that were cancelled as a result of this completion.
    ///
    /// A failed job on a [`QueuePolicy::CancelFutureIfFailed`] queue drops
    /// the rest of that queue's backlog; those dropped jobs are returned so
    /// the caller can synthesize cancellation responses for them, rather
    /// than letting them vanish silently.
    pub fn complete(&mut self, queue_id: QueueId, success: bool) -> (Option<Job>, Vec<Job>) {
        let Some(policy) = self.in_flight.remove(&queue_id) else {
            return (None, Vec::new());
        };

        if !success && policy == QueuePolicy::CancelFutureIfFailed {
            let dropped: Vec<Job> = self.backlog.remove(&queue_id).map(Vec::from).unwrap_or_default();
            if !dropped.is_empty() {
                warn!(queue_count = dropped.len(), "dropping queued jobs after a failure");
            }
            return (None, dropped);
        }

        let next = self.backlog.get_mut(&queue_id).and_then(VecDeque::pop_front);
        if let Some(job) = &next {
            self.in_flight.insert(queue_id, job.queue.map(|(_, p)| p).unwrap_or(policy));
        }
        (next, Vec::new())
    }
}

/// Build the synthetic failure [`Response`] a cancelled job is reported
/// with, so the reducer observes a uniform failure report (per spec §4.3)
/// rather than the job simply never completing.
pub fn cancellation_response(job: &Job) -> Response {
    Response {
        status: 499,
        body: ResponseBody::Empty,
        headers: Default::default(),
        extra_data: job.extra_data.clone(),
    }
}

#[cfg(test)]
mod test {
    use http::Method;
    use prism_sdk_base::job::{Job, QueueId, QueuePolicy};
    use uuid::Uuid;

    use super::JobDispatcher;

    #[test]
    fn unqueued_jobs_always_admit_immediately() {
        let mut dispatcher = JobDispatcher::new();
        let job = Job::new("Sync", Method::GET, "/sync");
        assert!(dispatcher.admit(job).is_some());
    }

    #[test]
    fn second_job_on_a_queue_waits_for_the_first() {
        let mut dispatcher = JobDispatcher::new();
        let queue = QueueId(Uuid::from_u128(1));
        let first = Job::new("SendMessage", Method::PUT, "/a").with_queue(queue, QueuePolicy::AlwaysContinue);
        let second = Job::new("SendMessage", Method::PUT, "/b").with_queue(queue, QueuePolicy::AlwaysContinue);

        assert!(dispatcher.admit(first).is_some());
        assert!(dispatcher.admit(second).is_none());

        let (released, cancelled) = dispatcher.complete(queue, true);
        assert_eq!(released.unwrap().path, "/b");
        assert!(cancelled.is_empty());
    }

    #[test]
    fn cancel_future_if_failed_drops_the_backlog() {
        let mut dispatcher = JobDispatcher::new();
        let queue = QueueId(Uuid::from_u128(2));
        let first = Job::new("SendMessage", Method::PUT, "/a").with_queue(queue, QueuePolicy::CancelFutureIfFailed);
        let second = Job::new("SendMessage", Method::PUT, "/b").with_queue(queue, QueuePolicy::CancelFutureIfFailed);

        dispatcher.admit(first);
        dispatcher.admit(second);

        let (next, cancelled) = dispatcher.complete(queue, false);
        assert!(next.is_none());
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].path, "/b");
    }

    #[test]
    fn cancellation_response_is_a_client_error_carrying_the_jobs_extra_data() {
        use serde_json::json;

        let job = Job::new("SendMessage", Method::PUT, "/a").with_extra_data(json!({"room_id": "!r:example.org"}));
        let response = super::cancellation_response(&job);
        assert_eq!(response.status, 499);
        assert_eq!(response.extra_data, Some(json!({"room_id": "!r:example.org"})));
    }
}
