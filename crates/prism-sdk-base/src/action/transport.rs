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

//! Job submission and response-routing actions.

use serde::{Deserialize, Serialize};

use crate::job::{Job, Response};

/// Actions concerned with moving jobs in and responses out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TransportAction {
    /// Enqueue a job for the runtime to execute.
    SubmitJob {
        /// The job to run.
        job: Job,
    },
    /// A job's response has arrived; route it by the job's stable id.
    ProcessResponse {
        /// The job id the response's originating job carried.
        job_id: &'static str,
        /// The response itself.
        response: Response,
    },
    /// Resubmit a job verbatim, e.g. after a transient transport failure.
    ResubmitJob {
        /// The job to resubmit.
        job: Job,
    },
}
