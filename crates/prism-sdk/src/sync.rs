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

//! The background engine: the one task that owns the [`ClientModel`], feeds
//! it [`Action`]s, and drives whatever [`Effect`]s and [`Job`]s those
//! actions produce.
//!
//! `prism-sdk-base::reduce` is pure and total; everything in this module
//! exists to close the loop that the reducer leaves open, per spec §4:
//! execute effects against [`TokioCapabilities`], submit jobs honoring
//! queue ordering via [`JobDispatcher`], and feed both the effects' and the
//! jobs' outcomes back in as new actions.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use prism_sdk_base::action::{Action, TransportAction};
use prism_sdk_base::effect::{Effect, RuntimeCapabilities};
use prism_sdk_base::job::{Job, QueueId, Response};
use prism_sdk_base::model::{ClientModel, Trigger};
use prism_sdk_base::reduce;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::job::JobDispatcher;
use crate::runtime::TokioCapabilities;

/// A handle to the running engine task: a channel to feed it actions and a
/// `watch` channel to read the latest model snapshot.
pub struct EngineHandle {
    actions: mpsc::UnboundedSender<Action>,
    model: watch::Receiver<ClientModel>,
}

impl EngineHandle {
    pub fn dispatch(&self, action: impl Into<Action>) {
        // The engine task only stops when its own `actions` sender (held by
        // the task loop via the initial clone) is dropped, which never
        // happens while this handle is alive; a send error here means the
        // task panicked, which we don't attempt to recover from.
        let _ = self.actions.send(action.into());
    }

    pub fn snapshot(&self) -> ClientModel {
        self.model.borrow().clone()
    }
}

/// One in-flight job submission, tagged with whether it belongs to a queue.
struct InFlightJob {
    job_id: &'static str,
    queue: Option<QueueId>,
    response: Response,
}

/// Spawn the background engine on the current `tokio` runtime, returning a
/// handle plus the trigger stream the [`crate::Client`] forwards to callers.
pub fn spawn(capabilities: TokioCapabilities) -> (EngineHandle, mpsc::UnboundedReceiver<Trigger>) {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (model_tx, model_rx) = watch::channel(ClientModel::new());
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel::<Trigger>();

    let capabilities: Arc<dyn RuntimeCapabilities> = Arc::new(capabilities);
    let loopback = action_tx.clone();

    tokio::spawn(async move {
        let mut state = ClientModel::new();
        let mut dispatcher = JobDispatcher::new();
        let mut jobs = FuturesUnordered::new();
        let mut effects = FuturesUnordered::new();

        loop {
            tokio::select! {
                action = action_rx.recv() => {
                    let Some(action) = action else { break };
                    let (next, effect) = reduce(&state, action);
                    state = next;

                    let (drained_state, triggers) = state.drain_triggers();
                    state = drained_state;
                    for trigger in triggers {
                        let _ = trigger_tx.send(trigger);
                    }

                    schedule_effect(effect, &capabilities, &mut effects);

                    loop {
                        let (popped, job) = state.pop_job();
                        state = popped;
                        let Some(job) = job else { break };
                        submit_or_queue(job, &mut dispatcher, &capabilities, &mut jobs);
                    }

                    let _ = model_tx.send(state.clone());
                }
                Some(followups) = effects.next(), if !effects.is_empty() => {
                    for action in followups {
                        let _ = loopback.send(action);
                    }
                }
                Some(finished) = jobs.next(), if !jobs.is_empty() => {
                    trace!(job_id = finished.job_id, "job completed");
                    let success = finished.response.status < 400;
                    let action = Action::Transport(TransportAction::ProcessResponse {
                        job_id: finished.job_id,
                        response: finished.response,
                    });
                    let _ = loopback.send(action);

                    if let Some(queue) = finished.queue {
                        let (next_job, cancelled) = dispatcher.complete(queue, success);
                        if let Some(next_job) = next_job {
                            submit_or_queue(next_job, &mut dispatcher, &capabilities, &mut jobs);
                        }
                        for job in &cancelled {
                            let response = crate::job::cancellation_response(job);
                            let action = Action::Transport(TransportAction::ProcessResponse {
                                job_id: job.job_id,
                                response,
                            });
                            let _ = loopback.send(action);
                        }
                    }
                }
                else => break,
            }
        }
        debug!("engine task exiting");
    });

    (EngineHandle { actions: action_tx, model: model_rx }, trigger_rx)
}

fn schedule_effect(
    effect: Effect,
    capabilities: &Arc<dyn RuntimeCapabilities>,
    effects: &mut FuturesUnordered<std::pin::Pin<Box<dyn std::future::Future<Output = Vec<Action>> + Send>>>,
) {
    match effect {
        Effect::None => {}
        Effect::Single(effect_fn) => {
            let caps = capabilities.clone();
            effects.push(effect_fn(caps));
        }
        Effect::Batch(batch) => {
            for effect in batch {
                schedule_effect(effect, capabilities, effects);
            }
        }
    }
}

fn submit_or_queue(
    job: Job,
    dispatcher: &mut JobDispatcher,
    capabilities: &Arc<dyn RuntimeCapabilities>,
    jobs: &mut FuturesUnordered<std::pin::Pin<Box<dyn std::future::Future<Output = InFlightJob> + Send>>>,
) {
    let queue = job.queue.map(|(id, _)| id);
    if let Some(admitted) = dispatcher.admit(job) {
        let job_id = admitted.job_id;
        let future = capabilities.submit_job(admitted);
        jobs.push(Box::pin(async move {
            let response = future.await;
            InFlightJob { job_id, queue, response }
        }));
    }
}
