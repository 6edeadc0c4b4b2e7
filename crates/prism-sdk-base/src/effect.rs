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

//! The deferred-side-effect half of `reduce(state, action) -> (state',
//! effect)`.
//!
//! An [`Effect`] is data, not an executed side effect: it is a boxed
//! function that the runtime (in `prism-sdk`) invokes later, handing it a
//! `&dyn RuntimeCapabilities` so it can perform the one HTTP call, timer
//! wait, or `await` it needs, then produce the next [`Action`]s. This is the
//! trait-capability replacement for the dynamically dispatched
//! `JobInterface`/`RandomInterface`/`EventInterface` of the source engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use prism_sdk_common::{RandomSource, Timestamp};

use crate::action::Action;
use crate::job::{Job, Response};
use crate::model::Trigger;

/// A future yielding the actions an effect wants dispatched next.
pub type EffectFuture = Pin<Box<dyn Future<Output = Vec<Action>> + Send>>;

/// A future yielding a job's response.
pub type JobFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A future that resolves once a timer has expired.
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The capabilities a runtime must provide to drive effects: transport,
/// clock, randomness, and trigger emission. Exactly the suspension points
/// named in the spec: `transport.fetch`, `setTimeout`, `Promise.then`.
pub trait RuntimeCapabilities: Send + Sync {
    /// Execute a job and resolve with its response. The only I/O suspension
    /// point.
    fn submit_job(&self, job: Job) -> JobFuture;

    /// The source of randomness for any crypto operation an effect performs.
    fn random(&self) -> &dyn RandomSource;

    /// The current wall-clock time.
    fn now(&self) -> Timestamp;

    /// Suspend for `duration`. The only timer suspension point.
    fn sleep(&self, duration: Duration) -> SleepFuture;

    /// Surface an observable outcome to the host application.
    fn emit_trigger(&self, trigger: Trigger);
}

/// A boxed, one-shot effect body.
pub type EffectFn = Box<dyn FnOnce(Arc<dyn RuntimeCapabilities>) -> EffectFuture + Send>;

/// The side-effect half of a reducer transition.
///
/// `Effect::None` is the common case (most actions are pure state updates).
/// `Effect::Batch` lets a single transition schedule more than one
/// independent effect (e.g. emitting a trigger *and* submitting a job)
/// without the reducer needing to pick an arbitrary single one.
pub enum Effect {
    /// No side effect.
    None,
    /// One deferred effect.
    Single(EffectFn),
    /// Several independent deferred effects.
    Batch(Vec<Effect>),
}

impl Effect {
    /// Build a single effect from a function taking the runtime
    /// capabilities and producing a future of follow-up actions.
    pub fn single<F>(f: F) -> Self
    where
        F: FnOnce(Arc<dyn RuntimeCapabilities>) -> EffectFuture + Send + 'static,
    {
        Effect::Single(Box::new(f))
    }

    /// Combine `self` with `other` into a batch, flattening nested batches.
    pub fn and(self, other: Effect) -> Effect {
        match (self, other) {
            (Effect::None, other) => other,
            (this, Effect::None) => this,
            (Effect::Batch(mut a), Effect::Batch(b)) => {
                a.extend(b);
                Effect::Batch(a)
            }
            (Effect::Batch(mut a), other) => {
                a.push(other);
                Effect::Batch(a)
            }
            (this, Effect::Batch(mut b)) => {
                b.insert(0, this);
                Effect::Batch(b)
            }
            (a, b) => Effect::Batch(vec![a, b]),
        }
    }

    /// Whether this effect does nothing.
    pub fn is_none(&self) -> bool {
        matches!(self, Effect::None)
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Single(_) => write!(f, "Effect::Single(..)"),
            Effect::Batch(effects) => write!(f, "Effect::Batch({} effects)", effects.len()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Effect;

    #[test]
    fn and_flattens_batches() {
        let a = Effect::None;
        let b = Effect::single(|_| Box::pin(async { Vec::new() }));
        let combined = a.and(b);
        assert!(matches!(combined, Effect::Single(_)));

        let with_third = combined.and(Effect::single(|_| Box::pin(async { Vec::new() })));
        match with_third {
            Effect::Batch(effects) => assert_eq!(effects.len(), 2),
            other => panic!("expected a batch, got {:?}", other),
        }
    }
}
