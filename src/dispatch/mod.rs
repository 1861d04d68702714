//! Callback dispatch.
//!
//! A matched listener's callback runs either inline on the tick thread or on
//! the [`Executor`] the listener was built with. Panics are caught here and
//! never escape into the tick; the listener stays registered.

mod pool;

pub use pool::WorkerPool;

use crate::error::Result;
use crate::listeners::{ExecutionContext, Listener, ListenerRegistry, Registration, RegistrationId};
use crate::types::Event;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run listener callbacks off the tick thread.
pub trait Executor: Send + Sync {
    /// Queue `job`. Fails if the executor no longer accepts work.
    fn execute(&self, job: Job) -> Result<()>;
}

/// What happened to one dispatch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Ran inline to completion.
    Delivered { done: bool },
    /// Handed to an executor; completion is not observed.
    Submitted,
    /// The callback panicked.
    Panicked,
    /// The executor refused the job.
    Rejected,
}

impl DispatchOutcome {
    /// Whether the event counts as delivered for mark purposes.
    pub fn is_delivered(self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. } | DispatchOutcome::Submitted)
    }
}

/// Run `registration`'s callback for `event` on its execution context.
///
/// A `done` signal from an executor-run callback removes the registration
/// from `registry` directly, whenever the job gets to run.
pub fn dispatch(
    registration: &Arc<Registration>,
    event: &Event,
    registry: &Arc<ListenerRegistry>,
) -> DispatchOutcome {
    match registration.listener().context() {
        ExecutionContext::Inline => {
            match invoke_guarded(registration.listener(), registration.id(), event) {
                Some(done) => DispatchOutcome::Delivered { done },
                None => DispatchOutcome::Panicked,
            }
        }
        ExecutionContext::Executor(executor) => {
            let job_registration = Arc::clone(registration);
            let registry = Arc::downgrade(registry);
            let event = event.clone();
            let job: Job = Box::new(move || {
                // Removed (or the poller stopped) while queued.
                if !job_registration.is_active() {
                    return;
                }
                let done = invoke_guarded(job_registration.listener(), job_registration.id(), &event);
                if done == Some(true) {
                    if let Some(registry) = registry.upgrade() {
                        registry.remove_id(job_registration.id());
                    }
                }
            });

            match executor.execute(job) {
                Ok(()) => DispatchOutcome::Submitted,
                Err(e) => {
                    warn!(
                        listener = registration.listener().name(),
                        registration = %registration.id(),
                        "Dropping delivery: {}",
                        e
                    );
                    DispatchOutcome::Rejected
                }
            }
        }
    }
}

/// Invoke a callback, converting a panic into `None`.
fn invoke_guarded(listener: &Listener, id: RegistrationId, event: &Event) -> Option<bool> {
    match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(event))) {
        Ok(done) => Some(done),
        Err(payload) => {
            error!(
                listener = listener.name(),
                registration = %id,
                timestamp = %event.timestamp,
                "Listener callback panicked: {}",
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
