//! Listeners and the registry that holds them.
//!
//! A [`Listener`] is an immutable filter plus callback. Delivery progress is
//! not stored on the listener: the poller keeps a [`HighWaterMark`] per
//! [`Registration`], so the same listener value registered again starts over.

mod matcher;
mod registry;
mod types;

pub use matcher::{matches, HighWaterMark};
pub use registry::{ListenerRegistry, Registration, RegistrationId, Snapshot};
pub use types::{Callback, EventFilter, ExecutionContext, Listener, ListenerBuilder, TimeBound, TimeWindow};
