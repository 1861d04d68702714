//! The polling loop.
//!
//! An [`EventPoller`] owns one listener registry and one tick driver. Each
//! tick snapshots the registry, asks the [`EventSource`](crate::source::EventSource)
//! for everything past the listeners' delivery marks, orders the batch, and
//! dispatches every event to every matching listener. Ticks never overlap.

mod config;
mod tick;
mod handle;
mod scope;

pub use config::{timestamp_order, EventOrder, PollerConfig, Schedule};
pub use tick::TickStats;
pub use handle::{EventPoller, WeakPoller};
