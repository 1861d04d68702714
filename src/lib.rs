//! # Transport Poller
//!
//! Periodically polls an event source for newly arrived events and fans them
//! out to registered listeners.
//!
//! ## Core Concepts
//!
//! - **Events**: Timestamped records from a device stream, tagged with a kind,
//!   a group and a process
//! - **Listeners**: A required kind, optional filters and time window, and a
//!   callback that returns `true` once it has seen enough
//! - **Poller**: A non-overlapping tick that queries only what listeners still
//!   need and never delivers the same event to a listener twice
//! - **Dispatch**: Callbacks run inline on the tick or on an executor
//!
//! ## Example
//!
//! ```ignore
//! use transport_poller::{Event, EventKind, EventPoller, InMemoryEventSource, Listener, PollerConfig, StreamId};
//!
//! let source = Arc::new(InMemoryEventSource::new());
//! let poller = EventPoller::create(source.clone(), PollerConfig::default())?;
//!
//! // Print every process event on stream 1 until the process ends
//! poller.register_listener(
//!     &Listener::builder(EventKind::Process, |event| {
//!         println!("{:?}", event);
//!         event.is_ended
//!     })
//!     .stream(StreamId(1))
//!     .build(),
//! )?;
//!
//! source.push(Event::new(StreamId(1), EventKind::Process, 10));
//!
//! poller.stop();
//! ```

pub mod dispatch;
pub mod error;
pub mod listeners;
pub mod poller;
pub mod source;
pub mod types;

// Re-exports
pub use dispatch::{DispatchOutcome, Executor, Job, WorkerPool};
pub use error::{PollError, Result, SourceError};
pub use listeners::{ExecutionContext, Listener, ListenerBuilder, ListenerRegistry, TimeWindow};
pub use poller::{EventPoller, PollerConfig, Schedule, TickStats, WeakPoller};
pub use source::{EventSource, InMemoryEventSource, QueryScope};
pub use types::{Event, EventKind, GroupId, ProcessId, StreamId, Timestamp};
