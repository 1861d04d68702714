//! Event source boundary.
//!
//! The poller never talks to a device directly. It asks an [`EventSource`]
//! for everything newer than a lower bound, per stream, and trusts the
//! source for per-group ordering but not for availability.
//!
//! Any `Fn(&[QueryScope]) -> Result<Vec<Event>, SourceError>` closure is a
//! source, which is the usual way to adapt a transport client stub.

mod memory;

pub use memory::InMemoryEventSource;

use crate::error::SourceError;
use crate::types::{Event, EventKind, StreamId, Timestamp};
use serde::{Deserialize, Serialize};

/// One entry of a source query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryScope {
    /// Stream to query (None = every stream the source knows about).
    pub stream: Option<StreamId>,

    /// Inclusive lower bound on event timestamps.
    pub from: Timestamp,

    /// Kinds of interest (empty = all kinds). A hint; the poller re-filters.
    pub kinds: Vec<EventKind>,
}

impl QueryScope {
    /// Scope covering all kinds on one stream.
    pub fn stream(stream: StreamId, from: impl Into<Timestamp>) -> Self {
        Self {
            stream: Some(stream),
            from: from.into(),
            kinds: Vec::new(),
        }
    }

    /// Scope covering all kinds on every stream.
    pub fn all_streams(from: impl Into<Timestamp>) -> Self {
        Self {
            stream: None,
            from: from.into(),
            kinds: Vec::new(),
        }
    }

    /// Whether an event falls inside this scope.
    pub fn covers(&self, event: &Event) -> bool {
        if let Some(stream) = self.stream {
            if stream != event.stream_id {
                return false;
            }
        }
        if event.timestamp < self.from {
            return false;
        }
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }
}

/// Remote query capability consumed by the poller.
///
/// Implementations return events ascending by timestamp within each scope.
/// Errors are treated as transient: the poller logs them and retries on its
/// next tick.
pub trait EventSource: Send + Sync {
    fn query(&self, scopes: &[QueryScope]) -> Result<Vec<Event>, SourceError>;
}

impl<F> EventSource for F
where
    F: Fn(&[QueryScope]) -> Result<Vec<Event>, SourceError> + Send + Sync,
{
    fn query(&self, scopes: &[QueryScope]) -> Result<Vec<Event>, SourceError> {
        self(scopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_covers() {
        let event = Event::new(StreamId(1), EventKind::Echo, 10);

        assert!(QueryScope::stream(StreamId(1), 10).covers(&event));
        assert!(!QueryScope::stream(StreamId(1), 11).covers(&event));
        assert!(!QueryScope::stream(StreamId(2), 0).covers(&event));
        assert!(QueryScope::all_streams(0).covers(&event));

        let scope = QueryScope {
            kinds: vec![EventKind::CpuUsage],
            ..QueryScope::all_streams(0)
        };
        assert!(!scope.covers(&event));
    }

    #[test]
    fn test_closure_is_a_source() {
        let source = |scopes: &[QueryScope]| -> Result<Vec<Event>, SourceError> {
            Ok(scopes
                .iter()
                .map(|s| Event::new(s.stream.unwrap_or(StreamId(0)), EventKind::Echo, s.from))
                .collect())
        };

        let events = source.query(&[QueryScope::stream(StreamId(3), 5)]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stream_id, StreamId(3));
        assert_eq!(events[0].timestamp, Timestamp(5));
    }
}
