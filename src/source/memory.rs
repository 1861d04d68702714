//! In-process event source.

use crate::error::SourceError;
use crate::types::{Event, StreamId};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{EventSource, QueryScope};

/// Thread-safe event source that producers push events into.
///
/// Each stream keeps its events sorted by timestamp; events sharing a
/// timestamp keep their insertion order. Nothing is ever evicted.
pub struct InMemoryEventSource {
    streams: RwLock<BTreeMap<StreamId, Vec<Event>>>,
}

impl InMemoryEventSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an event to its stream.
    pub fn push(&self, event: Event) {
        let mut streams = self.streams.write();
        let events = streams.entry(event.stream_id).or_default();
        let at = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(at, event);
    }

    /// Add several events.
    pub fn extend(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.push(event);
        }
    }

    /// Total number of events held.
    pub fn len(&self) -> usize {
        self.streams.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Streams that have received at least one event.
    pub fn streams(&self) -> Vec<StreamId> {
        self.streams.read().keys().copied().collect()
    }
}

impl Default for InMemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for InMemoryEventSource {
    fn query(&self, scopes: &[QueryScope]) -> Result<Vec<Event>, SourceError> {
        let streams = self.streams.read();
        let mut out: Vec<Event> = Vec::new();

        for scope in scopes {
            let start = out.len();
            let selected: Vec<&Vec<Event>> = match scope.stream {
                Some(id) => streams.get(&id).into_iter().collect(),
                None => streams.values().collect(),
            };
            for events in selected {
                let first = events.partition_point(|e| e.timestamp < scope.from);
                out.extend(events[first..].iter().filter(|e| scope.covers(e)).cloned());
            }
            // Streams are individually sorted; merge them for this scope.
            out[start..].sort_by_key(|e| e.timestamp);
        }

        Ok(out)
    }
}
