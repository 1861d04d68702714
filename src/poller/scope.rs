//! Query scope derivation.

use crate::source::QueryScope;
use crate::types::{EventKind, StreamId, Timestamp};
use std::collections::BTreeMap;

/// What one listener still needs from the source this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub stream: Option<StreamId>,
    pub kind: EventKind,
    /// Inclusive lower bound (mark + 1, or the window start).
    pub from: Timestamp,
    /// Exclusive window end.
    pub end: Timestamp,
}

/// Collapse listener interests into the smallest set of non-overlapping scopes.
///
/// Interests whose lower bound already reached their window end are dropped.
/// A single stream-agnostic interest turns the whole query into one wildcard
/// scope; otherwise there is one scope per referenced stream.
pub(crate) fn derive_scopes(interests: impl IntoIterator<Item = Interest>) -> Vec<QueryScope> {
    let mut wildcard: Option<QueryScope> = None;
    let mut per_stream: BTreeMap<StreamId, QueryScope> = BTreeMap::new();

    for interest in interests {
        if interest.from >= interest.end {
            continue;
        }
        let scope = match interest.stream {
            Some(stream) => per_stream
                .entry(stream)
                .or_insert_with(|| QueryScope::stream(stream, interest.from)),
            None => wildcard.get_or_insert_with(|| QueryScope::all_streams(interest.from)),
        };
        widen(scope, interest.from, &[interest.kind]);
    }

    let mut scopes = match wildcard {
        Some(mut all) => {
            for scope in per_stream.values() {
                widen(&mut all, scope.from, &scope.kinds);
            }
            vec![all]
        }
        None => per_stream.into_values().collect(),
    };
    for scope in &mut scopes {
        scope.kinds.sort();
    }
    scopes
}

fn widen(scope: &mut QueryScope, from: Timestamp, kinds: &[EventKind]) {
    scope.from = scope.from.min(from);
    for kind in kinds {
        if !scope.kinds.contains(kind) {
            scope.kinds.push(*kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interest(stream: Option<i64>, kind: EventKind, from: i64) -> Interest {
        Interest {
            stream: stream.map(StreamId),
            kind,
            from: Timestamp(from),
            end: Timestamp::MAX,
        }
    }

    #[test]
    fn test_no_interests_no_scopes() {
        assert!(derive_scopes(Vec::<Interest>::new()).is_empty());
    }

    #[test]
    fn test_one_scope_per_stream_with_minimum_bound() {
        let scopes = derive_scopes(vec![
            interest(Some(1), EventKind::Echo, 10),
            interest(Some(1), EventKind::CpuUsage, 4),
            interest(Some(2), EventKind::Echo, 7),
        ]);

        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].stream, Some(StreamId(1)));
        assert_eq!(scopes[0].from, Timestamp(4));
        assert_eq!(scopes[0].kinds, vec![EventKind::Echo, EventKind::CpuUsage]);
        assert_eq!(scopes[1].stream, Some(StreamId(2)));
        assert_eq!(scopes[1].from, Timestamp(7));
        assert_eq!(scopes[1].kinds, vec![EventKind::Echo]);
    }

    #[test]
    fn test_wildcard_absorbs_stream_scopes() {
        let scopes = derive_scopes(vec![
            interest(Some(1), EventKind::Process, 2),
            interest(None, EventKind::Echo, 9),
            interest(Some(2), EventKind::Stream, 5),
        ]);

        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].stream, None);
        assert_eq!(scopes[0].from, Timestamp(2));
        assert_eq!(
            scopes[0].kinds,
            vec![EventKind::Stream, EventKind::Process, EventKind::Echo]
        );
    }

    #[test]
    fn test_exhausted_windows_are_skipped() {
        let exhausted = Interest {
            end: Timestamp(3),
            ..interest(None, EventKind::Echo, 3)
        };
        let scopes = derive_scopes(vec![exhausted, interest(Some(4), EventKind::Echo, 0)]);

        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].stream, Some(StreamId(4)));
    }
}
