//! Event matching and per-listener delivery marks.

use crate::types::{Event, GroupId, Timestamp};
use std::collections::HashMap;

use super::types::{Listener, TimeWindow};

/// Highest timestamp already delivered to one registration.
///
/// Listeners that filter on groups keep one mark per group so that progress on
/// one group never hides earlier events of another. Everyone else keeps a
/// single scalar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HighWaterMark {
    Global(Option<Timestamp>),
    PerGroup(HashMap<GroupId, Timestamp>),
}

impl HighWaterMark {
    /// Fresh (empty) mark shaped for `listener`.
    pub fn for_listener(listener: &Listener) -> Self {
        if listener.tracks_groups() {
            HighWaterMark::PerGroup(HashMap::new())
        } else {
            HighWaterMark::Global(None)
        }
    }

    /// Last delivered timestamp relevant to `group`.
    pub fn last_seen(&self, group: GroupId) -> Option<Timestamp> {
        match self {
            HighWaterMark::Global(ts) => *ts,
            HighWaterMark::PerGroup(marks) => marks.get(&group).copied(),
        }
    }

    /// Whether `event` is newer than anything delivered for its group.
    pub fn admits(&self, event: &Event) -> bool {
        self.last_seen(event.group_id)
            .map_or(true, |seen| event.timestamp > seen)
    }

    /// Record a delivery. Never moves a mark backwards.
    pub fn advance(&mut self, group: GroupId, ts: Timestamp) {
        match self {
            HighWaterMark::Global(seen) => {
                if seen.map_or(true, |s| ts > s) {
                    *seen = Some(ts);
                }
            }
            HighWaterMark::PerGroup(marks) => {
                let seen = marks.entry(group).or_insert(ts);
                if ts > *seen {
                    *seen = ts;
                }
            }
        }
    }

    /// Fold another mark's progress into this one.
    pub fn merge(&mut self, other: &HighWaterMark) {
        match other {
            HighWaterMark::Global(Some(ts)) => self.advance(GroupId::default(), *ts),
            HighWaterMark::Global(None) => {}
            HighWaterMark::PerGroup(marks) => {
                for (group, ts) in marks {
                    self.advance(*group, *ts);
                }
            }
        }
    }

    /// Earliest timestamp `listener` could still need from the source.
    pub fn lower_bound(&self, listener: &Listener, window: &TimeWindow) -> Timestamp {
        let after = |seen: Option<Timestamp>| match seen {
            Some(ts) => ts.next().max(window.start),
            None => window.start,
        };
        match (self, listener.groups()) {
            (HighWaterMark::PerGroup(marks), Some(groups)) if !groups.is_empty() => groups
                .iter()
                .map(|g| after(marks.get(g).copied()))
                .min()
                .unwrap_or(window.start),
            (HighWaterMark::PerGroup(_), _) => window.start,
            (HighWaterMark::Global(seen), _) => after(*seen),
        }
    }
}

/// Full delivery check: kind, predicates, window, then the mark.
///
/// The mark is the last gate so filtered-out events never touch it.
pub fn matches(listener: &Listener, event: &Event, window: &TimeWindow, mark: &HighWaterMark) -> bool {
    listener.accepts(event) && window.contains(event.timestamp) && mark.admits(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, StreamId};

    fn noop(_: &Event) -> bool {
        false
    }

    fn echo(ts: i64, group: i64) -> Event {
        Event::new(StreamId(1), EventKind::Echo, ts).with_group(GroupId(group))
    }

    #[test]
    fn test_global_mark_blocks_older_events() {
        let listener = Listener::new(EventKind::Echo, noop);
        let mut mark = HighWaterMark::for_listener(&listener);
        let window = listener.window();

        assert!(matches(&listener, &echo(10, 0), &window, &mark));
        mark.advance(GroupId(0), Timestamp(10));

        assert!(!matches(&listener, &echo(10, 0), &window, &mark));
        assert!(!matches(&listener, &echo(5, 0), &window, &mark));
        // Scalar marks ignore the group.
        assert!(!matches(&listener, &echo(5, 7), &window, &mark));
        assert!(matches(&listener, &echo(20, 0), &window, &mark));
    }

    #[test]
    fn test_per_group_marks_are_independent() {
        let listener = Listener::builder(EventKind::Echo, noop)
            .groups([GroupId(1), GroupId(2)])
            .build();
        let mut mark = HighWaterMark::for_listener(&listener);
        let window = listener.window();

        mark.advance(GroupId(1), Timestamp(100));
        assert!(!matches(&listener, &echo(50, 1), &window, &mark));
        assert!(matches(&listener, &echo(50, 2), &window, &mark));
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut mark = HighWaterMark::Global(None);
        mark.advance(GroupId(0), Timestamp(10));
        mark.advance(GroupId(0), Timestamp(4));
        assert_eq!(mark.last_seen(GroupId(0)), Some(Timestamp(10)));

        let mut mark = HighWaterMark::PerGroup(HashMap::new());
        mark.advance(GroupId(3), Timestamp(10));
        mark.advance(GroupId(3), Timestamp(4));
        assert_eq!(mark.last_seen(GroupId(3)), Some(Timestamp(10)));
        assert_eq!(mark.last_seen(GroupId(4)), None);
    }

    #[test]
    fn test_window_gates_before_mark() {
        let listener = Listener::builder(EventKind::Echo, noop)
            .start_time(0)
            .end_time(3)
            .build();
        let mark = HighWaterMark::for_listener(&listener);
        let window = listener.window();

        assert!(matches(&listener, &echo(2, 0), &window, &mark));
        assert!(!matches(&listener, &echo(3, 0), &window, &mark));
        assert!(!matches(&listener, &echo(-1, 0), &window, &mark));
    }

    #[test]
    fn test_lower_bound() {
        let listener = Listener::builder(EventKind::Echo, noop).start_time(5).build();
        let window = listener.window();
        let mut mark = HighWaterMark::for_listener(&listener);

        assert_eq!(mark.lower_bound(&listener, &window), Timestamp(5));
        mark.advance(GroupId(0), Timestamp(2));
        assert_eq!(mark.lower_bound(&listener, &window), Timestamp(5));
        mark.advance(GroupId(0), Timestamp(9));
        assert_eq!(mark.lower_bound(&listener, &window), Timestamp(10));
    }

    #[test]
    fn test_lower_bound_per_group_uses_least_advanced_group() {
        let listener = Listener::builder(EventKind::Echo, noop)
            .groups([GroupId(1), GroupId(2)])
            .start_time(0)
            .build();
        let window = listener.window();
        let mut mark = HighWaterMark::for_listener(&listener);

        mark.advance(GroupId(1), Timestamp(40));
        assert_eq!(mark.lower_bound(&listener, &window), Timestamp(0));
        mark.advance(GroupId(2), Timestamp(30));
        assert_eq!(mark.lower_bound(&listener, &window), Timestamp(31));
    }

    #[test]
    fn test_merge() {
        let mut base = HighWaterMark::PerGroup(HashMap::new());
        base.advance(GroupId(1), Timestamp(5));

        let mut update = HighWaterMark::PerGroup(HashMap::new());
        update.advance(GroupId(1), Timestamp(7));
        update.advance(GroupId(2), Timestamp(3));

        base.merge(&update);
        assert_eq!(base.last_seen(GroupId(1)), Some(Timestamp(7)));
        assert_eq!(base.last_seen(GroupId(2)), Some(Timestamp(3)));
    }
}
