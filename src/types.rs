//! Core types for the event poller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifies the device/session connection an event came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub i64);

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates related events within a stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct GroupId(pub i64);

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process an event concerns. Zero when the event is not process-scoped.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ProcessId(pub i32);

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

/// Nanoseconds on the source's clock.
///
/// Only comparable within a single (stream, group); different groups may be
/// stamped by different clocks on the device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    /// Current wall-clock time. Useful for producers feeding an in-process source.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);
        Timestamp(nanos)
    }

    /// The smallest timestamp strictly after this one (saturating).
    pub fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ts({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp(value)
    }
}

/// Event categories reported by the on-device agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Device stream connected/disconnected.
    Stream,
    /// Process started/ended.
    Process,
    /// Agent attached to a process.
    Agent,
    /// Round-trip test traffic.
    Echo,
    CpuUsage,
    CpuThread,
    CpuTrace,
    MemoryUsage,
    MemoryGc,
    MemoryAllocTracking,
    MemoryHeapDump,
    NetworkSpeed,
    EnergyUsage,
    /// Layout inspector tree/property updates.
    LayoutInspector,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 14] = [
        EventKind::Stream,
        EventKind::Process,
        EventKind::Agent,
        EventKind::Echo,
        EventKind::CpuUsage,
        EventKind::CpuThread,
        EventKind::CpuTrace,
        EventKind::MemoryUsage,
        EventKind::MemoryGc,
        EventKind::MemoryAllocTracking,
        EventKind::MemoryHeapDump,
        EventKind::NetworkSpeed,
        EventKind::EnergyUsage,
        EventKind::LayoutInspector,
    ];
}

/// A single event pulled from the source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Originating stream.
    pub stream_id: StreamId,

    /// Correlation key within the stream.
    #[serde(default)]
    pub group_id: GroupId,

    /// Process the event concerns.
    #[serde(default)]
    pub pid: ProcessId,

    /// Event category.
    pub kind: EventKind,

    /// Source timestamp.
    pub timestamp: Timestamp,

    /// Whether this is the terminal event of its group.
    #[serde(default)]
    pub is_ended: bool,

    /// Kind-specific data. Opaque to the poller.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event with default group, process and an empty payload.
    pub fn new(stream_id: StreamId, kind: EventKind, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            stream_id,
            group_id: GroupId::default(),
            pid: ProcessId::default(),
            kind,
            timestamp: timestamp.into(),
            is_ended: false,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_pid(mut self, pid: ProcessId) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn ended(mut self) -> Self {
        self.is_ended = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_next_saturates() {
        assert_eq!(Timestamp(4).next(), Timestamp(5));
        assert_eq!(Timestamp::MAX.next(), Timestamp::MAX);
    }

    #[test]
    fn test_timestamp_now_is_wall_clock() {
        let first = Timestamp::now();
        let second = Timestamp::now();
        // 2020-01-01T00:00:00Z in nanoseconds.
        assert!(first > Timestamp(1_577_836_800_000_000_000));
        assert!(second >= first);
    }

    #[test]
    fn test_every_kind_has_a_distinct_wire_name() {
        let mut names = std::collections::HashSet::new();
        for kind in EventKind::ALL {
            let name = serde_json::to_string(&kind).unwrap();
            assert_eq!(serde_json::from_str::<EventKind>(&name).unwrap(), kind);
            assert!(names.insert(name), "duplicate name for {kind:?}");
        }
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_event_deserializes_with_defaults() {
        let event: Event = serde_json::from_value(json!({
            "stream_id": 7,
            "kind": "cpu_usage",
            "timestamp": 42,
        }))
        .unwrap();

        assert_eq!(event.stream_id, StreamId(7));
        assert_eq!(event.group_id, GroupId(0));
        assert_eq!(event.kind, EventKind::CpuUsage);
        assert_eq!(event.timestamp, Timestamp(42));
        assert!(!event.is_ended);
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(StreamId(1), EventKind::Echo, 3)
            .with_group(GroupId(456))
            .with_pid(ProcessId(12))
            .with_payload(json!({ "data": "blah" }))
            .ended();

        assert_eq!(event.group_id, GroupId(456));
        assert_eq!(event.pid, ProcessId(12));
        assert_eq!(event.payload["data"], "blah");
        assert!(event.is_ended);
    }
}
