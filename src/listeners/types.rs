//! Listener value types.

use crate::dispatch::Executor;
use crate::error::{PollError, Result};
use crate::types::{Event, EventKind, GroupId, ProcessId, StreamId, Timestamp};
use std::fmt;
use std::sync::Arc;

/// Callback invoked with each matching event. Returning `true` unregisters the listener.
pub type Callback = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Custom event predicate.
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// One end of a listener's time window.
#[derive(Clone)]
pub enum TimeBound {
    /// A constant timestamp.
    Fixed(Timestamp),
    /// Re-evaluated at the start of every tick (e.g. a moving view range).
    Dynamic(Arc<dyn Fn() -> Timestamp + Send + Sync>),
}

impl TimeBound {
    /// Current value of the bound.
    pub fn resolve(&self) -> Timestamp {
        match self {
            TimeBound::Fixed(ts) => *ts,
            TimeBound::Dynamic(f) => f(),
        }
    }

    fn fixed(&self) -> Option<Timestamp> {
        match self {
            TimeBound::Fixed(ts) => Some(*ts),
            TimeBound::Dynamic(_) => None,
        }
    }
}

impl fmt::Debug for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Fixed(ts) => write!(f, "Fixed({})", ts),
            TimeBound::Dynamic(_) => write!(f, "Dynamic"),
        }
    }
}

/// Half-open `[start, end)` window resolved for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    /// The unbounded window.
    pub const ALL: TimeWindow = TimeWindow {
        start: Timestamp::MIN,
        end: Timestamp::MAX,
    };

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Where a listener's callback runs.
#[derive(Clone, Default)]
pub enum ExecutionContext {
    /// On the poller's tick thread, synchronously.
    #[default]
    Inline,
    /// Handed off to an executor; the tick does not wait for it.
    Executor(Arc<dyn Executor>),
}

impl ExecutionContext {
    pub fn is_inline(&self) -> bool {
        matches!(self, ExecutionContext::Inline)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Inline => write!(f, "Inline"),
            ExecutionContext::Executor(_) => write!(f, "Executor"),
        }
    }
}

struct ListenerInner {
    name: String,
    kind: EventKind,
    stream: Option<StreamId>,
    groups: Option<Vec<GroupId>>,
    pid: Option<ProcessId>,
    filter: Option<EventFilter>,
    start: TimeBound,
    end: TimeBound,
    callback: Callback,
    context: ExecutionContext,
}

/// A filtered event consumer.
///
/// Cloning is cheap and clones share identity: registering a clone of an
/// already-registered listener is a no-op, and either clone can unregister it.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Start building a listener for `kind`.
    pub fn builder<F>(kind: EventKind, callback: F) -> ListenerBuilder
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        ListenerBuilder::new(kind, Arc::new(callback))
    }

    /// Listener with no filters beyond the kind, running inline.
    pub fn new<F>(kind: EventKind, callback: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self::builder(kind, callback).build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> EventKind {
        self.inner.kind
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.inner.stream
    }

    pub fn groups(&self) -> Option<&[GroupId]> {
        self.inner.groups.as_deref()
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.inner.pid
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    /// Whether delivery marks are kept per group rather than as one scalar.
    pub fn tracks_groups(&self) -> bool {
        self.inner.groups.is_some()
    }

    /// Resolve the time window for the current tick.
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.inner.start.resolve(),
            end: self.inner.end.resolve(),
        }
    }

    /// Whether both handles refer to the same listener.
    pub fn same_as(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check the static parts of the configuration.
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.inner.start.fixed(), self.inner.end.fixed()) {
            if start >= end {
                return Err(PollError::InvalidListener(format!(
                    "{}: start time {} is not before end time {}",
                    self.inner.name, start, end
                )));
            }
        }
        if matches!(self.inner.groups, Some(ref groups) if groups.is_empty()) {
            return Err(PollError::InvalidListener(format!(
                "{}: empty group filter can never match",
                self.inner.name
            )));
        }
        Ok(())
    }

    /// Check the kind and the optional predicates (not the time window).
    pub fn accepts(&self, event: &Event) -> bool {
        let inner = &self.inner;
        if event.kind != inner.kind {
            return false;
        }
        if let Some(stream) = inner.stream {
            if stream != event.stream_id {
                return false;
            }
        }
        if let Some(ref groups) = inner.groups {
            if !groups.contains(&event.group_id) {
                return false;
            }
        }
        if let Some(pid) = inner.pid {
            if pid != event.pid {
                return false;
            }
        }
        if let Some(ref filter) = inner.filter {
            if !filter(event) {
                return false;
            }
        }
        true
    }

    pub(crate) fn invoke(&self, event: &Event) -> bool {
        (self.inner.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("stream", &self.inner.stream)
            .field("groups", &self.inner.groups)
            .field("pid", &self.inner.pid)
            .field("start", &self.inner.start)
            .field("end", &self.inner.end)
            .field("context", &self.inner.context)
            .finish()
    }
}

/// Builder for [`Listener`]. Everything but the kind and callback is optional.
pub struct ListenerBuilder {
    name: Option<String>,
    kind: EventKind,
    stream: Option<StreamId>,
    groups: Option<Vec<GroupId>>,
    pid: Option<ProcessId>,
    filter: Option<EventFilter>,
    start: TimeBound,
    end: TimeBound,
    callback: Callback,
    context: ExecutionContext,
}

impl ListenerBuilder {
    fn new(kind: EventKind, callback: Callback) -> Self {
        Self {
            name: None,
            kind,
            stream: None,
            groups: None,
            pid: None,
            filter: None,
            start: TimeBound::Fixed(Timestamp::MIN),
            end: TimeBound::Fixed(Timestamp::MAX),
            callback,
            context: ExecutionContext::Inline,
        }
    }

    /// Label used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stream(mut self, stream: StreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Accept events from `group`. May be called repeatedly.
    pub fn group(mut self, group: GroupId) -> Self {
        self.groups.get_or_insert_with(Vec::new).push(group);
        self
    }

    /// Accept events from any of `groups`.
    pub fn groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups.get_or_insert_with(Vec::new).extend(groups);
        self
    }

    pub fn process(mut self, pid: ProcessId) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Inclusive lower bound of the window.
    pub fn start_time(mut self, ts: impl Into<Timestamp>) -> Self {
        self.start = TimeBound::Fixed(ts.into());
        self
    }

    /// Exclusive upper bound of the window.
    pub fn end_time(mut self, ts: impl Into<Timestamp>) -> Self {
        self.end = TimeBound::Fixed(ts.into());
        self
    }

    pub fn start_time_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        self.start = TimeBound::Dynamic(Arc::new(f));
        self
    }

    pub fn end_time_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        self.end = TimeBound::Dynamic(Arc::new(f));
        self
    }

    /// Run the callback on `executor` instead of the tick thread.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.context = ExecutionContext::Executor(executor);
        self
    }

    pub fn execution_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Listener {
        let name = self
            .name
            .unwrap_or_else(|| format!("{:?}-listener", self.kind).to_lowercase());
        Listener {
            inner: Arc::new(ListenerInner {
                name,
                kind: self.kind,
                stream: self.stream,
                groups: self.groups,
                pid: self.pid,
                filter: self.filter,
                start: self.start,
                end: self.end,
                callback: self.callback,
                context: self.context,
            }),
        }
    }
}
