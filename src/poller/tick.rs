//! The poll tick.

use crate::dispatch::{dispatch, DispatchOutcome};
use crate::listeners::{matches, HighWaterMark, ListenerRegistry, Registration, RegistrationId, TimeWindow};
use crate::source::EventSource;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

use super::config::EventOrder;
use super::scope::{derive_scopes, Interest};

/// Counters for one completed tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// 1-based tick sequence number.
    pub tick: u64,
    /// Active listeners in the snapshot.
    pub listeners: usize,
    /// Scopes sent to the source (0 = no query).
    pub scopes: usize,
    /// Events returned by the source.
    pub events: usize,
    /// Successful deliveries (inline completions and executor hand-offs).
    pub deliveries: usize,
    /// Panicked callbacks and rejected hand-offs.
    pub failures: usize,
    /// Listeners removed after signaling done.
    pub removed: usize,
    /// The source query failed; nothing was delivered.
    pub source_failed: bool,
}

/// A snapshot entry with its window resolved for this tick.
struct Plan {
    registration: Arc<Registration>,
    window: TimeWindow,
}

/// State shared by the tick driver and the control handle.
pub(crate) struct PollerCore {
    source: Arc<dyn EventSource>,
    registry: Arc<ListenerRegistry>,
    order: EventOrder,
    /// Delivery marks per registration. Held for the whole tick, which is
    /// what keeps ticks from overlapping.
    marks: Mutex<HashMap<RegistrationId, HighWaterMark>>,
    /// Thread currently holding `marks`, if any.
    ticking: Mutex<Option<ThreadId>>,
    stopped: AtomicBool,
    ticks: AtomicU64,
}

/// Clears `PollerCore::ticking` when the tick ends, panicking or not.
struct TickingGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> TickingGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        TickingGuard(slot)
    }
}

impl Drop for TickingGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl PollerCore {
    pub fn new(source: Arc<dyn EventSource>, order: EventOrder) -> Self {
        Self {
            source,
            registry: Arc::new(ListenerRegistry::new()),
            order,
            marks: Mutex::new(HashMap::new()),
            ticking: Mutex::new(None),
            stopped: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Enter the terminal state. Returns false if already stopped.
    pub fn mark_stopped(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    /// Run a tick, waiting for any tick already in progress.
    pub fn tick(&self) -> Option<TickStats> {
        if self.is_stopped() {
            return None;
        }
        let mut marks = self.marks.lock();
        let _ticking = TickingGuard::enter(&self.ticking);
        Some(self.run_tick(&mut marks))
    }

    /// Run a tick unless one is already in progress.
    pub fn try_tick(&self) -> Option<TickStats> {
        if self.is_stopped() {
            return None;
        }
        let mut marks = self.marks.try_lock()?;
        let _ticking = TickingGuard::enter(&self.ticking);
        Some(self.run_tick(&mut marks))
    }

    /// Whether the calling thread is inside a tick (e.g. an inline callback).
    pub fn ticking_on_current_thread(&self) -> bool {
        *self.ticking.lock() == Some(thread::current().id())
    }

    fn run_tick(&self, marks: &mut HashMap<RegistrationId, HighWaterMark>) -> TickStats {
        let mut stats = TickStats {
            tick: self.ticks.fetch_add(1, Ordering::Relaxed) + 1,
            ..Default::default()
        };
        if self.is_stopped() {
            return stats;
        }

        let snapshot = self.registry.snapshot();
        let plans: Vec<Plan> = snapshot
            .iter()
            .filter(|r| r.is_active())
            .map(|r| Plan {
                registration: Arc::clone(r),
                window: r.listener().window(),
            })
            .collect();
        stats.listeners = plans.len();

        // Marks of registrations that are gone are never needed again.
        let live: HashSet<RegistrationId> = plans.iter().map(|p| p.registration.id()).collect();
        marks.retain(|id, _| live.contains(id));
        for plan in &plans {
            marks
                .entry(plan.registration.id())
                .or_insert_with(|| HighWaterMark::for_listener(plan.registration.listener()));
        }

        let scopes = derive_scopes(plans.iter().filter_map(|plan| {
            let listener = plan.registration.listener();
            let mark = marks.get(&plan.registration.id())?;
            Some(Interest {
                stream: listener.stream(),
                kind: listener.kind(),
                from: mark.lower_bound(listener, &plan.window),
                end: plan.window.end,
            })
        }));
        stats.scopes = scopes.len();
        if scopes.is_empty() {
            trace!(tick = stats.tick, listeners = stats.listeners, "Nothing to poll");
            return stats;
        }

        let mut events = match self.source.query(&scopes) {
            Ok(events) => events,
            Err(e) => {
                warn!(tick = stats.tick, error = %e, "Event query failed, retrying next tick");
                stats.source_failed = true;
                return stats;
            }
        };
        stats.events = events.len();
        events.sort_by(|a, b| (self.order)(a, b));

        // Matching uses the marks as they were at tick start; progress made
        // during the batch is collected here and committed afterwards.
        let mut advances: HashMap<RegistrationId, HighWaterMark> = HashMap::new();
        let mut finished: HashSet<RegistrationId> = HashSet::new();

        'events: for event in &events {
            for plan in &plans {
                if self.is_stopped() {
                    break 'events;
                }
                let registration = &plan.registration;
                let id = registration.id();
                if finished.contains(&id) || !registration.is_active() {
                    continue;
                }
                let Some(mark) = marks.get(&id) else {
                    continue;
                };
                if !matches(registration.listener(), event, &plan.window, mark) {
                    continue;
                }

                let outcome = dispatch(registration, event, &self.registry);
                if outcome.is_delivered() {
                    stats.deliveries += 1;
                    advances
                        .entry(id)
                        .or_insert_with(|| HighWaterMark::for_listener(registration.listener()))
                        .advance(event.group_id, event.timestamp);
                } else {
                    stats.failures += 1;
                }
                if outcome == (DispatchOutcome::Delivered { done: true }) {
                    finished.insert(id);
                }
            }
        }

        for plan in &plans {
            let id = plan.registration.id();
            if finished.contains(&id) && self.registry.remove_id(id) {
                stats.removed += 1;
                debug!(
                    listener = plan.registration.listener().name(),
                    registration = %id,
                    "Listener finished, unregistered"
                );
            }

            let Some(advance) = advances.remove(&id) else {
                continue;
            };
            // A listener unregistered during the tick keeps no progress, so
            // registering it again replays from its start time.
            if plan.registration.is_active() {
                if let Some(mark) = marks.get_mut(&id) {
                    mark.merge(&advance);
                }
            } else {
                marks.remove(&id);
            }
        }

        if stats.events > 0 || stats.failures > 0 {
            debug!(
                tick = stats.tick,
                listeners = stats.listeners,
                events = stats.events,
                deliveries = stats.deliveries,
                failures = stats.failures,
                removed = stats.removed,
                "Poll tick complete"
            );
        }
        stats
    }
}
