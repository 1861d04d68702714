//! Poller control handle and background driver.

use crate::error::Result;
use crate::listeners::Listener;
use crate::source::EventSource;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::{timestamp_order, EventOrder, PollerConfig, Schedule};
use super::tick::{PollerCore, TickStats};

struct Shared {
    core: Arc<PollerCore>,
    config: PollerConfig,
    /// Dropping the sender wakes and ends the background thread.
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: stop ticking, but don't block the dropping
        // thread on the background one.
        if self.core.mark_stopped() {
            self.core.registry().clear();
            debug!(thread = %self.config.thread_name, "Poller dropped without stop");
        }
        drop(self.stop_tx.lock().take());
    }
}

/// Handle to a running poller.
///
/// Clones share the same poller. Pollers are independent of each other.
///
/// Dropping the last handle stops the poller. A callback that keeps a clone
/// keeps the poller alive through its own registration, so callbacks should
/// hold a [`WeakPoller`] from [`EventPoller::downgrade`] instead, or the owner
/// must call [`stop`](EventPoller::stop).
///
/// ```ignore
/// let source = Arc::new(InMemoryEventSource::new());
/// let poller = EventPoller::create(source.clone(), PollerConfig::default())?;
///
/// poller.register_listener(
///     &Listener::builder(EventKind::Process, |event| {
///         println!("process {:?} at {}", event.pid, event.timestamp);
///         event.is_ended
///     })
///     .stream(StreamId(1))
///     .build(),
/// )?;
/// ```
#[derive(Clone)]
pub struct EventPoller {
    shared: Arc<Shared>,
}

impl EventPoller {
    /// Create a poller delivering events in ascending timestamp order.
    pub fn create(source: Arc<dyn EventSource>, config: PollerConfig) -> Result<Self> {
        Self::create_with_order(source, config, timestamp_order())
    }

    /// Create a poller with a custom batch ordering.
    pub fn create_with_order(
        source: Arc<dyn EventSource>,
        config: PollerConfig,
        order: EventOrder,
    ) -> Result<Self> {
        config.validate()?;
        let core = Arc::new(PollerCore::new(source, order));

        let (stop_tx, worker) = match config.schedule {
            Schedule::Background => {
                let (tx, rx) = bounded::<()>(1);
                let weak = Arc::downgrade(&core);
                let period = config.period;
                let handle = thread::Builder::new()
                    .name(config.thread_name.clone())
                    .spawn(move || run_background(weak, rx, period))?;
                (Some(tx), Some(handle))
            }
            Schedule::Manual => (None, None),
        };

        info!(
            period = ?config.period,
            schedule = ?config.schedule,
            "Poller started"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                core,
                config,
                stop_tx: Mutex::new(stop_tx),
                worker: Mutex::new(worker),
            }),
        })
    }

    /// Add a listener. Registering an already-registered listener is a no-op.
    ///
    /// Fails only on listener misconfiguration. Registering on a stopped
    /// poller is ignored.
    pub fn register_listener(&self, listener: &Listener) -> Result<()> {
        listener.validate()?;

        let core = &self.shared.core;
        if core.is_stopped() {
            warn!(listener = listener.name(), "Poller is stopped, ignoring registration");
            return Ok(());
        }

        match core.registry().add(listener) {
            Some(id) => {
                // Lost a race with stop(), which may already have cleared.
                if core.is_stopped() {
                    core.registry().remove_id(id);
                    warn!(listener = listener.name(), "Poller is stopped, ignoring registration");
                } else {
                    debug!(listener = listener.name(), registration = %id, "Listener registered");
                }
            }
            None => debug!(listener = listener.name(), "Listener already registered"),
        }
        Ok(())
    }

    /// Remove a listener. Returns false if it was not registered.
    ///
    /// Safe from any thread, including from inside a callback. The listener
    /// receives nothing further, even later in the current tick.
    pub fn unregister_listener(&self, listener: &Listener) -> bool {
        let removed = self.shared.core.registry().remove(listener);
        if removed {
            debug!(listener = listener.name(), "Listener unregistered");
        }
        removed
    }

    /// Stop polling and drop every listener. Terminal and idempotent.
    ///
    /// Waits for the background thread to exit, unless called from inside a
    /// tick (an inline callback), on whichever thread runs it.
    pub fn stop(&self) {
        let shared = &self.shared;
        if !shared.core.mark_stopped() {
            return;
        }

        drop(shared.stop_tx.lock().take());
        let cleared = shared.core.registry().clear();
        info!(listeners = cleared, "Poller stopped");

        // The background thread may be blocked on the tick this thread is
        // running (stop from an inline callback under poll_now), so only
        // join it from outside any tick.
        let worker = shared.worker.lock().take();
        if let Some(handle) = worker {
            let current = thread::current().id();
            if handle.thread().id() != current && !shared.core.ticking_on_current_thread() {
                let _ = handle.join();
            }
        }
    }

    /// A handle that does not keep the poller alive.
    pub fn downgrade(&self) -> WeakPoller {
        WeakPoller {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.core.is_stopped()
    }

    /// Run one tick on the calling thread.
    ///
    /// Returns None without doing anything if the poller is stopped or a
    /// tick is already running.
    pub fn poll_now(&self) -> Option<TickStats> {
        self.shared.core.try_tick()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.core.registry().len()
    }

    pub fn is_registered(&self, listener: &Listener) -> bool {
        self.shared.core.registry().contains(listener)
    }

    pub fn config(&self) -> &PollerConfig {
        &self.shared.config
    }
}

/// Non-owning [`EventPoller`] handle, for use inside listener callbacks.
#[derive(Clone)]
pub struct WeakPoller {
    shared: Weak<Shared>,
}

impl WeakPoller {
    /// The poller, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<EventPoller> {
        self.shared.upgrade().map(|shared| EventPoller { shared })
    }
}

/// Fixed-rate tick loop. Exits when stopped or when every handle is gone.
fn run_background(core: Weak<PollerCore>, stop: Receiver<()>, period: Duration) {
    debug!(period = ?period, "Poller thread running");
    loop {
        let started = Instant::now();
        {
            let Some(core) = core.upgrade() else {
                break;
            };
            if core.is_stopped() {
                break;
            }
            core.tick();
        }

        // An overrunning tick is followed immediately by the next one.
        match stop.recv_timeout(period.saturating_sub(started.elapsed())) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Poller thread exiting");
}
