//! Copy-on-write listener registry.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::types::Listener;

/// Identifies one registration of a listener.
///
/// Registering the same listener again after removing it yields a new id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(pub u64);

impl fmt::Debug for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistrationId({})", self.0)
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A listener entry in the registry.
pub struct Registration {
    id: RegistrationId,
    listener: Listener,
    /// Cleared on removal, so snapshots taken earlier stop delivering to it.
    active: AtomicBool,
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("listener", &self.listener.name())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Point-in-time view of the registry. Unaffected by later mutations.
pub type Snapshot = Arc<Vec<Arc<Registration>>>;

/// Thread-safe set of registered listeners.
///
/// Readers take a cheap [`Snapshot`]; writers copy the entry list only when a
/// snapshot is still alive.
pub struct ListenerRegistry {
    entries: RwLock<Snapshot>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    ///
    /// Returns the new registration id, or None if the listener is already
    /// registered.
    pub fn add(&self, listener: &Listener) -> Option<RegistrationId> {
        let mut entries = self.entries.write();
        if entries.iter().any(|r| r.listener.same_as(listener)) {
            return None;
        }

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        Arc::make_mut(&mut *entries).push(Arc::new(Registration {
            id,
            listener: listener.clone(),
            active: AtomicBool::new(true),
        }));
        Some(id)
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Listener) -> bool {
        self.remove_where(|r| r.listener.same_as(listener))
    }

    /// Unregister by registration id. Returns false if already gone.
    pub fn remove_id(&self, id: RegistrationId) -> bool {
        self.remove_where(|r| r.id == id)
    }

    fn remove_where<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Registration) -> bool,
    {
        let mut entries = self.entries.write();
        let Some(pos) = entries.iter().position(|r| predicate(&**r)) else {
            return false;
        };
        let removed = Arc::make_mut(&mut *entries).remove(pos);
        removed.deactivate();
        true
    }

    /// Remove everything. Returns how many registrations were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        for registration in entries.iter() {
            registration.deactivate();
        }
        let count = entries.len();
        *entries = Arc::new(Vec::new());
        count
    }

    /// Current registrations, safe to iterate while others mutate the registry.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read())
    }

    /// Registration id of a listener, if registered.
    pub fn registration_id(&self, listener: &Listener) -> Option<RegistrationId> {
        self.entries
            .read()
            .iter()
            .find(|r| r.listener.same_as(listener))
            .map(|r| r.id)
    }

    pub fn contains(&self, listener: &Listener) -> bool {
        self.registration_id(listener).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
