//! Identity tracking for managed instances
//!
//! Two objects are the same instance only if they are the same allocation.
//! Entries hold a weak reference, so tracking never keeps an instance alive,
//! and a dead entry whose address is reused by a new allocation is replaced
//! rather than mistaken for it.

use crate::describe::AnyInstance;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Stable identifier for one tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct Tracked {
    handle: Handle,
    instance: Weak<AnyInstance>,
}

impl Tracked {
    fn is_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }
}

#[derive(Default)]
pub struct IdentityTracker {
    entries: DashMap<usize, Tracked>,
    next_handle: AtomicU64,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance`; false if it is already tracked.
    pub fn add<T>(&self, instance: &Arc<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.insert(instance).is_some()
    }

    /// Register `instance` and return its new handle, or `None` if it is
    /// already tracked.
    pub fn insert<T>(&self, instance: &Arc<T>) -> Option<Handle>
    where
        T: Send + Sync + 'static,
    {
        let erased: Arc<AnyInstance> = Arc::clone(instance) as Arc<AnyInstance>;
        self.insert_erased(&erased)
    }

    pub(crate) fn insert_erased(&self, instance: &Arc<AnyInstance>) -> Option<Handle> {
        self.purge();
        let weak = Arc::downgrade(instance);
        match self.entries.entry(address(instance)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_alive() && Weak::ptr_eq(&occupied.get().instance, &weak) {
                    return None;
                }
                let handle = self.next();
                occupied.insert(Tracked {
                    handle,
                    instance: weak,
                });
                Some(handle)
            }
            Entry::Vacant(vacant) => {
                let handle = self.next();
                vacant.insert(Tracked {
                    handle,
                    instance: weak,
                });
                Some(handle)
            }
        }
    }

    pub fn contains<T>(&self, instance: &Arc<T>) -> bool
    where
        T: Send + Sync + 'static,
    {
        let erased: Arc<AnyInstance> = Arc::clone(instance) as Arc<AnyInstance>;
        let weak = Arc::downgrade(&erased);
        self.entries
            .get(&address(&erased))
            .is_some_and(|tracked| tracked.is_alive() && Weak::ptr_eq(&tracked.instance, &weak))
    }

    /// Stop tracking the instance registered under `handle`.
    pub fn release(&self, handle: Handle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, tracked| tracked.handle != handle);
        self.entries.len() < before
    }

    /// Number of live tracked instances
    pub fn len(&self) -> usize {
        self.purge();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose instance has been deallocated.
    pub fn purge(&self) {
        self.entries.retain(|_, tracked| tracked.is_alive());
    }

    fn next(&self) -> Handle {
        Handle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

fn address(instance: &Arc<AnyInstance>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}
