//! Keyed storage for one resource kind.
//!
//! A key maps either to a finished resource or to an in-flight load. The
//! table lock is only held to look up or swap a slot, never while a load
//! runs; callers that miss on a key someone else is loading wait on that
//! load's [`PendingLoad`] instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CacheError, CacheResult};
use crate::key::ResourceKey;

use super::ResourceKind;

enum Slot<T> {
    Ready(Arc<T>),
    Loading(Arc<PendingLoad<T>>),
}

/// Outcome of an in-flight load, shared with every caller waiting on it.
struct PendingLoad<T> {
    result: Mutex<Option<CacheResult<Arc<T>>>>,
    done: Condvar,
}

impl<T> PendingLoad<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn resolve(&self, result: CacheResult<Arc<T>>) {
        *self.result.lock() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self, key: &ResourceKey, timeout: Option<Duration>) -> CacheResult<Arc<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut result = self.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut result, deadline).timed_out() && result.is_none() {
                        return Err(CacheError::Timeout(key.clone()));
                    }
                }
                None => self.done.wait(&mut result),
            }
        }
    }
}

/// Resolves a load that never reported back, e.g. because it panicked.
struct LoadGuard<'a, T> {
    table: &'a ResourceTable<T>,
    key: &'a ResourceKey,
    pending: &'a Arc<PendingLoad<T>>,
    finished: bool,
}

impl<T> LoadGuard<'_, T> {
    fn finish(mut self, result: CacheResult<T>) -> CacheResult<Arc<T>> {
        self.finished = true;
        let result = result.map(Arc::new);
        {
            let mut slots = self.table.slots.lock();
            match &result {
                Ok(resource) => {
                    slots.insert(self.key.clone(), Slot::Ready(Arc::clone(resource)));
                }
                Err(_) => {
                    slots.remove(self.key);
                }
            }
        }
        self.pending.resolve(result.clone());
        result
    }
}

impl<T> Drop for LoadGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::error!("loading {} '{}' panicked", self.table.kind, self.key);
        self.table.slots.lock().remove(self.key);
        self.pending
            .resolve(Err(CacheError::LoadPanicked(self.key.clone())));
    }
}

pub(crate) struct ResourceTable<T> {
    kind: ResourceKind,
    slots: Mutex<HashMap<ResourceKey, Slot<T>>>,
}

impl<T> ResourceTable<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a finished resource. Keys still loading read as absent.
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<T>> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(resource)) => Some(Arc::clone(resource)),
            _ => None,
        }
    }

    /// Return the resource for `key`, running `load` if nobody has yet.
    ///
    /// At most one `load` runs per key at a time. Callers arriving while it
    /// runs wait for its outcome, bounded by `timeout`. A failed load leaves
    /// no slot behind.
    pub fn get_or_load<F>(
        &self,
        key: &ResourceKey,
        timeout: Option<Duration>,
        load: F,
    ) -> CacheResult<Arc<T>>
    where
        F: FnOnce() -> CacheResult<T>,
    {
        let pending = {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Ready(resource)) => {
                    log::trace!("{} '{}' cache hit", self.kind, key);
                    return Ok(Arc::clone(resource));
                }
                Some(Slot::Loading(pending)) => {
                    let pending = Arc::clone(pending);
                    drop(slots);
                    log::trace!("{} '{}' is loading, waiting", self.kind, key);
                    return pending.wait(key, timeout);
                }
                None => {
                    let pending = Arc::new(PendingLoad::new());
                    slots.insert(key.clone(), Slot::Loading(Arc::clone(&pending)));
                    pending
                }
            }
        };

        log::debug!("{} '{}' cache miss, loading", self.kind, key);
        let guard = LoadGuard {
            table: self,
            key,
            pending: &pending,
            finished: false,
        };
        let result = load();
        if let Err(err) = &result {
            log::warn!("{}", err);
        }
        guard.finish(result)
    }

    /// Store a resource created as part of another table's load.
    pub fn insert_ready(&self, key: ResourceKey, resource: Arc<T>) {
        self.slots.lock().insert(key, Slot::Ready(resource));
    }

    /// Remove a finished resource. In-flight loads are left alone.
    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<T>> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready(_)) => match slots.remove(key) {
                Some(Slot::Ready(resource)) => Some(resource),
                _ => None,
            },
            _ => None,
        }
    }

    /// Remove every finished resource, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| matches!(slot, Slot::Loading(_)));
        before - slots.len()
    }

    /// Number of finished resources.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}
