use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{CacheError, CacheResult};
use crate::key::ResourceKey;

/// Borrowed reference to a cached resource.
///
/// The cache keeps the only owning reference. Access goes through
/// [`Handle::with`], which borrows the resource for the duration of a
/// closure, so releasing the entry (or shutting the cache down) destroys
/// the object and every handle to it reports [`CacheError::Released`]
/// from then on.
pub struct Handle<T> {
    key: ResourceKey,
    resource: Weak<T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(key: ResourceKey, resource: &Arc<T>) -> Self {
        Self {
            key,
            resource: Arc::downgrade(resource),
        }
    }

    /// The normalized key the resource is cached under.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Run `f` with the resource borrowed.
    ///
    /// A release that races with `f` takes effect when `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> CacheResult<R> {
        let resource = self
            .resource
            .upgrade()
            .ok_or_else(|| CacheError::Released(self.key.clone()))?;
        Ok(f(&resource))
    }

    pub fn is_live(&self) -> bool {
        self.resource.strong_count() > 0
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            resource: Weak::clone(&self.resource),
        }
    }
}

/// Two handles are equal when they refer to the same cached object.
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("live", &self.is_live())
            .finish()
    }
}
