use lru::LruCache;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;

use crate::graph::{NodeId, ResourceResolver};
use crate::Result;

/// Request-scoped LRU memo in front of a [`ResourceResolver`].
///
/// Traversals look the same resource up several times (existence check, URN
/// probing, referrer verification, expansion). Hits and misses are both cached;
/// errors are not. Single-threaded: build one per request and drop it afterwards.
pub struct ResolveCache<R> {
    inner: R,
    cache: Option<RefCell<LruCache<NodeId, Option<Value>>>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<R: ResourceResolver> ResolveCache<R> {
    /// A capacity of 0 disables caching; every lookup goes to `inner`.
    pub fn new(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            cache: NonZeroUsize::new(capacity).map(|cap| RefCell::new(LruCache::new(cap))),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// `(hits, misses)` so far.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits.get(), self.misses.get())
    }
}

impl<R: ResourceResolver> ResourceResolver for ResolveCache<R> {
    fn get(&self, resource_type: &str, id: &str) -> Result<Option<Value>> {
        let Some(cache) = &self.cache else {
            return self.inner.get(resource_type, id);
        };

        let key = NodeId::new(resource_type, id);
        if let Some(cached) = cache.borrow_mut().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(cached.clone());
        }

        self.misses.set(self.misses.get() + 1);
        let fetched = self.inner.get(resource_type, id)?;
        cache.borrow_mut().put(key, fetched.clone());
        Ok(fetched)
    }
}
