//! The [PendingRequestTracker] remembers which keys have a fetch in flight, so that concurrent requests for the same
//! key share one fetch instead of each starting their own.
//!
//! Entries clean up after themselves: registering a request spawns a small task which drives it to completion and then
//! removes the key, whether the request succeeded or failed.  Nothing else removes entries.
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::*;

type CacheHashMap<V> = HashMap<String, V, ahash::RandomState>;

/// A fetch which any number of callers may await, all seeing the same outcome.
pub type PendingRequest<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

/// Wrap a fetch so that it can be tracked and shared.
pub fn pending_request<T, F>(fetch: F) -> PendingRequest<T>
where
    T: Clone,
    F: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    fetch.boxed().shared()
}

struct Registration<T> {
    /// Distinguishes this registration from a later one under the same key.
    id: u64,
    request: PendingRequest<T>,
}

pub struct PendingRequestTracker<T> {
    pending: Arc<Mutex<CacheHashMap<Registration<T>>>>,
    next_id: AtomicU64,
    spawner: Arc<dyn TaskSpawner>,
}

impl<T: Clone + Send + Sync + 'static> PendingRequestTracker<T> {
    pub fn new(spawner: Arc<dyn TaskSpawner>) -> PendingRequestTracker<T> {
        PendingRequestTracker {
            pending: Default::default(),
            next_id: AtomicU64::new(0),
            spawner,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// The request in flight for `key`.  Awaiting it yields the same outcome as every other holder.
    pub fn get(&self, key: &str) -> Option<PendingRequest<T>> {
        self.pending.lock().get(key).map(|r| r.request.clone())
    }

    /// Track `request` under `key`, replacing anything already tracked there.
    ///
    /// This doesn't check whether a request was already in flight; callers deduplicating with [Self::has] must not
    /// yield between the check and this call.  [Self::get_or_insert_with] does both under one lock.
    pub fn set(&self, key: impl Into<String>, request: PendingRequest<T>) {
        let key = key.into();
        let id = self.register(&mut self.pending.lock(), key.clone(), request.clone());
        self.watch(key, id, request);
    }

    /// Join the request in flight for `key`, or track the one built by `start` if there isn't one.
    ///
    /// The boolean is true if `start` was called.  `start` runs under the tracker's lock, so it should only build the
    /// future, not touch this tracker.
    pub fn get_or_insert_with(
        &self,
        key: &str,
        start: impl FnOnce() -> PendingRequest<T>,
    ) -> (PendingRequest<T>, bool) {
        let (request, id) = {
            let mut guard = self.pending.lock();
            if let Some(r) = guard.get(key) {
                return (r.request.clone(), false);
            }
            let request = start();
            let id = self.register(&mut guard, key.to_string(), request.clone());
            (request, id)
        };

        self.watch(key.to_string(), id, request.clone());
        (request, true)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    fn register(
        &self,
        pending: &mut CacheHashMap<Registration<T>>,
        key: String,
        request: PendingRequest<T>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pending.insert(key, Registration { id, request });
        id
    }

    /// Drive the request to completion in the background, then forget it.
    fn watch(&self, key: String, id: u64, request: PendingRequest<T>) {
        let pending = Arc::downgrade(&self.pending);
        self.spawner.spawn(
            async move {
                // Holders of the request see the outcome, including errors; here we only care that it's over.
                let _ = request.await;

                let pending = match pending.upgrade() {
                    Some(p) => p,
                    None => return,
                };
                let mut guard = pending.lock();
                // A later registration under the same key isn't ours to remove.
                if guard.get(&key).map_or(false, |r| r.id == id) {
                    guard.remove(&key);
                    tracing::trace!(key = %key, "request settled");
                }
            }
            .boxed(),
        );
    }
}
