//! The [PreviewCache] holds rendered cursor previews and decoded animations, and makes sure each is fetched at most
//! once at a time.
//!
//! It is made of two lanes, one per kind of artifact:
//!
//! - Static previews: encoded image strings, keyed by file path or by `system:<name>` for cursors without a file.
//! - Animations: [AnimationData] decoded from animated cursor files, keyed by file path.
//!
//! Each lane pairs a [TimedCache] with a [PendingRequestTracker].  A miss either joins the fetch already in flight for
//! the key or starts a new one, whose value is written to the cache when it succeeds.
//!
//! Build one with [PreviewCache::new] at startup and share it, usually behind an `Arc`.  Instances share nothing, so
//! tests are free to build their own with a [ManualClock].
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::*;

pub const DEFAULT_EXPIRATION_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_PREVIEW_MAX_SIZE: usize = 200;
pub const DEFAULT_ANI_MAX_SIZE: usize = 100;

#[derive(Clone, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct PreviewCacheConfig {
    /// How long an entry stays usable after it was written.
    #[builder(default = "DEFAULT_EXPIRATION_MS")]
    pub expiration_ms: u64,
    /// Maximum number of static previews.
    #[builder(default = "DEFAULT_PREVIEW_MAX_SIZE")]
    pub preview_max_size: usize,
    /// Maximum number of decoded animations.
    #[builder(default = "DEFAULT_ANI_MAX_SIZE")]
    pub ani_max_size: usize,
    #[builder(default = "Arc::new(SystemClock) as Arc<dyn Clock>")]
    pub clock: Arc<dyn Clock>,
}

impl PreviewCacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.preview_max_size == Some(0) {
            return Err("preview_max_size must be at least 1".into());
        }
        if self.ani_max_size == Some(0) {
            return Err("ani_max_size must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for PreviewCacheConfig {
    fn default() -> PreviewCacheConfig {
        PreviewCacheConfig {
            expiration_ms: DEFAULT_EXPIRATION_MS,
            preview_max_size: DEFAULT_PREVIEW_MAX_SIZE,
            ani_max_size: DEFAULT_ANI_MAX_SIZE,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for PreviewCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewCacheConfig")
            .field("expiration_ms", &self.expiration_ms)
            .field("preview_max_size", &self.preview_max_size)
            .field("ani_max_size", &self.ani_max_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ani_size: usize,
    pub ani_max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedCacheStats {
    #[serde(flatten)]
    pub cache: CacheStats,
    pub pending_requests: usize,
    pub pending_ani_requests: usize,
}

/// A cache plus the fetches in flight for it.
pub(crate) struct CacheLane<V> {
    cache: Arc<Mutex<TimedCache<String, V>>>,
    pub(crate) pending: PendingRequestTracker<Arc<V>>,
}

impl<V: Send + Sync + 'static> CacheLane<V> {
    fn new(
        config: &PreviewCacheConfig,
        max_size: usize,
        spawner: Arc<dyn TaskSpawner>,
    ) -> CacheLane<V> {
        CacheLane {
            cache: Arc::new(Mutex::new(TimedCache::new(
                config.expiration_ms,
                max_size,
                config.clock.clone(),
            ))),
            pending: PendingRequestTracker::new(spawner),
        }
    }

    pub(crate) fn get_cached(&self, key: &str) -> Option<Arc<V>> {
        self.cache.lock().get(key)
    }

    fn set_cached(&self, key: String, value: V) {
        self.cache.lock().set(key, value);
    }

    /// Join the fetch in flight for `key`, or start the one `start` builds.  Either way, a successful fetch ends up in
    /// the cache.
    ///
    /// The boolean is true if `start` was called.
    pub(crate) fn join_or_start<S, F>(&self, key: &str, start: S) -> (PendingRequest<Arc<V>>, bool)
    where
        S: FnOnce() -> F,
        F: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        self.pending.get_or_insert_with(key, || {
            let fetch = start();
            let cache = self.cache.clone();
            let key = key.to_string();
            pending_request(async move {
                let value = Arc::new(fetch.await?);
                cache.lock().set_shared(key, value.clone());
                Ok(value)
            })
        })
    }

    async fn get_or_fetch<S, F>(&self, key: &str, start: S) -> Result<Arc<V>, FetchError>
    where
        S: FnOnce() -> F,
        F: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        if let Some(v) = self.get_cached(key) {
            return Ok(v);
        }

        let (request, _) = self.join_or_start(key, start);
        request.await
    }

    fn len(&self) -> usize {
        self.cache.lock().len()
    }

    fn max_size(&self) -> usize {
        self.cache.lock().max_size()
    }

    fn clear(&self) {
        self.cache.lock().clear();
    }
}

pub struct PreviewCache {
    config: PreviewCacheConfig,
    pub(crate) previews: CacheLane<String>,
    pub(crate) animations: CacheLane<AnimationData>,
}

impl PreviewCache {
    /// Build a cache.  `spawner` runs fetches nobody is waiting on, such as background preloads.
    pub fn new(config: PreviewCacheConfig, spawner: Arc<dyn TaskSpawner>) -> PreviewCache {
        PreviewCache {
            previews: CacheLane::new(&config, config.preview_max_size, spawner.clone()),
            animations: CacheLane::new(&config, config.ani_max_size, spawner),
            config,
        }
    }

    /// Build a cache which runs background fetches on the current Tokio runtime.
    #[cfg(feature = "tokio")]
    pub fn with_tokio(
        config: PreviewCacheConfig,
    ) -> Result<PreviewCache, tokio::runtime::TryCurrentError> {
        let spawner = TokioSpawner::current()?;
        Ok(PreviewCache::new(config, Arc::new(spawner)))
    }

    pub fn config(&self) -> &PreviewCacheConfig {
        &self.config
    }

    pub fn get_cached_preview(&self, key: &str) -> Option<Arc<String>> {
        self.previews.get_cached(key)
    }

    pub fn set_cached_preview(&self, key: impl Into<String>, value: impl Into<String>) {
        self.previews.set_cached(key.into(), value.into());
    }

    /// Forget a static preview, for example because its file changed.
    pub fn invalidate_preview(&self, key: &str) {
        self.previews.cache.lock().remove(key);
    }

    pub fn get_cached_ani_preview(&self, key: &str) -> Option<Arc<AnimationData>> {
        self.animations.get_cached(key)
    }

    pub fn set_cached_ani_preview(&self, key: impl Into<String>, value: AnimationData) {
        self.animations.set_cached(key.into(), value);
    }

    /// Empty both caches.  Fetches in flight are unaffected and will still write their results.
    pub fn clear_all(&self) {
        self.previews.clear();
        self.animations.clear();
    }

    pub fn has_pending_request(&self, key: &str) -> bool {
        self.previews.pending.has(key)
    }

    pub fn get_pending_request(&self, key: &str) -> Option<PendingRequest<Arc<String>>> {
        self.previews.pending.get(key)
    }

    pub fn set_pending_request(
        &self,
        key: impl Into<String>,
        request: PendingRequest<Arc<String>>,
    ) {
        self.previews.pending.set(key, request);
    }

    pub fn has_pending_ani_request(&self, key: &str) -> bool {
        self.animations.pending.has(key)
    }

    pub fn get_pending_ani_request(&self, key: &str) -> Option<PendingRequest<Arc<AnimationData>>> {
        self.animations.pending.get(key)
    }

    pub fn set_pending_ani_request(
        &self,
        key: impl Into<String>,
        request: PendingRequest<Arc<AnimationData>>,
    ) {
        self.animations.pending.set(key, request);
    }

    /// Get a static preview, fetching it with `start` if it isn't cached and nobody else is already fetching it.
    ///
    /// Fetch errors are returned to every caller waiting on that fetch, and nothing is cached.
    pub async fn get_or_fetch_preview<S, F>(
        &self,
        key: &str,
        start: S,
    ) -> Result<Arc<String>, FetchError>
    where
        S: FnOnce() -> F,
        F: Future<Output = Result<String, FetchError>> + Send + 'static,
    {
        self.previews.get_or_fetch(key, start).await
    }

    /// Like [Self::get_or_fetch_preview], for animations.
    pub async fn get_or_fetch_ani_preview<S, F>(
        &self,
        key: &str,
        start: S,
    ) -> Result<Arc<AnimationData>, FetchError>
    where
        S: FnOnce() -> F,
        F: Future<Output = Result<AnimationData, FetchError>> + Send + 'static,
    {
        self.animations.get_or_fetch(key, start).await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.previews.len(),
            max_size: self.previews.max_size(),
            ani_size: self.animations.len(),
            ani_max_size: self.animations.max_size(),
        }
    }

    pub fn extended_stats(&self) -> ExtendedCacheStats {
        ExtendedCacheStats {
            cache: self.stats(),
            pending_requests: self.previews.pending.len(),
            pending_ani_requests: self.animations.pending.len(),
        }
    }
}
