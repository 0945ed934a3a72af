//! Batch preloading: warm the caches for a list of cursors before anything asks for them.
//!
//! Each cursor resolves to one of three targets, by its image path:
//!
//! - A path ending in `.ani` (any case) is an animation, keyed by path.
//! - Any other path is a library cursor, keyed by path.
//! - No path at all is a system cursor, keyed by `system:<name>`.
//!
//! Cursors which are already cached or already being fetched are skipped.  Static previews are awaited as a batch;
//! animations are left running in the background, because decoding them is slow and nobody should wait on it.  Failures
//! are logged and otherwise ignored, leaving the cursor uncached for a later on-demand fetch.
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::*;

pub const ANIMATION_EXTENSION: &str = ".ani";
pub const SYSTEM_KEY_PREFIX: &str = "system:";

/// A cursor the host would like previewed soon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPreloadDescriptor {
    pub name: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Where a preloaded cursor comes from, and so which cache and fetch it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadTarget<'a> {
    Animated { path: &'a str },
    Library { path: &'a str },
    System { name: &'a str },
}

pub fn is_animation_path(path: &str) -> bool {
    let path = path.as_bytes();
    let ext = ANIMATION_EXTENSION.as_bytes();
    path.len() >= ext.len() && path[path.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// The static cache key for a system cursor.
pub fn system_key(name: &str) -> String {
    format!("{}{}", SYSTEM_KEY_PREFIX, name)
}

impl CursorPreloadDescriptor {
    pub fn new(name: impl Into<String>, image_path: Option<String>) -> CursorPreloadDescriptor {
        CursorPreloadDescriptor {
            name: name.into(),
            image_path,
        }
    }

    pub fn target(&self) -> PreloadTarget<'_> {
        match self.image_path.as_deref() {
            Some(path) if is_animation_path(path) => PreloadTarget::Animated { path },
            Some(path) => PreloadTarget::Library { path },
            None => PreloadTarget::System { name: &self.name },
        }
    }
}

impl PreloadTarget<'_> {
    pub fn cache_key(&self) -> String {
        match *self {
            PreloadTarget::Animated { path } | PreloadTarget::Library { path } => path.to_string(),
            PreloadTarget::System { name } => system_key(name),
        }
    }
}

impl PreviewCache {
    /// Start fetches for every cursor not already cached or in flight.
    ///
    /// Resolves once the static previews started by this call have finished, successfully or not.  Animations started
    /// here may still be decoding afterwards.
    pub async fn preload_batch<F>(&self, descriptors: &[CursorPreloadDescriptor], fetcher: Arc<F>)
    where
        F: PreviewFetcher + ?Sized,
    {
        let mut waiting: Vec<BoxFuture<'static, ()>> = vec![];

        for descriptor in descriptors {
            let target = descriptor.target();
            let key = target.cache_key();

            match target {
                PreloadTarget::Animated { path } => {
                    let fetcher = fetcher.clone();
                    let path = path.to_string();
                    self.preload_animation(&key, move || async move {
                        fetcher.animation_data(&path).await
                    });
                }
                PreloadTarget::Library { path } => {
                    let fetcher = fetcher.clone();
                    let path = path.to_string();
                    waiting.extend(self.preload_static(&key, move || async move {
                        fetcher.library_preview(&path).await
                    }));
                }
                PreloadTarget::System { name } => {
                    let fetcher = fetcher.clone();
                    let name = name.to_string();
                    waiting.extend(self.preload_static(&key, move || async move {
                        fetcher.system_preview(&name).await
                    }));
                }
            }
        }

        if !waiting.is_empty() {
            tracing::debug!(count = waiting.len(), "waiting on static preview preloads");
        }
        join_all(waiting).await;
    }

    /// Start a static preview fetch unless it's cached or in flight, returning something to wait on if we started one.
    fn preload_static<S, Fut>(&self, key: &str, start: S) -> Option<BoxFuture<'static, ()>>
    where
        S: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String, FetchError>> + Send + 'static,
    {
        if self.previews.get_cached(key).is_some() {
            return None;
        }

        let (request, started) = self.previews.join_or_start(key, || {
            let fetch = start();
            let key = key.to_string();
            async move {
                fetch.await.map_err(|e| {
                    tracing::warn!(key = %key, error = %e, "failed to preload cursor preview");
                    e
                })
            }
        });
        if !started {
            return None;
        }

        tracing::debug!(key, "preloading cursor preview");
        Some(request.map(|_| ()).boxed())
    }

    /// Start an animation fetch unless it's cached or in flight, and leave it to run.
    fn preload_animation<S, Fut>(&self, key: &str, start: S)
    where
        S: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AnimationData, FetchError>> + Send + 'static,
    {
        if self.animations.get_cached(key).is_some() {
            return;
        }

        let (_, started) = self.animations.join_or_start(key, || {
            let fetch = start();
            let key = key.to_string();
            async move {
                fetch.await.map_err(|e| {
                    tracing::debug!(key = %key, error = %e, "failed to preload animated cursor");
                    e
                })
            }
        });
        if started {
            tracing::debug!(key, "preloading animated cursor in the background");
        }
    }
}

/// Preload through a host's generic command interface.  See [PreviewCache::preload_batch].
pub async fn preload_cursor_previews<I: Invoke>(
    cache: &PreviewCache,
    descriptors: &[CursorPreloadDescriptor],
    invoke: I,
) {
    cache
        .preload_batch(descriptors, Arc::new(InvokeFetcher::new(invoke)))
        .await
}
