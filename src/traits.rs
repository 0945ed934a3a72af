//! The [PreviewFetcher] trait is responsible for producing previews the caches don't have yet.
//!
//! The caches never render or decode anything themselves; they only decide when a fetcher needs to run and remember
//! what it produced.  Hosts which expose rendering as named remote commands can implement [Invoke] instead and wrap it
//! in an [InvokeFetcher](crate::InvokeFetcher).
use async_trait::async_trait;

use crate::*;

/// Produce the expensive things we cache.
///
/// Timeouts, if wanted, belong here: a fetch which never finishes keeps its key marked in flight forever.
#[async_trait]
pub trait PreviewFetcher: Send + Sync + 'static {
    /// Render the preview of a cursor file, as an encoded image string.
    async fn library_preview(&self, path: &str) -> Result<String, FetchError>;

    /// Render the preview of a named system cursor, which has no file.
    async fn system_preview(&self, name: &str) -> Result<String, FetchError>;

    /// Decode every frame of an animated cursor file.
    async fn animation_data(&self, path: &str) -> Result<AnimationData, FetchError>;
}

/// Call a named command on the host with JSON arguments.
#[async_trait]
pub trait Invoke: Send + Sync + 'static {
    async fn invoke(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, FetchError>;
}
