//! Caching and request deduplication for cursor previews which are expensive to produce.
//!
//! Rendering a cursor file to an image, or decoding every frame of an animated cursor, is slow enough that a UI
//! shouldn't do it twice for the same cursor, and shouldn't start a second render while the first is still running.
//! This crate provides the pieces for that:
//!
//! [TimedCache] is a small capacity-bounded map whose entries expire a fixed time after they were written.  It reads
//! the time from an injected [Clock], so expiry can be tested without sleeping.  When full it evicts the oldest write.
//!
//! [PendingRequestTracker] remembers the fetches currently in flight, so that a second request for the same key joins
//! the first instead of starting its own.  Tracked fetches run to completion in the background via a [TaskSpawner] and
//! remove themselves when done.
//!
//! [PreviewCache] combines two of each, one pair for static previews and one for animations, and adds batch preloading
//! through [PreviewCache::preload_batch]:
//!
//! - Anything already cached or already in flight is skipped.
//! - Static previews are awaited as a batch.
//! - Animations are left to decode in the background.
//! - Failures are logged and leave the cursor uncached.
//!
//! To use this crate, implement [PreviewFetcher] (or [Invoke], if the host exposes rendering as named commands), then
//! build a [PreviewCache] from a [PreviewCacheConfig].
mod animation;
mod clock;
mod error;
mod invoke_fetcher;
mod pending;
mod preload;
mod preview_cache;
mod runtime;
mod timed_cache;
mod traits;

pub use animation::*;
pub use clock::*;
pub use error::*;
pub use invoke_fetcher::*;
pub use pending::*;
pub use preload::*;
pub use preview_cache::*;
pub use runtime::*;
pub use timed_cache::*;
pub use traits::*;
