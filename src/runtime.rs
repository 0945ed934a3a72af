//! Spawning of the bookkeeping tasks which drive tracked requests to completion.
use futures_util::future::BoxFuture;

/// A trait for spawning a future onto an asynchronous runtime.
///
/// Tracked requests start running as soon as they are registered, whether or not anyone awaits them; the spawner is
/// what runs them.
pub trait TaskSpawner: Send + Sync + 'static {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> TokioSpawner {
        TokioSpawner(handle)
    }

    /// A spawner for the runtime we are currently running inside, if any.
    pub fn current() -> Result<TokioSpawner, tokio::runtime::TryCurrentError> {
        tokio::runtime::Handle::try_current().map(TokioSpawner)
    }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        // Completion is observed through the tracked request itself, never through the join handle.
        drop(self.0.spawn(future));
    }
}

#[cfg(all(test, feature = "tokio"))]
mod tests {
    use super::*;

    use futures_util::FutureExt;
    use tokio::sync::oneshot;

    #[test]
    fn no_spawner_outside_a_runtime() {
        assert!(TokioSpawner::current().is_err());
    }

    #[tokio::test]
    async fn spawned_tasks_run() {
        let spawner = TokioSpawner::current().expect("Inside a runtime");
        let (tx, rx) = oneshot::channel();
        spawner.spawn(
            async move {
                let _ = tx.send(5);
            }
            .boxed(),
        );
        assert_eq!(rx.await.unwrap(), 5);
    }
}
