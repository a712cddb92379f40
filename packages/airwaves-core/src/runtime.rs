//! Background task spawning.
//!
//! Upstream connections, the event loop and the periodic services all run as
//! detached tasks. They are started through [`TaskSpawner`] so the relay does
//! not care which runtime handle it was built on.

use std::future::Future;

/// Spawns detached background tasks.
///
/// Tasks are never joined; they stop via cancellation tokens.
pub trait TaskSpawner: Send + Sync {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// [`TaskSpawner`] backed by a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the handle of the runtime we are currently running on.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
