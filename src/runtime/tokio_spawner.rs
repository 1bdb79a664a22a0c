//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::{EngineError, Spawn};

/// Tokio-based spawner that runs dispatched executions and engine loops.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when called outside a tokio runtime.
    pub fn current() -> Result<Self, EngineError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| EngineError::InvalidConfig(format!("no tokio runtime: {e}")))
    }

    /// Underlying runtime handle.
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
