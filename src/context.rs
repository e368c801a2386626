//! Shared application state, passed explicitly to every operation.
//!
//! There are no process-wide globals: the service layer builds one
//! [`AppContext`] at startup and hands it (behind an `Arc`) to each request
//! handler. Besides making tests trivial to isolate, this keeps the
//! engine's exclusivity visible in the types instead of hidden in a static.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::engine::InferenceEngine;
use crate::reasoning::ReasoningProvider;
use crate::structured::StructuredExtractor;
use crate::template::TemplateStore;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// The engine slot: a pool of size one.
///
/// The vision model is not reentrant and owns the accelerator, so at most
/// one document may drive it at a time. Concurrent documents queue on the
/// slot in the mutex's own wakeup order; there is no additional fairness
/// layer.
pub struct EnginePool {
    slot: Mutex<InferenceEngine>,
}

impl EnginePool {
    pub fn new(engine: InferenceEngine) -> Self {
        Self {
            slot: Mutex::new(engine),
        }
    }

    /// Acquire exclusive use of the engine, waiting for any in-flight
    /// document to release it. The guard is the permit; dropping it
    /// releases the slot.
    pub async fn acquire(&self) -> MutexGuard<'_, InferenceEngine> {
        self.slot.lock().await
    }

    /// Acquire from inside `spawn_blocking`, where awaiting is unavailable.
    ///
    /// Must never be called on an async scheduler thread.
    pub fn acquire_blocking(&self) -> MutexGuard<'_, InferenceEngine> {
        self.slot.blocking_lock()
    }
}

/// Everything a request handler needs, wired once at startup.
pub struct AppContext {
    pub config: PipelineConfig,
    pub engine: Arc<EnginePool>,
    pub templates: Arc<TemplateStore>,
    pub structured: StructuredExtractor,
}

impl AppContext {
    /// Build the context from configuration and a reasoning provider.
    pub fn new(config: PipelineConfig, provider: Arc<dyn ReasoningProvider>) -> Self {
        let templates = Arc::new(TemplateStore::new(&config.templates_dir));
        let engine = Arc::new(EnginePool::new(InferenceEngine::new(config.clone())));
        let structured = StructuredExtractor::new(provider, Arc::clone(&templates));
        Self {
            config,
            engine,
            templates,
            structured,
        }
    }

    /// Load the vision model if it is not already loaded.
    ///
    /// Loading blocks for however long the runner takes to map the weights,
    /// so it runs on the blocking pool while holding the engine slot. Safe
    /// to call again after [`unload_engine`](Self::unload_engine).
    pub async fn load_engine(&self) -> Result<(), PipelineError> {
        let pool = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = pool.acquire_blocking();
            if engine.is_loaded() {
                debug!("Engine already loaded");
                return Ok(());
            }
            engine.load()
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("engine load task panicked: {e}")))?
    }

    /// Unload the vision model, releasing accelerator memory. No-op when
    /// already unloaded.
    pub async fn unload_engine(&self) {
        let mut engine = self.engine.acquire().await;
        engine.unload();
    }

    /// Whether the vision model is currently loaded. Waits for the engine
    /// slot, so during an in-flight document this reports the state as of
    /// that document finishing.
    pub async fn engine_loaded(&self) -> bool {
        self.engine.acquire().await.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{CompletionOptions, ReasoningError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NullProvider;

    #[async_trait]
    impl ReasoningProvider for NullProvider {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            _options: CompletionOptions,
        ) -> Result<String, ReasoningError> {
            Err(ReasoningError::Malformed("stub".into()))
        }
    }

    fn context(dir: &TempDir) -> AppContext {
        let config = PipelineConfig::builder()
            .model_path(dir.path().join("absent-weights"))
            .runner_path(dir.path().join("absent-runner"))
            .templates_dir(dir.path())
            .build()
            .unwrap();
        AppContext::new(config, Arc::new(NullProvider))
    }

    #[tokio::test]
    async fn engine_starts_unloaded_and_load_surfaces_config_errors() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert!(!ctx.engine_loaded().await);

        let err = ctx.load_engine().await.unwrap_err();
        assert!(matches!(err, PipelineError::WeightsNotFound { .. }));
        assert!(!ctx.engine_loaded().await);
    }

    #[tokio::test]
    async fn unload_without_load_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.unload_engine().await;
        assert!(!ctx.engine_loaded().await);
    }

    #[tokio::test]
    async fn engine_slot_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let held = ctx.engine.acquire().await;
        let contender = tokio::time::timeout(Duration::from_millis(50), ctx.engine.acquire());
        assert!(contender.await.is_err(), "second acquire should wait");
        drop(held);

        // Released slot is immediately available again.
        let _reacquired = ctx.engine.acquire().await;
    }
}
