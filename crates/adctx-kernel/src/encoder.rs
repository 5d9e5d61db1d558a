//! Process-wide embedding function with init-on-first-use and swap-on-demand.
//!
//! Every embed call holds a shared guard on the driver slot for its whole
//! duration; a swap takes the exclusive guard, so it waits for in-flight
//! calls and no call ever sees a half-swapped encoder. This lock is
//! independent of every namespace lock.

use adctx_runtime::embedding::{create_embedding_driver, EmbeddingDriver, EmbeddingError};
use adctx_types::config::EmbeddingSettings;
use adctx_types::error::{AdctxError, AdctxResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

/// Generation of the encoder configured at boot; each swap adds one.
const BOOT_GENERATION: u64 = 1;

type DriverFactory =
    Box<dyn Fn() -> Result<Arc<dyn EmbeddingDriver>, EmbeddingError> + Send + Sync>;

type DriverSlot = Option<Arc<dyn EmbeddingDriver>>;

/// Result of replacing the active encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReport {
    /// Model that answered before the swap; `None` if it was never loaded.
    pub previous_model: Option<String>,
    pub current_model: String,
    pub generation: u64,
}

/// Vectors from one embed call plus the model id of the driver that made
/// them.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
}

pub struct EncoderService {
    factory: DriverFactory,
    slot: RwLock<DriverSlot>,
    generation: AtomicU64,
}

impl EncoderService {
    /// Lazily build the driver described by `settings` on first use.
    pub fn from_settings(settings: EmbeddingSettings) -> Self {
        Self {
            factory: Box::new(move || create_embedding_driver(&settings)),
            slot: RwLock::new(None),
            generation: AtomicU64::new(BOOT_GENERATION),
        }
    }

    /// Start with an already-built driver.
    pub fn with_driver(driver: Arc<dyn EmbeddingDriver>) -> Self {
        let fallback = Arc::clone(&driver);
        Self {
            factory: Box::new(move || Ok(Arc::clone(&fallback))),
            slot: RwLock::new(Some(driver)),
            generation: AtomicU64::new(BOOT_GENERATION),
        }
    }

    /// Generation answering embed calls right now (loaded or not).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Model id of the loaded driver, if any.
    pub async fn model_id(&self) -> Option<String> {
        self.slot.read().await.as_ref().map(|d| d.model_id())
    }

    /// Model id of the active driver, loading it first if needed.
    pub async fn current_model(&self) -> AdctxResult<String> {
        let guard = self.loaded().await?;
        guard
            .as_ref()
            .map(|d| d.model_id())
            .ok_or_else(|| AdctxError::Internal("encoder slot empty after load".to_string()))
    }

    /// Shared guard over a loaded driver, loading it first if needed.
    async fn loaded(&self) -> AdctxResult<RwLockReadGuard<'_, DriverSlot>> {
        {
            let guard = self.slot.read().await;
            if guard.is_some() {
                return Ok(guard);
            }
        }

        let mut guard = self.slot.write().await;
        if guard.is_none() {
            let driver =
                (self.factory)().map_err(|e| AdctxError::EncoderUnavailable(e.to_string()))?;
            info!(
                model = %driver.model_id(),
                dimensions = driver.dimensions(),
                "Encoder loaded"
            );
            *guard = Some(driver);
        }
        Ok(guard.downgrade())
    }

    /// Embed a batch of texts with the active encoder.
    pub async fn embed(&self, texts: &[&str]) -> AdctxResult<Embedded> {
        let guard = self.loaded().await?;
        let driver = guard
            .as_ref()
            .ok_or_else(|| AdctxError::Internal("encoder slot empty after load".to_string()))?;
        let model = driver.model_id();
        let vectors = driver
            .embed(texts)
            .await
            .map_err(|e| AdctxError::EncoderUnavailable(e.to_string()))?;
        if vectors.len() != texts.len() {
            return Err(AdctxError::EncoderUnavailable(format!(
                "encoder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(Embedded { vectors, model })
    }

    /// Replace the active driver. Waits for in-flight embed calls.
    /// Existing chunks are not re-embedded.
    pub async fn swap(&self, driver: Arc<dyn EmbeddingDriver>) -> SwapReport {
        let mut guard = self.slot.write().await;
        let previous_model = guard.as_ref().map(|d| d.model_id());
        let current_model = driver.model_id();
        *guard = Some(driver);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            previous = previous_model.as_deref().unwrap_or("<unloaded>"),
            current = %current_model,
            generation,
            "Encoder swapped"
        );
        SwapReport {
            previous_model,
            current_model,
            generation,
        }
    }
}
