//! Embedding models: the `EmbeddingSource` boundary and its load-once registry.
//!
//! The embedding model itself is external; this module only owns its lifecycle:
//!
//! - `ModelLoader` produces a ready `EmbeddingSource` for a model id (the expensive step).
//! - `EncoderRegistry` keeps loaded models keyed by id. Loading is serialised by a
//!   mutex scoped to the load step only, with a double-checked lookup, so concurrent
//!   requests for the same model load it once. Encoding never holds the lock.
//! - `EncoderHandle` is the resource handle a worker acquires, encodes with, and
//!   releases, explicitly or by dropping it. The registry keeps the model alive until
//!   `unload` is called.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, info, trace};

use crate::core::EmbeddingMatrix;
use crate::error::{AnalysisError, AnalysisResult};

/// Maps a batch of texts to fixed-dimension unit-norm vectors.
///
/// Implementations must be deterministic for identical input and model version.
pub trait EmbeddingSource: Send + Sync {
    /// Identity of the model, used as part of cache keys.
    fn model_id(&self) -> &str;

    /// Width of every produced vector.
    fn dimension(&self) -> usize;

    fn encode(&self, batch: &[String]) -> AnalysisResult<Vec<Vec<f64>>>;
}

/// Loads an embedding model by id. Called at most once per id while it stays loaded.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_id: &str) -> AnalysisResult<Arc<dyn EmbeddingSource>>;
}

/// Load-once registry of embedding models.
pub struct EncoderRegistry {
    loader: Arc<dyn ModelLoader>,
    models: DashMap<String, Arc<dyn EmbeddingSource>>,
    load_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl EncoderRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: DashMap::new(),
            load_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Acquires a handle on `model_id`, loading the model on first use.
    pub fn acquire(&self, model_id: &str) -> AnalysisResult<EncoderHandle> {
        if let Some(source) = self.cached(model_id) {
            trace!("Encoder `{}` already loaded", model_id);
            return Ok(EncoderHandle::new(source));
        }

        let source = {
            // a poisoned lock only means another loader panicked; the map is still consistent
            let _guard = self
                .load_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match self.cached(model_id) {
                Some(source) => source,
                None => {
                    info!("Loading embedding model `{}`", model_id);
                    let source = self.loader.load(model_id)?;
                    self.loads.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        "Model `{}` loaded, dimension={}",
                        model_id,
                        source.dimension()
                    );
                    self.models
                        .insert(model_id.to_string(), Arc::clone(&source));
                    source
                }
            }
        };

        Ok(EncoderHandle::new(source))
    }

    // clones out of the map so no shard guard outlives the lookup
    fn cached(&self, model_id: &str) -> Option<Arc<dyn EmbeddingSource>> {
        self.models.get(model_id).map(|s| Arc::clone(s.value()))
    }

    /// Drops the registry's reference to `model_id`. Outstanding handles keep the
    /// model alive until released.
    pub fn unload(&self, model_id: &str) -> bool {
        let removed = self.models.remove(model_id).is_some();
        if removed {
            info!("Unloaded embedding model `{}`", model_id);
        }
        removed
    }

    /// Number of loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }
}

/// A worker's handle on a loaded embedding model.
#[derive(Clone)]
pub struct EncoderHandle {
    source: Arc<dyn EmbeddingSource>,
}

impl EncoderHandle {
    fn new(source: Arc<dyn EmbeddingSource>) -> Self {
        Self { source }
    }

    pub fn model_id(&self) -> &str {
        self.source.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.source.dimension()
    }

    /// Encodes `texts` in batches of `batch_size` into one embedding matrix.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size == 0`.
    pub fn encode_all(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> AnalysisResult<EmbeddingMatrix> {
        assert!(batch_size > 0, "batch_size must be positive");
        let dim = self.dimension();
        info!(
            "Encoding {} texts with `{}` (batch_size={})",
            texts.len(),
            self.model_id(),
            batch_size
        );

        let mut rows = Vec::with_capacity(texts.len());
        for (b, batch) in texts.chunks(batch_size).enumerate() {
            let encoded = self.source.encode(batch)?;
            if encoded.len() != batch.len() {
                return Err(AnalysisError::Encode {
                    model: self.model_id().to_string(),
                    reason: format!(
                        "batch {} returned {} vectors for {} texts",
                        b,
                        encoded.len(),
                        batch.len()
                    ),
                });
            }
            if let Some(bad) = encoded.iter().find(|v| v.len() != dim) {
                return Err(AnalysisError::DimensionMismatch {
                    expected: dim,
                    found: bad.len(),
                });
            }
            trace!("Encoded batch {} ({} texts)", b, batch.len());
            rows.extend(encoded);
        }

        if rows.is_empty() {
            return Ok(EmbeddingMatrix::empty(dim));
        }
        Ok(EmbeddingMatrix::from_rows(rows))
    }

    /// Releases the handle. Dropping it has the same effect.
    pub fn release(self) {}
}

impl Drop for EncoderHandle {
    fn drop(&mut self) {
        trace!("Released handle on `{}`", self.source.model_id());
    }
}
