use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::SimilarityAnalysis;
use crate::embeddings::{EncoderRegistry, ModelLoader};
use crate::overlap::EstimatorParams;

// Add logging
use log::{debug, info};

/// Neighbour search and tagging options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Embedding model used to encode every split.
    pub model_id: String,
    /// Neighbours retrieved per row (K).
    pub neighbors: usize,
    /// Minimum share of differently-labelled neighbours to flag a row.
    pub conflicting_neighbors_threshold: f64,
    /// Nearest-neighbour similarity under which a row has no close neighbour.
    pub no_close_threshold: f64,
    /// Texts per encoder call.
    pub batch_size: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            model_id: "all-MiniLM-L12-v2".to_string(),
            neighbors: 20,
            conflicting_neighbors_threshold: 0.9,
            no_close_threshold: 0.5,
            batch_size: 32,
        }
    }
}

pub struct AnalysisBuilder {
    similarity: SimilarityConfig,
    // coarse estimator for the dashboard overlap table
    overlap: EstimatorParams,
    // finer estimator for spectral clustering of classes
    spectral: EstimatorParams,
}

impl Default for AnalysisBuilder {
    fn default() -> Self {
        debug!("Creating AnalysisBuilder with default parameters");
        Self {
            similarity: SimilarityConfig::default(),
            overlap: EstimatorParams::class_overlap(),
            spectral: EstimatorParams::spectral_clustering(),
        }
    }
}

impl AnalysisBuilder {
    pub fn new() -> Self {
        info!("Initializing new AnalysisBuilder");
        Self::default()
    }

    /// Starts from a fully specified similarity config (e.g. deserialised by the caller).
    pub fn with_similarity_config(mut self, config: SimilarityConfig) -> Self {
        info!("Using similarity config: {:?}", config);
        self.similarity = config;
        self
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        info!("Setting embedding model: {}", model_id);
        self.similarity.model_id = model_id.to_string();
        self
    }

    /// Number of neighbours per row (K).
    ///
    /// # Panics
    ///
    /// Panics if `k == 0`.
    pub fn with_neighbors(mut self, k: usize) -> Self {
        assert!(k > 0, "number of neighbours must be positive");
        info!("Setting neighbours per row: {}", k);
        self.similarity.neighbors = k;
        self
    }

    /// Tagging thresholds; `conflicting` must lie in [0, 1].
    pub fn with_thresholds(mut self, conflicting: f64, no_close: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&conflicting),
            "conflicting_neighbors_threshold must be in [0, 1], got {}",
            conflicting
        );
        info!(
            "Setting thresholds: conflicting_neighbors={}, no_close={}",
            conflicting, no_close
        );
        self.similarity.conflicting_neighbors_threshold = conflicting;
        self.similarity.no_close_threshold = no_close;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        info!("Setting encoder batch size: {}", batch_size);
        self.similarity.batch_size = batch_size;
        self
    }

    /// Parameters of the estimator behind `compute_overlap`.
    pub fn with_overlap_params(mut self, params: EstimatorParams) -> Self {
        info!("Setting class-overlap estimator params: {:?}", params);
        self.overlap = params;
        self
    }

    /// Parameters of the estimator behind `compute_spectral`.
    pub fn with_spectral_params(mut self, params: EstimatorParams) -> Self {
        info!("Setting spectral estimator params: {:?}", params);
        self.spectral = params;
        self
    }

    pub fn build(self, loader: Arc<dyn ModelLoader>) -> SimilarityAnalysis {
        self.build_with_registry(Arc::new(EncoderRegistry::new(loader)))
    }

    /// Builds on a registry shared with other analyses, so models load once per process.
    pub fn build_with_registry(self, registry: Arc<EncoderRegistry>) -> SimilarityAnalysis {
        debug!(
            "Build configuration: similarity={:?}, overlap={:?}, spectral={:?}",
            self.similarity, self.overlap, self.spectral
        );
        SimilarityAnalysis::new(registry, self.similarity, self.overlap, self.spectral)
    }
}
