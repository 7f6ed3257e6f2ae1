//! # Dashboard-facing analysis facade
//!
//! `SimilarityAnalysis` ties the pipeline stages together for the layer that serves
//! the dashboard:
//!
//! 1. **Splits**: `load_split` registers the raw texts and labels of train/eval.
//! 2. **Index**: `build_or_get_index` encodes a split once per embedding model and
//!    caches the resulting `NeighborIndex`; replacing a split drops its cached index.
//! 3. **Neighbours**: `get_neighbors` queries every loaded split.
//! 4. **Tags**: `tag_split` attaches smart tags against every loaded split.
//! 5. **Overlap**: `compute_overlap` / `compute_spectral` fit the Parzen estimator on a
//!    split's embeddings with the coarse or fine sampling preset.
//! 6. **Layout**: `compute_layout` turns an estimate into request-scoped Sankey geometry.
//!
//! Every method takes `&self`; caches are concurrent maps and built indices are shared
//! read-only through `Arc`, so one analysis can serve parallel requests.
//!
//! A cached index remembers the `DatasetSplit` it was encoded from. It is served only
//! while that exact split is still loaded, so a split replaced mid-encode never leaves
//! a stale index behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};

use crate::builder::SimilarityConfig;
use crate::core::{DatasetSplit, EmbeddingMatrix, NeighborRecord, Split};
use crate::embeddings::EncoderRegistry;
use crate::error::{AnalysisError, AnalysisResult};
use crate::index::NeighborIndex;
use crate::layout::{LayoutParams, OverlapLayout, OverlapLayoutEngine};
use crate::overlap::{ClassOverlapEstimate, EstimatorParams, OverlapEstimator};
use crate::tagging::{NeighborTagger, RowTags, SplitView};

/// Per target split, one ordered neighbour list per query vector.
pub type SplitNeighbors = BTreeMap<Split, Vec<Vec<NeighborRecord>>>;

/// An index together with the split snapshot it was built from.
struct CachedIndex {
    source: Arc<DatasetSplit>,
    index: Arc<NeighborIndex>,
}

impl CachedIndex {
    fn built_from(&self, data: &Arc<DatasetSplit>) -> bool {
        Arc::ptr_eq(&self.source, data)
    }
}

pub struct SimilarityAnalysis {
    registry: Arc<EncoderRegistry>,
    config: SimilarityConfig,
    overlap_params: EstimatorParams,
    spectral_params: EstimatorParams,
    splits: DashMap<Split, Arc<DatasetSplit>>,
    indices: DashMap<(Split, String), CachedIndex>,
}

impl SimilarityAnalysis {
    /// Lower level constructor: use `AnalysisBuilder::build`.
    pub fn new(
        registry: Arc<EncoderRegistry>,
        config: SimilarityConfig,
        overlap_params: EstimatorParams,
        spectral_params: EstimatorParams,
    ) -> Self {
        Self {
            registry,
            config,
            overlap_params,
            spectral_params,
            splits: DashMap::new(),
            indices: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EncoderRegistry> {
        &self.registry
    }

    /// Registers (or replaces) a split. Replacing drops the split's cached indices.
    pub fn load_split(&self, data: DatasetSplit) -> AnalysisResult<()> {
        if data.texts.len() != data.labels.len() {
            return Err(AnalysisError::LabelMismatch {
                texts: data.texts.len(),
                labels: data.labels.len(),
            });
        }
        let split = data.split;
        info!("Loading split `{}` with {} rows", split, data.len());
        self.indices.retain(|(s, _), _| *s != split);
        self.splits.insert(split, Arc::new(data));
        Ok(())
    }

    pub fn unload_split(&self, split: Split) -> bool {
        self.indices.retain(|(s, _), _| *s != split);
        let removed = self.splits.remove(&split).is_some();
        if removed {
            info!("Unloaded split `{}`", split);
        }
        removed
    }

    pub fn is_loaded(&self, split: Split) -> bool {
        self.splits.contains_key(&split)
    }

    /// Loaded splits in `Split::ALL` order.
    pub fn loaded_splits(&self) -> Vec<Split> {
        Split::ALL
            .iter()
            .copied()
            .filter(|s| self.is_loaded(*s))
            .collect()
    }

    fn split_data(&self, split: Split) -> AnalysisResult<Arc<DatasetSplit>> {
        self.splits
            .get(&split)
            .map(|d| Arc::clone(d.value()))
            .ok_or(AnalysisError::MissingSplit(split))
    }

    /// Returns the split's index, encoding and building it on first request.
    ///
    /// Idempotent: concurrent first requests may both encode, the first insert wins
    /// and every caller receives the same index afterwards.
    pub fn build_or_get_index(&self, split: Split) -> AnalysisResult<Arc<NeighborIndex>> {
        let data = self.split_data(split)?;
        self.index_for(split, &data)
    }

    /// Index over exactly `data`, which must be a snapshot taken from `self.splits`.
    fn index_for(
        &self,
        split: Split,
        data: &Arc<DatasetSplit>,
    ) -> AnalysisResult<Arc<NeighborIndex>> {
        let key = (split, self.config.model_id.clone());
        let cached = self
            .indices
            .get(&key)
            .filter(|c| c.built_from(data))
            .map(|c| Arc::clone(&c.index));
        if let Some(index) = cached {
            debug!("Index for `{}` served from cache", split);
            return Ok(index);
        }

        let handle = self.registry.acquire(&self.config.model_id)?;
        let embeddings = handle.encode_all(&data.texts, self.config.batch_size)?;
        handle.release();
        let built = Arc::new(NeighborIndex::build(embeddings));

        let still_loaded = self
            .splits
            .get(&split)
            .map(|current| Arc::ptr_eq(current.value(), data))
            .unwrap_or(false);
        if !still_loaded {
            debug!("Split `{}` replaced while encoding, index not cached", split);
            return Ok(built);
        }

        let mut entry = self.indices.entry(key).or_insert_with(|| CachedIndex {
            source: Arc::clone(data),
            index: Arc::clone(&built),
        });
        if !entry.built_from(data) {
            *entry = CachedIndex {
                source: Arc::clone(data),
                index: built,
            };
        }
        Ok(Arc::clone(&entry.index))
    }

    /// Queries `k` neighbours of every row of `vectors` in each loaded split.
    ///
    /// With `source = Some(split)`, row `i` of `vectors` is row `i` of that split and is
    /// excluded from its own results; with `None` the vectors are external queries.
    ///
    /// # Panics
    ///
    /// Panics if `source` is a loaded split whose row count differs from `vectors`.
    pub fn get_neighbors(
        &self,
        source: Option<Split>,
        vectors: &EmbeddingMatrix,
        k: usize,
    ) -> AnalysisResult<SplitNeighbors> {
        let mut out = SplitNeighbors::new();
        for target in self.loaded_splits() {
            let index = self.build_or_get_index(target)?;
            let same_split = source == Some(target);
            if same_split {
                assert_eq!(
                    vectors.nitems,
                    index.len(),
                    "self-excluding queries need one vector per row of `{}`",
                    target
                );
            }
            out.insert(target, index.search_batch(vectors, k, same_split)?);
        }
        Ok(out)
    }

    /// Smart tags for every row of `split` against all loaded splits.
    pub fn tag_split(&self, split: Split) -> AnalysisResult<Vec<RowTags>> {
        let source_data = self.split_data(split)?;
        let source_index = self.index_for(split, &source_data)?;

        let mut targets: Vec<(Split, Arc<NeighborIndex>, Arc<DatasetSplit>)> = Vec::new();
        for target in self.loaded_splits() {
            let data = if target == split {
                Arc::clone(&source_data)
            } else {
                self.split_data(target)?
            };
            targets.push((target, self.index_for(target, &data)?, data));
        }

        let source = SplitView::new(split, &source_index, &source_data.labels);
        let views: Vec<SplitView> = targets
            .iter()
            .map(|(s, index, data)| SplitView::new(*s, index, &data.labels))
            .collect();

        NeighborTagger::new(&self.config).tag(&source, &views)
    }

    /// Class-overlap estimate for the dashboard table (coarse sampling).
    pub fn compute_overlap(&self, split: Split) -> AnalysisResult<ClassOverlapEstimate> {
        self.estimate(split, self.overlap_params)
    }

    /// Class-overlap estimate for spectral clustering (fine sampling).
    pub fn compute_spectral(&self, split: Split) -> AnalysisResult<ClassOverlapEstimate> {
        self.estimate(split, self.spectral_params)
    }

    fn estimate(
        &self,
        split: Split,
        params: EstimatorParams,
    ) -> AnalysisResult<ClassOverlapEstimate> {
        let data = self.split_data(split)?;
        if data.is_empty() {
            return Err(AnalysisError::EmptySplit(split));
        }
        let index = self.index_for(split, &data)?;
        Ok(OverlapEstimator::new(params).fit(index.vectors(), &data.labels))
    }

    /// Sankey layout of `estimate`, nodes labelled by class id.
    pub fn compute_layout(
        &self,
        estimate: &ClassOverlapEstimate,
        self_overlap: bool,
        scale_by_class: bool,
        overlap_threshold: Option<f64>,
    ) -> OverlapLayout {
        let params = LayoutParams {
            self_overlap,
            scale_by_class,
            overlap_threshold,
        };
        self.compute_layout_with_names(estimate, params, &BTreeMap::new())
    }

    /// Sankey layout of `estimate`; classes missing from `names` fall back to their id.
    pub fn compute_layout_with_names(
        &self,
        estimate: &ClassOverlapEstimate,
        params: LayoutParams,
        names: &BTreeMap<usize, String>,
    ) -> OverlapLayout {
        let labels: Vec<String> = estimate
            .classes
            .ids()
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect();
        OverlapLayoutEngine::new(params).layout(&estimate.s, &estimate.class_counts, &labels)
    }
}
