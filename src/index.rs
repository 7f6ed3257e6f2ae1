//! Nearest-neighbour index over unit-norm embedding rows.
//!
//! `NeighborIndex` is a flat inner-product index: every query is scored against all
//! indexed rows and the top-k are selected with a partial sort. On unit-norm
//! embeddings the inner product equals cosine similarity, bounded in [-1, 1].
//!
//! ## Ordering
//!
//! Results are sorted by decreasing similarity; ties are broken by ascending row
//! index so that rebuilding the index over identical vectors reproduces identical
//! neighbour lists.
//!
//! ## Complexity
//!
//! - build: O(N × D) copy
//! - single query: O(N × D + N + k log k)
//! - batch query: queries are scored in parallel with rayon; the index is shared
//!   read-only across threads, no locking is involved.

use std::cmp::Ordering;

use log::{debug, info, trace};
use rayon::prelude::*;

use crate::core::{dot, EmbeddingMatrix, NeighborRecord};
use crate::error::{AnalysisError, AnalysisResult};

/// Flat inner-product index, built once per split and read-only afterwards.
#[derive(Clone, Debug)]
pub struct NeighborIndex {
    vectors: EmbeddingMatrix,
}

/// Descending similarity, ascending row on ties.
#[inline]
fn rank(a: &NeighborRecord, b: &NeighborRecord) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.row.cmp(&b.row))
}

impl NeighborIndex {
    /// Builds the index over `vectors`. Building is pure: identical input yields an
    /// index answering every query identically.
    pub fn build(vectors: EmbeddingMatrix) -> Self {
        info!(
            "Building neighbour index over {} rows of dimension {}",
            vectors.nitems, vectors.nfeatures
        );
        Self { vectors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.nitems
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.vectors.nfeatures
    }

    /// Indexed vectors, row `i` is dataset row `i`.
    #[inline]
    pub fn vectors(&self) -> &EmbeddingMatrix {
        &self.vectors
    }

    /// Top-`k` neighbours of `query`, sorted by decreasing similarity.
    ///
    /// Returns `min(k, len())` records; an empty index yields an empty list.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `query.len()` differs from the indexed dimension.
    pub fn search(&self, query: &[f64], k: usize) -> AnalysisResult<Vec<NeighborRecord>> {
        self.search_excluding(query, k, None)
    }

    /// Like `search`, but never returns row `exclude`.
    ///
    /// Used for self-queries within a split, where the query's own row would
    /// otherwise be its own nearest neighbour.
    pub fn search_excluding(
        &self,
        query: &[f64],
        k: usize,
        exclude: Option<usize>,
    ) -> AnalysisResult<Vec<NeighborRecord>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.dimension(),
                found: query.len(),
            });
        }

        let mut scored: Vec<NeighborRecord> = self
            .vectors
            .rows()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(i, row)| NeighborRecord::new(i, dot(query, row)))
            .collect();

        let k = k.min(scored.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);

        trace!(
            "query -> {} neighbours, best={:.4}",
            scored.len(),
            scored[0].similarity
        );
        Ok(scored)
    }

    /// Queries every row of `queries` in parallel.
    ///
    /// With `exclude_self`, query `i` never returns index row `i`; this is the
    /// within-split case where `queries` are the indexed vectors themselves.
    pub fn search_batch(
        &self,
        queries: &EmbeddingMatrix,
        k: usize,
        exclude_self: bool,
    ) -> AnalysisResult<Vec<Vec<NeighborRecord>>> {
        debug!(
            "Batch query: {} queries, k={}, exclude_self={}",
            queries.nitems, k, exclude_self
        );
        if self.is_empty() {
            return Ok(vec![Vec::new(); queries.nitems]);
        }
        if queries.nitems > 0 && queries.nfeatures != self.dimension() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.dimension(),
                found: queries.nfeatures,
            });
        }

        (0..queries.nitems)
            .into_par_iter()
            .map(|i| {
                let exclude = if exclude_self { Some(i) } else { None };
                self.search_excluding(queries.row(i), k, exclude)
            })
            .collect()
    }
}
