//! # Class overlap via Parzen-window density ratios
//!
//! For every observed class `i`, a sample of its members is taken and, for each sampled
//! member `q`, its `k_nearest` nearest training points (Euclidean, excluding `q`) are found.
//! The class histogram of those neighbours gives a raw probability vector over classes;
//! dividing by the Parzen-window volume around `q` gives a local density estimate:
//!
//! ```text
//! p[c]      = #{neighbours of class c} / k
//! volume    = max(1e-4, ∏_d 2 · max_n |x_n[d] - q[d]|)
//! p_norm[c] = p[c] / volume
//! ```
//!
//! `S[i][j]` is the mean of `p_norm[j]` over the sampled members of class `i`, with each
//! row normalised to sum 1. `S` is not symmetric in general and its diagonal is kept.
//! The spectral statistics of `S` come from `crate::laplacian`.
//!
//! ## Class table
//!
//! Class ids are arbitrary `usize` values discovered at fit time. `ClassTable` maps the
//! sorted observed ids to dense indices `0..C`; every matrix in `ClassOverlapEstimate`
//! is indexed by those dense indices. Declared classes without members are skipped
//! and reported in `skipped_classes`.
//!
//! ## Modes
//!
//! The dashboard table uses `EstimatorParams::class_overlap()` (fewer samples, wider
//! neighbourhoods); spectral clustering uses `EstimatorParams::spectral_clustering()`
//! (more samples). Both run the same estimator.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Range;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::core::{sq_euclidean, EmbeddingMatrix};
use crate::laplacian::{
    affinity_matrix, cumulative_spectral_gradient, laplacian_from_affinity, symmetric_eigen,
    SpectralDecomposition,
};
use crate::sampling::{MemberSampler, SeededSampler};

/// Floor of the Parzen-window volume, reached when all neighbours coincide with the query.
pub const MIN_VOLUME: f64 = 1e-4;

/// Sampling depth and neighbourhood size of the estimator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Maximum number of sampled members per class.
    pub m_sample: usize,
    /// Neighbours per sampled member.
    pub k_nearest: usize,
    /// Seed of the per-class member sampler.
    pub seed: u64,
}

impl EstimatorParams {
    /// Coarse summary used for the dashboard class-overlap table.
    pub fn class_overlap() -> Self {
        Self {
            m_sample: 100,
            k_nearest: 10,
            seed: 128,
        }
    }

    /// Finer estimate used for spectral clustering of classes.
    pub fn spectral_clustering() -> Self {
        Self {
            m_sample: 500,
            k_nearest: 5,
            seed: 128,
        }
    }
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self::spectral_clustering()
    }
}

/// Explicit class-id → dense-index table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassTable {
    ids: Vec<usize>,
    index: BTreeMap<usize, usize>,
}

impl ClassTable {
    /// Builds from the ids of classes with at least one member.
    pub fn from_ids(ids: impl IntoIterator<Item = usize>) -> Self {
        let mut ids: Vec<usize> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { ids, index }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dense index of a class id, if observed.
    #[inline]
    pub fn index_of(&self, class_id: usize) -> Option<usize> {
        self.index.get(&class_id).copied()
    }

    /// Class id at a dense index.
    #[inline]
    pub fn id_at(&self, index: usize) -> usize {
        self.ids[index]
    }

    #[inline]
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }
}

/// Parzen estimate contributed by one sampled member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEntry {
    /// Row index of the member in the training split.
    pub member: usize,
    /// Neighbour class histogram over dense class indices, sums to 1.
    pub probability: Vec<f64>,
    /// `probability` divided by the Parzen-window volume.
    pub probability_norm: Vec<f64>,
    pub volume: f64,
}

/// Flat arena of contributor entries, grouped contiguously by class.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityArena {
    entries: Vec<SimilarityEntry>,
    ranges: Vec<Range<usize>>,
}

impl SimilarityArena {
    /// Contributors of the class at dense index `class_index`.
    pub fn for_class(&self, class_index: usize) -> &[SimilarityEntry] {
        &self.entries[self.ranges[class_index].clone()]
    }

    /// Entry of `member` within class `class_index`, if it was sampled.
    pub fn get(&self, class_index: usize, member: usize) -> Option<&SimilarityEntry> {
        let slice = self.for_class(class_index);
        slice
            .binary_search_by(|e| e.member.cmp(&member))
            .ok()
            .map(|pos| &slice[pos])
    }

    pub fn entries(&self) -> &[SimilarityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of fitting the estimator on a training split.
#[derive(Clone, Debug)]
pub struct ClassOverlapEstimate {
    pub classes: ClassTable,
    /// Members per observed class (full counts, not sampled).
    pub class_counts: Vec<usize>,
    /// Row i: share of class i's Parzen mass attributed to each class.
    pub s: DenseMatrix<f64>,
    pub similarity_arrays: SimilarityArena,
    /// `1 - BrayCurtis` between rows of `s`.
    pub affinity: DenseMatrix<f64>,
    /// `1 - affinity`.
    pub difference_matrix: DenseMatrix<f64>,
    /// Per class: dissimilarity to its closest other class (larger is more separable).
    pub difference: Vec<f64>,
    pub laplacian: DenseMatrix<f64>,
    pub evals: Vec<f64>,
    pub evecs: DenseMatrix<f64>,
    /// Cumulative spectral gradient, NaN if the eigensolver failed.
    pub csg: f64,
    /// Declared class ids that had no member and were left out.
    pub skipped_classes: Vec<usize>,
}

impl ClassOverlapEstimate {
    #[inline]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// `S` as nested rows, dense class order.
    pub fn s_rows(&self) -> Vec<Vec<f64>> {
        let n = self.n_classes();
        (0..n)
            .map(|i| (0..n).map(|j| *self.s.get((i, j))).collect())
            .collect()
    }

    /// Overlap of class id `from` attributed to class id `to`.
    pub fn overlap(&self, from: usize, to: usize) -> Option<f64> {
        let i = self.classes.index_of(from)?;
        let j = self.classes.index_of(to)?;
        Some(*self.s.get((i, j)))
    }
}

/// Parzen-window volume of the box spanned by `neighbours` around `query`.
pub fn parzen_volume(query: &[f64], neighbours: &[&[f64]]) -> f64 {
    if neighbours.is_empty() {
        return MIN_VOLUME;
    }
    let volume: f64 = (0..query.len())
        .map(|d| {
            let reach = neighbours
                .iter()
                .map(|n| (n[d] - query[d]).abs())
                .fold(0.0_f64, f64::max);
            2.0 * reach
        })
        .product();
    if volume < MIN_VOLUME {
        trace!("degenerate Parzen window ({:.3e}), flooring", volume);
        MIN_VOLUME
    } else {
        volume
    }
}

/// The `k` nearest rows to row `member` (itself excluded), by squared Euclidean
/// distance, ties broken by ascending row index.
pub fn nearest_rows(data: &EmbeddingMatrix, member: usize, k: usize) -> Vec<usize> {
    let query = data.row(member);
    let mut dists: Vec<(usize, f64)> = data
        .rows()
        .enumerate()
        .filter(|(j, _)| *j != member)
        .map(|(j, row)| (j, sq_euclidean(query, row)))
        .collect();

    let by_dist = |a: &(usize, f64), b: &(usize, f64)| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    };
    let k = k.min(dists.len());
    if k == 0 {
        return Vec::new();
    }
    if k < dists.len() {
        dists.select_nth_unstable_by(k - 1, by_dist);
        dists.truncate(k);
    }
    dists.sort_by(by_dist);
    dists.into_iter().map(|(j, _)| j).collect()
}

/// Parzen-window k-NN density-ratio estimator.
#[derive(Clone, Debug, Default)]
pub struct OverlapEstimator {
    pub params: EstimatorParams,
}

impl OverlapEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self { params }
    }

    /// Fits on the training split with classes inferred from `labels`.
    pub fn fit(&self, data: &EmbeddingMatrix, labels: &[usize]) -> ClassOverlapEstimate {
        self.fit_with_classes(data, labels, &[])
    }

    /// Fits on the training split; `declared` lists class ids that may have no member.
    ///
    /// # Panics
    ///
    /// - If `data` has no rows.
    /// - If `labels.len() != data.nitems`.
    /// - If `k_nearest == 0` or `m_sample == 0`.
    pub fn fit_with_classes(
        &self,
        data: &EmbeddingMatrix,
        labels: &[usize],
        declared: &[usize],
    ) -> ClassOverlapEstimate {
        assert_eq!(
            labels.len(),
            data.nitems,
            "labels length must match number of rows"
        );
        assert!(data.nitems > 0, "training split must contain at least one row");
        assert!(self.params.k_nearest > 0, "k_nearest must be positive");
        assert!(self.params.m_sample > 0, "m_sample must be positive");

        let classes = ClassTable::from_ids(labels.iter().copied());
        let n_classes = classes.len();
        info!(
            "Fitting overlap estimator: N={}, F={}, C={}, m_sample={}, k_nearest={}",
            data.nitems, data.nfeatures, n_classes, self.params.m_sample, self.params.k_nearest
        );

        let mut skipped_classes: Vec<usize> = declared
            .iter()
            .copied()
            .filter(|id| classes.index_of(*id).is_none())
            .collect();
        skipped_classes.sort_unstable();
        skipped_classes.dedup();
        if !skipped_classes.is_empty() {
            debug!("Skipping classes without members: {:?}", skipped_classes);
        }

        // dense labels and members per class
        let dense: Vec<usize> = labels
            .iter()
            .map(|l| classes.index_of(*l).unwrap_or_default())
            .collect();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (row, &c) in dense.iter().enumerate() {
            members[c].push(row);
        }
        let class_counts: Vec<usize> = members.iter().map(|m| m.len()).collect();

        let mut sampler = SeededSampler::new(self.params.seed);
        let mut entries: Vec<SimilarityEntry> = Vec::new();
        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(n_classes);
        let mut s = DenseMatrix::<f64>::zeros(n_classes, n_classes);

        for ci in 0..n_classes {
            let sampled = sampler.select(ci, &members[ci], self.params.m_sample);
            let class_entries: Vec<SimilarityEntry> = sampled
                .par_iter()
                .map(|&member| self.member_estimate(data, &dense, n_classes, member, ci))
                .collect();

            // mean of normalised vectors, then row-normalise
            let mut row = vec![0.0; n_classes];
            for e in &class_entries {
                for (acc, v) in row.iter_mut().zip(e.probability_norm.iter()) {
                    *acc += v;
                }
            }
            let n_sampled = class_entries.len().max(1) as f64;
            row.iter_mut().for_each(|v| *v /= n_sampled);
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|v| *v /= total);
            } else {
                warn!("class {} has zero Parzen mass", classes.id_at(ci));
            }
            for (cj, v) in row.iter().enumerate() {
                s.set((ci, cj), *v);
            }
            debug!(
                "class {} (n={}, sampled={}): S row = {:?}",
                classes.id_at(ci),
                class_counts[ci],
                class_entries.len(),
                row
            );

            let start = entries.len();
            entries.extend(class_entries);
            ranges.push(start..entries.len());
        }

        let similarity_arrays = SimilarityArena { entries, ranges };
        let (affinity, difference_matrix, difference, laplacian, spectral, csg) =
            spectral_summary(&s);

        let (sampled, discarded) = sampler.stats();
        info!(
            "Overlap estimate complete: {} contributors ({} members left out), csg={:.6}",
            sampled, discarded, csg
        );

        ClassOverlapEstimate {
            classes,
            class_counts,
            s,
            similarity_arrays,
            affinity,
            difference_matrix,
            difference,
            laplacian,
            evals: spectral.evals,
            evecs: spectral.evecs,
            csg,
            skipped_classes,
        }
    }

    fn member_estimate(
        &self,
        data: &EmbeddingMatrix,
        dense_labels: &[usize],
        n_classes: usize,
        member: usize,
        own_class: usize,
    ) -> SimilarityEntry {
        let neighbours = nearest_rows(data, member, self.params.k_nearest);

        let mut probability = vec![0.0; n_classes];
        if neighbours.is_empty() {
            // lone point: all of its mass stays with its own class
            probability[own_class] = 1.0;
        } else {
            let share = 1.0 / neighbours.len() as f64;
            for &nb in &neighbours {
                probability[dense_labels[nb]] += share;
            }
        }

        let rows: Vec<&[f64]> = neighbours.iter().map(|&nb| data.row(nb)).collect();
        let volume = parzen_volume(data.row(member), &rows);
        let probability_norm = probability.iter().map(|p| p / volume).collect();

        SimilarityEntry {
            member,
            probability,
            probability_norm,
            volume,
        }
    }
}

type SpectralSummary = (
    DenseMatrix<f64>,
    DenseMatrix<f64>,
    Vec<f64>,
    DenseMatrix<f64>,
    SpectralDecomposition,
    f64,
);

fn spectral_summary(s: &DenseMatrix<f64>) -> SpectralSummary {
    let n = s.shape().0;
    let affinity = affinity_matrix(s);

    let mut difference_matrix = DenseMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            difference_matrix.set((i, j), 1.0 - *affinity.get((i, j)));
        }
    }
    let difference: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| *difference_matrix.get((i, j)))
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
                .unwrap_or(1.0)
        })
        .collect();

    let laplacian = laplacian_from_affinity(&affinity);
    let spectral = symmetric_eigen(&laplacian).unwrap_or_else(|| {
        warn!("Assigning NaN to eigenvalues, eigenvectors and csg");
        SpectralDecomposition::nan(n)
    });
    let csg = if spectral.is_nan() {
        f64::NAN
    } else {
        cumulative_spectral_gradient(&spectral.evals)
    };

    (affinity, difference_matrix, difference, laplacian, spectral, csg)
}
