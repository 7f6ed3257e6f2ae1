//! Embedding rows, dataset splits and neighbour records.
//!
//! This module provides the shared data model of the crate:
//!
//! - `EmbeddingMatrix`: a dense, row-major, zero-copy container of embedding rows
//!   (one row per dataset example), with allocation-free row views and the
//!   distance/similarity primitives used by the index and the overlap estimator.
//! - `Split`: the dataset split a row belongs to (train or eval).
//! - `DatasetSplit`: raw texts plus integer class labels for one split.
//! - `NeighborRecord`: a `(row, similarity)` pair returned by neighbour queries.
//!
//! # Examples
//!
//! ```
//! use overlapspace::core::EmbeddingMatrix;
//!
//! let m = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
//! assert_eq!(m.shape(), (2, 2));
//! assert_eq!(m.row(1), &[0.0, 1.0]);
//! ```
//!
//! # Panics
//!
//! - Constructors panic if rows have inconsistent lengths.
//! - Row accessors panic on out-of-bounds indices.
//! - Pairwise primitives panic if slice lengths differ.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Computes the Euclidean norm (L2) without allocating.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Inner product of two equally long slices.
///
/// # Panics
///
/// Panics if the lengths differ.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Dimension mismatch");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance, no square root taken.
///
/// # Panics
///
/// Panics if the lengths differ.
#[inline]
pub fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Dimension mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Dataset split identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Eval,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Eval];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Eval => "eval",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inputs of one dataset split: texts to embed and their class labels.
///
/// Row `i` of the split is `(texts[i], labels[i])`; the positional index is the
/// stable row identifier used in every `NeighborRecord`.
#[derive(Clone, Debug)]
pub struct DatasetSplit {
    pub split: Split,
    pub texts: Vec<String>,
    pub labels: Vec<usize>,
}

impl DatasetSplit {
    pub fn new(split: Split, texts: Vec<String>, labels: Vec<usize>) -> Self {
        Self {
            split,
            texts,
            labels,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One neighbour of a query point: its row index in the target split and the
/// inner-product similarity (higher is closer).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub row: usize,
    pub similarity: f64,
}

impl NeighborRecord {
    #[inline]
    pub fn new(row: usize, similarity: f64) -> Self {
        Self { row, similarity }
    }
}

/// A dense, row-major matrix of embedding vectors.
///
/// Rows are items (dataset examples) and columns are embedding features. All data
/// lives in a single flattened `Vec<f64>` so rows can be borrowed as contiguous
/// slices without copying.
///
/// A matrix with zero rows is valid: it represents an empty split and still
/// records the embedding width it was created for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingMatrix {
    pub nitems: usize,
    pub nfeatures: usize,
    pub data: Vec<f64>,
}

impl EmbeddingMatrix {
    /// Builds from a vector of equally-sized rows.
    ///
    /// # Panics
    ///
    /// - If rows have differing lengths.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let nitems = rows.len();
        let nfeatures = rows.first().map(|r| r.len()).unwrap_or(0);
        assert!(
            rows.iter().all(|r| r.len() == nfeatures),
            "All items must have same number of features"
        );

        let mut data = Vec::with_capacity(nitems * nfeatures);
        for row in rows {
            data.extend(row);
        }

        Self {
            nitems,
            nfeatures,
            data,
        }
    }

    /// Empty matrix of the given embedding width.
    pub fn empty(nfeatures: usize) -> Self {
        Self {
            nitems: 0,
            nfeatures,
            data: Vec::new(),
        }
    }

    /// Returns (nitems, nfeatures).
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nitems, self.nfeatures)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    /// Zero-copy view of row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= nitems`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        assert!(i < self.nitems, "Item index out of bounds");
        let start = i * self.nfeatures;
        &self.data[start..start + self.nfeatures]
    }

    /// Iterates all rows as borrowed slices.
    #[inline]
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics; zero-width matrices hold no data and yield nothing
        self.data.chunks_exact(self.nfeatures.max(1))
    }

    /// Scales every non-zero row to unit L2 norm in place.
    pub fn normalise_rows(&mut self) {
        if self.nfeatures == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(self.nfeatures) {
            let n = norm(row);
            if n > 0.0 {
                row.iter_mut().for_each(|x| *x /= n);
            }
        }
    }
}
