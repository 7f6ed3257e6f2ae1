//! Synthetic datasets shared by the test modules.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::EmbeddingMatrix;

/// Isotropic gaussian blobs: `per_class` points around each center, labelled by
/// `labels[c]` for center `c`. Rows are grouped by class in center order.
pub fn gaussian_blobs(
    centers: &[Vec<f64>],
    labels: &[usize],
    per_class: usize,
    spread: f64,
    seed: u64,
) -> (EmbeddingMatrix, Vec<usize>) {
    assert_eq!(centers.len(), labels.len());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(centers.len() * per_class);
    let mut y = Vec::with_capacity(centers.len() * per_class);

    for (center, &label) in centers.iter().zip(labels) {
        for _ in 0..per_class {
            let row: Vec<f64> = center
                .iter()
                .map(|&c| {
                    let z: f64 = StandardNormal.sample(&mut rng);
                    c + spread * z
                })
                .collect();
            rows.push(row);
            y.push(label);
        }
    }
    (EmbeddingMatrix::from_rows(rows), y)
}

/// `n` random unit vectors of dimension `dim`.
pub fn unit_vectors(n: usize, dim: usize, seed: u64) -> EmbeddingMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dim).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect();
    let mut m = EmbeddingMatrix::from_rows(rows);
    m.normalise_rows();
    m
}

/// Unit vector at `angle` radians in the plane.
pub fn planar(angle: f64) -> Vec<f64> {
    vec![angle.cos(), angle.sin()]
}
