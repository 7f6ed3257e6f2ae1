//! # Spectral statistics of a class-overlap matrix
//!
//! Given the C×C overlap matrix `S` (row i: where class i's Parzen mass lands), this
//! module derives the spectral summary of class separability:
//!
//! 1. **Affinity**: `W[i][j] = 1 - BrayCurtis(S_i, S_j)`; classes whose overlap profiles
//!    look alike get affinity near 1.
//! 2. **Laplacian**: `L = D - W` with `D = diag(Σ_j W[i][j])`, computed with the
//!    diagonal of `W` ignored (self-loops do not contribute to the degree).
//! 3. **Eigenpairs**: symmetric eigendecomposition of `L`, eigenvalues ascending.
//! 4. **Cumulative spectral gradient**: with gaps `Δ_i = λ_{i+1} - λ_i` normalised by
//!    `C - i`, the CSG is the sum of the running maximum of the normalised gaps.
//!    Higher CSG means more entangled classes.
//!
//! All matrices are `smartcore` dense matrices; C is the number of observed classes,
//! so sizes stay small and dense storage is appropriate.

use log::{debug, trace, warn};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::evd::EVDDecomposable;

/// Bray-Curtis dissimilarity `Σ|u - v| / Σ|u + v|`, defined as 0 for two zero vectors.
pub fn bray_curtis(u: &[f64], v: &[f64]) -> f64 {
    assert_eq!(u.len(), v.len(), "Dimension mismatch");
    let (num, den) = u
        .iter()
        .zip(v.iter())
        .fold((0.0, 0.0), |(n, d), (a, b)| (n + (a - b).abs(), d + (a + b).abs()));
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn row_of(m: &DenseMatrix<f64>, i: usize) -> Vec<f64> {
    let (_, ncols) = m.shape();
    (0..ncols).map(|j| *m.get((i, j))).collect()
}

/// Class affinity `W[i][j] = 1 - BrayCurtis(S_i, S_j)`; the diagonal is 1.
///
/// # Panics
///
/// Panics if `s` is not square.
pub fn affinity_matrix(s: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, m) = s.shape();
    assert_eq!(n, m, "overlap matrix must be square: ({},{})", n, m);

    let rows: Vec<Vec<f64>> = (0..n).map(|i| row_of(s, i)).collect();
    let mut w = DenseMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            w.set((i, j), 1.0 - bray_curtis(&rows[i], &rows[j]));
        }
    }
    w
}

/// Unnormalised Laplacian `D - W`, ignoring the diagonal of `w`.
pub fn laplacian_from_affinity(w: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, m) = w.shape();
    assert_eq!(n, m, "affinity matrix must be square: ({},{})", n, m);

    let mut l = DenseMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let mut degree = 0.0;
        for j in 0..n {
            if i != j {
                let wij = *w.get((i, j));
                degree += wij;
                l.set((i, j), -wij);
            }
        }
        l.set((i, i), degree);
    }
    trace!("Laplacian built for {} classes", n);
    l
}

/// Eigenvalues (ascending) and matching eigenvectors (as columns) of a symmetric matrix.
#[derive(Clone, Debug)]
pub struct SpectralDecomposition {
    pub evals: Vec<f64>,
    pub evecs: DenseMatrix<f64>,
}

impl SpectralDecomposition {
    /// All-NaN decomposition returned when the eigensolver fails.
    pub fn nan(n: usize) -> Self {
        let mut evecs = DenseMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                evecs.set((i, j), f64::NAN);
            }
        }
        Self {
            evals: vec![f64::NAN; n],
            evecs,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.evals.iter().any(|v| v.is_nan())
    }
}

/// Symmetric eigendecomposition with eigenpairs sorted by ascending eigenvalue.
///
/// Returns `None` if the eigensolver fails.
pub fn symmetric_eigen(l: &DenseMatrix<f64>) -> Option<SpectralDecomposition> {
    let (n, m) = l.shape();
    assert_eq!(n, m, "matrix must be square: ({},{})", n, m);

    if n == 1 {
        let mut evecs = DenseMatrix::<f64>::zeros(1, 1);
        evecs.set((0, 0), 1.0);
        return Some(SpectralDecomposition {
            evals: vec![*l.get((0, 0))],
            evecs,
        });
    }

    let evd = match l.evd(true) {
        Ok(evd) => evd,
        Err(e) => {
            warn!("Eigendecomposition failed: {}", e);
            return None;
        }
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        evd.d[a]
            .partial_cmp(&evd.d[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let evals: Vec<f64> = order.iter().map(|&k| evd.d[k]).collect();
    let mut evecs = DenseMatrix::<f64>::zeros(n, n);
    for (new_col, &old_col) in order.iter().enumerate() {
        for row in 0..n {
            evecs.set((row, new_col), *evd.V.get((row, old_col)));
        }
    }
    debug!("Eigenvalues: {:?}", evals);

    Some(SpectralDecomposition { evals, evecs })
}

/// Cumulative spectral gradient of ascending eigenvalues.
///
/// Gap `i` is divided by `g - i + 1` where `g` is the number of gaps, then the
/// running maximum of the normalised gaps is summed. Zero for fewer than two values.
pub fn cumulative_spectral_gradient(evals: &[f64]) -> f64 {
    if evals.len() < 2 {
        return 0.0;
    }
    let g = evals.len() - 1;
    let mut running = f64::NEG_INFINITY;
    let mut csg = 0.0;
    for (i, pair) in evals.windows(2).enumerate() {
        let ratio = (pair[1] - pair[0]) / ((g - i) as f64 + 1.0);
        running = running.max(ratio);
        csg += running;
    }
    csg
}
