use approx::assert_abs_diff_eq;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::laplacian::*;

fn overlap_matrix() -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&vec![
        vec![0.7, 0.2, 0.1],
        vec![0.3, 0.6, 0.1],
        vec![0.0, 0.1, 0.9],
    ])
    .unwrap()
}

#[test]
fn test_bray_curtis_basic() {
    assert_abs_diff_eq!(bray_curtis(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bray_curtis(&[0.4, 0.6], &[0.4, 0.6]), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bray_curtis(&[1.0, 2.0], &[2.0, 1.0]), 1.0 / 3.0, epsilon = 1e-12);
    assert_eq!(bray_curtis(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
}

#[test]
fn test_affinity_is_symmetric_with_unit_diagonal() {
    let w = affinity_matrix(&overlap_matrix());
    assert_eq!(w.shape(), (3, 3));
    for i in 0..3 {
        assert_abs_diff_eq!(*w.get((i, i)), 1.0, epsilon = 1e-12);
        for j in 0..3 {
            assert_abs_diff_eq!(*w.get((i, j)), *w.get((j, i)), epsilon = 1e-12);
            assert!(*w.get((i, j)) >= 0.0 && *w.get((i, j)) <= 1.0);
        }
    }
    // rows 0 and 1 differ by 0.4 + 0.4 + 0.0 over a total mass of 2: BC = 0.4
    assert_abs_diff_eq!(*w.get((0, 1)), 0.6, epsilon = 1e-12);
}

#[test]
fn test_laplacian_rows_sum_to_zero() {
    let l = laplacian_from_affinity(&affinity_matrix(&overlap_matrix()));
    for i in 0..3 {
        let row_sum: f64 = (0..3).map(|j| *l.get((i, j))).sum();
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-12);
        assert!(*l.get((i, i)) >= 0.0);
    }
}

#[test]
fn test_laplacian_ignores_self_loops() {
    let w = DenseMatrix::from_2d_vec(&vec![vec![5.0, 0.5], vec![0.5, 7.0]]).unwrap();
    let l = laplacian_from_affinity(&w);
    assert_abs_diff_eq!(*l.get((0, 0)), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(*l.get((1, 1)), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(*l.get((0, 1)), -0.5, epsilon = 1e-12);
}

#[test]
fn test_symmetric_eigen_sorted_ascending() {
    let m = DenseMatrix::from_2d_vec(&vec![vec![2.0, -1.0], vec![-1.0, 2.0]]).unwrap();
    let spectral = symmetric_eigen(&m).unwrap();

    assert_abs_diff_eq!(spectral.evals[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(spectral.evals[1], 3.0, epsilon = 1e-9);

    // M v = λ v for every column
    for k in 0..2 {
        for i in 0..2 {
            let mv: f64 = (0..2)
                .map(|j| *m.get((i, j)) * *spectral.evecs.get((j, k)))
                .sum();
            let lv = spectral.evals[k] * *spectral.evecs.get((i, k));
            assert_abs_diff_eq!(mv, lv, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_laplacian_spectrum_starts_at_zero() {
    let l = laplacian_from_affinity(&affinity_matrix(&overlap_matrix()));
    let spectral = symmetric_eigen(&l).unwrap();
    assert_eq!(spectral.evals.len(), 3);
    assert_abs_diff_eq!(spectral.evals[0], 0.0, epsilon = 1e-9);
    assert!(spectral.evals.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_cumulative_spectral_gradient() {
    // gaps 1 and 2 normalised by 3 and 2, running max 1/3 then 1
    assert_abs_diff_eq!(
        cumulative_spectral_gradient(&[0.0, 1.0, 3.0]),
        4.0 / 3.0,
        epsilon = 1e-12
    );
    assert_eq!(cumulative_spectral_gradient(&[0.0]), 0.0);
    assert_eq!(cumulative_spectral_gradient(&[]), 0.0);
}

#[test]
fn test_nan_decomposition() {
    let nan = SpectralDecomposition::nan(2);
    assert!(nan.is_nan());
    assert!(nan.evecs.get((1, 0)).is_nan());
}
