//! The handful of dense linear algebra kernels needed to fit cost models.

use nalgebra::{DMatrix, DVector, DVectorView};

/// Dot product of two equally long vectors.
///
/// # Examples
/// ```
/// # use tncplan::linalg::dot;
/// assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, -5.0, 6.0]), 12.0);
/// ```
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    assert_eq!(x.len(), y.len(), "dot product of vectors of different length");
    DVectorView::from_slice(x, x.len()).dot(&DVectorView::from_slice(y, y.len()))
}

/// A least-squares system `A x ~= b` compressed to `n` rows, where `n` is the number
/// of unknowns: `r` is an upper triangular `n x n` matrix and `rhs` has `n` entries,
/// such that minimizing `|r x - rhs|` is equivalent to minimizing `|A x - b|`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedSystem {
    pub r: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl CompressedSystem {
    /// An all-zero system with `n` unknowns, i.e., a contribution without data.
    pub fn zeros(n: usize) -> Self {
        Self {
            r: DMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
        }
    }

    /// The number of unknowns.
    pub fn unknowns(&self) -> usize {
        self.rhs.len()
    }
}

/// Compresses the tall system `a x ~= b` via a Householder QR factorization
/// `a = Q R`: keeps the top square block of `R` and the top entries of `Q^T b`.
///
/// # Panics
/// Panics if `a` has fewer rows than columns or if `b` does not match `a`.
pub fn compress_qr(a: DMatrix<f64>, mut b: DVector<f64>) -> CompressedSystem {
    let (rows, cols) = a.shape();
    assert!(rows >= cols, "system with {rows} rows can not be compressed to {cols}");
    assert_eq!(b.len(), rows, "right hand side does not match the system");

    let qr = a.qr();
    qr.q_tr_mul(&mut b);
    CompressedSystem {
        r: qr.r(),
        rhs: b.rows(0, cols).into_owned(),
    }
}

/// Solves the (possibly rank deficient) least-squares problem `a x ~= b` using a
/// singular value decomposition. Singular values below machine precision relative
/// to the largest one are treated as zero.
///
/// # Panics
/// Panics if the decomposition fails or yields a non-finite solution.
pub fn solve_least_squares(a: DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    assert_eq!(b.len(), a.nrows(), "right hand side does not match the system");
    let svd = a.svd(true, true);
    let largest = svd.singular_values.max();
    let cutoff = f64::EPSILON * largest;
    let solution = svd
        .solve(b, cutoff)
        .unwrap_or_else(|err| panic!("least-squares solve failed: {err}"));
    assert!(
        solution.iter().all(|x| x.is_finite()),
        "least-squares solve produced non-finite coefficients"
    );
    solution
}
