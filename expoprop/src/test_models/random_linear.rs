use nalgebra_sparse::CsrMatrix;

use crate::{op::matrix::MatrixOperator, DenseMatrix, OperatorKind, Scalar, StateVector};

fn coefficient_matrix(n: usize, k: usize) -> DenseMatrix {
    let scale = 1.0 / (n as f64).sqrt();
    let k = k as f64;
    DenseMatrix::from_fn(n, n, |i, j| {
        let (i, j) = (i as f64, j as f64);
        Scalar::new(
            (1.3 * i + 0.7 * j + k + 0.1).sin(),
            0.5 * (0.9 * i - 1.1 * j + 2.0 * k).cos(),
        ) * scale
    })
}

/// Generic (non-normal, complex) linear operator `A(t) = A0 + t A1 + t^2 A2` with
/// deterministic pseudo-random entries of unit scale.
pub fn operator(n: usize) -> MatrixOperator {
    MatrixOperator::new(OperatorKind::Linear)
        .with_constant_term(CsrMatrix::from(&coefficient_matrix(n, 0)))
        .with_term(CsrMatrix::from(&coefficient_matrix(n, 1)), |t| t, |_| 1.0)
        .with_term(
            CsrMatrix::from(&coefficient_matrix(n, 2)),
            |t| t * t,
            |t| 2.0 * t,
        )
}

pub fn initial_state(n: usize) -> StateVector {
    let v = StateVector::from_fn(n, |i, _| {
        Scalar::new(1.0 + (i as f64).cos(), (0.5 * i as f64).sin())
    });
    let norm = v.norm();
    v / Scalar::from(norm)
}
