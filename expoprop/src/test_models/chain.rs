use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{op::matrix::MatrixOperator, scalar::scalar, OperatorKind, Scalar, StateVector};

pub const HOPPING: f64 = 1.0;
pub const FIELD: f64 = 0.8;

fn hopping(n: usize) -> CsrMatrix<Scalar> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n.saturating_sub(1) {
        coo.push(i, i + 1, scalar(-HOPPING));
        coo.push(i + 1, i, scalar(-HOPPING));
    }
    CsrMatrix::from(&coo)
}

fn potential(n: usize) -> CsrMatrix<Scalar> {
    let mut coo = CooMatrix::new(n, n);
    let centre = 0.5 * (n as f64 - 1.0);
    for i in 0..n {
        coo.push(i, i, scalar((i as f64 - centre) / n as f64));
    }
    CsrMatrix::from(&coo)
}

/// Tight-binding chain of `n` sites in an oscillating linear field,
/// `H(t) = H_hop + FIELD sin(t) H_pot`. Hermitian and sparse.
pub fn operator(n: usize) -> MatrixOperator {
    MatrixOperator::new(OperatorKind::Schroedinger)
        .with_constant_term(hopping(n))
        .with_term(
            potential(n),
            |t| FIELD * t.sin(),
            |t| FIELD * t.cos(),
        )
}

/// Normalised Gaussian wave packet centred on the middle of the chain.
pub fn initial_state(n: usize) -> StateVector {
    let centre = 0.5 * (n as f64 - 1.0);
    let width = (n as f64 / 8.0).max(1.0);
    let v = StateVector::from_fn(n, |i, _| {
        let x = i as f64 - centre;
        Scalar::from_polar((-(x * x) / (2.0 * width * width)).exp(), 0.7 * x)
    });
    let norm = v.norm();
    v / Scalar::from(norm)
}
