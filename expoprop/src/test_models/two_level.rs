use nalgebra_sparse::CooMatrix;

use crate::{op::matrix::MatrixOperator, scalar::scalar, OperatorKind, Scalar, StateVector};

/// `i dψ/dt = H ψ` with the constant `H = diag(1, -1)`.
pub fn operator() -> MatrixOperator {
    let mut h = CooMatrix::new(2, 2);
    h.push(0, 0, scalar(1.0));
    h.push(1, 1, scalar(-1.0));
    MatrixOperator::new(OperatorKind::Schroedinger).with_constant_term((&h).into())
}

pub fn initial_state() -> StateVector {
    StateVector::from_vec(vec![scalar(1.0), scalar(0.0)])
}

/// Solution at `t` starting from [initial_state] at `t0`: `(exp(-i (t - t0)), 0)`.
pub fn exact_solution(t0: f64, t: f64) -> StateVector {
    StateVector::from_vec(vec![
        Scalar::new(0.0, -(t - t0)).exp(),
        scalar(0.0),
    ])
}
