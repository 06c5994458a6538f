use nalgebra_sparse::CooMatrix;

use crate::{op::matrix::MatrixOperator, scalar::scalar, OperatorKind, StateVector};

pub const SPLITTING: f64 = 1.0;
pub const AMPLITUDE: f64 = 0.5;
pub const FREQUENCY: f64 = 1.3;

/// Driven two-level system `H(t) = SPLITTING / 2 σz + AMPLITUDE cos(FREQUENCY t) σx`.
pub fn operator() -> MatrixOperator {
    let mut sz = CooMatrix::new(2, 2);
    sz.push(0, 0, scalar(0.5 * SPLITTING));
    sz.push(1, 1, scalar(-0.5 * SPLITTING));
    let mut sx = CooMatrix::new(2, 2);
    sx.push(0, 1, scalar(1.0));
    sx.push(1, 0, scalar(1.0));
    MatrixOperator::new(OperatorKind::Schroedinger)
        .with_constant_term((&sz).into())
        .with_term(
            (&sx).into(),
            |t| AMPLITUDE * (FREQUENCY * t).cos(),
            |t| -AMPLITUDE * FREQUENCY * (FREQUENCY * t).sin(),
        )
}

pub fn initial_state() -> StateVector {
    StateVector::from_vec(vec![scalar(1.0), scalar(0.0)])
}
