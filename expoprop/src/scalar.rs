use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

pub type IndexType = usize;

/// Element type of state vectors and operator entries.
pub type Scalar = Complex64;

/// State vector ψ.
pub type StateVector = DVector<Scalar>;

/// Dense complex matrix, used for dense operator assembly and the fallback exponential.
pub type DenseMatrix = DMatrix<Scalar>;

/// The imaginary unit scaled by `-1`, applied by Schroedinger-kind operators.
pub fn minus_i() -> Scalar {
    Scalar::new(0.0, -1.0)
}

/// Lift a real number into the state's scalar type.
pub fn scalar(x: f64) -> Scalar {
    Scalar::new(x, 0.0)
}
