use crate::{
    error::{ExpopropError, OperatorError},
    DenseMatrix, Scalar, StateVector,
};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

pub mod closure;
pub mod magnus;
pub mod matrix;

/// How the stored operator `H(t)` relates to the generator `A(t)` of `dψ/dt = A(t)ψ`.
///
/// - `Linear`: `A(t) = H(t)`.
/// - `Schroedinger`: `A(t) = -i H(t)`, i.e. the equation is `i dψ/dt = H(t)ψ`.
///
/// Snapshots of a Schroedinger-kind operator fold the `-i` factor into their action, so the
/// integrators only ever see `A(t)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    Linear,
    Schroedinger,
}

/// Scalar domain of the stored operator entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    Real,
    Complex,
}

/// A generic operator trait.
///
/// Op describes the shape of an operator acting on state vectors: the number of input states
/// (the length of `x`) and outputs (the length of `y`), the scalar domain of its entries and
/// structural predicates that callers may use to pick faster algorithms.
pub trait Op {
    /// Return the number of input states of the operator.
    fn nstates(&self) -> usize;

    /// Return the number of outputs of the operator.
    fn nout(&self) -> usize {
        self.nstates()
    }

    fn element_type(&self) -> ElementType {
        ElementType::Complex
    }

    fn is_symmetric(&self) -> bool {
        false
    }

    fn is_hermitian(&self) -> bool {
        false
    }

    /// Fail with a dimension error unless `nstates == nout`.
    fn check_square(&self) -> Result<(), ExpopropError> {
        if self.nstates() != self.nout() {
            return Err(ExpopropError::from(OperatorError::NotSquare {
                nstates: self.nstates(),
                nout: self.nout(),
            }));
        }
        Ok(())
    }

    /// Return statistics about the operator (e.g. how many times it was evaluated or applied)
    fn statistics(&self) -> OpStatistics {
        OpStatistics::default()
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct OpStatistics {
    pub number_of_evaluations: usize,
    pub number_of_derivative_evaluations: usize,
    pub number_of_applications: usize,
}

impl OpStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_evaluation(&mut self) {
        self.number_of_evaluations += 1;
    }

    pub fn increment_derivative_evaluation(&mut self) {
        self.number_of_derivative_evaluations += 1;
    }

    pub fn increment_application(&mut self) {
        self.number_of_applications += 1;
    }
}

impl<C: Op> Op for &C {
    fn nstates(&self) -> usize {
        C::nstates(*self)
    }
    fn nout(&self) -> usize {
        C::nout(*self)
    }
    fn element_type(&self) -> ElementType {
        C::element_type(*self)
    }
    fn is_symmetric(&self) -> bool {
        C::is_symmetric(*self)
    }
    fn is_hermitian(&self) -> bool {
        C::is_hermitian(*self)
    }
    fn statistics(&self) -> OpStatistics {
        C::statistics(*self)
    }
}

/// A frozen, time-independent linear map: the operator (or a weighted combination of
/// operators, or a derivative of one) evaluated at fixed times.
///
/// Snapshots are cheap to create and are consumed by the exponential kernel and the defect
/// estimators through [OperatorState::apply_inplace] only.
pub trait OperatorState: Op {
    /// Compute `y = A x`, overwriting `y`.
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector);

    fn apply(&self, x: &StateVector) -> StateVector {
        let mut y = StateVector::zeros(self.nout());
        self.apply_inplace(x, &mut y);
        y
    }

    /// Assemble the dense matrix of the snapshot, by applying it to each unit vector.
    fn matrix(&self) -> DenseMatrix {
        let n = self.nstates();
        let mut m = DenseMatrix::zeros(self.nout(), n);
        let mut e = StateVector::zeros(n);
        let mut col = StateVector::zeros(self.nout());
        for j in 0..n {
            e[j] = Scalar::one();
            self.apply_inplace(&e, &mut col);
            m.set_column(j, &col);
            e[j] = Scalar::zero();
        }
        m
    }

    /// Fail with a dimension error unless `v` has `nstates` entries.
    fn check_dimension(&self, v: &StateVector) -> Result<(), ExpopropError> {
        if v.len() != self.nstates() {
            return Err(ExpopropError::from(OperatorError::DimensionMismatch {
                expected: self.nstates(),
                found: v.len(),
            }));
        }
        Ok(())
    }
}

impl<S: OperatorState> OperatorState for &S {
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector) {
        S::apply_inplace(*self, x, y)
    }
}

/// Associates a time-dependent operator with the snapshot type it produces.
///
/// The snapshot may borrow the operator, hence the lifetime; see [TimeDependentOperator].
pub trait TimeDependentOperatorRef<'a, ImplicitBounds: Sealed = Bounds<&'a Self>>: Op {
    type State: OperatorState;
}

// seal the trait so that users must use the provided default type for ImplicitBounds
mod sealed {
    pub trait Sealed: Sized {}
    pub struct Bounds<T>(T);
    impl<T> Sealed for Bounds<T> {}
}
use sealed::{Bounds, Sealed};

/// Snapshot type produced by the time-dependent operator `H` for a borrow of lifetime `'a`.
pub type State<'a, H> = <H as TimeDependentOperatorRef<'a>>::State;

/// A square linear operator `A(t)` that depends on time.
///
/// Implementors create snapshots of weighted combinations
///
/// $$
/// B = \sum_k w_k A(t + o_k)
/// $$
///
/// for given offsets `o_k` and weights `w_k`, and optionally of the same combination of time
/// derivatives `A'`. All snapshots produced by one operator share its dimension, which is
/// checked to be square every time a snapshot is created.
pub trait TimeDependentOperator: for<'a> TimeDependentOperatorRef<'a> {
    fn kind(&self) -> OperatorKind;

    /// Snapshot of `A(t)`.
    fn evaluate(&self, t: f64) -> Result<State<'_, Self>, ExpopropError> {
        self.evaluate_combination(t, &[0.0], &[1.0])
    }

    /// Snapshot of `sum_k weights[k] * A(t + offsets[k])`.
    fn evaluate_combination(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
    ) -> Result<State<'_, Self>, ExpopropError>;

    /// Snapshot of `sum_k weights[k] * A'(t + offsets[k])`.
    fn evaluate_derivative_combination(
        &self,
        _t: f64,
        _offsets: &[f64],
        _weights: &[f64],
    ) -> Result<State<'_, Self>, ExpopropError> {
        Err(crate::operator_error!(DerivativeNotImplemented))
    }

    fn has_derivative(&self) -> bool {
        false
    }
}

pub(crate) fn check_combination(offsets: &[f64], weights: &[f64]) -> Result<(), ExpopropError> {
    if offsets.len() != weights.len() {
        return Err(ExpopropError::from(
            OperatorError::CombinationLengthMismatch {
                offsets: offsets.len(),
                weights: weights.len(),
            },
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{op::matrix::MatrixOperator, test_models::two_level};
    use nalgebra_sparse::CsrMatrix;

    #[test]
    fn non_square_operator_is_rejected() {
        let m = CsrMatrix::<Scalar>::zeros(2, 3);
        let op = MatrixOperator::new(OperatorKind::Linear).with_constant_term(m);
        let err = op.evaluate(0.0).err().unwrap();
        assert!(matches!(
            err,
            ExpopropError::OperatorError(OperatorError::NotSquare { nstates: 3, nout: 2 })
        ));
    }

    #[test]
    fn default_matrix_assembles_columns() {
        let op = two_level::operator();
        let state = op.evaluate(0.0).unwrap();
        let m = state.matrix();
        assert_eq!(m[(0, 0)], Scalar::new(0.0, -1.0));
        assert_eq!(m[(1, 1)], Scalar::new(0.0, 1.0));
        assert_eq!(m[(0, 1)], Scalar::zero());
    }

    #[test]
    fn check_dimension_reports_lengths() {
        let op = two_level::operator();
        let state = op.evaluate(0.0).unwrap();
        let v = StateVector::zeros(3);
        let err = state.check_dimension(&v).err().unwrap();
        assert!(matches!(
            err,
            ExpopropError::OperatorError(OperatorError::DimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn mismatched_combination_lengths_are_rejected() {
        let op = two_level::operator();
        assert!(op.evaluate_combination(0.0, &[0.0, 0.5], &[1.0]).is_err());
    }
}
