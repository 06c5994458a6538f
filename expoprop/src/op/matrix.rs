use std::cell::RefCell;

use nalgebra_sparse::{
    ops::{serial::spmm_csr_dense, Op as SparseOp},
    CsrMatrix,
};
use num_traits::{One, Zero};

use crate::{
    error::{ExpopropError, OperatorError},
    op::{check_combination, OpStatistics},
    scalar::{minus_i, scalar},
    ElementType, Op, OperatorKind, OperatorState, Scalar, StateVector, TimeDependentOperator,
    TimeDependentOperatorRef,
};

/// Real-valued coefficient function `f(t)` of one term of a [MatrixOperator].
pub type Coefficient = Box<dyn Fn(f64) -> f64>;

struct Term {
    matrix: CsrMatrix<Scalar>,
    coefficient: Coefficient,
    derivative: Option<Coefficient>,
}

/// A time-dependent operator given as a sum of constant sparse matrices with real,
/// time-dependent coefficients
///
/// $$
/// H(t) = \sum_m f_m(t) H_m
/// $$
///
/// A weighted combination of evaluations only combines the scalar coefficients, so every
/// snapshot costs one sparse matrix-vector product per term, regardless of the number of nodes.
pub struct MatrixOperator {
    terms: Vec<Term>,
    kind: OperatorKind,
    statistics: RefCell<OpStatistics>,
}

impl MatrixOperator {
    pub fn new(kind: OperatorKind) -> Self {
        Self {
            terms: Vec::new(),
            kind,
            statistics: RefCell::new(OpStatistics::default()),
        }
    }

    /// Add a term `f(t) H` with time derivative `f'(t) H`.
    pub fn with_term(
        mut self,
        matrix: CsrMatrix<Scalar>,
        coefficient: impl Fn(f64) -> f64 + 'static,
        derivative: impl Fn(f64) -> f64 + 'static,
    ) -> Self {
        self.terms.push(Term {
            matrix,
            coefficient: Box::new(coefficient),
            derivative: Some(Box::new(derivative)),
        });
        self
    }

    /// Add a term `f(t) H` whose time derivative is unknown. Derivative snapshots of the
    /// operator then fail with [OperatorError::DerivativeNotImplemented].
    pub fn with_term_without_derivative(
        mut self,
        matrix: CsrMatrix<Scalar>,
        coefficient: impl Fn(f64) -> f64 + 'static,
    ) -> Self {
        self.terms.push(Term {
            matrix,
            coefficient: Box::new(coefficient),
            derivative: None,
        });
        self
    }

    /// Add a time-independent term `H`.
    pub fn with_constant_term(self, matrix: CsrMatrix<Scalar>) -> Self {
        self.with_term(matrix, |_| 1.0, |_| 0.0)
    }

    pub fn nterms(&self) -> usize {
        self.terms.len()
    }

    fn combine(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
        derivative: bool,
    ) -> Result<MatrixState<'_>, ExpopropError> {
        self.check_square()?;
        check_combination(offsets, weights)?;
        let mut coefficients = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let f = if derivative {
                term.derivative
                    .as_ref()
                    .ok_or_else(|| crate::operator_error!(DerivativeNotImplemented))?
            } else {
                &term.coefficient
            };
            let g: f64 = offsets
                .iter()
                .zip(weights)
                .filter(|(_, w)| **w != 0.0)
                .map(|(&o, &w)| w * f(t + o))
                .sum();
            coefficients.push(match self.kind {
                OperatorKind::Linear => scalar(g),
                OperatorKind::Schroedinger => minus_i() * g,
            });
        }
        Ok(MatrixState {
            op: self,
            coefficients,
        })
    }
}

fn is_hermitian(m: &CsrMatrix<Scalar>, conjugate: bool) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let tol = 1e-14
        * m.values()
            .iter()
            .map(|v| v.norm())
            .fold(0.0, f64::max)
            .max(f64::MIN_POSITIVE);
    m.triplet_iter().all(|(i, j, v)| {
        let vt = m
            .get_entry(j, i)
            .map(|e| e.into_value())
            .unwrap_or_else(Scalar::zero);
        let v = if conjugate { v.conj() } else { *v };
        (vt - v).norm() <= tol
    })
}

impl Op for MatrixOperator {
    fn nstates(&self) -> usize {
        self.terms.first().map(|t| t.matrix.ncols()).unwrap_or(0)
    }
    fn nout(&self) -> usize {
        self.terms.first().map(|t| t.matrix.nrows()).unwrap_or(0)
    }
    fn element_type(&self) -> ElementType {
        if self
            .terms
            .iter()
            .all(|t| t.matrix.values().iter().all(|v| v.im == 0.0))
        {
            ElementType::Real
        } else {
            ElementType::Complex
        }
    }
    fn is_symmetric(&self) -> bool {
        self.terms.iter().all(|t| is_hermitian(&t.matrix, false))
    }
    fn is_hermitian(&self) -> bool {
        self.terms.iter().all(|t| is_hermitian(&t.matrix, true))
    }
    fn check_square(&self) -> Result<(), ExpopropError> {
        let (nout, nstates) = (self.nout(), self.nstates());
        for term in &self.terms {
            if term.matrix.nrows() != nout || term.matrix.ncols() != nstates {
                return Err(ExpopropError::from(
                    OperatorError::DimensionMismatch {
                        expected: nstates,
                        found: term.matrix.ncols(),
                    },
                ));
            }
        }
        if nstates != nout {
            return Err(ExpopropError::from(
                OperatorError::NotSquare { nstates, nout },
            ));
        }
        Ok(())
    }
    fn statistics(&self) -> OpStatistics {
        self.statistics.borrow().clone()
    }
}

impl<'a> TimeDependentOperatorRef<'a> for MatrixOperator {
    type State = MatrixState<'a>;
}

impl TimeDependentOperator for MatrixOperator {
    fn kind(&self) -> OperatorKind {
        self.kind
    }

    fn evaluate_combination(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
    ) -> Result<MatrixState<'_>, ExpopropError> {
        self.statistics.borrow_mut().increment_evaluation();
        self.combine(t, offsets, weights, false)
    }

    fn evaluate_derivative_combination(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
    ) -> Result<MatrixState<'_>, ExpopropError> {
        self.statistics
            .borrow_mut()
            .increment_derivative_evaluation();
        self.combine(t, offsets, weights, true)
    }

    fn has_derivative(&self) -> bool {
        self.terms.iter().all(|t| t.derivative.is_some())
    }
}

/// Snapshot of a [MatrixOperator]: the terms with frozen (complex) coefficients.
pub struct MatrixState<'a> {
    op: &'a MatrixOperator,
    coefficients: Vec<Scalar>,
}

impl MatrixState<'_> {
    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }
}

impl Op for MatrixState<'_> {
    fn nstates(&self) -> usize {
        self.op.nstates()
    }
    fn nout(&self) -> usize {
        self.op.nout()
    }
    fn element_type(&self) -> ElementType {
        if self.op.kind == OperatorKind::Linear
            && self.coefficients.iter().all(|c| c.im == 0.0)
            && self.op.element_type() == ElementType::Real
        {
            ElementType::Real
        } else {
            ElementType::Complex
        }
    }
    fn is_hermitian(&self) -> bool {
        self.op.kind == OperatorKind::Linear && self.op.is_hermitian()
    }
    fn is_symmetric(&self) -> bool {
        self.op.is_symmetric()
    }
    fn statistics(&self) -> OpStatistics {
        self.op.statistics()
    }
}

impl OperatorState for MatrixState<'_> {
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector) {
        self.op.statistics.borrow_mut().increment_application();
        y.fill(Scalar::zero());
        for (term, &g) in self.op.terms.iter().zip(&self.coefficients) {
            if g.is_zero() {
                continue;
            }
            // y = y + g * M x
            spmm_csr_dense(
                Scalar::one(),
                &mut *y,
                g,
                SparseOp::NoOp(&term.matrix),
                SparseOp::NoOp(x),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DenseMatrix;
    use nalgebra_sparse::CooMatrix;

    fn sigma_x() -> CsrMatrix<Scalar> {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 1, scalar(1.0));
        coo.push(1, 0, scalar(1.0));
        CsrMatrix::from(&coo)
    }

    fn sigma_y() -> CsrMatrix<Scalar> {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 1, Scalar::new(0.0, -1.0));
        coo.push(1, 0, Scalar::new(0.0, 1.0));
        CsrMatrix::from(&coo)
    }

    #[test]
    fn combination_combines_coefficients() {
        let op = MatrixOperator::new(OperatorKind::Linear).with_term(sigma_x(), |t| t, |_| 1.0);
        let state = op.evaluate_combination(1.0, &[0.0, 1.0], &[0.5, 2.0]).unwrap();
        // 0.5 * 1 + 2 * 2
        assert_eq!(state.coefficients(), &[scalar(4.5)]);
        let x = StateVector::from_vec(vec![scalar(1.0), scalar(0.0)]);
        let y = state.apply(&x);
        assert_eq!(y[1], scalar(4.5));
        assert_eq!(y[0], Scalar::zero());
    }

    #[test]
    fn apply_matches_dense_sum_of_terms() {
        let mut coo = CooMatrix::new(3, 3);
        for i in 0..3 {
            coo.push(i, i, Scalar::new(-1.0, 0.5 * i as f64));
            if i + 1 < 3 {
                coo.push(i, i + 1, scalar(2.0));
                coo.push(i + 1, i, Scalar::new(0.0, 0.3));
            }
        }
        let tridiagonal = CsrMatrix::from(&coo);
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 2, scalar(1.5));
        coo.push(2, 0, scalar(-0.5));
        let corner = CsrMatrix::from(&coo);
        let dense = DenseMatrix::from(&tridiagonal) * scalar(0.7f64.cos())
            + DenseMatrix::from(&corner) * scalar(0.7f64.sin());
        let op = MatrixOperator::new(OperatorKind::Linear)
            .with_term(tridiagonal, f64::cos, |t| -t.sin())
            .with_term(corner, f64::sin, f64::cos);
        let state = op.evaluate(0.7).unwrap();
        let x = StateVector::from_fn(3, |i, _| Scalar::new(1.0 - i as f64, 0.25 * i as f64));
        // stale contents of y must not leak into the product
        let mut y = StateVector::from_element(3, scalar(100.0));
        state.apply_inplace(&x, &mut y);
        assert!((y - dense * x).norm() < 1e-14);
    }

    #[test]
    fn schroedinger_kind_scales_by_minus_i() {
        let op = MatrixOperator::new(OperatorKind::Schroedinger).with_constant_term(sigma_x());
        let x = StateVector::from_vec(vec![scalar(1.0), scalar(0.0)]);
        let y = op.evaluate(0.0).unwrap().apply(&x);
        assert_eq!(y[1], Scalar::new(0.0, -1.0));
    }

    #[test]
    fn derivative_snapshot_uses_derivative_coefficients() {
        let op = MatrixOperator::new(OperatorKind::Linear).with_term(
            sigma_x(),
            |t| t * t,
            |t| 2.0 * t,
        );
        let state = op
            .evaluate_derivative_combination(1.0, &[0.5], &[2.0])
            .unwrap();
        assert_eq!(state.coefficients(), &[scalar(6.0)]);
    }

    #[test]
    fn missing_derivative_is_not_implemented() {
        let op = MatrixOperator::new(OperatorKind::Linear)
            .with_term_without_derivative(sigma_x(), f64::cos);
        assert!(!op.has_derivative());
        let err = op
            .evaluate_derivative_combination(0.0, &[0.0], &[1.0])
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ExpopropError::OperatorError(OperatorError::DerivativeNotImplemented)
        ));
    }

    #[test]
    fn structural_predicates() {
        let op = MatrixOperator::new(OperatorKind::Schroedinger)
            .with_constant_term(sigma_x())
            .with_term(sigma_y(), f64::sin, f64::cos);
        assert!(op.is_hermitian());
        assert!(!op.is_symmetric());
        assert_eq!(op.element_type(), ElementType::Complex);
        let real = MatrixOperator::new(OperatorKind::Linear).with_constant_term(sigma_x());
        assert!(real.is_symmetric());
        assert_eq!(real.element_type(), ElementType::Real);
    }

    #[test]
    fn statistics_count_evaluations_and_applications() {
        let op = MatrixOperator::new(OperatorKind::Linear).with_constant_term(sigma_x());
        let state = op.evaluate(0.0).unwrap();
        let x = StateVector::from_element(2, scalar(1.0));
        state.apply(&x);
        state.apply(&x);
        insta::assert_yaml_snapshot!(op.statistics(), @r###"
        number_of_evaluations: 1
        number_of_derivative_evaluations: 0
        number_of_applications: 2
        "###);
    }
}
