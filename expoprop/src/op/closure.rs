use std::cell::RefCell;

use num_traits::Zero;

use crate::{
    error::{ExpopropError, OperatorError},
    op::{check_combination, OpStatistics},
    scalar::{minus_i, scalar},
    Op, OperatorKind, OperatorState, Scalar, StateVector, TimeDependentOperator,
    TimeDependentOperatorRef,
};

type DerivativeFn = fn(&StateVector, f64, &mut StateVector);

/// A time-dependent operator given by a closure `func(x, t, y)` that computes `y = H(t) x`.
///
/// An optional second closure of the same signature computes `y = H'(t) x`. Snapshots of
/// combinations call the closure once per node and accumulate through one temporary owned by
/// the operator, so snapshots never allocate vectors.
pub struct ClosureOperator<F, D = DerivativeFn>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    func: F,
    derivative: Option<D>,
    nstates: usize,
    kind: OperatorKind,
    hermitian: bool,
    tmp: RefCell<StateVector>,
    statistics: RefCell<OpStatistics>,
}

impl<F> ClosureOperator<F>
where
    F: Fn(&StateVector, f64, &mut StateVector),
{
    pub fn new(func: F, nstates: usize, kind: OperatorKind) -> Self {
        Self {
            func,
            derivative: None,
            nstates,
            kind,
            hermitian: false,
            tmp: RefCell::new(StateVector::zeros(nstates)),
            statistics: RefCell::new(OpStatistics::default()),
        }
    }
}

impl<F, D> ClosureOperator<F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    pub fn with_derivative<D2>(self, derivative: D2) -> ClosureOperator<F, D2>
    where
        D2: Fn(&StateVector, f64, &mut StateVector),
    {
        ClosureOperator {
            func: self.func,
            derivative: Some(derivative),
            nstates: self.nstates,
            kind: self.kind,
            hermitian: self.hermitian,
            tmp: self.tmp,
            statistics: self.statistics,
        }
    }

    /// Declare that `H(t)` is Hermitian for every `t`.
    pub fn hermitian(mut self, hermitian: bool) -> Self {
        self.hermitian = hermitian;
        self
    }

    fn snapshot(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
        derivative: bool,
    ) -> Result<ClosureState<'_, F, D>, ExpopropError> {
        check_combination(offsets, weights)?;
        if derivative && self.derivative.is_none() {
            return Err(crate::operator_error!(DerivativeNotImplemented));
        }
        let nodes = offsets
            .iter()
            .zip(weights)
            .filter(|(_, w)| **w != 0.0)
            .map(|(&o, &w)| (t + o, w))
            .collect();
        Ok(ClosureState {
            op: self,
            nodes,
            derivative,
        })
    }
}

impl<F, D> Op for ClosureOperator<F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn is_hermitian(&self) -> bool {
        self.hermitian
    }
    fn statistics(&self) -> OpStatistics {
        self.statistics.borrow().clone()
    }
}

impl<'a, F, D> TimeDependentOperatorRef<'a> for ClosureOperator<F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    type State = ClosureState<'a, F, D>;
}

impl<F, D> TimeDependentOperator for ClosureOperator<F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    fn kind(&self) -> OperatorKind {
        self.kind
    }

    fn evaluate_combination(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
    ) -> Result<ClosureState<'_, F, D>, ExpopropError> {
        self.statistics.borrow_mut().increment_evaluation();
        self.snapshot(t, offsets, weights, false)
    }

    fn evaluate_derivative_combination(
        &self,
        t: f64,
        offsets: &[f64],
        weights: &[f64],
    ) -> Result<ClosureState<'_, F, D>, ExpopropError> {
        self.statistics
            .borrow_mut()
            .increment_derivative_evaluation();
        self.snapshot(t, offsets, weights, true)
    }

    fn has_derivative(&self) -> bool {
        self.derivative.is_some()
    }
}

/// Snapshot of a [ClosureOperator]: the absolute times and weights of the combination.
pub struct ClosureState<'a, F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    op: &'a ClosureOperator<F, D>,
    nodes: Vec<(f64, f64)>,
    derivative: bool,
}

impl<F, D> ClosureState<'_, F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    fn call(&self, x: &StateVector, t: f64, y: &mut StateVector) {
        match (&self.op.derivative, self.derivative) {
            (Some(d), true) => d(x, t, y),
            _ => (self.op.func)(x, t, y),
        }
    }
}

impl<F, D> Op for ClosureState<'_, F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    fn nstates(&self) -> usize {
        self.op.nstates
    }
    fn is_hermitian(&self) -> bool {
        self.op.kind == OperatorKind::Linear && self.op.hermitian
    }
    fn statistics(&self) -> OpStatistics {
        self.op.statistics()
    }
}

impl<F, D> OperatorState for ClosureState<'_, F, D>
where
    F: Fn(&StateVector, f64, &mut StateVector),
    D: Fn(&StateVector, f64, &mut StateVector),
{
    fn apply_inplace(&self, x: &StateVector, y: &mut StateVector) {
        self.op.statistics.borrow_mut().increment_application();
        let Some((&(t0, w0), rest)) = self.nodes.split_first() else {
            y.fill(Scalar::zero());
            return;
        };
        self.call(x, t0, y);
        let mut w0 = scalar(w0);
        if self.op.kind == OperatorKind::Schroedinger {
            w0 *= minus_i();
        }
        *y *= w0;
        if rest.is_empty() {
            return;
        }
        let mut tmp = self.op.tmp.borrow_mut();
        for &(t, w) in rest {
            self.call(x, t, &mut tmp);
            let mut w = scalar(w);
            if self.op.kind == OperatorKind::Schroedinger {
                w *= minus_i();
            }
            y.axpy(w, &*tmp, Scalar::from(1.0));
        }
    }
}
