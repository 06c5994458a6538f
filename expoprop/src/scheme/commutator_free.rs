use nalgebra::DMatrix;
use num_traits::Zero;
use tracing::trace;

use crate::{
    error::{ExpopropError, SchemeError},
    expmv::expmv_inplace,
    scalar::scalar,
    scheme::{
        coefficients::*,
        defect::{self, MAX_GAMMA_ORDER},
        workspace::Combination,
        SchemeFlags, SchemeOverrides, Workspace,
    },
    OperatorState, Scalar, StateVector, TimeDependentOperator,
};

/// A commutator-free exponential integrator
///
/// $$
/// \psi_{n+1} = \exp(dt B_J) \cdots \exp(dt B_1) \psi_n, \quad B_j = \sum_k a_{jk} A(t_n + c_k dt)
/// $$
///
/// `a` has one row per exponential, in application order, and one column per node in `c`.
#[derive(Debug, Clone)]
pub struct CommutatorFreeScheme {
    a: DMatrix<f64>,
    c: Vec<f64>,
    order: usize,
    flags: SchemeFlags,
}

impl CommutatorFreeScheme {
    pub fn new(a: DMatrix<f64>, c: Vec<f64>, order: usize) -> Result<Self, ExpopropError> {
        if a.nrows() == 0 || a.ncols() != c.len() {
            return Err(crate::scheme_error!(
                InvalidCoefficients,
                format!(
                    "coefficient matrix is {}x{} but there are {} nodes",
                    a.nrows(),
                    a.ncols(),
                    c.len()
                )
            ));
        }
        if order == 0 {
            return Err(crate::scheme_error!(InvalidCoefficients, "order must be at least 1"));
        }
        if a.iter().chain(c.iter()).any(|x| !x.is_finite()) {
            return Err(crate::scheme_error!(InvalidCoefficients, "coefficients must be finite"));
        }
        Ok(Self {
            a,
            c,
            order,
            flags: SchemeFlags::default(),
        })
    }

    fn from_table<const J: usize, const K: usize>(
        table: &[[f64; K]; J],
        c: &[f64; K],
        order: usize,
    ) -> Self {
        Self {
            a: DMatrix::from_fn(J, K, |j, k| table[j][k]),
            c: c.to_vec(),
            order,
            flags: SchemeFlags::default(),
        }
    }

    /// Exponential midpoint rule, order 2.
    pub fn cf2() -> Self {
        Self::from_table(&CF2_WEIGHTS, &CF2_NODES, 2)
    }

    /// Two exponentials on the Gauss nodes, order 4.
    pub fn cf4() -> Self {
        Self::from_table(&CF4_WEIGHTS, &GAUSS2_NODES, 4)
    }

    /// Three exponentials with optimised error constants, order 4.
    pub fn cf4o() -> Self {
        let c = [GAUSS3_NODES[0], GAUSS3_NODES[1], GAUSS3_NODES[2]];
        Self::from_table(&CF4O_WEIGHTS, &c, 4)
    }

    /// Six exponentials on three Gauss nodes, order 6.
    pub fn cf6() -> Self {
        Self::from_table(&CF6_WEIGHTS, &GAUSS3_NODES, 6)
    }

    /// Non-symmetric five-fold composition of [Self::cf6], order 7: 30 exponentials on 15
    /// nodes per step.
    pub fn cf7() -> Self {
        Self::compose(&Self::cf6(), &ORDER7_FRACTIONS, 7)
    }

    /// Symmetric five-fold composition of [Self::cf6] (Suzuki), order 8: 30 exponentials on 15
    /// nodes per step.
    pub fn cf8() -> Self {
        Self::compose(&Self::cf6(), &SUZUKI8_FRACTIONS, 8)
    }

    /// Symmetric five-fold composition of [Self::cf8] (Suzuki), order 10: 150 exponentials on
    /// 75 nodes per step.
    pub fn cf10() -> Self {
        Self::compose(&Self::cf8(), &SUZUKI10_FRACTIONS, 10)
    }

    /// The scheme obtained by taking consecutive sub-steps of `base` with sizes
    /// `fractions[i] * dt`. The fractions must sum to one; their order conditions are the
    /// caller's responsibility.
    pub fn composition(
        base: &Self,
        fractions: &[f64],
        order: usize,
    ) -> Result<Self, ExpopropError> {
        let total: f64 = fractions.iter().sum();
        if fractions.is_empty() || (total - 1.0).abs() > 1e-12 {
            return Err(crate::scheme_error!(
                InvalidCoefficients,
                format!("composition fractions must sum to one, got {total}")
            ));
        }
        Ok(Self::compose(base, fractions, order))
    }

    fn compose(base: &Self, fractions: &[f64], order: usize) -> Self {
        let (j, k) = base.a.shape();
        let n = fractions.len();
        let mut a = DMatrix::zeros(j * n, k * n);
        let mut c = Vec::with_capacity(k * n);
        let mut start = 0.0;
        for (i, &f) in fractions.iter().enumerate() {
            a.view_mut((i * j, i * k), (j, k))
                .copy_from(&(&base.a * f));
            c.extend(base.c.iter().map(|&ck| start + f * ck));
            start += f;
        }
        Self {
            a,
            c,
            order,
            flags: base.flags,
        }
    }

    /// The adjoint scheme: exponentials in reverse order with reflected nodes `1 - c`.
    pub fn adjoint(&self) -> Self {
        let (j, k) = self.a.shape();
        Self {
            a: DMatrix::from_fn(j, k, |r, s| self.a[(j - 1 - r, k - 1 - s)]),
            c: self.c.iter().rev().map(|&ck| 1.0 - ck).collect(),
            order: self.order,
            flags: self.flags,
        }
    }

    pub fn with_flags(mut self, flags: SchemeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// A copy of this scheme with some estimator flags replaced.
    pub fn with_overrides(&self, overrides: SchemeOverrides) -> Self {
        let mut s = self.clone();
        s.flags = self.flags.with_overrides(overrides);
        s
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn flags(&self) -> SchemeFlags {
        self.flags
    }

    /// Number of exponentials per step.
    pub fn nexp(&self) -> usize {
        self.a.nrows()
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn c(&self) -> &[f64] {
        &self.c
    }

    pub(crate) fn workspace_size(&self) -> usize {
        defect::DEFECT_SCRATCH
    }

    fn is_midpoint_type(&self) -> bool {
        self.order == 2 && self.nexp() == 1
    }

    pub fn check_estimator(&self) -> Result<(), ExpopropError> {
        if self.flags.adjoint_based {
            if self.order % 2 == 0 {
                return Err(ExpopropError::from(SchemeError::AdjointRequiresOddOrder {
                    order: self.order,
                }));
            }
            return Ok(());
        }
        if self.flags.trapezoidal_rule || self.is_midpoint_type() {
            return Ok(());
        }
        if self.order > MAX_GAMMA_ORDER {
            return Err(ExpopropError::from(SchemeError::DefectOrderTooHigh {
                order: self.order,
            }));
        }
        Ok(())
    }

    /// Load the combination of exponential `j`; for the adjoint, exponential `j` of the adjoint
    /// scheme.
    fn load(&self, j: usize, dt: f64, adjoint: bool, combination: &mut Combination) {
        combination.clear();
        let row = if adjoint { self.nexp() - 1 - j } else { j };
        for (k, &ck) in self.c.iter().enumerate() {
            let a = self.a[(row, k)];
            if a != 0.0 {
                let ck = if adjoint { 1.0 - ck } else { ck };
                combination.push(ck, a, dt);
            }
        }
    }

    fn apply_exponentials<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        t: f64,
        dt: f64,
        adjoint: bool,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        for j in 0..self.nexp() {
            self.load(j, dt, adjoint, &mut ws.combination);
            let b = op.evaluate_combination(
                t,
                &ws.combination.offsets,
                &ws.combination.weights,
            )?;
            expmv_inplace(dt, &b, psi, &mut ws.krylov)?;
        }
        Ok(())
    }

    pub fn step<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        if dt == 0.0 {
            return Ok(());
        }
        self.apply_exponentials(op, psi, t, dt, false, ws)
    }

    pub fn step_estimated<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        self.check_estimator()?;
        psi_est.fill(Scalar::zero());
        if dt == 0.0 {
            return Ok(());
        }
        if self.flags.adjoint_based {
            trace!(t, dt, "adjoint-based error estimate");
            return self.step_adjoint_estimated(op, psi, psi_est, t, dt, ws);
        }
        if self.is_midpoint_type() && self.flags.symmetrized_defect {
            return self.step_midpoint_symmetrized(op, psi, psi_est, t, dt, ws);
        }
        if self.is_midpoint_type() && self.flags.trapezoidal_rule {
            return self.step_midpoint_trapezoidal(op, psi, psi_est, t, dt, ws);
        }

        let Workspace {
            slots,
            krylov,
            combination,
            ..
        } = ws;
        for j in 0..self.nexp() {
            self.load(j, dt, false, combination);
            let b = op.evaluate_combination(t, &combination.offsets, &combination.weights)?;
            let bd = op.evaluate_derivative_combination(
                t,
                &combination.offsets,
                &combination.derivative_weights,
            )?;
            if self.flags.trapezoidal_rule {
                defect::trapezoidal_factor(&b, &bd, psi, psi_est, dt, krylov, slots)?;
            } else {
                defect::gamma_factor(
                    &b,
                    &bd,
                    psi,
                    psi_est,
                    j == 0,
                    self.order,
                    dt,
                    self.flags.modified_gamma,
                    krylov,
                    slots,
                )?;
            }
        }
        defect::finish(op, t, dt, self.order, psi, psi_est, &mut slots[0])
    }

    /// Odd-order estimate `(S(dt) - S*(dt)) psi / 2` from the adjoint scheme `S*`, whose
    /// leading error term has the opposite sign.
    fn step_adjoint_estimated<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        psi_est.copy_from(psi);
        self.apply_exponentials(op, psi_est, t, dt, true, ws)?;
        self.apply_exponentials(op, psi, t, dt, false, ws)?;
        // psi_est = (psi - psi_est) / 2
        psi_est.axpy(scalar(0.5), psi, scalar(-0.5));
        Ok(())
    }

    /// Midpoint-type schemes with the symmetrized defect, computed with three half-step
    /// exponentials:
    ///
    /// $$
    /// u = E_{1/2} \psi, \quad g = X u + \frac{dt^3}{24} [B, [B, B']] u, \quad
    /// \psi_{est} = \frac{dt}{3} (E_{1/2} g - A(t + dt) E_{1/2} u)
    /// $$
    ///
    /// with `X = B + dt B'`.
    fn step_midpoint_symmetrized<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        let Workspace {
            slots,
            krylov,
            combination,
            ..
        } = ws;
        self.load(0, dt, false, combination);
        let b = op.evaluate_combination(t, &combination.offsets, &combination.weights)?;
        let bd = op.evaluate_derivative_combination(
            t,
            &combination.offsets,
            &combination.derivative_weights,
        )?;
        let found = slots.len();
        let [u, g, t1, t2, t3, ..] = slots.as_mut_slice() else {
            return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
                required: 5,
                found,
            }));
        };
        let one = scalar(1.0);
        let c = dt * dt * dt / 24.0;

        expmv_inplace(0.5 * dt, &b, psi, krylov)?;
        u.copy_from(psi);
        expmv_inplace(0.5 * dt, &b, psi, krylov)?;

        // g = (B + dt B') u
        b.apply_inplace(u, g);
        bd.apply_inplace(u, t2);
        g.axpy(scalar(dt), t2, one);
        // + c B B B' u
        b.apply_inplace(t2, t3);
        b.apply_inplace(t3, t2);
        g.axpy(scalar(c), t2, one);
        // - 2c B B' B u
        b.apply_inplace(u, t1);
        bd.apply_inplace(t1, t2);
        b.apply_inplace(t2, t3);
        g.axpy(scalar(-2.0 * c), t3, one);
        // + c B' B B u
        b.apply_inplace(t1, t2);
        bd.apply_inplace(t2, t3);
        g.axpy(scalar(c), t3, one);

        psi_est.copy_from(g);
        expmv_inplace(0.5 * dt, &b, psi_est, krylov)?;
        defect::finish(op, t, dt, self.order, psi, psi_est, t1)
    }

    /// Midpoint-type schemes with the trapezoidal rule. The start-point term shares the
    /// single exponential with the state, so two exponentials suffice.
    fn step_midpoint_trapezoidal<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        let Workspace {
            slots,
            krylov,
            combination,
            ..
        } = ws;
        self.load(0, dt, false, combination);
        let b = op.evaluate_combination(t, &combination.offsets, &combination.weights)?;
        let bd = op.evaluate_derivative_combination(
            t,
            &combination.offsets,
            &combination.derivative_weights,
        )?;
        let (r, rest) = defect::split_first(slots)?;
        let one = scalar(1.0);
        defect::trapezoidal(psi_est, &b, &bd, psi, dt, -1.0, rest)?;
        expmv_inplace(dt, &b, psi_est, krylov)?;
        expmv_inplace(dt, &b, psi, krylov)?;
        defect::trapezoidal(r, &b, &bd, psi, dt, 1.0, rest)?;
        psi_est.axpy(one, r, one);
        defect::finish(op, t, dt, self.order, psi, psi_est, r)
    }
}
