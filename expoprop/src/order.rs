//! Empirical convergence orders.
//!
//! Every table is produced by repeatedly halving the step size, starting from `dt0`, and
//! comparing against a reference: a given vector for global errors, or a fine resolution of the
//! same interval with a reference scheme for local errors.

use serde::Serialize;

use crate::{
    error::ExpopropError,
    expmv::ExpmvConfig,
    scheme::{CommutatorFreeScheme, Scheme, Workspace},
    stepper::{EquidistantCorrectedTimeStepper, EquidistantTimeStepper, TimeStepper},
    StateVector, TimeDependentOperator,
};

/// One step size of an order table.
///
/// `order` is `log2` of the error ratio to the previous row. For estimator tables `ratio` is
/// `|ψ_est| / error`, `deviation` is the distance between the estimate and the true local
/// error and `deviation_order` its observed order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderTableRow {
    pub dt: f64,
    pub error: f64,
    pub order: Option<f64>,
    pub ratio: Option<f64>,
    pub deviation: Option<f64>,
    pub deviation_order: Option<f64>,
}

impl OrderTableRow {
    fn new(dt: f64, error: f64) -> Self {
        Self {
            dt,
            error,
            order: None,
            ratio: None,
            deviation: None,
            deviation_order: None,
        }
    }
}

fn observed_order(previous: f64, current: f64) -> f64 {
    (previous / current).log2()
}

fn fill_orders(rows: &mut [OrderTableRow]) {
    for i in 1..rows.len() {
        let (previous, current) = (rows[i - 1], &mut rows[i]);
        current.order = Some(observed_order(previous.error, current.error));
        if let (Some(a), Some(b)) = (previous.deviation, current.deviation) {
            current.deviation_order = Some(observed_order(a, b));
        }
    }
}

/// Drives schemes and steppers over `A(t)` from `(t0, psi0)`.
pub struct OrderHarness<'a, H: TimeDependentOperator> {
    op: &'a H,
    psi0: StateVector,
    t0: f64,
    reference: Scheme,
    reference_substeps: usize,
    expmv: ExpmvConfig,
}

impl<'a, H: TimeDependentOperator> OrderHarness<'a, H> {
    /// Local references default to 64 sub-steps of the sixth-order commutator-free scheme.
    pub fn new(op: &'a H, psi0: StateVector, t0: f64) -> Self {
        Self {
            op,
            psi0,
            t0,
            reference: Scheme::from(CommutatorFreeScheme::cf6()),
            reference_substeps: 64,
            expmv: ExpmvConfig::default(),
        }
    }

    pub fn with_reference(mut self, scheme: Scheme, substeps: usize) -> Self {
        self.reference = scheme;
        self.reference_substeps = substeps.max(1);
        self
    }

    pub fn with_expmv_config(mut self, expmv: ExpmvConfig) -> Self {
        self.expmv = expmv;
        self
    }

    fn step_sizes(dt0: f64, n: usize) -> impl Iterator<Item = f64> {
        (0..n).map(move |i| dt0 / 2f64.powi(i as i32))
    }

    /// The state at `t0 + dt` resolved with the reference scheme.
    pub fn reference_solution(&self, dt: f64) -> Result<StateVector, ExpopropError> {
        let mut ws = Workspace::new(self.psi0.len(), &self.reference, self.expmv);
        let mut psi = self.psi0.clone();
        let h = dt / self.reference_substeps as f64;
        for i in 0..self.reference_substeps {
            self.reference
                .step(self.op, &mut psi, self.t0 + i as f64 * h, h, &mut ws)?;
        }
        Ok(psi)
    }

    /// Local errors of single steps of `scheme` from `t0` with `n` step sizes.
    pub fn local_orders(
        &self,
        scheme: &Scheme,
        dt0: f64,
        n: usize,
    ) -> Result<Vec<OrderTableRow>, ExpopropError> {
        let mut ws = Workspace::new(self.psi0.len(), scheme, self.expmv);
        let mut rows = Vec::with_capacity(n);
        for dt in Self::step_sizes(dt0, n) {
            let mut psi = self.psi0.clone();
            scheme.step(self.op, &mut psi, self.t0, dt, &mut ws)?;
            let error = (psi - self.reference_solution(dt)?).norm();
            rows.push(OrderTableRow::new(dt, error));
        }
        fill_orders(&mut rows);
        Ok(rows)
    }

    /// Local errors of `scheme` together with the quality of its error estimate.
    pub fn estimator_quality(
        &self,
        scheme: &Scheme,
        dt0: f64,
        n: usize,
    ) -> Result<Vec<OrderTableRow>, ExpopropError> {
        scheme.check_estimator()?;
        let mut ws = Workspace::new(self.psi0.len(), scheme, self.expmv);
        let mut psi_est = StateVector::zeros(self.psi0.len());
        let mut rows = Vec::with_capacity(n);
        for dt in Self::step_sizes(dt0, n) {
            let mut psi = self.psi0.clone();
            scheme.step_estimated(self.op, &mut psi, &mut psi_est, self.t0, dt, &mut ws)?;
            let local = psi - self.reference_solution(dt)?;
            let error = local.norm();
            let mut row = OrderTableRow::new(dt, error);
            row.ratio = Some(psi_est.norm() / error);
            row.deviation = Some((local - &psi_est).norm());
            rows.push(row);
        }
        fill_orders(&mut rows);
        Ok(rows)
    }

    /// Global errors at `tend` of equidistant runs of `scheme` against `reference`.
    pub fn global_orders(
        &self,
        scheme: &Scheme,
        tend: f64,
        reference: &StateVector,
        dt0: f64,
        n: usize,
    ) -> Result<Vec<OrderTableRow>, ExpopropError> {
        let mut rows = Vec::with_capacity(n);
        for dt in Self::step_sizes(dt0, n) {
            let mut stepper = EquidistantTimeStepper::new(
                self.op,
                scheme.clone(),
                self.psi0.clone(),
                self.t0,
                tend,
                dt,
                self.expmv,
            )?;
            while stepper.advance()?.is_some() {}
            let error = (stepper.into_psi() - reference).norm();
            rows.push(OrderTableRow::new(dt, error));
        }
        fill_orders(&mut rows);
        Ok(rows)
    }

    /// Like [OrderHarness::global_orders] with the corrected equidistant stepper.
    pub fn corrected_global_orders(
        &self,
        scheme: &Scheme,
        tend: f64,
        reference: &StateVector,
        dt0: f64,
        n: usize,
    ) -> Result<Vec<OrderTableRow>, ExpopropError> {
        let mut rows = Vec::with_capacity(n);
        for dt in Self::step_sizes(dt0, n) {
            let mut stepper = EquidistantCorrectedTimeStepper::new(
                self.op,
                scheme.clone(),
                self.psi0.clone(),
                self.t0,
                tend,
                dt,
                self.expmv,
            )?;
            while stepper.advance()?.is_some() {}
            let error = (stepper.into_psi() - reference).norm();
            rows.push(OrderTableRow::new(dt, error));
        }
        fill_orders(&mut rows);
        Ok(rows)
    }
}
