use num_traits::Zero;

use crate::{
    error::{ExpopropError, SchemeError},
    scalar::scalar,
    scheme::{tableau::Tableau, Workspace},
    OperatorState, Scalar, StateVector, TimeDependentOperator,
};

/// An explicit embedded Runge-Kutta method applied to `dψ/dt = A(t)ψ`.
///
/// Stage `i` is `k_i = A(t + c_i dt) (ψ + dt Σ_j a_ij k_j)`. The step is `ψ + dt Σ b_i k_i`
/// and the estimate is `dt Σ d_i k_i`, the difference to the embedded solution.
#[derive(Debug, Clone)]
pub struct EmbeddedRungeKuttaScheme {
    tableau: Tableau,
    // stages needed without the estimate: up to the last non-zero weight of `b`
    solution_stages: usize,
}

impl EmbeddedRungeKuttaScheme {
    pub fn new(tableau: Tableau) -> Result<Self, ExpopropError> {
        tableau.check_explicit()?;
        if tableau.order() == 0 {
            return Err(crate::scheme_error!(InvalidTableau, "order must be at least 1"));
        }
        Ok(Self::from_preset(tableau))
    }

    pub fn dopri5() -> Self {
        Self::from_preset(Tableau::dopri5())
    }

    pub fn tsit45() -> Self {
        Self::from_preset(Tableau::tsit45())
    }

    fn from_preset(tableau: Tableau) -> Self {
        let solution_stages = tableau
            .b()
            .iter()
            .rposition(|&b| b != 0.0)
            .map_or(0, |i| i + 1);
        Self {
            tableau,
            solution_stages,
        }
    }

    pub fn tableau(&self) -> &Tableau {
        &self.tableau
    }

    pub fn order(&self) -> usize {
        self.tableau.order()
    }

    /// One vector per stage plus the stage argument.
    pub(crate) fn workspace_size(&self) -> usize {
        self.tableau.s() + 1
    }

    /// Compute the first `nstages` stages into `slots[1..]`, using `slots[0]` for the stage
    /// argument.
    fn stages<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &StateVector,
        t: f64,
        dt: f64,
        nstages: usize,
        slots: &mut [StateVector],
    ) -> Result<(), ExpopropError> {
        let found = slots.len();
        let Some((y, k)) = slots.split_first_mut() else {
            return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
                required: self.workspace_size(),
                found,
            }));
        };
        let (a, c) = (self.tableau.a(), self.tableau.c());
        for i in 0..nstages {
            let (done, rest) = k.split_at_mut(i);
            y.copy_from(psi);
            for (j, kj) in done.iter().enumerate() {
                let aij = a[(i, j)];
                if aij != 0.0 {
                    y.axpy(scalar(dt * aij), kj, scalar(1.0));
                }
            }
            op.evaluate(t + c[i] * dt)?.apply_inplace(y, &mut rest[0]);
        }
        Ok(())
    }

    fn accumulate(weights: &[f64], dt: f64, k: &[StateVector], out: &mut StateVector) {
        for (&w, ki) in weights.iter().zip(k) {
            if w != 0.0 {
                out.axpy(scalar(dt * w), ki, scalar(1.0));
            }
        }
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
        let n = self.solution_stages;
        self.stages(op, psi, t, dt, n, &mut ws.slots)?;
        Self::accumulate(self.tableau.b().as_slice(), dt, &ws.slots[1..=n], psi);
        Ok(())
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
        psi_est.fill(Scalar::zero());
        if dt == 0.0 {
            return Ok(());
        }
        let s = self.tableau.s();
        self.stages(op, psi, t, dt, s, &mut ws.slots)?;
        let k = &ws.slots[1..=s];
        Self::accumulate(self.tableau.b().as_slice(), dt, k, psi);
        Self::accumulate(self.tableau.d().as_slice(), dt, k, psi_est);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};

    use super::*;
    use crate::{
        expmv::ExpmvConfig,
        scheme::tests::{local_orders, Model},
        test_models::two_level,
        Scheme,
    };

    #[test]
    fn observed_local_orders() {
        let model = Model::random(4);
        for scheme in [
            EmbeddedRungeKuttaScheme::dopri5(),
            EmbeddedRungeKuttaScheme::tsit45(),
        ] {
            let observed = local_orders(&model, &Scheme::from(scheme), 0.2, 2);
            let last = observed[observed.len() - 1];
            assert!((last - 6.0).abs() < 0.5, "observed {observed:?}");
        }
    }

    #[test]
    fn estimate_is_difference_to_embedded_solution() {
        let model = Model::random(4);
        let harness = model.harness();
        let scheme = Scheme::from(EmbeddedRungeKuttaScheme::dopri5());
        let mut ws = Workspace::new(4, &scheme, ExpmvConfig::default());
        let mut errors = Vec::new();
        for dt in [0.1, 0.05] {
            let mut psi = model.psi0.clone();
            let mut psi_est = StateVector::zeros(4);
            scheme
                .step_estimated(&model.op, &mut psi, &mut psi_est, model.t0, dt, &mut ws)
                .unwrap();
            let reference = harness.reference_solution(dt).unwrap();
            let embedded = (&psi - &psi_est - &reference).norm();
            let ratio = psi_est.norm() / embedded;
            assert!((ratio - 1.0).abs() < 0.05, "dt {dt}: ratio {ratio}");
            errors.push(embedded);
        }
        let order = (errors[0] / errors[1]).log2();
        assert!((order - 5.0).abs() < 0.3, "embedded order {order}");
    }

    #[test]
    fn step_and_estimated_step_agree() {
        let op = two_level::operator();
        let scheme = Scheme::from(EmbeddedRungeKuttaScheme::tsit45());
        let mut ws = Workspace::new(2, &scheme, ExpmvConfig::default());
        let mut psi = two_level::initial_state();
        let mut psi2 = psi.clone();
        let mut psi_est = StateVector::zeros(2);
        scheme.step(&op, &mut psi, 0.0, 0.1, &mut ws).unwrap();
        scheme
            .step_estimated(&op, &mut psi2, &mut psi_est, 0.0, 0.1, &mut ws)
            .unwrap();
        assert!((psi - psi2).norm() < 1e-15);
        assert!(psi_est.norm() > 0.0);
    }

    #[test]
    fn implicit_tableau_is_rejected() {
        let a = DMatrix::from_element(1, 1, 0.5);
        let tableau = Tableau::new(
            a,
            DVector::from_element(1, 1.0),
            DVector::from_element(1, 0.5),
            DVector::zeros(1),
            2,
        );
        let err = EmbeddedRungeKuttaScheme::new(tableau).err().unwrap();
        assert!(matches!(
            err,
            ExpopropError::SchemeError(SchemeError::InvalidTableau(_))
        ));
    }
}
