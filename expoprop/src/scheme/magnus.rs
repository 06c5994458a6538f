use num_traits::Zero;

use crate::{
    error::{ExpopropError, SchemeError},
    expmv::expmv_inplace,
    op::magnus::{Magnus4DerivativeState, Magnus4State, MAGNUS4_SCRATCH},
    scheme::{coefficients::GAUSS2_NODES, defect, SchemeFlags, SchemeOverrides, Workspace},
    Scalar, StateVector, TimeDependentOperator,
};

/// The fourth-order Magnus integrator
///
/// $$
/// \psi_{n+1} = \exp\left(\frac{dt}{2}(A_1 + A_2) + \frac{\sqrt{3}}{12} dt^2 [A_2, A_1]\right) \psi_n
/// $$
///
/// with `A_k = A(t_n + c_k dt)` at the two Gauss nodes. The exponent is never assembled; the
/// exponential acts through a composite snapshot.
#[derive(Debug, Clone, Default)]
pub struct MagnusScheme {
    flags: SchemeFlags,
}

impl MagnusScheme {
    pub fn magnus4() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: SchemeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_overrides(&self, overrides: SchemeOverrides) -> Self {
        Self {
            flags: self.flags.with_overrides(overrides),
        }
    }

    pub fn order(&self) -> usize {
        4
    }

    pub fn flags(&self) -> SchemeFlags {
        self.flags
    }

    pub(crate) fn workspace_size(&self) -> usize {
        defect::DEFECT_SCRATCH
    }

    pub(crate) fn composite_workspace_size(&self) -> usize {
        MAGNUS4_SCRATCH
    }

    pub fn check_estimator(&self) -> Result<(), ExpopropError> {
        if self.flags.adjoint_based {
            return Err(ExpopropError::from(SchemeError::AdjointRequiresOddOrder {
                order: self.order(),
            }));
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
        let [c1, c2] = GAUSS2_NODES;
        let b = Magnus4State::new(
            op.evaluate(t + c1 * dt)?,
            op.evaluate(t + c2 * dt)?,
            dt,
            &ws.composite,
        )?;
        expmv_inplace(dt, &b, psi, &mut ws.krylov)
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
        let Workspace {
            slots,
            composite,
            krylov,
            ..
        } = ws;
        let [c1, c2] = GAUSS2_NODES;
        let b = Magnus4State::new(
            op.evaluate(t + c1 * dt)?,
            op.evaluate(t + c2 * dt)?,
            dt,
            composite,
        )?;
        let bd = Magnus4DerivativeState::new(
            op.evaluate(t + c1 * dt)?,
            op.evaluate(t + c2 * dt)?,
            op.evaluate_derivative_combination(t, &[c1 * dt], &[c1])?,
            op.evaluate_derivative_combination(t, &[c2 * dt], &[c2])?,
            dt,
            composite,
        )?;
        if self.flags.trapezoidal_rule {
            defect::trapezoidal_factor(&b, &bd, psi, psi_est, dt, krylov, slots)?;
        } else {
            defect::gamma_factor(
                &b,
                &bd,
                psi,
                psi_est,
                true,
                self.order(),
                dt,
                self.flags.modified_gamma,
                krylov,
                slots,
            )?;
        }
        defect::finish(op, t, dt, self.order(), psi, psi_est, &mut slots[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expmv::ExpmvConfig,
        scheme::tests::{estimator_ratio_and_order, local_orders, Model},
        test_models::two_level,
        Scheme,
    };

    #[test]
    fn observed_local_order() {
        let model = Model::random(4);
        let observed = local_orders(&model, &Scheme::from(MagnusScheme::magnus4()), 0.2, 3);
        let last = observed[observed.len() - 1];
        assert!((last - 5.0).abs() < 0.35, "observed {observed:?}");
    }

    #[test]
    fn estimators_are_asymptotically_correct() {
        let model = Model::random(4);
        for overrides in [
            SchemeOverrides::default(),
            SchemeOverrides {
                modified_gamma: Some(true),
                ..Default::default()
            },
            SchemeOverrides {
                trapezoidal_rule: Some(true),
                ..Default::default()
            },
        ] {
            let scheme = MagnusScheme::magnus4().with_overrides(overrides);
            let (ratio, deviation_order) =
                estimator_ratio_and_order(&model, &Scheme::from(scheme), 0.1, 2);
            assert!((ratio - 1.0).abs() < 0.1, "{overrides:?}: ratio {ratio}");
            assert!(
                deviation_order > 5.5,
                "{overrides:?}: deviation order {deviation_order}"
            );
        }
    }

    #[test]
    fn conserves_norm_for_hermitian_generator() {
        let op = two_level::operator();
        let scheme = Scheme::from(MagnusScheme::magnus4());
        let mut ws = Workspace::new(2, &scheme, ExpmvConfig::default());
        let mut psi = two_level::initial_state();
        for i in 0..10 {
            scheme.step(&op, &mut psi, 0.1 * i as f64, 0.1, &mut ws).unwrap();
        }
        assert!((psi.norm() - 1.0).abs() < 1e-12);
        assert!((psi - two_level::exact_solution(0.0, 1.0)).norm() < 1e-10);
    }

    #[test]
    fn adjoint_estimate_is_rejected() {
        let scheme = MagnusScheme::magnus4().with_overrides(SchemeOverrides {
            adjoint_based: Some(true),
            ..Default::default()
        });
        assert!(scheme.check_estimator().err().unwrap().is_configuration_error());
    }
}
