use tracing::{debug, trace};

use crate::{
    error::ExpopropError,
    expmv::ExpmvConfig,
    scalar::scalar,
    scheme::{Scheme, Workspace},
    stepper::{check_problem, Cadence, StepperStatistics, TimeStepper},
    StateVector, TimeDependentOperator,
};

/// Equidistant steps with a posteriori correction: every step calls [Scheme::step_estimated]
/// and replaces ψ by `ψ - ψ_est`, which raises the order of the trajectory by one.
///
/// Embedded Runge-Kutta schemes are rejected on construction, see [Scheme::check_correction].
pub struct EquidistantCorrectedTimeStepper<'a, H: TimeDependentOperator> {
    op: &'a H,
    scheme: Scheme,
    psi: StateVector,
    psi_est: StateVector,
    t: f64,
    tend: f64,
    cadence: Cadence,
    ws: Workspace,
    statistics: StepperStatistics,
}

impl<'a, H: TimeDependentOperator> EquidistantCorrectedTimeStepper<'a, H> {
    pub fn new(
        op: &'a H,
        scheme: Scheme,
        psi0: StateVector,
        t0: f64,
        tend: f64,
        dt: f64,
        expmv: ExpmvConfig,
    ) -> Result<Self, ExpopropError> {
        check_problem(op, &psi0, t0, tend, dt)?;
        scheme.check_correction()?;
        let n = psi0.len();
        let ws = Workspace::new(n, &scheme, expmv);
        debug!(
            order = scheme.order(),
            n,
            t0,
            tend,
            dt,
            "corrected equidistant stepper"
        );
        Ok(Self {
            op,
            scheme,
            psi: psi0,
            psi_est: StateVector::zeros(n),
            t: t0,
            tend,
            cadence: Cadence::new(t0, tend, dt),
            ws,
            statistics: StepperStatistics::default(),
        })
    }

    /// The correction subtracted in the last step.
    pub fn last_estimate(&self) -> &StateVector {
        &self.psi_est
    }
}

impl<H: TimeDependentOperator> TimeStepper for EquidistantCorrectedTimeStepper<'_, H> {
    fn t(&self) -> f64 {
        self.t
    }

    fn tend(&self) -> f64 {
        self.tend
    }

    fn psi(&self) -> &StateVector {
        &self.psi
    }

    fn into_psi(self) -> StateVector {
        self.psi
    }

    fn statistics(&self) -> StepperStatistics {
        StepperStatistics {
            number_of_exponentials: self.ws.krylov().statistics().number_of_calls,
            ..self.statistics.clone()
        }
    }

    fn advance(&mut self) -> Result<Option<f64>, ExpopropError> {
        let Some((h, tnext)) = self.cadence.next(self.t) else {
            return Ok(None);
        };
        self.scheme.step_estimated(
            self.op,
            &mut self.psi,
            &mut self.psi_est,
            self.t,
            h,
            &mut self.ws,
        )?;
        self.psi.axpy(scalar(-1.0), &self.psi_est, scalar(1.0));
        self.cadence.accept();
        self.t = tnext;
        self.statistics.number_of_steps += 1;
        trace!(t = self.t, dt = h, estimate = self.psi_est.norm(), "corrected step");
        Ok(Some(self.t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SchemeError,
        stepper::EquidistantTimeStepper,
        test_models::{random_linear, rabi},
    };

    fn run<S: TimeStepper>(mut stepper: S) -> StateVector {
        stepper.solve().unwrap();
        assert_eq!(stepper.t(), stepper.tend());
        stepper.into_psi()
    }

    #[test]
    fn scenario_b_corrected_cf4_matches_cf6() {
        let op = random_linear::operator(4);
        let psi0 = random_linear::initial_state(4);
        let config = ExpmvConfig { tol: 0.0, m: 30 };
        let scheme = |name: &str| Scheme::preset(name).unwrap();
        let corrected = run(
            EquidistantCorrectedTimeStepper::new(
                &op,
                scheme("CF4"),
                psi0.clone(),
                0.0,
                1.0,
                0.1,
                config,
            )
            .unwrap(),
        );
        let plain = run(
            EquidistantTimeStepper::new(
                &op,
                scheme("CF4"),
                psi0.clone(),
                0.0,
                1.0,
                0.1,
                config,
            )
            .unwrap(),
        );
        let cf6 = run(
            EquidistantTimeStepper::new(&op, scheme("CF6"), psi0, 0.0, 1.0, 0.1, config).unwrap(),
        );
        let corrected_error = (&corrected - &cf6).norm();
        let plain_error = (&plain - &cf6).norm();
        assert!(corrected_error < 1e-6, "corrected {corrected_error}");
        assert!(
            corrected_error < 0.1 * plain_error,
            "corrected {corrected_error}, plain {plain_error}"
        );
    }

    #[test]
    fn corrected_order_is_raised() {
        let op = rabi::operator();
        let config = ExpmvConfig { tol: 0.0, m: 30 };
        let reference = run(
            EquidistantTimeStepper::new(
                &op,
                Scheme::preset("CF6").unwrap(),
                rabi::initial_state(),
                0.0,
                1.0,
                1.0 / 64.0,
                config,
            )
            .unwrap(),
        );
        let errors: Vec<f64> = [0.1, 0.05]
            .iter()
            .map(|&dt| {
                let psi = run(
                    EquidistantCorrectedTimeStepper::new(
                        &op,
                        Scheme::preset("CF2").unwrap(),
                        rabi::initial_state(),
                        0.0,
                        1.0,
                        dt,
                        config,
                    )
                    .unwrap(),
                );
                (psi - &reference).norm()
            })
            .collect();
        let order = (errors[0] / errors[1]).log2();
        assert!(order > 2.6, "observed order {order}, errors {errors:?}");
    }

    #[test]
    fn rejects_unsupported_estimator() {
        let op = random_linear::operator(3);
        let err = EquidistantCorrectedTimeStepper::new(
            &op,
            Scheme::preset("CF8").unwrap(),
            random_linear::initial_state(3),
            0.0,
            1.0,
            0.1,
            ExpmvConfig::default(),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn rejects_runge_kutta_correction() {
        let op = rabi::operator();
        for name in ["DoPri45", "Tsit45"] {
            let err = EquidistantCorrectedTimeStepper::new(
                &op,
                Scheme::preset(name).unwrap(),
                rabi::initial_state(),
                0.0,
                1.0,
                0.1,
                ExpmvConfig::default(),
            )
            .err()
            .unwrap();
            assert!(
                matches!(
                    err,
                    ExpopropError::SchemeError(SchemeError::CorrectionNotSupported(_))
                ),
                "{name}"
            );
        }
    }
}
