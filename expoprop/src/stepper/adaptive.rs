use tracing::{debug, trace};

use crate::{
    error::{ExpopropError, StepperError},
    expmv::ExpmvConfig,
    scalar::scalar,
    scheme::{Scheme, Workspace},
    stepper::{check_problem, troundoff, AdaptiveConfig, StepperStatistics, TimeStepper},
    StateVector, TimeDependentOperator,
};

/// Adaptive steps controlled by the local error estimate of [Scheme::step_estimated].
///
/// Each attempt runs with `min(dt, tend - t, dt_max)`. The attempt is accepted when the
/// normalized error `|ψ_est| / tol` is below one; otherwise ψ is restored from a checkpoint
/// and the same interval is retried with a smaller step. Either way the next step size comes
/// from [AdaptiveConfig::factor].
pub struct AdaptiveTimeStepper<'a, H: TimeDependentOperator> {
    op: &'a H,
    scheme: Scheme,
    config: AdaptiveConfig,
    psi: StateVector,
    psi_est: StateVector,
    checkpoint: StateVector,
    t: f64,
    tend: f64,
    dt: f64,
    last_dt: f64,
    last_error: Option<f64>,
    ws: Workspace,
    statistics: StepperStatistics,
}

impl<'a, H: TimeDependentOperator> AdaptiveTimeStepper<'a, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        op: &'a H,
        scheme: Scheme,
        psi0: StateVector,
        t0: f64,
        tend: f64,
        dt0: f64,
        config: AdaptiveConfig,
        expmv: ExpmvConfig,
    ) -> Result<Self, ExpopropError> {
        check_problem(op, &psi0, t0, tend, dt0)?;
        if !(config.tol > 0.0 && config.tol.is_finite()) {
            return Err(ExpopropError::from(StepperError::InvalidTolerance {
                tol: config.tol,
            }));
        }
        if config.dt_max.is_nan() || config.dt_max <= 0.0 {
            return Err(ExpopropError::from(StepperError::InvalidStepSize {
                dt: config.dt_max,
            }));
        }
        if config.higher_order {
            scheme.check_correction()?;
        } else {
            scheme.check_estimator()?;
        }
        let n = psi0.len();
        let ws = Workspace::new(n, &scheme, expmv);
        debug!(
            order = scheme.order(),
            n,
            t0,
            tend,
            dt0,
            tol = config.tol,
            "adaptive stepper"
        );
        Ok(Self {
            op,
            scheme,
            config,
            checkpoint: psi0.clone(),
            psi_est: StateVector::zeros(n),
            psi: psi0,
            t: t0,
            tend,
            dt: dt0,
            last_dt: 0.0,
            last_error: None,
            ws,
            statistics: StepperStatistics::default(),
        })
    }

    /// Proposed size of the next step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Size of the last accepted step.
    pub fn last_dt(&self) -> f64 {
        self.last_dt
    }

    /// Normalized error `|ψ_est| / tol` of the last accepted step.
    pub fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }
}

impl<H: TimeDependentOperator> TimeStepper for AdaptiveTimeStepper<'_, H> {
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
        if self.t >= self.tend {
            return Ok(None);
        }
        let order = self.scheme.order();
        let mut nattempts = 0;
        loop {
            let mut h = self.dt.min(self.config.dt_max);
            let last = self.t + h >= self.tend - troundoff(self.t, h);
            if last {
                h = self.tend - self.t;
            }
            self.checkpoint.copy_from(&self.psi);
            self.scheme.step_estimated(
                self.op,
                &mut self.psi,
                &mut self.psi_est,
                self.t,
                h,
                &mut self.ws,
            )?;
            let err = self.psi_est.norm() / self.config.tol;
            self.dt = h * self.config.factor(err, order);

            if err < 1.0 {
                if self.config.higher_order {
                    self.psi.axpy(scalar(-1.0), &self.psi_est, scalar(1.0));
                }
                self.t = if last { self.tend } else { self.t + h };
                self.last_dt = h;
                self.last_error = Some(err);
                self.statistics.number_of_steps += 1;
                trace!(t = self.t, dt = h, err, "accepted step");
                return Ok(Some(self.t));
            }

            self.psi.copy_from(&self.checkpoint);
            self.statistics.number_of_rejected_steps += 1;
            nattempts += 1;
            debug!(t = self.t, dt = h, err, next_dt = self.dt, "rejected step");
            if let Some(max) = self.config.maximum_error_test_failures {
                if nattempts >= max {
                    return Err(ExpopropError::from(
                        StepperError::TooManyErrorTestFailures { time: self.t },
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SchemeError,
        scheme::SchemeOverrides,
        stepper::EquidistantTimeStepper,
        test_models::{chain, rabi},
    };

    fn reference(tend: f64) -> StateVector {
        let op = rabi::operator();
        let mut stepper = EquidistantTimeStepper::new(
            &op,
            Scheme::preset("CF6").unwrap(),
            rabi::initial_state(),
            0.0,
            tend,
            1.0 / 64.0,
            ExpmvConfig { tol: 0.0, m: 30 },
        )
        .unwrap();
        stepper.solve().unwrap();
        stepper.into_psi()
    }

    #[test]
    fn scenario_c_loose_initial_step_is_rejected() {
        let op = rabi::operator();
        let mut stepper = AdaptiveTimeStepper::new(
            &op,
            Scheme::preset("CF4").unwrap(),
            rabi::initial_state(),
            0.0,
            3.0,
            2.0,
            AdaptiveConfig::default().with_tol(1e-8),
            ExpmvConfig::default(),
        )
        .unwrap();
        let mut previous_attempt = stepper.dt();
        while let Some(t) = stepper.advance().unwrap() {
            assert!(t <= 3.0);
            let err = stepper.last_error().unwrap();
            assert!(err < 1.0, "accepted error {err}");
            // the accepted step results from shrinking the previous proposal
            assert!(stepper.last_dt() <= previous_attempt + 1e-15);
            let growth = stepper.dt() / stepper.last_dt();
            assert!((0.25..=4.0).contains(&growth), "growth {growth}");
            previous_attempt = stepper.dt();
        }
        assert_eq!(stepper.t(), 3.0);
        let statistics = stepper.statistics();
        assert!(statistics.number_of_rejected_steps >= 1);
        assert!(statistics.number_of_steps > 1);
        let error = (stepper.psi() - reference(3.0)).norm();
        assert!(error < 1e-6, "global error {error}");
    }

    #[test]
    fn higher_order_correction_improves_accuracy() {
        let op = rabi::operator();
        let expect = reference(2.0);
        let run = |higher_order: bool| {
            let mut stepper = AdaptiveTimeStepper::new(
                &op,
                Scheme::preset("CF2").unwrap(),
                rabi::initial_state(),
                0.0,
                2.0,
                0.1,
                AdaptiveConfig::default()
                    .with_tol(1e-6)
                    .with_higher_order(higher_order),
                ExpmvConfig::default(),
            )
            .unwrap();
            stepper.solve().unwrap();
            (stepper.into_psi() - &expect).norm()
        };
        let plain = run(false);
        let corrected = run(true);
        assert!(corrected < plain, "corrected {corrected}, plain {plain}");
    }

    #[test]
    fn maximum_step_is_honoured() {
        let op = chain::operator(8);
        let mut stepper = AdaptiveTimeStepper::new(
            &op,
            Scheme::preset("Magnus4").unwrap(),
            chain::initial_state(8),
            0.0,
            1.0,
            0.01,
            AdaptiveConfig::default().with_tol(1e-3).with_dt_max(0.2),
            ExpmvConfig::default(),
        )
        .unwrap();
        while stepper.advance().unwrap().is_some() {
            assert!(stepper.last_dt() <= 0.2);
        }
        assert_eq!(stepper.t(), 1.0);
        assert!((stepper.psi().norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn runge_kutta_schemes_adapt() {
        let op = rabi::operator();
        for name in ["DoPri45", "Tsit45"] {
            let mut stepper = AdaptiveTimeStepper::new(
                &op,
                Scheme::preset(name).unwrap(),
                rabi::initial_state(),
                0.0,
                2.0,
                0.5,
                AdaptiveConfig::default().with_tol(1e-9),
                ExpmvConfig::default(),
            )
            .unwrap();
            stepper.solve().unwrap();
            assert_eq!(stepper.t(), 2.0);
            let error = (stepper.psi() - reference(2.0)).norm();
            assert!(error < 1e-6, "{name}: global error {error}");
        }
    }

    #[test]
    fn rejection_cap_is_opt_in() {
        let op = rabi::operator();
        let config = AdaptiveConfig {
            tol: 1e-14,
            maximum_error_test_failures: Some(1),
            ..Default::default()
        };
        let mut stepper = AdaptiveTimeStepper::new(
            &op,
            Scheme::preset("CF2").unwrap(),
            rabi::initial_state(),
            0.0,
            1.0,
            1.0,
            config,
            ExpmvConfig::default(),
        )
        .unwrap();
        let err = stepper.advance().err().unwrap();
        assert!(matches!(
            err,
            ExpopropError::StepperError(StepperError::TooManyErrorTestFailures { .. })
        ));
        // the rejected attempt is rolled back
        assert_eq!(stepper.psi(), &rabi::initial_state());
        assert_eq!(stepper.t(), 0.0);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let op = rabi::operator();
        let new = |scheme: Scheme, config: AdaptiveConfig| {
            AdaptiveTimeStepper::new(
                &op,
                scheme,
                rabi::initial_state(),
                0.0,
                1.0,
                0.1,
                config,
                ExpmvConfig::default(),
            )
            .err()
            .unwrap()
        };
        let cf4 = Scheme::preset("CF4").unwrap();
        assert!(matches!(
            new(cf4.clone(), AdaptiveConfig::default().with_tol(0.0)),
            ExpopropError::StepperError(StepperError::InvalidTolerance { .. })
        ));
        assert!(matches!(
            new(cf4.clone(), AdaptiveConfig::default().with_dt_max(-1.0)),
            ExpopropError::StepperError(StepperError::InvalidStepSize { .. })
        ));
        let adjoint = cf4.with_overrides(SchemeOverrides {
            adjoint_based: Some(true),
            ..Default::default()
        });
        assert!(new(adjoint, AdaptiveConfig::default()).is_configuration_error());
        let dopri = Scheme::preset("DoPri45").unwrap();
        assert!(matches!(
            new(dopri.clone(), AdaptiveConfig::default().with_higher_order(true)),
            ExpopropError::SchemeError(SchemeError::CorrectionNotSupported(_))
        ));
        let ok = AdaptiveTimeStepper::new(
            &op,
            dopri,
            rabi::initial_state(),
            0.0,
            1.0,
            0.1,
            AdaptiveConfig::default(),
            ExpmvConfig::default(),
        );
        assert!(ok.is_ok());
    }
}
