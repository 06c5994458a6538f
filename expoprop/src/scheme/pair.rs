use crate::{
    error::{ExpopropError, SchemeError},
    scalar::scalar,
    scheme::{Scheme, Workspace},
    StateVector, TimeDependentOperator,
};

/// Estimates the local error of a primary scheme by comparing it with a second, usually more
/// accurate, scheme taking `substeps` equal sub-steps over the same interval.
#[derive(Debug, Clone)]
pub struct SchemeEstimatorPair {
    primary: Box<Scheme>,
    estimator: Box<Scheme>,
    substeps: usize,
}

impl SchemeEstimatorPair {
    pub fn new(primary: Scheme, estimator: Scheme, substeps: usize) -> Result<Self, ExpopropError> {
        if substeps == 0 {
            return Err(crate::scheme_error!(
                InvalidCoefficients,
                "a scheme-estimator pair needs at least one sub-step"
            ));
        }
        Ok(Self {
            primary: Box::new(primary),
            estimator: Box::new(estimator),
            substeps,
        })
    }

    pub fn primary(&self) -> &Scheme {
        &self.primary
    }

    pub fn estimator(&self) -> &Scheme {
        &self.estimator
    }

    pub fn substeps(&self) -> usize {
        self.substeps
    }

    pub fn order(&self) -> usize {
        self.primary.order()
    }

    pub(crate) fn workspace_size(&self) -> usize {
        self.primary
            .workspace_size()
            .max(self.estimator.workspace_size())
    }

    pub(crate) fn composite_workspace_size(&self) -> usize {
        self.primary
            .composite_workspace_size()
            .max(self.estimator.composite_workspace_size())
    }

    pub fn check_estimator(&self) -> Result<(), ExpopropError> {
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
        self.primary.step(op, psi, t, dt, ws)
    }

    /// `psi_est = S_p(dt) psi - S_e(dt / n)^n psi`
    pub fn step_estimated<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        psi_est.copy_from(psi);
        self.primary.step(op, psi, t, dt, ws)?;
        let h = dt / self.substeps as f64;
        for i in 0..self.substeps {
            self.estimator.step(op, psi_est, t + i as f64 * h, h, ws)?;
        }
        psi_est.axpy(scalar(1.0), psi, scalar(-1.0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expmv::ExpmvConfig,
        scheme::tests::{estimator_ratio_and_order, Model},
    };

    #[test]
    fn higher_order_estimator_tracks_local_error() {
        let model = Model::random(4);
        let pair = SchemeEstimatorPair::new(
            Scheme::preset("CF2").unwrap(),
            Scheme::preset("CF4").unwrap(),
            1,
        )
        .unwrap();
        assert_eq!(pair.order(), 2);
        let (ratio, deviation_order) =
            estimator_ratio_and_order(&model, &Scheme::from(pair), 0.1, 2);
        assert!((ratio - 1.0).abs() < 1e-3, "ratio {ratio}");
        assert!(deviation_order > 4.5, "deviation order {deviation_order}");
    }

    #[test]
    fn workspace_fits_both_schemes() {
        let pair = SchemeEstimatorPair::new(
            Scheme::preset("CF4").unwrap(),
            Scheme::preset("Magnus4").unwrap(),
            2,
        )
        .unwrap();
        let scheme = Scheme::from(pair);
        let ws = Workspace::new(3, &scheme, ExpmvConfig::default());
        assert!(ws.check(&Scheme::preset("Magnus4").unwrap()).is_ok());
        assert!(ws.check(&Scheme::preset("CF4").unwrap()).is_ok());
    }

    #[test]
    fn zero_substeps_are_rejected() {
        let cf2 = Scheme::preset("CF2").unwrap();
        assert!(SchemeEstimatorPair::new(cf2.clone(), cf2, 0).is_err());
    }
}
