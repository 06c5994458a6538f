use tracing::{debug, trace};

use crate::{
    error::ExpopropError,
    expmv::ExpmvConfig,
    scheme::{Scheme, Workspace},
    stepper::{check_problem, Cadence, StepperStatistics, TimeStepper},
    StateVector, TimeDependentOperator,
};

/// Steps of constant size `dt` from `t0` to `tend`, one call of [Scheme::step] each.
pub struct EquidistantTimeStepper<'a, H: TimeDependentOperator> {
    op: &'a H,
    scheme: Scheme,
    psi: StateVector,
    t: f64,
    tend: f64,
    cadence: Cadence,
    ws: Workspace,
    statistics: StepperStatistics,
}

impl<'a, H: TimeDependentOperator> EquidistantTimeStepper<'a, H> {
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
        let ws = Workspace::new(psi0.len(), &scheme, expmv);
        debug!(
            order = scheme.order(),
            n = psi0.len(),
            t0,
            tend,
            dt,
            "equidistant stepper"
        );
        Ok(Self {
            op,
            scheme,
            psi: psi0,
            t: t0,
            tend,
            cadence: Cadence::new(t0, tend, dt),
            ws,
            statistics: StepperStatistics::default(),
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }
}

impl<H: TimeDependentOperator> TimeStepper for EquidistantTimeStepper<'_, H> {
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
        self.scheme
            .step(self.op, &mut self.psi, self.t, h, &mut self.ws)?;
        self.cadence.accept();
        self.t = tnext;
        self.statistics.number_of_steps += 1;
        trace!(t = self.t, dt = h, "step");
        Ok(Some(self.t))
    }
}
