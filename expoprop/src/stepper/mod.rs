use serde::Serialize;

use crate::{
    error::{ExpopropError, OperatorError, StepperError},
    DenseMatrix, StateVector, TimeDependentOperator,
};

pub mod adaptive;
pub mod config;
pub mod corrected;
pub mod equidistant;

pub use adaptive::AdaptiveTimeStepper;
pub use config::AdaptiveConfig;
pub use corrected::EquidistantCorrectedTimeStepper;
pub use equidistant::EquidistantTimeStepper;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepperStatistics {
    pub number_of_steps: usize,
    pub number_of_rejected_steps: usize,
    pub number_of_exponentials: usize,
}

/// A forward-only state machine advancing ψ from `t0` to `tend`.
///
/// The stepper owns ψ and its scratch space and borrows the operator. Each call to
/// [TimeStepper::advance] performs one accepted step; the last step is clipped so that `t`
/// lands exactly on `tend`.
///
/// # Example
///
/// ```
/// use expoprop::{EquidistantTimeStepper, ExpmvConfig, Scheme, TimeStepper};
/// use expoprop::test_models::two_level;
///
/// let op = two_level::operator();
/// let scheme = Scheme::preset("CF4").unwrap();
/// let mut stepper = EquidistantTimeStepper::new(
///     &op, scheme, two_level::initial_state(), 0.0, 1.0, 0.1, ExpmvConfig::default(),
/// ).unwrap();
/// while let Some(t) = stepper.advance().unwrap() {
///     assert!(t <= 1.0);
/// }
/// assert_eq!(stepper.t(), 1.0);
/// ```
pub trait TimeStepper {
    fn t(&self) -> f64;

    fn tend(&self) -> f64;

    fn psi(&self) -> &StateVector;

    fn into_psi(self) -> StateVector
    where
        Self: Sized;

    fn statistics(&self) -> StepperStatistics;

    /// Take one step and return the new time, or `None` once `tend` has been reached.
    fn advance(&mut self) -> Result<Option<f64>, ExpopropError>;

    fn is_finished(&self) -> bool {
        self.t() >= self.tend()
    }

    /// Advance to `tend`, returning ψ at every step time (one column each, the current state
    /// first) together with those times.
    fn solve(&mut self) -> Result<(DenseMatrix, Vec<f64>), ExpopropError>
    where
        Self: Sized,
    {
        let mut times = vec![self.t()];
        let mut columns = vec![self.psi().clone()];
        while let Some(t) = self.advance()? {
            times.push(t);
            columns.push(self.psi().clone());
        }
        Ok((DenseMatrix::from_columns(&columns), times))
    }

    /// Iterate over the times of the remaining steps.
    fn times(&mut self) -> Times<'_, Self>
    where
        Self: Sized,
    {
        Times { stepper: self }
    }
}

pub struct Times<'s, S: TimeStepper> {
    stepper: &'s mut S,
}

impl<S: TimeStepper> Iterator for Times<'_, S> {
    type Item = Result<f64, ExpopropError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stepper.advance().transpose()
    }
}

/// Tolerance below which two times are considered equal.
pub(crate) fn troundoff(t: f64, h: f64) -> f64 {
    100.0 * f64::EPSILON * (t.abs() + h.abs())
}

pub(crate) fn check_problem<H: TimeDependentOperator>(
    op: &H,
    psi0: &StateVector,
    t0: f64,
    tend: f64,
    dt: f64,
) -> Result<(), ExpopropError> {
    op.check_square()?;
    if psi0.len() != op.nstates() {
        return Err(ExpopropError::from(OperatorError::DimensionMismatch {
            expected: op.nstates(),
            found: psi0.len(),
        }));
    }
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(ExpopropError::from(StepperError::InvalidStepSize { dt }));
    }
    if !(t0.is_finite() && tend.is_finite()) || tend < t0 {
        return Err(ExpopropError::from(
            StepperError::EndTimeBeforeStartTime { t0, tend },
        ));
    }
    Ok(())
}

/// Equidistant times `t0 + n dt`, the last one replaced by `tend`.
#[derive(Debug, Clone)]
pub(crate) struct Cadence {
    t0: f64,
    tend: f64,
    dt: f64,
    n: usize,
}

impl Cadence {
    pub(crate) fn new(t0: f64, tend: f64, dt: f64) -> Self {
        Self { t0, tend, dt, n: 0 }
    }

    /// Step size and end time of the next step from `t`, if any.
    pub(crate) fn next(&self, t: f64) -> Option<(f64, f64)> {
        if t >= self.tend {
            return None;
        }
        let mut tnext = self.t0 + (self.n + 1) as f64 * self.dt;
        if tnext >= self.tend - troundoff(t, self.dt) {
            tnext = self.tend;
        }
        Some((tnext - t, tnext))
    }

    pub(crate) fn accept(&mut self) {
        self.n += 1;
    }
}
