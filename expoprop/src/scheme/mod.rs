use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ExpopropError, OperatorError, SchemeError},
    StateVector, TimeDependentOperator,
};

pub mod coefficients;
pub mod commutator_free;
pub mod defect;
pub mod magnus;
pub mod pair;
pub mod runge_kutta;
pub mod tableau;
pub mod workspace;

pub use commutator_free::CommutatorFreeScheme;
pub use magnus::MagnusScheme;
pub use pair::SchemeEstimatorPair;
pub use runge_kutta::EmbeddedRungeKuttaScheme;
pub use tableau::Tableau;
pub use workspace::Workspace;

/// Selects the local error estimator of an exponential scheme.
///
/// With all flags cleared the Gamma defect estimator is used. `symmetrized_defect` selects the
/// closed-form symmetrized defect of midpoint-type (single exponential, order 2) schemes,
/// `trapezoidal_rule` integrates the defect with the trapezoidal rule, `modified_gamma`
/// extends the Gamma series of order 2 and 4 schemes by one corrected term, and
/// `adjoint_based` compares odd-order schemes with their adjoint instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeFlags {
    pub symmetrized_defect: bool,
    pub trapezoidal_rule: bool,
    pub modified_gamma: bool,
    pub adjoint_based: bool,
}

/// Flags to replace in [SchemeFlags::with_overrides]; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeOverrides {
    pub symmetrized_defect: Option<bool>,
    pub trapezoidal_rule: Option<bool>,
    pub modified_gamma: Option<bool>,
    pub adjoint_based: Option<bool>,
}

impl SchemeFlags {
    pub fn with_overrides(self, overrides: SchemeOverrides) -> Self {
        Self {
            symmetrized_defect: overrides
                .symmetrized_defect
                .unwrap_or(self.symmetrized_defect),
            trapezoidal_rule: overrides.trapezoidal_rule.unwrap_or(self.trapezoidal_rule),
            modified_gamma: overrides.modified_gamma.unwrap_or(self.modified_gamma),
            adjoint_based: overrides.adjoint_based.unwrap_or(self.adjoint_based),
        }
    }
}

/// An integration scheme for `dψ/dt = A(t)ψ`.
///
/// Every variant advances ψ by one step of size `dt` ([Scheme::step]) and can also produce an
/// estimate `ψ_est` of the local error of that step ([Scheme::step_estimated]).
#[derive(Debug, Clone)]
pub enum Scheme {
    CommutatorFree(CommutatorFreeScheme),
    Magnus(MagnusScheme),
    EmbeddedRungeKutta(EmbeddedRungeKuttaScheme),
    Pair(SchemeEstimatorPair),
}

impl Scheme {
    /// Look up a named preset: `CF2`, `CF4`, `CF4o`, `CF6`, `CF7`, `CF8`, `CF10`, `Magnus4`,
    /// `DoPri45` or `Tsit45`.
    pub fn preset(name: &str) -> Result<Self, ExpopropError> {
        let scheme = match name {
            "CF2" => CommutatorFreeScheme::cf2().into(),
            "CF4" => CommutatorFreeScheme::cf4().into(),
            "CF4o" => CommutatorFreeScheme::cf4o().into(),
            "CF6" => CommutatorFreeScheme::cf6().into(),
            "CF7" => CommutatorFreeScheme::cf7().into(),
            "CF8" => CommutatorFreeScheme::cf8().into(),
            "CF10" => CommutatorFreeScheme::cf10().into(),
            "Magnus4" => MagnusScheme::magnus4().into(),
            "DoPri45" => EmbeddedRungeKuttaScheme::dopri5().into(),
            "Tsit45" => EmbeddedRungeKuttaScheme::tsit45().into(),
            _ => return Err(crate::scheme_error!(UnknownPreset, name)),
        };
        Ok(scheme)
    }

    pub fn order(&self) -> usize {
        match self {
            Scheme::CommutatorFree(s) => s.order(),
            Scheme::Magnus(s) => s.order(),
            Scheme::EmbeddedRungeKutta(s) => s.order(),
            Scheme::Pair(s) => s.order(),
        }
    }

    /// Number of state-sized scratch vectors needed by [Scheme::step_estimated].
    pub fn workspace_size(&self) -> usize {
        match self {
            Scheme::CommutatorFree(s) => s.workspace_size(),
            Scheme::Magnus(s) => s.workspace_size(),
            Scheme::EmbeddedRungeKutta(s) => s.workspace_size(),
            Scheme::Pair(s) => s.workspace_size(),
        }
    }

    pub(crate) fn composite_workspace_size(&self) -> usize {
        match self {
            Scheme::Magnus(s) => s.composite_workspace_size(),
            Scheme::Pair(s) => s.composite_workspace_size(),
            Scheme::CommutatorFree(_) | Scheme::EmbeddedRungeKutta(_) => 0,
        }
    }

    /// Fail with a configuration error if [Scheme::step_estimated] cannot be used.
    pub fn check_estimator(&self) -> Result<(), ExpopropError> {
        match self {
            Scheme::CommutatorFree(s) => s.check_estimator(),
            Scheme::Magnus(s) => s.check_estimator(),
            Scheme::EmbeddedRungeKutta(_) => Ok(()),
            Scheme::Pair(s) => s.check_estimator(),
        }
    }

    /// Fail with a configuration error unless `ψ - ψ_est` is a higher-order solution than `ψ`.
    ///
    /// For an embedded Runge-Kutta scheme `ψ - ψ_est` is the embedded solution, whose order is
    /// one lower.
    pub fn check_correction(&self) -> Result<(), ExpopropError> {
        self.check_estimator()?;
        if let Scheme::EmbeddedRungeKutta(s) = self {
            return Err(crate::scheme_error!(
                CorrectionNotSupported,
                format!(
                    "the embedded solution of a Runge-Kutta pair of order {} has order {}",
                    s.order(),
                    s.order() - 1
                )
            ));
        }
        Ok(())
    }

    /// A copy with some estimator flags replaced. Runge-Kutta schemes and pairs carry no
    /// flags and are returned unchanged.
    pub fn with_overrides(&self, overrides: SchemeOverrides) -> Self {
        match self {
            Scheme::CommutatorFree(s) => Scheme::CommutatorFree(s.with_overrides(overrides)),
            Scheme::Magnus(s) => Scheme::Magnus(s.with_overrides(overrides)),
            Scheme::EmbeddedRungeKutta(_) | Scheme::Pair(_) => self.clone(),
        }
    }

    fn check<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &StateVector,
        ws: &Workspace,
    ) -> Result<(), ExpopropError> {
        op.check_square()?;
        if psi.len() != op.nstates() {
            return Err(ExpopropError::from(OperatorError::DimensionMismatch {
                expected: op.nstates(),
                found: psi.len(),
            }));
        }
        if ws.krylov.dimension() != psi.len() {
            return Err(ExpopropError::from(OperatorError::DimensionMismatch {
                expected: psi.len(),
                found: ws.krylov.dimension(),
            }));
        }
        ws.check(self)
    }

    /// Advance `psi` from `t` to `t + dt` in place. A zero `dt` leaves `psi` untouched.
    pub fn step<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        self.check(op, psi, ws)?;
        match self {
            Scheme::CommutatorFree(s) => s.step(op, psi, t, dt, ws),
            Scheme::Magnus(s) => s.step(op, psi, t, dt, ws),
            Scheme::EmbeddedRungeKutta(s) => s.step(op, psi, t, dt, ws),
            Scheme::Pair(s) => s.step(op, psi, t, dt, ws),
        }
    }

    /// Advance `psi` like [Scheme::step] and overwrite `psi_est` with an estimate of the local
    /// error of the step, such that `psi - psi_est` is the improved solution.
    pub fn step_estimated<H: TimeDependentOperator>(
        &self,
        op: &H,
        psi: &mut StateVector,
        psi_est: &mut StateVector,
        t: f64,
        dt: f64,
        ws: &mut Workspace,
    ) -> Result<(), ExpopropError> {
        self.check(op, psi, ws)?;
        if psi_est.len() != psi.len() {
            return Err(ExpopropError::from(OperatorError::DimensionMismatch {
                expected: psi.len(),
                found: psi_est.len(),
            }));
        }
        match self {
            Scheme::CommutatorFree(s) => s.step_estimated(op, psi, psi_est, t, dt, ws),
            Scheme::Magnus(s) => s.step_estimated(op, psi, psi_est, t, dt, ws),
            Scheme::EmbeddedRungeKutta(s) => s.step_estimated(op, psi, psi_est, t, dt, ws),
            Scheme::Pair(s) => s.step_estimated(op, psi, psi_est, t, dt, ws),
        }
    }
}

impl FromStr for Scheme {
    type Err = ExpopropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::preset(s)
    }
}

impl From<CommutatorFreeScheme> for Scheme {
    fn from(s: CommutatorFreeScheme) -> Self {
        Scheme::CommutatorFree(s)
    }
}

impl From<MagnusScheme> for Scheme {
    fn from(s: MagnusScheme) -> Self {
        Scheme::Magnus(s)
    }
}

impl From<EmbeddedRungeKuttaScheme> for Scheme {
    fn from(s: EmbeddedRungeKuttaScheme) -> Self {
        Scheme::EmbeddedRungeKutta(s)
    }
}

impl From<SchemeEstimatorPair> for Scheme {
    fn from(s: SchemeEstimatorPair) -> Self {
        Scheme::Pair(s)
    }
}
