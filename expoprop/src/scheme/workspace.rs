use std::cell::RefCell;

use crate::{
    error::{ExpopropError, SchemeError},
    expmv::{ExpmvConfig, KrylovWorkspace},
    Scheme, StateVector,
};

/// Offsets and weights of the snapshot combination for one exponential, reused across steps.
#[derive(Debug, Clone, Default)]
pub(crate) struct Combination {
    pub(crate) offsets: Vec<f64>,
    pub(crate) weights: Vec<f64>,
    pub(crate) derivative_weights: Vec<f64>,
}

impl Combination {
    pub(crate) fn clear(&mut self) {
        self.offsets.clear();
        self.weights.clear();
        self.derivative_weights.clear();
    }

    /// Add the node `c` with weight `a`; the derivative weight carries the node factor `a c`.
    pub(crate) fn push(&mut self, c: f64, a: f64, dt: f64) {
        self.offsets.push(c * dt);
        self.weights.push(a);
        self.derivative_weights.push(a * c);
    }
}

/// Scratch storage for one stepper.
///
/// A fixed pool of state-sized vectors (`slots`) used by the schemes and defect estimators, a
/// separate pool lent to composite snapshots during their applications, and the storage of
/// the exponential-action kernel. Everything is allocated once and never resized.
#[derive(Debug)]
pub struct Workspace {
    pub(crate) slots: Vec<StateVector>,
    pub(crate) composite: RefCell<Vec<StateVector>>,
    pub(crate) krylov: KrylovWorkspace,
    pub(crate) combination: Combination,
}

impl Workspace {
    /// Allocate a workspace for running `scheme` on states of length `n`.
    pub fn new(n: usize, scheme: &Scheme, config: ExpmvConfig) -> Self {
        Self::with_size(
            n,
            scheme.workspace_size(),
            scheme.composite_workspace_size(),
            config,
        )
    }

    pub fn with_size(n: usize, slots: usize, composite: usize, config: ExpmvConfig) -> Self {
        Self {
            slots: vec![StateVector::zeros(n); slots],
            composite: RefCell::new(vec![StateVector::zeros(n); composite]),
            krylov: KrylovWorkspace::new(n, config),
            combination: Combination::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[StateVector] {
        &self.slots
    }

    pub fn krylov(&self) -> &KrylovWorkspace {
        &self.krylov
    }

    pub(crate) fn check(&self, scheme: &Scheme) -> Result<(), ExpopropError> {
        let required = scheme.workspace_size();
        if self.slots.len() < required {
            return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
                required,
                found: self.slots.len(),
            }));
        }
        let required = scheme.composite_workspace_size();
        let found = self.composite.borrow().len();
        if found < required {
            return Err(ExpopropError::from(SchemeError::WorkspaceTooSmall {
                required,
                found,
            }));
        }
        Ok(())
    }
}
