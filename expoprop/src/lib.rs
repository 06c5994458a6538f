//! # Expoprop
//!
//! Expoprop integrates linear, non-autonomous systems `dψ/dt = A(t)ψ`, in particular the
//! time-dependent Schroedinger equation `i dψ/dt = H(t)ψ`, with high-order exponential
//! integrators and asymptotically correct local error estimators.
//!
//! ## Operators
//!
//! The generator is supplied through the [TimeDependentOperator] trait, which creates frozen
//! snapshots ([OperatorState]) of weighted combinations `Σ w_k A(t + o_k)` and optionally of the
//! time derivative. Two implementations are provided: [MatrixOperator], a sum of sparse matrices
//! with scalar time-dependent coefficients, and [ClosureOperator], which wraps user closures. The
//! [OperatorKind] decides whether the stored operator is `A` itself or a Hamiltonian `H` with
//! `A = -iH`.
//!
//! ## Schemes
//!
//! A single step from `t` to `t + dt` is performed by a [Scheme]:
//! - commutator-free Magnus-type schemes ([CommutatorFreeScheme]) of orders 2 to 10, which
//!   are products of exponentials of linear combinations of `A` at quadrature nodes,
//! - the classical fourth-order Magnus integrator ([MagnusScheme]),
//! - embedded explicit Runge-Kutta schemes ([EmbeddedRungeKuttaScheme]) defined by a
//!   [Tableau],
//! - a [SchemeEstimatorPair] that estimates the local error of one scheme with a second,
//!   more accurate one.
//!
//! [Scheme::step_estimated] additionally returns an estimate `ψ_est` of the local error, based on
//! the defect of the numerical solution, the adjoint scheme or the embedded solution. All scratch
//! space lives in a [Workspace] sized by [Scheme::workspace_size], and the exponentials are
//! computed by the Krylov kernel [expmv].
//!
//! ## Time steppers
//!
//! The [TimeStepper] trait drives a scheme over an interval:
//! - [EquidistantTimeStepper] takes steps of constant size,
//! - [EquidistantCorrectedTimeStepper] subtracts the local error estimate after each step,
//!   raising the order by one,
//! - [AdaptiveTimeStepper] controls the step size from the error estimate ([AdaptiveConfig]).
//!
//! ## Order verification
//!
//! [OrderHarness] tabulates observed local and global convergence orders and the quality of the
//! error estimators, using the small models in [test_models].

pub mod error;
pub mod expmv;
pub mod op;
pub mod order;
pub mod scalar;
pub mod scheme;
pub mod stepper;
pub mod test_models;

pub use error::{ExpopropError, OperatorError, SchemeError, StepperError};
pub use expmv::{expmv, expmv_inplace, ExpmvConfig, ExpmvStatistics, KrylovWorkspace};
pub use op::{
    closure::ClosureOperator, matrix::MatrixOperator, ElementType, Op, OpStatistics,
    OperatorKind, OperatorState, State, TimeDependentOperator, TimeDependentOperatorRef,
};
pub use order::{OrderHarness, OrderTableRow};
pub use scalar::{DenseMatrix, IndexType, Scalar, StateVector};
pub use scheme::{
    CommutatorFreeScheme, EmbeddedRungeKuttaScheme, MagnusScheme, Scheme, SchemeEstimatorPair,
    SchemeFlags, SchemeOverrides, Tableau, Workspace,
};
pub use stepper::{
    AdaptiveConfig, AdaptiveTimeStepper, EquidistantCorrectedTimeStepper, EquidistantTimeStepper,
    StepperStatistics, TimeStepper,
};
