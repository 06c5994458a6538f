use thiserror::Error;

/// Custom error type for Expoprop
///
/// This error type is used to wrap all possible errors that can occur when using Expoprop
#[derive(Error, Debug)]
pub enum ExpopropError {
    #[error("Operator error: {0}")]
    OperatorError(#[from] OperatorError),
    #[error("Scheme error: {0}")]
    SchemeError(#[from] SchemeError),
    #[error("Time stepper error: {0}")]
    StepperError(#[from] StepperError),
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors raised by operators, their snapshots and the exponential kernel
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Operator is not square: {nout} outputs for {nstates} states")]
    NotSquare { nstates: usize, nout: usize },
    #[error("Vector has wrong length: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Offsets and weights have different lengths: {offsets} offsets, {weights} weights")]
    CombinationLengthMismatch { offsets: usize, weights: usize },
    #[error("Time derivative of the operator is not implemented")]
    DerivativeNotImplemented,
    #[error("Exponential action is not finite after {time} of a step of size {z}")]
    NonFiniteExponential { time: f64, z: f64 },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible configuration errors of an integration scheme
#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("Defect-based error estimation supports orders up to 6, scheme has order {order}")]
    DefectOrderTooHigh { order: usize },
    #[error("Adjoint-based error estimation requires an odd order, scheme has order {order}")]
    AdjointRequiresOddOrder { order: usize },
    #[error("Invalid Tableau: {0}")]
    InvalidTableau(String),
    #[error("Invalid coefficients: {0}")]
    InvalidCoefficients(String),
    #[error("Unknown scheme preset: {0}")]
    UnknownPreset(String),
    #[error("Correction by the error estimate does not raise the order: {0}")]
    CorrectionNotSupported(String),
    #[error("Workspace too small: scheme needs {required} vectors, workspace has {found}")]
    WorkspaceTooSmall { required: usize, found: usize },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors raised when constructing or advancing a time stepper
#[derive(Error, Debug)]
pub enum StepperError {
    #[error("Step size must be positive and finite, got {dt}")]
    InvalidStepSize { dt: f64 },
    #[error("Tolerance must be positive and finite, got {tol}")]
    InvalidTolerance { tol: f64 },
    #[error("End time = {tend} is less than start time = {t0}")]
    EndTimeBeforeStartTime { t0: f64, tend: f64 },
    #[error("Exceeded maximum number of error test failures at time = {time}")]
    TooManyErrorTestFailures { time: f64 },
    #[error("Error: {0}")]
    Other(String),
}

#[macro_export]
macro_rules! operator_error {
    ($variant:ident) => {
        ExpopropError::from(OperatorError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        ExpopropError::from(OperatorError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! scheme_error {
    ($variant:ident) => {
        ExpopropError::from(SchemeError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        ExpopropError::from(SchemeError::$variant($($arg)*.to_string()))
    };
}

impl ExpopropError {
    /// True for errors caused by an invalid scheme or estimator configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, ExpopropError::SchemeError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_build_domain_variants() {
        let err = crate::scheme_error!(InvalidCoefficients, format!("{} nodes", 3));
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "Scheme error: Invalid coefficients: 3 nodes");
        let err = crate::operator_error!(DerivativeNotImplemented);
        assert!(matches!(
            err,
            ExpopropError::OperatorError(OperatorError::DerivativeNotImplemented)
        ));
        assert!(!err.is_configuration_error());
    }
}
