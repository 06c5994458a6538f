//! Small operators with known behaviour, used by the tests, benchmarks and the
//! order-verification harness.

pub mod chain;
pub mod rabi;
pub mod random_linear;
pub mod two_level;
