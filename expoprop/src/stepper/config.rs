use serde::{Deserialize, Serialize};

/// Step-size control of the [AdaptiveTimeStepper](super::AdaptiveTimeStepper).
///
/// After every attempt with step `dt` and normalized error `err = |ψ_est| / tol` the next
/// step is `dt * clamp(safety_factor * err^(-1/(p+1)), minimum_timestep_shrink,
/// maximum_timestep_growth)`, with `p` the order of the scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub tol: f64,
    pub dt_max: f64,
    /// Replace ψ by the corrected solution `ψ - ψ_est` after each accepted step. Not available
    /// for embedded Runge-Kutta schemes.
    pub higher_order: bool,
    pub safety_factor: f64,
    pub minimum_timestep_shrink: f64,
    pub maximum_timestep_growth: f64,
    /// Fail after this many consecutive rejections of the same step. `None` retries without
    /// bound.
    pub maximum_error_test_failures: Option<usize>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            tol: 1e-8,
            dt_max: f64::INFINITY,
            higher_order: false,
            safety_factor: 0.9,
            minimum_timestep_shrink: 0.25,
            maximum_timestep_growth: 4.0,
            maximum_error_test_failures: None,
        }
    }
}

impl AdaptiveConfig {
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_dt_max(mut self, dt_max: f64) -> Self {
        self.dt_max = dt_max;
        self
    }

    pub fn with_higher_order(mut self, higher_order: bool) -> Self {
        self.higher_order = higher_order;
        self
    }

    /// Factor by which to scale the step after an attempt with normalized error `err`, for a
    /// scheme of order `order`. A non-finite error shrinks the step as far as allowed.
    pub fn factor(&self, err: f64, order: usize) -> f64 {
        if err.is_nan() {
            return self.minimum_timestep_shrink;
        }
        let factor = self.safety_factor * err.powf(-1.0 / (order as f64 + 1.0));
        factor.clamp(self.minimum_timestep_shrink, self.maximum_timestep_growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn factor_stays_within_bounds(err in 0.0f64..1e12, order in 1usize..11) {
            let config = AdaptiveConfig::default();
            let factor = config.factor(err, order);
            prop_assert!((0.25..=4.0).contains(&factor));
        }

        #[test]
        fn factor_decreases_with_error(a in 1e-12f64..1e6, b in 1e-12f64..1e6, order in 1usize..11) {
            let config = AdaptiveConfig::default();
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            prop_assert!(config.factor(lo, order) >= config.factor(hi, order));
        }
    }

    #[test]
    fn degenerate_errors() {
        let config = AdaptiveConfig::default();
        assert_eq!(config.factor(0.0, 4), 4.0);
        assert_eq!(config.factor(f64::INFINITY, 4), 0.25);
        assert_eq!(config.factor(f64::NAN, 4), 0.25);
        // an error of exactly one shrinks by the safety factor
        assert!((config.factor(1.0, 4) - 0.9).abs() < 1e-15);
    }
}
