//! Gaussian summary of the posterior over the unknown phase.

use super::circuit::CircuitParameters;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Scalar Gaussian approximation of the phase posterior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    mean: f64,
    standard_deviation: f64,
}

impl Belief {
    /// Creates a belief. Negative spreads collapse to zero.
    pub fn new(mean: f64, standard_deviation: f64) -> Self {
        debug_assert!(!standard_deviation.is_nan(), "standard deviation is NaN");
        Self {
            mean,
            standard_deviation: standard_deviation.max(0.0),
        }
    }

    /// Prior every experiment starts from: centred on zero, spread over half the circle.
    pub fn prior() -> Self {
        Self::new(0.0, FRAC_PI_2)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn standard_deviation(&self) -> f64 {
        self.standard_deviation
    }

    /// Circuit parameters that sharpen this belief on the next iteration.
    pub fn circuit_parameters(&self, alpha: f64) -> CircuitParameters {
        CircuitParameters::derive(self, alpha)
    }

    /// True once the spread has dropped strictly below `precision`.
    pub fn has_converged(&self, precision: f64) -> bool {
        self.standard_deviation < precision
    }

    pub fn absolute_error(&self, target_phi: f64) -> f64 {
        (target_phi - self.mean).abs()
    }
}

impl Default for Belief {
    fn default() -> Self {
        Self::prior()
    }
}
