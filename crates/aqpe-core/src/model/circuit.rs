use super::belief::Belief;
use serde::{Deserialize, Serialize};

/// Circuit knobs for one iteration: the repetition multiplier `M` and the offset `theta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitParameters {
    m: f64,
    theta: f64,
}

impl CircuitParameters {
    pub fn new(m: f64, theta: f64) -> Self {
        Self { m, theta }
    }

    /// `M = sigma^-alpha` (1 when sigma is zero) and `theta = mu - sigma`.
    pub fn derive(belief: &Belief, alpha: f64) -> Self {
        let sigma = belief.standard_deviation();
        let m = if sigma == 0.0 {
            1.0
        } else {
            1.0 / sigma.powf(alpha)
        };
        Self::new(m, belief.mean() - sigma)
    }

    pub fn m(&self) -> f64 {
        self.m
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Probability of measuring outcome 0 when the true phase is `phi`.
    pub fn probability_of_zero(&self, phi: f64) -> f64 {
        (1.0 + (self.m * (phi - self.theta)).cos()) / 2.0
    }
}
