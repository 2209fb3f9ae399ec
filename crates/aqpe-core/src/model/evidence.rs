use serde::{Deserialize, Serialize};

/// Outcome counts from one batch of circuit shots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    zeros: u64,
    ones: u64,
}

impl Evidence {
    pub const fn new(zeros: u64, ones: u64) -> Self {
        Self { zeros, ones }
    }

    pub const fn zeros(&self) -> u64 {
        self.zeros
    }

    pub const fn ones(&self) -> u64 {
        self.ones
    }

    pub const fn total(&self) -> u64 {
        self.zeros + self.ones
    }

    /// Fraction of outcome-0 shots; `None` when no shots were taken.
    pub fn zero_fraction(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.zeros as f64 / total as f64)
    }
}
