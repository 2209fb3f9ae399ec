//! Truncated-Gaussian candidate phases drawn from the current belief.

use crate::model::Belief;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;
use tracing::warn;

/// Candidates must satisfy `|phase| < PHASE_BOUND`.
pub const PHASE_BOUND: f64 = PI;

/// Largest value strictly inside the open phase interval.
const INNER_BOUND: f64 = PI - PI * f64::EPSILON;

/// Rejections tolerated for a single slot before the draw is clamped.
const DEFAULT_MAX_REDRAWS: usize = 10_000;

/// Counters describing how much rejection work one batch needed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriorSamplingStats {
    pub redraws: usize,
    pub clamped: usize,
}

/// A batch of candidate phases together with its sampling counters.
#[derive(Debug, Clone)]
pub struct PriorSamples {
    values: Vec<f64>,
    stats: PriorSamplingStats,
}

impl PriorSamples {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn stats(&self) -> PriorSamplingStats {
        self.stats
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Draws candidates from `N(mean, sigma^2)` restricted to `(-pi, pi)` by rejection.
#[derive(Debug, Clone, Copy)]
pub struct PriorSampler {
    max_redraws: usize,
}

impl Default for PriorSampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDRAWS)
    }
}

impl PriorSampler {
    pub fn new(max_redraws: usize) -> Self {
        Self {
            max_redraws: max_redraws.max(1),
        }
    }

    /// Draws `count` candidates into a freshly allocated buffer.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        belief: &Belief,
        count: usize,
        rng: &mut R,
    ) -> PriorSamples {
        let mut values = Vec::with_capacity(count);
        let stats = self.sample_into(belief, count, rng, &mut values);
        PriorSamples { values, stats }
    }

    /// Refills `buffer` with exactly `count` candidates.
    ///
    /// A slot that keeps landing outside the interval for `max_redraws` attempts is
    /// clamped just inside the boundary, so the call always terminates.
    pub fn sample_into<R: Rng + ?Sized>(
        &self,
        belief: &Belief,
        count: usize,
        rng: &mut R,
        buffer: &mut Vec<f64>,
    ) -> PriorSamplingStats {
        let mean = belief.mean();
        let sigma = belief.standard_deviation();
        let mut stats = PriorSamplingStats::default();

        buffer.clear();
        buffer.reserve(count);
        for _ in 0..count {
            buffer.push(self.draw_one(mean, sigma, rng, &mut stats));
        }

        if stats.clamped > 0 {
            warn!(
                target: "aqpe_core::prior",
                clamped = stats.clamped as u64,
                redraws = stats.redraws as u64,
                mean,
                sigma,
                "prior draws clamped to the phase interval"
            );
        }

        stats
    }

    fn draw_one<R: Rng + ?Sized>(
        &self,
        mean: f64,
        sigma: f64,
        rng: &mut R,
        stats: &mut PriorSamplingStats,
    ) -> f64 {
        let mut candidate = mean;
        for _ in 0..self.max_redraws {
            let z: f64 = StandardNormal.sample(rng);
            candidate = mean + sigma * z;
            if candidate.abs() < PHASE_BOUND {
                return candidate;
            }
            stats.redraws += 1;
        }

        stats.clamped += 1;
        if candidate.is_nan() {
            return mean.clamp(-INNER_BOUND, INNER_BOUND);
        }
        candidate.clamp(-INNER_BOUND, INNER_BOUND)
    }
}
