//! Rejection filter: the approximate Bayesian update at the heart of RFPE.

use crate::model::{Belief, CircuitParameters, Evidence};
use rand::Rng;
use std::fmt;
use tracing::{debug, warn};

/// Multiplier applied to the posterior spread to counter filter degeneracy.
pub const POSTERIOR_SPREAD_FACTOR: f64 = 1.0;

/// Updated belief plus the number of candidates that survived acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutcome {
    pub belief: Belief,
    pub accepted: usize,
}

/// Recoverable failures of a single filter step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    EmptyPriorSamples,
    NoAcceptedSamples { candidates: usize },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::EmptyPriorSamples => write!(f, "no prior samples supplied to the filter"),
            FilterError::NoAcceptedSamples { candidates } => {
                write!(f, "none of the {candidates} prior samples was accepted")
            }
        }
    }
}

impl std::error::Error for FilterError {}

#[derive(Debug, Clone, Copy)]
pub struct RejectionFilter {
    spread_factor: f64,
}

impl Default for RejectionFilter {
    fn default() -> Self {
        Self::new(POSTERIOR_SPREAD_FACTOR)
    }
}

impl RejectionFilter {
    pub fn new(spread_factor: f64) -> Self {
        Self { spread_factor }
    }

    /// Folds `evidence` into `prior` using the candidate phases in `samples`.
    ///
    /// Every candidate is kept with probability equal to its likelihood relative to the
    /// best candidate. The accepted set's mean and (scaled) standard deviation become the
    /// new belief. A lone survivor keeps its value as the mean but halves the previous
    /// spread instead of collapsing it to zero.
    pub fn update<R: Rng + ?Sized>(
        &self,
        prior: &Belief,
        samples: &[f64],
        evidence: Evidence,
        circuit: &CircuitParameters,
        rng: &mut R,
    ) -> Result<FilterOutcome, FilterError> {
        if samples.is_empty() {
            return Err(FilterError::EmptyPriorSamples);
        }

        let weights = likelihood_weights(samples, evidence, circuit);

        let mut accepted = 0usize;
        let mut sum = 0.0;
        let mut sum_of_squares = 0.0;
        for (&sample, &weight) in samples.iter().zip(&weights) {
            if rng.gen_range(0.0..1.0) <= weight {
                accepted += 1;
                sum += sample;
                sum_of_squares += sample * sample;
            }
        }

        match accepted {
            0 => {
                warn!(
                    target: "aqpe_core::filter",
                    outcome = "zero_acceptance",
                    candidates = samples.len() as u64,
                    zeros = evidence.zeros(),
                    ones = evidence.ones(),
                    "rejection filter accepted no samples"
                );
                Err(FilterError::NoAcceptedSamples {
                    candidates: samples.len(),
                })
            }
            1 => {
                let belief = Belief::new(sum, prior.standard_deviation() / 2.0);
                debug!(
                    target: "aqpe_core::filter",
                    outcome = "single_acceptance",
                    mean = belief.mean(),
                    sigma = belief.standard_deviation(),
                    "single accepted sample; halving previous spread"
                );
                Ok(FilterOutcome { belief, accepted })
            }
            _ => {
                let count = accepted as f64;
                let mean = sum / count;
                let variance = (sum_of_squares / count - mean * mean).max(0.0);
                Ok(FilterOutcome {
                    belief: Belief::new(mean, variance.sqrt() * self.spread_factor),
                    accepted,
                })
            }
        }
    }
}

/// Likelihood of `evidence` at each candidate, scaled so the best candidate scores 1.
///
/// Log-likelihoods are accumulated one outcome class at a time and re-centred on their
/// maximum after each class. A class with no shots contributes nothing. Candidates that
/// make the evidence impossible get weight 0.
pub fn likelihood_weights(
    samples: &[f64],
    evidence: Evidence,
    circuit: &CircuitParameters,
) -> Vec<f64> {
    let predicted_zero: Vec<f64> = samples
        .iter()
        .map(|&sample| circuit.probability_of_zero(sample))
        .collect();

    let mut log_likelihood = vec![0.0; samples.len()];
    fold_outcome(&mut log_likelihood, &predicted_zero, evidence.zeros(), f64::ln);
    fold_outcome(&mut log_likelihood, &predicted_zero, evidence.ones(), |q| (1.0 - q).ln());

    log_likelihood.into_iter().map(f64::exp).collect()
}

fn fold_outcome(
    log_likelihood: &mut [f64],
    predicted_zero: &[f64],
    count: u64,
    log_probability: impl Fn(f64) -> f64,
) {
    if count > 0 {
        let count = count as f64;
        for (value, &q) in log_likelihood.iter_mut().zip(predicted_zero) {
            *value += count * log_probability(q);
        }
    }
    recentre(log_likelihood);
}

fn recentre(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // All candidates impossible: leave them at -inf so every weight becomes 0.
    if !max.is_finite() {
        return;
    }
    for value in values.iter_mut() {
        *value -= max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    fn grid(count: usize, low: f64, high: f64) -> Vec<f64> {
        let step = (high - low) / (count - 1) as f64;
        (0..count).map(|i| low + step * i as f64).collect()
    }

    #[test]
    fn best_candidate_has_unit_weight() {
        let samples = grid(101, -3.0, 3.0);
        let circuit = CircuitParameters::new(1.3, -0.2);
        let weights = likelihood_weights(&samples, Evidence::new(12, 7), &circuit);

        let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
        assert!(weights.iter().all(|w| (0.0..=1.0).contains(w)));
    }

    #[test]
    fn empty_evidence_weights_everything_equally() {
        let samples = grid(11, -1.0, 1.0);
        let circuit = CircuitParameters::new(2.0, 0.5);
        let weights = likelihood_weights(&samples, Evidence::new(0, 0), &circuit);
        assert!(weights.iter().all(|w| *w == 1.0));
    }

    #[test]
    fn impossible_candidates_get_zero_weight() {
        let circuit = CircuitParameters::new(1.0, 0.0);
        let weights = likelihood_weights(&[0.0, PI], Evidence::new(4, 0), &circuit);
        assert_eq!(weights, vec![1.0, 0.0]);
    }

    #[test]
    fn empty_evidence_keeps_sample_moments() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(1);
        let samples = [-1.0, 0.0, 1.0, 2.0];
        let outcome = filter
            .update(
                &Belief::prior(),
                &samples,
                Evidence::new(0, 0),
                &CircuitParameters::new(1.0, 0.0),
                &mut rng,
            )
            .expect("all samples accepted");

        assert_eq!(outcome.accepted, 4);
        assert!((outcome.belief.mean() - 0.5).abs() < 1e-12);
        assert!((outcome.belief.standard_deviation() - 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn single_acceptance_halves_previous_spread() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(99);
        let prior = Belief::new(0.1, 0.8);
        let samples = [PI, 0.0, -PI, PI];
        let outcome = filter
            .update(
                &prior,
                &samples,
                Evidence::new(5, 0),
                &CircuitParameters::new(1.0, 0.0),
                &mut rng,
            )
            .expect("one sample survives");

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.belief.mean(), 0.0);
        assert_eq!(outcome.belief.standard_deviation(), 0.4);
    }

    #[test]
    fn zero_acceptance_is_reported() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(4);
        let result = filter.update(
            &Belief::prior(),
            &[PI, -PI],
            Evidence::new(3, 0),
            &CircuitParameters::new(1.0, 0.0),
            &mut rng,
        );
        assert_eq!(result, Err(FilterError::NoAcceptedSamples { candidates: 2 }));
    }

    #[test]
    fn empty_sample_set_is_rejected() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(4);
        let result = filter.update(
            &Belief::prior(),
            &[],
            Evidence::new(3, 1),
            &CircuitParameters::new(1.0, 0.0),
            &mut rng,
        );
        assert_eq!(result, Err(FilterError::EmptyPriorSamples));
    }

    #[test]
    fn spread_is_never_negative() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(2718);
        for round in 0..200u64 {
            let centre = (round as f64 * 0.37).sin() * 3.0;
            let samples: Vec<f64> = (0..50)
                .map(|i| (centre + 1e-9 * i as f64).clamp(-3.1, 3.1))
                .collect();
            let circuit = CircuitParameters::new(1.0 + round as f64 * 0.1, centre - 0.5);
            let evidence = Evidence::new(round % 13, (round * 7) % 11);
            let result = filter.update(&Belief::prior(), &samples, evidence, &circuit, &mut rng);
            if let Ok(outcome) = result {
                assert!(outcome.belief.standard_deviation() >= 0.0);
                assert!(!outcome.belief.standard_deviation().is_nan());
            }
        }
    }

    #[test]
    fn posterior_concentrates_on_consistent_phases() {
        let filter = RejectionFilter::default();
        let mut rng = StdRng::seed_from_u64(31);
        let samples = grid(601, -3.0, 3.0);
        let outcome = filter
            .update(
                &Belief::prior(),
                &samples,
                Evidence::new(100, 0),
                &CircuitParameters::new(1.0, 0.0),
                &mut rng,
            )
            .expect("filter accepts the mode");

        assert!(outcome.accepted > 1);
        assert!(outcome.belief.mean().abs() < 0.1);
        assert!(outcome.belief.standard_deviation() < 0.3);
    }

    #[test]
    fn spread_factor_scales_posterior() {
        let samples = [-1.0, 1.0];
        let circuit = CircuitParameters::new(1.0, 0.0);
        let narrow = RejectionFilter::default()
            .update(
                &Belief::prior(),
                &samples,
                Evidence::new(0, 0),
                &circuit,
                &mut StdRng::seed_from_u64(8),
            )
            .expect("accepted");
        let wide = RejectionFilter::new(2.0)
            .update(
                &Belief::prior(),
                &samples,
                Evidence::new(0, 0),
                &circuit,
                &mut StdRng::seed_from_u64(8),
            )
            .expect("accepted");

        assert_eq!(narrow.belief.standard_deviation(), 1.0);
        assert_eq!(wide.belief.standard_deviation(), 2.0);
    }
}
