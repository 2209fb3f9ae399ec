use super::budget::{EvidenceBudget, EvidenceRequest};
use crate::model::{Belief, CircuitParameters, Evidence};
use crate::rfpe::{EvidenceGenerator, PriorSampler, RejectionFilter};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::debug;

/// Iteration cap applied to every experiment unless overridden.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// A converged estimate further than this many precisions from the target is suspect.
pub const WRONG_CONVERGENCE_SIGMAS: f64 = 4.0;

const DEFAULT_PRIOR_SAMPLES: usize = 1_000;

/// Immutable settings for a single estimation experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub target_phi: f64,
    pub precision: f64,
    pub alpha: f64,
    pub evidence_samples: u64,
    pub prior_samples: usize,
    pub max_iterations: usize,
    #[serde(default)]
    pub record_trace: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let precision = 1e-2;
        let alpha = 1.0;
        let budget = EvidenceBudget::resolve(EvidenceRequest::Default, precision, alpha);
        Self::new(FRAC_PI_2, precision, alpha, budget.samples, DEFAULT_PRIOR_SAMPLES)
    }
}

impl ExperimentConfig {
    pub fn new(
        target_phi: f64,
        precision: f64,
        alpha: f64,
        evidence_samples: u64,
        prior_samples: usize,
    ) -> Self {
        Self {
            target_phi,
            precision,
            alpha,
            evidence_samples,
            prior_samples,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            record_trace: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_trace(mut self, record_trace: bool) -> Self {
        self.record_trace = record_trace;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Converged,
    ExhaustedIterations,
}

/// Snapshot of one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: usize,
    pub circuit: CircuitParameters,
    pub evidence: Evidence,
    pub accepted: usize,
    /// True when the filter accepted nothing and the belief was carried over.
    pub degenerate: bool,
    pub belief: Belief,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub status: ExperimentStatus,
    /// Iterations executed: `index + 1` of the converging iteration, or the cap.
    pub iterations: usize,
    pub initial: Belief,
    pub belief: Belief,
    pub degenerate_iterations: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<IterationRecord>,
}

impl ExperimentResult {
    pub fn converged(&self) -> bool {
        self.status == ExperimentStatus::Converged
    }

    /// Final mean, reported only for converged experiments.
    pub fn estimated_phi(&self) -> Option<f64> {
        self.converged().then(|| self.belief.mean())
    }

    pub fn absolute_error(&self, target_phi: f64) -> Option<f64> {
        self.estimated_phi()
            .map(|estimate| (target_phi - estimate).abs())
    }

    /// Converged with an error above `WRONG_CONVERGENCE_SIGMAS * precision`.
    pub fn is_wrong_convergence(&self, target_phi: f64, precision: f64) -> bool {
        self.absolute_error(target_phi)
            .is_some_and(|error| error > WRONG_CONVERGENCE_SIGMAS * precision)
    }
}

/// Runs the evidence → prior → filter loop until the belief is tight enough.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
    sampler: PriorSampler,
    filter: RejectionFilter,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self::with_components(config, PriorSampler::default(), RejectionFilter::default())
    }

    pub fn with_components(
        config: ExperimentConfig,
        sampler: PriorSampler,
        filter: RejectionFilter,
    ) -> Self {
        Self {
            config,
            sampler,
            filter,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs one experiment from the standard prior.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> ExperimentResult {
        self.run_from(Belief::prior(), rng)
    }

    /// Runs one experiment starting from `initial`.
    ///
    /// Each iteration derives the circuit from the current belief, synthesises evidence,
    /// draws fresh candidates and filters them. A zero-acceptance step keeps the previous
    /// belief and still counts toward the iteration cap.
    pub fn run_from<R: Rng + ?Sized>(&self, initial: Belief, rng: &mut R) -> ExperimentResult {
        let config = &self.config;
        let mut belief = initial;
        let mut samples = Vec::with_capacity(config.prior_samples);
        let mut trace = Vec::new();
        let mut degenerate_iterations = 0;

        for index in 0..config.max_iterations {
            let iteration = index + 1;
            let circuit = belief.circuit_parameters(config.alpha);
            let evidence = EvidenceGenerator::run_circuit(
                config.target_phi,
                &circuit,
                config.evidence_samples,
                rng,
            );
            self.sampler
                .sample_into(&belief, config.prior_samples, rng, &mut samples);

            let (accepted, degenerate) =
                match self.filter.update(&belief, &samples, evidence, &circuit, rng) {
                    Ok(outcome) => {
                        belief = outcome.belief;
                        (outcome.accepted, false)
                    }
                    Err(_) => {
                        degenerate_iterations += 1;
                        (0, true)
                    }
                };

            debug!(
                target: "aqpe_core::iteration",
                iteration = iteration as u64,
                mean = belief.mean(),
                sigma = belief.standard_deviation(),
                m = circuit.m(),
                theta = circuit.theta(),
                zeros = evidence.zeros(),
                ones = evidence.ones(),
                accepted = accepted as u64,
                degenerate,
                "rfpe iteration"
            );

            if config.record_trace {
                trace.push(IterationRecord {
                    iteration,
                    circuit,
                    evidence,
                    accepted,
                    degenerate,
                    belief,
                });
            }

            if belief.has_converged(config.precision) {
                return ExperimentResult {
                    status: ExperimentStatus::Converged,
                    iterations: iteration,
                    initial,
                    belief,
                    degenerate_iterations,
                    trace,
                };
            }
        }

        ExperimentResult {
            status: ExperimentStatus::ExhaustedIterations,
            iterations: config.max_iterations,
            initial,
            belief,
            degenerate_iterations,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn quick_config() -> ExperimentConfig {
        ExperimentConfig::new(FRAC_PI_2, 1e-2, 1.0, 19, 500)
    }

    #[test]
    fn default_config_follows_documented_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.target_phi, FRAC_PI_2);
        assert_eq!(config.precision, 1e-2);
        assert_eq!(config.alpha, 1.0);
        assert_eq!(config.evidence_samples, 19);
        assert_eq!(config.prior_samples, 1_000);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(!config.record_trace);
    }

    #[test]
    fn zero_iteration_cap_exhausts_immediately() {
        let experiment = Experiment::new(quick_config().with_max_iterations(0));
        let mut rng = StdRng::seed_from_u64(0);
        let result = experiment.run(&mut rng);

        assert_eq!(result.status, ExperimentStatus::ExhaustedIterations);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.belief, Belief::prior());
        assert_eq!(result.estimated_phi(), None);
    }

    #[test]
    fn already_converged_start_stops_after_one_iteration() {
        let experiment = Experiment::new(quick_config());
        let mut rng = StdRng::seed_from_u64(3);
        let result = experiment.run_from(Belief::new(FRAC_PI_2, 0.0), &mut rng);

        assert!(result.converged());
        assert_eq!(result.iterations, 1);
        let error = result.absolute_error(FRAC_PI_2).expect("converged");
        assert!(error < 1e-12);
    }

    #[test]
    fn empty_prior_set_counts_degenerate_iterations() {
        let config = quick_config().with_max_iterations(5).with_trace(true);
        let experiment = Experiment::new(ExperimentConfig {
            prior_samples: 0,
            ..config
        });
        let mut rng = StdRng::seed_from_u64(8);
        let result = experiment.run(&mut rng);

        assert_eq!(result.status, ExperimentStatus::ExhaustedIterations);
        assert_eq!(result.iterations, 5);
        assert_eq!(result.degenerate_iterations, 5);
        assert_eq!(result.belief, Belief::prior());
        assert!(result.trace.iter().all(|record| record.degenerate));
    }

    #[test]
    fn trace_records_every_iteration() {
        let experiment = Experiment::new(quick_config().with_trace(true));
        let mut rng = StdRng::seed_from_u64(21);
        let result = experiment.run(&mut rng);

        assert_eq!(result.trace.len(), result.iterations);
        for (index, record) in result.trace.iter().enumerate() {
            assert_eq!(record.iteration, index + 1);
            assert_eq!(record.evidence.total(), 19);
            assert!(record.belief.standard_deviation() >= 0.0);
        }
        let last = result.trace.last().expect("at least one iteration");
        assert_eq!(last.belief, result.belief);
    }

    #[test]
    fn trace_is_empty_unless_requested() {
        let experiment = Experiment::new(quick_config());
        let mut rng = StdRng::seed_from_u64(21);
        assert!(experiment.run(&mut rng).trace.is_empty());
    }

    #[test]
    fn wrong_convergence_uses_four_precisions() {
        let result = ExperimentResult {
            status: ExperimentStatus::Converged,
            iterations: 7,
            initial: Belief::prior(),
            belief: Belief::new(1.0, 0.001),
            degenerate_iterations: 0,
            trace: Vec::new(),
        };
        assert!(!result.is_wrong_convergence(1.039, 1e-2));
        assert!(result.is_wrong_convergence(1.041, 1e-2));

        let exhausted = ExperimentResult {
            status: ExperimentStatus::ExhaustedIterations,
            ..result
        };
        assert!(!exhausted.is_wrong_convergence(3.0, 1e-2));
    }

    #[test]
    fn result_serializes_status_in_snake_case() {
        let result = ExperimentResult {
            status: ExperimentStatus::ExhaustedIterations,
            iterations: 100,
            initial: Belief::prior(),
            belief: Belief::new(0.2, 0.5),
            degenerate_iterations: 2,
            trace: Vec::new(),
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "exhausted_iterations");
        assert_eq!(json["belief"]["standard_deviation"], 0.5);
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn same_seed_same_result() {
        let experiment = Experiment::new(quick_config().with_trace(true));
        let a = experiment.run(&mut StdRng::seed_from_u64(77));
        let b = experiment.run(&mut StdRng::seed_from_u64(77));
        assert_eq!(a, b);
    }
}
