//! Experiment driver: the per-experiment convergence loop and run-level aggregation.

mod budget;
mod driver;
mod run;
mod stats;

pub use budget::{
    EvidenceBudget, EvidenceRequest, MAX_DEFAULT_EVIDENCE_SAMPLES, auto_evidence_samples,
    required_circuit_depth,
};
pub use driver::{
    DEFAULT_MAX_ITERATIONS, Experiment, ExperimentConfig, ExperimentResult, ExperimentStatus,
    IterationRecord, WRONG_CONVERGENCE_SIGMAS,
};
pub use run::{Repetition, repetition_seeds, run_repetitions, run_seeded};
pub use stats::RunStatistics;
