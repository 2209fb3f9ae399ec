//! Classical simulation of accelerated quantum phase estimation (AQPE) driven by
//! rejection-filtering phase estimation (RFPE).
//!
//! - `model`: belief, circuit parameters and measurement evidence.
//! - `rfpe`: evidence generation, truncated prior sampling and the rejection filter.
//! - `experiment`: the per-experiment convergence loop, evidence budgets and run statistics.

pub mod experiment;
pub mod model;
pub mod rfpe;

pub use experiment::{
    EvidenceBudget, EvidenceRequest, Experiment, ExperimentConfig, ExperimentResult,
    ExperimentStatus, IterationRecord, Repetition, RunStatistics, run_repetitions,
};
pub use model::{Belief, CircuitParameters, Evidence};
pub use rfpe::{EvidenceGenerator, FilterError, FilterOutcome, PriorSampler, RejectionFilter};

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "aqpe-rfpe"
    }

    pub const fn description() -> &'static str {
        "Accelerated Quantum Phase Estimation (AQPE) using Rejection Filtering Phase Estimation (RFPE)"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
