//! One RFPE iteration, split into its three stochastic stages.
//!
//! - `evidence`: biased-coin stand-in for running the phase-estimation circuit.
//! - `prior`: candidate phases drawn from the current belief, truncated to (-pi, pi).
//! - `filter`: likelihood weighting and stochastic acceptance of the candidates.

mod evidence;
mod filter;
mod prior;

pub use evidence::EvidenceGenerator;
pub use filter::{
    FilterError, FilterOutcome, POSTERIOR_SPREAD_FACTOR, RejectionFilter, likelihood_weights,
};
pub use prior::{PHASE_BOUND, PriorSampler, PriorSamples, PriorSamplingStats};
