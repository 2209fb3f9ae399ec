//! Independent repetitions with per-repetition generator streams.

use super::driver::{Experiment, ExperimentResult};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One finished repetition and the seed that reproduces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Repetition {
    pub index: usize,
    pub seed: u64,
    pub result: ExperimentResult,
}

/// Derives `count` repetition seeds from a master seed.
pub fn repetition_seeds(master_seed: u64, count: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(master_seed);
    (0..count).map(|_| rng.next_u64()).collect()
}

pub fn run_seeded(experiment: &Experiment, index: usize, seed: u64) -> Repetition {
    let mut rng = StdRng::seed_from_u64(seed);
    Repetition {
        index,
        seed,
        result: experiment.run(&mut rng),
    }
}

/// Runs `repetitions` experiments, each on its own `StdRng`.
///
/// Output is ordered by index and does not depend on whether the `parallel` feature is on.
pub fn run_repetitions(
    experiment: &Experiment,
    repetitions: usize,
    master_seed: u64,
) -> Vec<Repetition> {
    let seeds = repetition_seeds(master_seed, repetitions);

    #[cfg(feature = "parallel")]
    let iter = seeds.into_par_iter().enumerate();
    #[cfg(not(feature = "parallel"))]
    let iter = seeds.into_iter().enumerate();

    iter.map(|(index, seed)| run_seeded(experiment, index, seed))
        .collect()
}
