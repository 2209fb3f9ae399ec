use aqpe_core::experiment::{
    EvidenceBudget, EvidenceRequest, Experiment, ExperimentConfig, RunStatistics,
    WRONG_CONVERGENCE_SIGMAS, run_repetitions,
};
use aqpe_core::model::Belief;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::f64::consts::FRAC_PI_2;

const PRECISION: f64 = 1e-2;

fn quarter_turn_config() -> ExperimentConfig {
    let budget = EvidenceBudget::resolve(EvidenceRequest::Default, PRECISION, 1.0);
    ExperimentConfig::new(FRAC_PI_2, PRECISION, 1.0, budget.samples, 1_000)
}

#[test]
fn quarter_turn_phase_converges_accurately() {
    let config = quarter_turn_config();
    let experiment = Experiment::new(config.clone());
    let repetitions = run_repetitions(&experiment, 20, 20251017);
    let stats = RunStatistics::from_results(
        repetitions.iter().map(|r| &r.result),
        config.target_phi,
        config.precision,
    );

    assert_eq!(stats.total_repetitions, 20);
    assert!(stats.converged >= 19, "only {} of 20 converged", stats.converged);
    let accurate = stats.converged - stats.wrong_convergences;
    assert!(
        accurate >= 15,
        "{accurate} of {} converged runs were within {WRONG_CONVERGENCE_SIGMAS} precisions",
        stats.converged
    );
    for repetition in &repetitions {
        assert!(repetition.result.iterations <= config.max_iterations);
    }
}

#[test]
fn spread_trends_downward_while_converging() {
    let experiment = Experiment::new(quarter_turn_config().with_trace(true));
    let mut checked = 0;
    for seed in 0..10u64 {
        let result = experiment.run(&mut StdRng::seed_from_u64(seed));
        if !result.converged() {
            continue;
        }
        checked += 1;

        let spreads: Vec<f64> = std::iter::once(result.initial.standard_deviation())
            .chain(result.trace.iter().map(|r| r.belief.standard_deviation()))
            .collect();
        let half = spreads.len() / 2;
        let early = spreads[..half].iter().sum::<f64>() / half as f64;
        let late = spreads[half..].iter().sum::<f64>() / (spreads.len() - half) as f64;
        assert!(late < early, "seed {seed}: late spread {late} vs early {early}");
        assert!(result.belief.standard_deviation() < PRECISION);
    }
    assert!(checked >= 8);
}

#[test]
fn identical_seed_gives_identical_statistics() {
    let config = quarter_turn_config();
    let experiment = Experiment::new(config.clone());

    let first = run_repetitions(&experiment, 6, 7);
    let second = run_repetitions(&experiment, 6, 7);
    assert_eq!(first, second);

    let stats = |reps: &[aqpe_core::Repetition]| {
        RunStatistics::from_results(
            reps.iter().map(|r| &r.result),
            config.target_phi,
            config.precision,
        )
    };
    assert_eq!(stats(first.as_slice()), stats(second.as_slice()));
}

#[test]
fn estimate_stays_inside_phase_interval() {
    let config = ExperimentConfig {
        target_phi: -1.0,
        ..quarter_turn_config()
    };
    let experiment = Experiment::new(config);
    let result = experiment.run_from(Belief::prior(), &mut StdRng::seed_from_u64(11));
    assert!(result.belief.mean() > -std::f64::consts::PI);
    assert!(result.belief.mean() < std::f64::consts::PI);
}
