//! Console rendering for the harness. Each function returns the text so callers decide
//! where it goes.

use aqpe_core::experiment::{
    EvidenceBudget, ExperimentConfig, ExperimentResult, RunStatistics, WRONG_CONVERGENCE_SIGMAS,
    required_circuit_depth,
};

pub fn render_configuration(
    config: &ExperimentConfig,
    budget: &EvidenceBudget,
    repetitions: usize,
    seed: u64,
) -> String {
    let mut out = String::new();
    if config.record_trace {
        out.push_str("In verbose mode!\n");
    }
    out.push_str(&format!("target_phi = {:.6}\n", config.target_phi));
    out.push_str(&format!("alpha = {:.6}\n", config.alpha));
    out.push_str(&format!("precision = {:.6e}\n", config.precision));
    out.push_str(&format!("evidence_samples_per_iteration = {}\n", budget.samples));
    out.push_str(&format!("prior_samples_per_iteration = {}\n", config.prior_samples));
    out.push_str(&format!("repetitions = {repetitions}\n"));
    out.push_str(&format!("seed = {seed}\n"));
    out.push_str(&format!(
        "\nRequired quantum circuit depth = 1 / precision^alpha = {}\n",
        required_circuit_depth(config.precision, config.alpha)
    ));
    match budget.computed {
        Some(computed) => out.push_str(&format!(
            "Required quantum circuit samples (N) = {computed}\n"
        )),
        None => out.push_str(&format!(
            "Quantum circuit samples (N) fixed at {}\n",
            budget.samples
        )),
    }
    out
}

/// Iteration trace and verdict for one experiment; `number` is 1-based.
pub fn render_experiment(number: usize, result: &ExperimentResult, max_iterations: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nStarting AQPE experiment #{number}:\n"));
    out.push_str("-------------------------------\n");
    out.push_str(&iteration_line(
        0,
        result.initial.mean(),
        result.initial.standard_deviation(),
    ));
    for record in &result.trace {
        out.push_str(&iteration_line(
            record.iteration,
            record.belief.mean(),
            record.belief.standard_deviation(),
        ));
    }

    let belief = &result.belief;
    if result.converged() {
        out.push_str(&format!(
            "AQPE experiment #{number}: achieved precision in {} iterative circuit mappings. \
             Final estimate has mean {:.6e} and standard deviation {:.6e}.\n",
            result.iterations,
            belief.mean(),
            belief.standard_deviation()
        ));
    } else {
        out.push_str(&format!(
            "AQPE experiment #{number}: did not converge within {max_iterations} iterative \
             circuit mappings. Final estimate has mean {:.6e} and standard deviation {:.6e}.\n",
            belief.mean(),
            belief.standard_deviation()
        ));
    }
    if result.degenerate_iterations > 0 {
        out.push_str(&format!(
            "  ({} iterations accepted no prior samples and kept the previous belief)\n",
            result.degenerate_iterations
        ));
    }
    out
}

fn iteration_line(iteration: usize, mean: f64, sigma: f64) -> String {
    format!(
        "Iteration {iteration}: mean of estimate phi: {mean:.6e},\tstandard deviation of estimate phi: {sigma:.6e}\n"
    )
}

/// Run-level verdict lines.
pub fn render_aggregate(stats: &RunStatistics, precision: f64, max_iterations: usize) -> String {
    let (Some(iterations), Some(error)) =
        (stats.average_iterations(), stats.average_absolute_error())
    else {
        return format!(
            "\nConvergence failed for all {} AQPE experiments within the maximum of {} \
             iterative circuit mappings.\n",
            stats.total_repetitions, max_iterations
        );
    };

    let mut out = format!(
        "\nConvergence achieved on average in {iterations:.6} iterative circuit mappings in {} of \
         {} AQPE experiments, with an average phase estimation error of {error:.6e}.\n",
        stats.converged, stats.total_repetitions
    );
    out.push_str(&format!(
        "In {} out of {} converging experiments, the phase estimation error was greater than {} \
         times the input precision ({:.6e}).\n",
        stats.wrong_convergences,
        stats.converged,
        WRONG_CONVERGENCE_SIGMAS,
        WRONG_CONVERGENCE_SIGMAS * precision
    ));
    out
}

pub const VERBOSE_HINT: &str =
    "\nTo print details of every experiment, run in verbose mode with the '-v' option.\n";
