use super::driver::ExperimentResult;
use serde::Serialize;

/// Aggregate over the repetitions of one run.
///
/// Averages are taken over converged experiments only and are `None` when nothing
/// converged.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub total_repetitions: usize,
    pub converged: usize,
    pub wrong_convergences: usize,
    pub converged_iterations: usize,
    pub total_absolute_error: f64,
    pub degenerate_iterations: usize,
}

impl RunStatistics {
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a ExperimentResult>,
        target_phi: f64,
        precision: f64,
    ) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.record(result, target_phi, precision);
        }
        stats
    }

    pub fn record(&mut self, result: &ExperimentResult, target_phi: f64, precision: f64) {
        self.total_repetitions += 1;
        self.degenerate_iterations += result.degenerate_iterations;

        let Some(error) = result.absolute_error(target_phi) else {
            return;
        };
        self.converged += 1;
        self.converged_iterations += result.iterations;
        self.total_absolute_error += error;
        if result.is_wrong_convergence(target_phi, precision) {
            self.wrong_convergences += 1;
        }
    }

    pub fn average_iterations(&self) -> Option<f64> {
        (self.converged > 0).then(|| self.converged_iterations as f64 / self.converged as f64)
    }

    pub fn average_absolute_error(&self) -> Option<f64> {
        (self.converged > 0).then(|| self.total_absolute_error / self.converged as f64)
    }

    pub fn all_failed(&self) -> bool {
        self.converged == 0
    }
}
