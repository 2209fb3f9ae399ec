use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aqpe_core::experiment::{ExperimentConfig, ExperimentResult, RunStatistics};
use plotters::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

const CONFIDENCE_LEVEL: f64 = 0.95;
const HISTOGRAM_FILE_NAME: &str = "iterations_histogram.png";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("invalid statistics configuration: {0}")]
    Stats(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}

/// Accumulates per-experiment results into run-level analytics.
pub struct AnalyticsCollector {
    run_id: String,
    seed: u64,
    config: ExperimentConfig,
    statistics: RunStatistics,
    iterations: Vec<f64>,
    errors: Vec<f64>,
    histogram: BTreeMap<usize, usize>,
}

impl AnalyticsCollector {
    pub fn new(run_id: &str, seed: u64, config: &ExperimentConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            seed,
            config: config.clone(),
            statistics: RunStatistics::default(),
            iterations: Vec::new(),
            errors: Vec::new(),
            histogram: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, result: &ExperimentResult) {
        self.statistics
            .record(result, self.config.target_phi, self.config.precision);

        if let Some(error) = result.absolute_error(self.config.target_phi) {
            self.iterations.push(result.iterations as f64);
            self.errors.push(error);
            *self.histogram.entry(result.iterations).or_insert(0) += 1;
        }
    }

    pub fn finalize(self) -> Result<AnalyticsSummary, AnalyticsError> {
        let z = confidence_z(CONFIDENCE_LEVEL)?;
        Ok(AnalyticsSummary {
            run_id: self.run_id,
            seed: self.seed,
            config: self.config,
            iterations: MetricSummary::from_samples(&self.iterations, z),
            absolute_error: MetricSummary::from_samples(&self.errors, z),
            statistics: self.statistics,
            iteration_histogram: self.histogram.into_iter().collect(),
        })
    }
}

/// Mean of a sample with a normal-approximation confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub samples: usize,
    pub mean: Option<f64>,
    pub ci95: Option<(f64, f64)>,
}

impl MetricSummary {
    fn from_samples(values: &[f64], z: f64) -> Self {
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        Self {
            samples: values.len(),
            mean,
            ci95: confidence_interval(values, z),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub run_id: String,
    pub seed: u64,
    pub config: ExperimentConfig,
    pub statistics: RunStatistics,
    pub iterations: MetricSummary,
    pub absolute_error: MetricSummary,
    /// `(iterations, converged experiments)` pairs in ascending order.
    pub iteration_histogram: Vec<(usize, usize)>,
}

impl AnalyticsSummary {
    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let config = &self.config;
        let stats = &self.statistics;

        let mut rows = String::new();
        rows.push_str(&format!("# AQPE Run Summary: {}\n\n", self.run_id));
        rows.push_str("## Configuration\n\n");
        rows.push_str("| Parameter | Value |\n");
        rows.push_str("|-----------|-------|\n");
        rows.push_str(&format!("| Target phi | {:.6} |\n", config.target_phi));
        rows.push_str(&format!("| Precision | {:e} |\n", config.precision));
        rows.push_str(&format!("| Alpha | {:.3} |\n", config.alpha));
        rows.push_str(&format!(
            "| Evidence samples per iteration | {} |\n",
            config.evidence_samples
        ));
        rows.push_str(&format!(
            "| Prior samples per iteration | {} |\n",
            config.prior_samples
        ));
        rows.push_str(&format!("| Iteration cap | {} |\n", config.max_iterations));
        rows.push_str(&format!("| Master seed | {} |\n", self.seed));

        rows.push_str("\n## Results\n\n");
        rows.push_str("| Metric | Value | 95% CI |\n");
        rows.push_str("|--------|-------|--------|\n");
        rows.push_str(&format!(
            "| Converged | {} / {} | |\n",
            stats.converged, stats.total_repetitions
        ));
        rows.push_str(&format!(
            "| Avg iterations to converge | {} | {} |\n",
            format_optional(self.iterations.mean, |v| format!("{v:.3}")),
            format_interval(self.iterations.ci95, |v| format!("{v:.3}")),
        ));
        rows.push_str(&format!(
            "| Avg absolute error | {} | {} |\n",
            format_optional(self.absolute_error.mean, |v| format!("{v:.3e}")),
            format_interval(self.absolute_error.ci95, |v| format!("{v:.3e}")),
        ));
        rows.push_str(&format!(
            "| Wrong convergences (error > 4 x precision) | {} | |\n",
            stats.wrong_convergences
        ));
        rows.push_str(&format!(
            "| Degenerate filter iterations | {} | |\n",
            stats.degenerate_iterations
        ));

        fs::write(path.as_ref(), rows).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })?;
        Ok(())
    }

    pub fn render_plot(&self, dir: impl AsRef<Path>) -> Result<PathBuf, AnalyticsError> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| AnalyticsError::Io {
                context: "creating plots directory",
                source: e,
            })?;
        }

        if self.iteration_histogram.is_empty() {
            return Err(AnalyticsError::Plot(
                "no converged experiments to plot".into(),
            ));
        }

        let output_path = dir.join(HISTOGRAM_FILE_NAME);
        let histogram = self.iteration_histogram.clone();
        let max_iterations = self.config.max_iterations.max(1);

        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let plot_attempt = std::panic::catch_unwind(move || {
            let root = BitMapBackend::new(&output_path, (800, 480)).into_drawing_area();
            root.fill(&WHITE)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            let x_max = histogram
                .iter()
                .map(|(iterations, _)| *iterations)
                .max()
                .unwrap_or(max_iterations)
                + 1;
            let y_max = histogram.iter().map(|(_, count)| *count).max().unwrap_or(1) + 1;

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Iterations to converge", ("sans-serif", 22))
                .set_label_area_size(LabelAreaPosition::Left, 50)
                .set_label_area_size(LabelAreaPosition::Bottom, 60)
                .build_cartesian_2d(0..x_max, 0..y_max)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            chart
                .configure_mesh()
                .disable_mesh()
                .y_desc("Experiments")
                .x_desc("Iterations")
                .draw()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            chart
                .draw_series(histogram.iter().map(|(iterations, count)| {
                    Rectangle::new(
                        [(*iterations, 0), (*iterations + 1, *count)],
                        BLUE.filled(),
                    )
                }))
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(chart);

            root.present()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(root);

            Ok(output_path)
        });

        std::panic::set_hook(prev_hook);

        match plot_attempt {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Plot(
                "plotters panicked while rendering (missing font support?)".into(),
            )),
        }
    }
}

fn format_optional(value: Option<f64>, format: impl Fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| "n/a".to_string())
}

fn format_interval(interval: Option<(f64, f64)>, format: impl Fn(f64) -> String) -> String {
    interval
        .map(|(low, high)| format!("[{}, {}]", format(low), format(high)))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Two-sided standard normal quantile for `level`, e.g. 1.96 for 0.95.
fn confidence_z(level: f64) -> Result<f64, AnalyticsError> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::Stats(e.to_string()))?;
    Ok(normal.inverse_cdf(0.5 + level / 2.0))
}

fn confidence_interval(values: &[f64], z: f64) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() == 1 {
        return Some((mean, mean));
    }
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() as f64 - 1.0);
    let std_error = (variance / values.len() as f64).sqrt();
    let margin = z * std_error;
    Some((mean - margin, mean + margin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqpe_core::experiment::ExperimentStatus;
    use aqpe_core::model::Belief;
    use std::f64::consts::FRAC_PI_2;

    fn result(status: ExperimentStatus, iterations: usize, mean: f64) -> ExperimentResult {
        ExperimentResult {
            status,
            iterations,
            initial: Belief::prior(),
            belief: Belief::new(mean, 0.004),
            degenerate_iterations: 0,
            trace: Vec::new(),
        }
    }

    fn collector() -> AnalyticsCollector {
        let config = ExperimentConfig::new(FRAC_PI_2, 1e-2, 1.0, 19, 1_000);
        AnalyticsCollector::new("analytics_test", 42, &config)
    }

    #[test]
    fn z_matches_ninety_five_percent() {
        let z = confidence_z(CONFIDENCE_LEVEL).expect("valid normal");
        assert!((z - 1.959_964).abs() < 1e-4);
    }

    #[test]
    fn interval_brackets_mean() {
        let (low, high) = confidence_interval(&[8.0, 9.0, 10.0, 11.0], 1.96).expect("non-empty");
        assert!(low < 9.5 && 9.5 < high);
        assert_eq!(confidence_interval(&[3.0], 1.96), Some((3.0, 3.0)));
        assert_eq!(confidence_interval(&[], 1.96), None);
    }

    #[test]
    fn summary_tracks_converged_experiments_only() {
        let mut collector = collector();
        collector.record(&result(ExperimentStatus::Converged, 8, FRAC_PI_2 + 0.01));
        collector.record(&result(ExperimentStatus::Converged, 8, FRAC_PI_2 - 0.02));
        collector.record(&result(ExperimentStatus::Converged, 10, FRAC_PI_2 + 0.5));
        collector.record(&result(ExperimentStatus::ExhaustedIterations, 100, 0.0));
        let summary = collector.finalize().expect("finalize");

        assert_eq!(summary.statistics.total_repetitions, 4);
        assert_eq!(summary.statistics.converged, 3);
        assert_eq!(summary.statistics.wrong_convergences, 1);
        assert_eq!(summary.iterations.samples, 3);
        let mean = summary.iterations.mean.expect("converged runs");
        assert!((mean - 26.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.iteration_histogram, vec![(8, 2), (10, 1)]);
    }

    #[test]
    fn markdown_lists_configuration_and_results() {
        let mut collector = collector();
        collector.record(&result(ExperimentStatus::Converged, 9, FRAC_PI_2));
        let summary = collector.finalize().expect("finalize");

        let file = tempfile::NamedTempFile::new().expect("temp file");
        summary.write_markdown(file.path()).expect("write markdown");
        let contents = fs::read_to_string(file.path()).expect("read back");

        assert!(contents.contains("# AQPE Run Summary: analytics_test"));
        assert!(contents.contains("| Evidence samples per iteration | 19 |"));
        assert!(contents.contains("| Converged | 1 / 1 | |"));
        assert!(contents.contains("| Avg iterations to converge | 9.000 | [9.000, 9.000] |"));
    }

    #[test]
    fn failed_runs_report_missing_averages() {
        let mut collector = collector();
        collector.record(&result(ExperimentStatus::ExhaustedIterations, 100, 0.3));
        let summary = collector.finalize().expect("finalize");
        assert_eq!(summary.iterations.mean, None);
        assert_eq!(summary.absolute_error.ci95, None);

        let dir = tempfile::tempdir().expect("temp dir");
        let err = summary.render_plot(dir.path()).expect_err("nothing to plot");
        assert!(matches!(err, AnalyticsError::Plot(_)));
    }
}
