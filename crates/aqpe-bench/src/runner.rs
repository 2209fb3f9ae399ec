use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aqpe_core::experiment::{
    EvidenceBudget, Experiment, ExperimentConfig, Repetition, RunStatistics, run_repetitions,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event, info, warn};

use crate::analytics::{AnalyticsCollector, AnalyticsError};
use crate::config::{BenchmarkConfig, ResolvedOutputs};

/// Primary entry point for running a batch of estimation experiments.
pub struct ExperimentRunner {
    run_id: String,
    repetitions: usize,
    seed: u64,
    budget: EvidenceBudget,
    experiment: Experiment,
    outputs: ResolvedOutputs,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub seed: u64,
    pub repetitions: Vec<Repetition>,
    pub statistics: RunStatistics,
    pub rows_written: usize,
    pub jsonl_path: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub plot_path: Option<PathBuf>,
}

impl ExperimentRunner {
    /// Build a runner from a validated configuration.
    ///
    /// Without a configured seed one is derived from the wall clock.
    pub fn new(config: &BenchmarkConfig, outputs: ResolvedOutputs) -> Self {
        let budget = config.evidence_budget();
        if budget.capped {
            warn!(
                target: "aqpe_bench::config",
                computed = budget.computed.unwrap_or_default(),
                used = budget.samples,
                "required evidence samples exceed the default maximum; use an explicit sample \
                 count or 0 to lift the cap"
            );
        }

        let seed = match config.repetitions.seed {
            Some(seed) => seed,
            None => {
                let seed = seed_from_clock();
                info!(target: "aqpe_bench::config", seed, "no seed configured; derived from clock");
                seed
            }
        };

        Self {
            run_id: config.run_id.clone(),
            repetitions: config.repetitions.count,
            seed,
            budget,
            experiment: Experiment::new(config.experiment_config()),
            outputs,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn budget(&self) -> &EvidenceBudget {
        &self.budget
    }

    pub fn experiment_config(&self) -> &ExperimentConfig {
        self.experiment.config()
    }

    /// Execute every repetition, then write the JSONL log, summary and plot.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        if let Some(path) = self.outputs.jsonl.as_ref() {
            ensure_parent(path.parent())?;
        }
        if let Some(path) = self.outputs.summary_md.as_ref() {
            ensure_parent(path.parent())?;
        }

        let config = self.experiment.config();
        let repetitions = run_repetitions(&self.experiment, self.repetitions, self.seed);
        let mut analytics = AnalyticsCollector::new(&self.run_id, self.seed, config);

        let mut writer = match self.outputs.jsonl.as_ref() {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        let mut rows_written = 0usize;

        for repetition in &repetitions {
            let result = &repetition.result;
            analytics.record(result);
            let status = if result.converged() {
                "converged"
            } else {
                "exhausted_iterations"
            };
            event!(
                target: "aqpe_bench::experiment",
                Level::INFO,
                run_id = %self.run_id,
                index = repetition.index as u64,
                seed = repetition.seed,
                status,
                iterations = result.iterations as u64,
                mean = result.belief.mean(),
                sigma = result.belief.standard_deviation(),
                degenerate_iterations = result.degenerate_iterations as u64
            );

            if let Some(writer) = writer.as_mut() {
                write_experiment_row(writer, &self.run_id, config, repetition)?;
                rows_written += 1;
            }
        }

        if let Some(writer) = writer.as_mut() {
            writer.flush()?;
        }

        let summary = analytics.finalize()?;
        if let Some(path) = self.outputs.summary_md.as_ref() {
            summary.write_markdown(path)?;
        }
        let plot_path = match self.outputs.plots_dir.as_ref() {
            Some(dir) => match summary.render_plot(dir) {
                Ok(path) => Some(path),
                Err(err) => {
                    eprintln!("WARN: {}", err);
                    None
                }
            },
            None => None,
        };

        Ok(RunSummary {
            seed: self.seed,
            statistics: summary.statistics,
            repetitions,
            rows_written,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            plot_path,
        })
    }
}

/// Seed derived from the wall clock: `((secs >> 10) ^ (micros << 10)) + 1`.
pub fn seed_from_clock() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = elapsed.as_secs();
    let micros = u64::from(elapsed.subsec_micros());
    ((seconds >> 10) ^ (micros << 10)).wrapping_add(1)
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_experiment_row(
    writer: &mut BufWriter<File>,
    run_id: &str,
    config: &ExperimentConfig,
    repetition: &Repetition,
) -> Result<(), RunnerError> {
    let result = &repetition.result;
    let row = ExperimentLogRow {
        run_id,
        experiment_id: format!("E{:05}", repetition.index),
        index: repetition.index,
        seed: repetition.seed,
        converged: result.converged(),
        iterations: result.iterations,
        estimated_phi: result.estimated_phi(),
        final_mean: result.belief.mean(),
        final_standard_deviation: result.belief.standard_deviation(),
        absolute_error: result.absolute_error(config.target_phi),
        wrong_convergence: result.is_wrong_convergence(config.target_phi, config.precision),
        degenerate_iterations: result.degenerate_iterations,
    };

    serde_json::to_writer(&mut *writer, &row)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ExperimentLogRow<'a> {
    run_id: &'a str,
    experiment_id: String,
    index: usize,
    seed: u64,
    converged: bool,
    iterations: usize,
    estimated_phi: Option<f64>,
    final_mean: f64,
    final_standard_deviation: f64,
    absolute_error: Option<f64>,
    wrong_convergence: bool,
    degenerate_iterations: usize,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize log row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}
