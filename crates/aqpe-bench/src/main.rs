use std::path::PathBuf;

use clap::Parser;

use aqpe_bench::config::{BenchmarkConfig, ResolvedOutputs};
use aqpe_bench::logging::init_logging;
use aqpe_bench::report::{VERBOSE_HINT, render_aggregate, render_configuration, render_experiment};
use aqpe_bench::runner::ExperimentRunner;
use aqpe_bench::telemetry::{append_highlights_to_markdown, write_summary_outputs};
use aqpe_core::AppInfo;

/// Accelerated quantum phase estimation driven by rejection filtering.
#[derive(Debug, Parser)]
#[command(
    name = "aqpe-bench",
    author,
    version,
    about = AppInfo::description()
)]
struct Cli {
    /// Optional YAML configuration; command-line values override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target phase in [-pi, pi]. Out-of-range values are ignored with a warning.
    #[arg(short = 't', long, value_name = "PHI", allow_negative_numbers = true)]
    target_phi: Option<f64>,

    /// Precision in [1e-10, 1]. Out-of-range values are ignored with a warning.
    #[arg(short, long, value_name = "PRECISION")]
    precision: Option<f64>,

    /// Depth exponent alpha in [0, 1]. Out-of-range values are ignored with a warning.
    #[arg(short, long, value_name = "ALPHA", allow_negative_numbers = true)]
    alpha: Option<f64>,

    /// Evidence samples per iteration; 0 selects the uncapped automatic value.
    #[arg(short = 'n', long, value_name = "N")]
    evidence_samples: Option<u64>,

    /// Prior samples per iteration.
    #[arg(short = 'm', long, value_name = "M")]
    prior_samples: Option<usize>,

    /// Number of independent experiments.
    #[arg(short = 'r', long, value_name = "COUNT")]
    repetitions: Option<usize>,

    /// Print every experiment's iteration trace.
    #[arg(short, long)]
    verbose: bool,

    /// Override the master RNG seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Exit after validating the configuration (no experiment is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.config.as_ref() {
        Some(path) => BenchmarkConfig::from_path(path)?,
        None => BenchmarkConfig::default(),
    };

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    let rejected = config
        .estimation
        .apply_overrides(cli.target_phi, cli.precision, cli.alpha);

    if cli.evidence_samples.is_some() {
        config.estimation.evidence_samples = cli.evidence_samples;
    }

    if let Some(prior_samples) = cli.prior_samples {
        config.estimation.prior_samples = prior_samples;
    }

    if let Some(repetitions) = cli.repetitions {
        config.repetitions.count = repetitions;
    }

    if let Some(seed) = cli.seed {
        config.repetitions.seed = Some(seed);
    }

    if cli.verbose {
        config.logging.verbose = true;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let logging_guard = init_logging(&config.logging, &outputs, &run_id)?;

    for override_value in &rejected {
        override_value.report();
    }

    let runner = ExperimentRunner::new(&config, outputs.clone());
    println!("Loaded configuration '{run_id}'");
    print!(
        "{}",
        render_configuration(
            runner.experiment_config(),
            runner.budget(),
            config.repetitions.count,
            runner.seed()
        )
    );

    if cli.validate_only {
        println!("Validation-only mode: experiments skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    let max_iterations = runner.experiment_config().max_iterations;
    if config.logging.verbose {
        for repetition in &summary.repetitions {
            print!(
                "{}",
                render_experiment(repetition.index + 1, &repetition.result, max_iterations)
            );
        }
    }
    print!(
        "{}",
        render_aggregate(
            &summary.statistics,
            config.estimation.precision,
            max_iterations
        )
    );
    if !config.logging.verbose {
        print!("{VERBOSE_HINT}");
    }

    if let Some(path) = summary.jsonl_path.as_ref() {
        println!(
            "Experiment log: {} rows at {}",
            summary.rows_written,
            path.display()
        );
    }
    if let Some(path) = summary.summary_path.as_ref() {
        println!("Summary table: {}", path.display());
    }
    if let Some(plot_path) = summary.plot_path.as_ref() {
        println!("Iterations histogram: {}", plot_path.display());
    }

    if let Some(guard) = logging_guard {
        let telemetry_path = guard.telemetry_path.clone();
        // Flush the non-blocking writer before reading the log back.
        drop(guard);
        println!("Telemetry log: {}", telemetry_path.display());

        if let Some(telemetry) = write_summary_outputs(&telemetry_path, &outputs.telemetry_dir())? {
            if let Some(summary_path) = summary.summary_path.as_ref() {
                append_highlights_to_markdown(summary_path, &telemetry)?;
            }
            println!("Telemetry summary (JSON): {}", telemetry.json_path.display());
            println!(
                "Telemetry summary (Markdown): {}",
                telemetry.markdown_path.display()
            );
            println!(
                "  Filter iterations: {}, zero-acceptance: {}, single-acceptance: {}",
                telemetry.summary.filter.iterations_label(),
                telemetry.summary.filter.zero_acceptance,
                telemetry.summary.filter.single_acceptance_label()
            );
        }
    }

    Ok(())
}
