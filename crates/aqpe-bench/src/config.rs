use aqpe_core::experiment::{
    DEFAULT_MAX_ITERATIONS, EvidenceBudget, EvidenceRequest, ExperimentConfig,
};
use serde::Deserialize;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fs::File;
use std::io::BufReader;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{Level, warn};

const DEFAULT_RUN_ID: &str = "aqpe_default";
const DEFAULT_PRECISION: f64 = 1e-2;
const DEFAULT_ALPHA: f64 = 1.0;
const DEFAULT_PRIOR_SAMPLES: usize = 1_000;
const DEFAULT_REPETITIONS: usize = 1;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

const TARGET_PHI_RANGE: RangeInclusive<f64> = -PI..=PI;
const PRECISION_RANGE: RangeInclusive<f64> = 1e-10..=1.0;
const ALPHA_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Root harness configuration, loaded from YAML or built from defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    #[serde(default = "default_run_id")]
    pub run_id: String,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub repetitions: RepetitionConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            estimation: EstimationConfig::default(),
            repetitions: RepetitionConfig::default(),
            outputs: OutputsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.estimation.validate()?;
        self.repetitions.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        let resolve = |template: &Option<String>| {
            template
                .as_deref()
                .map(|template| resolve_template(&self.run_id, template))
        };
        ResolvedOutputs {
            jsonl: resolve(&self.outputs.jsonl),
            summary_md: resolve(&self.outputs.summary_md),
            plots_dir: resolve(&self.outputs.plots_dir),
        }
    }

    pub fn evidence_budget(&self) -> EvidenceBudget {
        EvidenceBudget::resolve(
            EvidenceRequest::from_option(self.estimation.evidence_samples),
            self.estimation.precision,
            self.estimation.alpha,
        )
    }

    /// Experiment settings for the core driver. Verbose runs record iteration traces.
    pub fn experiment_config(&self) -> ExperimentConfig {
        let estimation = &self.estimation;
        ExperimentConfig::new(
            estimation.target_phi,
            estimation.precision,
            estimation.alpha,
            self.evidence_budget().samples,
            estimation.prior_samples,
        )
        .with_max_iterations(estimation.max_iterations)
        .with_trace(self.logging.verbose)
    }
}

/// Estimation parameters for every experiment in the run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EstimationConfig {
    #[serde(default = "default_target_phi")]
    pub target_phi: f64,
    #[serde(default = "default_precision")]
    pub precision: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// `None` = auto (capped), `Some(0)` = auto (uncapped), `Some(k)` = k shots.
    #[serde(default)]
    pub evidence_samples: Option<u64>,
    #[serde(default = "default_prior_samples")]
    pub prior_samples: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            target_phi: default_target_phi(),
            precision: default_precision(),
            alpha: default_alpha(),
            evidence_samples: None,
            prior_samples: default_prior_samples(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl EstimationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        check_range("estimation.target_phi", self.target_phi, &TARGET_PHI_RANGE)?;
        check_range("estimation.precision", self.precision, &PRECISION_RANGE)?;
        check_range("estimation.alpha", self.alpha, &ALPHA_RANGE)?;

        if self.prior_samples == 0 {
            return Err(ValidationError::InvalidField {
                field: "estimation.prior_samples".to_string(),
                message: "number of prior samples must be greater than zero".to_string(),
            });
        }

        if self.max_iterations == 0 {
            return Err(ValidationError::InvalidField {
                field: "estimation.max_iterations".to_string(),
                message: "iteration cap must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Sets the target phase, keeping the current value when `value` is out of range.
    pub fn set_target_phi(&mut self, value: f64) -> Result<(), ValidationError> {
        check_range("target_phi", value, &TARGET_PHI_RANGE)?;
        self.target_phi = value;
        Ok(())
    }

    /// Sets the precision, keeping the current value when `value` is out of range.
    pub fn set_precision(&mut self, value: f64) -> Result<(), ValidationError> {
        check_range("precision", value, &PRECISION_RANGE)?;
        self.precision = value;
        Ok(())
    }

    /// Sets alpha, keeping the current value when `value` is out of range.
    pub fn set_alpha(&mut self, value: f64) -> Result<(), ValidationError> {
        check_range("alpha", value, &ALPHA_RANGE)?;
        self.alpha = value;
        Ok(())
    }

    /// Applies command-line values for the range-checked fields.
    ///
    /// Out-of-range values are not fatal: the field keeps its current value and the
    /// rejection is returned so the caller can report it once logging is up.
    pub fn apply_overrides(
        &mut self,
        target_phi: Option<f64>,
        precision: Option<f64>,
        alpha: Option<f64>,
    ) -> Vec<RejectedOverride> {
        let mut rejected = Vec::new();
        if let Some(value) = target_phi {
            if let Err(error) = self.set_target_phi(value) {
                rejected.push(RejectedOverride::new(error, self.target_phi));
            }
        }
        if let Some(value) = precision {
            if let Err(error) = self.set_precision(value) {
                rejected.push(RejectedOverride::new(error, self.precision));
            }
        }
        if let Some(value) = alpha {
            if let Err(error) = self.set_alpha(value) {
                rejected.push(RejectedOverride::new(error, self.alpha));
            }
        }
        rejected
    }
}

/// A command-line value that was out of range, with the value used instead.
#[derive(Debug)]
pub struct RejectedOverride {
    pub error: ValidationError,
    pub kept: f64,
}

impl RejectedOverride {
    fn new(error: ValidationError, kept: f64) -> Self {
        Self { error, kept }
    }

    pub fn report(&self) {
        warn!(
            target: "aqpe_bench::config",
            "{}; continuing with the default value {:e}",
            self.error,
            self.kept
        );
    }
}

fn check_range(
    field: &str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<(), ValidationError> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::InvalidField {
        field: field.to_string(),
        message: format!(
            "value {value:e} should be in [{:e}, {:e}]",
            range.start(),
            range.end()
        ),
    })
}

fn default_target_phi() -> f64 {
    FRAC_PI_2
}

fn default_precision() -> f64 {
    DEFAULT_PRECISION
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_prior_samples() -> usize {
    DEFAULT_PRIOR_SAMPLES
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Repetition count and master seed.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RepetitionConfig {
    #[serde(default = "default_repetitions")]
    pub count: usize,
    pub seed: Option<u64>,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            count: default_repetitions(),
            seed: None,
        }
    }
}

impl RepetitionConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::InvalidField {
                field: "repetitions.count".to_string(),
                message: "number of repetitions must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_repetitions() -> usize {
    DEFAULT_REPETITIONS
}

/// Output artifact configuration. Every artifact is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct OutputsConfig {
    #[serde(default)]
    pub jsonl: Option<String>,
    #[serde(default)]
    pub summary_md: Option<String>,
    #[serde(default)]
    pub plots_dir: Option<String>,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            let Some(value) = value else {
                continue;
            };

            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
            verbose: false,
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_run_id() -> String {
    DEFAULT_RUN_ID.to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: Option<PathBuf>,
    pub summary_md: Option<PathBuf>,
    pub plots_dir: Option<PathBuf>,
}

impl ResolvedOutputs {
    /// Directory that receives `telemetry.jsonl` and its summaries.
    ///
    /// Sits next to the summary Markdown, or the JSONL log when no summary is configured.
    pub fn telemetry_dir(&self) -> PathBuf {
        self.summary_md
            .as_deref()
            .or(self.jsonl.as_deref())
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
