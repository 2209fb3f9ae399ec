use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub experiments: ExperimentTelemetrySummary,
    pub filter: FilterTelemetrySummary,
    pub prior: PriorTelemetrySummary,
    pub levels: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct ExperimentTelemetrySummary {
    pub count: usize,
    pub converged: usize,
    pub avg_iterations: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct FilterTelemetrySummary {
    pub iterations: usize,
    pub avg_accepted: Option<f64>,
    pub zero_acceptance: usize,
    pub single_acceptance: usize,
}

impl FilterTelemetrySummary {
    /// Iteration and single-acceptance events are logged at debug level. Without any
    /// iteration events those counts are unknown, not zero.
    pub fn captured_debug_events(&self) -> bool {
        self.iterations > 0
    }

    pub fn iterations_label(&self) -> String {
        self.debug_count(self.iterations)
    }

    pub fn single_acceptance_label(&self) -> String {
        self.debug_count(self.single_acceptance)
    }

    fn debug_count(&self, value: usize) -> String {
        if self.captured_debug_events() {
            value.to_string()
        } else {
            DEBUG_COUNT_UNAVAILABLE.to_string()
        }
    }
}

const DEBUG_COUNT_UNAVAILABLE: &str = "n/a (requires tracing_level: debug)";

#[derive(Debug, Default, Serialize)]
pub struct PriorTelemetrySummary {
    pub clamp_events: usize,
    pub clamped_draws: u64,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Aggregate experiment, filter and prior-sampler events from a JSON telemetry log.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();
    let mut iterations_avg = Average::new();
    let mut accepted_avg = Average::new();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(level) = payload.get("level").and_then(Value::as_str) {
            *summary.levels.entry(level.to_string()).or_insert(0) += 1;
        }

        match target {
            "aqpe_bench::experiment" => {
                summary.experiments.count += 1;
                if string_field(&fields, "status") == Some("converged") {
                    summary.experiments.converged += 1;
                    if let Some(iterations) = fields.get("iterations").and_then(Value::as_f64) {
                        iterations_avg.add(iterations);
                    }
                }
            }
            "aqpe_core::iteration" => {
                summary.filter.iterations += 1;
                if let Some(accepted) = fields.get("accepted").and_then(Value::as_f64) {
                    accepted_avg.add(accepted);
                }
            }
            "aqpe_core::filter" => match string_field(&fields, "outcome") {
                Some("zero_acceptance") => summary.filter.zero_acceptance += 1,
                Some("single_acceptance") => summary.filter.single_acceptance += 1,
                _ => {}
            },
            "aqpe_core::prior" => {
                summary.prior.clamp_events += 1;
                summary.prior.clamped_draws += fields
                    .get("clamped")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
            }
            _ => {}
        }
    }

    summary.experiments.avg_iterations = iterations_avg.mean();
    summary.filter.avg_accepted = accepted_avg.mean();

    Ok(summary)
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(
        &json_path,
        serde_json::to_vec_pretty(&summary).map_err(TelemetryError::from)?,
    )
    .map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary json",
        source,
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let summary = &outputs.summary;
    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    section.push_str(&format!(
        "- Experiment events captured: {}\n",
        summary.experiments.count
    ));
    section.push_str(&format!(
        "- Filter iterations logged: {}\n",
        summary.filter.iterations_label()
    ));
    if let Some(value) = summary.filter.avg_accepted {
        section.push_str(&format!("- Avg accepted samples: {:.1}\n", value));
    }
    section.push_str(&format!(
        "- Zero-acceptance iterations: {}\n",
        summary.filter.zero_acceptance
    ));
    section.push_str(&format!(
        "- Single-acceptance fallbacks: {}\n",
        summary.filter.single_acceptance_label()
    ));
    if summary.prior.clamp_events > 0 {
        section.push_str(&format!(
            "- Prior clamps: {} draws in {} batches\n",
            summary.prior.clamped_draws, summary.prior.clamp_events
        ));
    }

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push('\n');

    output.push_str("## Experiments\n");
    output.push_str(&format!("- Events: {}\n", summary.experiments.count));
    output.push_str(&format!("- Converged: {}\n", summary.experiments.converged));
    if let Some(value) = summary.experiments.avg_iterations {
        output.push_str(&format!("- Avg iterations to converge: {:.2}\n", value));
    }
    output.push('\n');

    output.push_str("## Rejection Filter\n");
    output.push_str(&format!(
        "- Iterations: {}\n",
        summary.filter.iterations_label()
    ));
    if let Some(value) = summary.filter.avg_accepted {
        output.push_str(&format!("- Avg accepted samples: {:.1}\n", value));
    }
    output.push_str(&format!(
        "- Zero acceptance: {}\n",
        summary.filter.zero_acceptance
    ));
    output.push_str(&format!(
        "- Single acceptance: {}\n",
        summary.filter.single_acceptance_label()
    ));
    output.push('\n');

    output.push_str("## Prior Sampler\n");
    output.push_str(&format!(
        "- Clamp events: {}\n",
        summary.prior.clamp_events
    ));
    output.push_str(&format!(
        "- Clamped draws: {}\n",
        summary.prior.clamped_draws
    ));
    output.push('\n');

    output.push_str("## Levels\n");
    if summary.levels.is_empty() {
        output.push_str("- <none>\n");
    } else {
        for (label, count) in &summary.levels {
            output.push_str(&format!("- {}: {}\n", label, count));
        }
    }
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}
