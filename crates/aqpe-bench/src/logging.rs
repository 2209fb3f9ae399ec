use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{Level, Subscriber, info};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LoggingConfig, ResolvedOutputs};

pub const TELEMETRY_FILE_NAME: &str = "telemetry.jsonl";

/// Keeps the non-blocking writer alive. Dropping it flushes pending telemetry.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    pub telemetry_path: PathBuf,
}

/// Installs the global subscriber for the run.
///
/// Warnings always reach stderr. With structured logging enabled every event at the
/// configured level is also written as JSON to `telemetry.jsonl` in the telemetry
/// directory; the returned guard must outlive the run.
pub fn init_logging(
    logging: &LoggingConfig,
    outputs: &ResolvedOutputs,
    run_id: &str,
) -> Result<Option<LoggingGuard>> {
    if !logging.enable_structured {
        // A subscriber may already be installed (tests, embedding).
        let _ = tracing_subscriber::registry()
            .with(console_layer(std::io::stderr))
            .try_init();
        return Ok(None);
    }

    let telemetry_dir = outputs.telemetry_dir();
    fs::create_dir_all(&telemetry_dir)
        .with_context(|| format!("creating telemetry directory {}", telemetry_dir.display()))?;
    let telemetry_path = telemetry_dir.join(TELEMETRY_FILE_NAME);
    let file = File::create(&telemetry_path)
        .with_context(|| format!("creating telemetry file {}", telemetry_path.display()))?;
    let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(file);

    let _ = tracing_subscriber::registry()
        .with(telemetry_layer(writer, logging))
        .with(console_layer(std::io::stderr))
        .try_init();
    info!(target: "aqpe_bench::run", run_id, "structured telemetry enabled");

    Ok(Some(LoggingGuard {
        _guard: guard,
        telemetry_path,
    }))
}

/// Compact warnings-only output for the terminal.
fn console_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .compact()
        .without_time()
        .with_writer(writer)
        .with_filter(LevelFilter::WARN)
}

/// One JSON object per event, filtered by `RUST_LOG` or the configured level.
fn telemetry_layer<S, W>(writer: W, logging: &LoggingConfig) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = logging.level().unwrap_or(Level::INFO);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimationConfig;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::warn;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            let bytes = self.0.lock().expect("capture lock").clone();
            String::from_utf8(bytes).expect("utf8 output")
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn structured_logging() -> LoggingConfig {
        LoggingConfig {
            enable_structured: true,
            tracing_level: "info".to_string(),
            verbose: false,
        }
    }

    #[test]
    fn rejected_cli_values_reach_console_with_structured_logging() {
        let console = Capture::default();
        let telemetry = Capture::default();
        let console_writer = console.clone();
        let telemetry_writer = telemetry.clone();
        let subscriber = tracing_subscriber::registry()
            .with(telemetry_layer(
                move || telemetry_writer.clone(),
                &structured_logging(),
            ))
            .with(console_layer(move || console_writer.clone()));

        let mut estimation = EstimationConfig::default();
        tracing::subscriber::with_default(subscriber, || {
            for rejected in estimation.apply_overrides(Some(9.0), Some(1e-3), None) {
                rejected.report();
            }
            info!(target: "aqpe_bench::run", "telemetry only");
        });

        let console = console.contents();
        assert!(console.contains("target_phi: value 9e0"), "console: {console}");
        assert!(console.contains("continuing with the default value"));
        assert!(!console.contains("telemetry only"));

        let telemetry = telemetry.contents();
        let levels: Vec<String> = telemetry
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).expect("json line");
                value["level"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(levels, vec!["WARN", "INFO"]);
        assert_eq!(estimation.precision, 1e-3);
    }

    #[test]
    fn console_layer_drops_events_below_warn() {
        let console = Capture::default();
        let writer = console.clone();
        let subscriber =
            tracing_subscriber::registry().with(console_layer(move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!(target: "aqpe_bench::experiment", "quiet");
            warn!(target: "aqpe_core::prior", clamped = 3u64, "loud");
        });

        let console = console.contents();
        assert!(console.contains("loud"));
        assert!(!console.contains("quiet"));
    }
}
