//! Structured logging.
//!
//! The terminal belongs to the progress UI, so the console layer only shows
//! warnings unless `--verbose` is given. During a run a second layer copies
//! every event at info (or debug) level into `pipeline.log` inside the run
//! directory, without ANSI colours.

use chrono::Local;
use std::path::Path;
use tracing::{Dispatch, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

use crate::errors::PipelineError;
use crate::pipeline::LOG_FILE;

/// Local wall-clock time as `[HH:MM:SS]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%H:%M:%S"))
    }
}

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "warn,quill=debug" } else { "warn" })
    })
}

fn file_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "warn,quill=debug" } else { "warn,quill=info" })
}

fn console_layer<S>(verbose: bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(ClockTime)
        .with_target(false)
        .with_filter(console_filter(verbose))
}

/// Install the process-wide console subscriber. Safe to call more than once.
pub fn init_console(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(console_layer(verbose))
        .try_init();
}

/// A subscriber for one run: console plus `pipeline.log` in `run_dir`.
///
/// Attach it to the run future with
/// [`WithSubscriber`](tracing::instrument::WithSubscriber) so that
/// concurrent runs in one process keep separate logs.
pub fn run_dispatch(run_dir: &Path, verbose: bool) -> Result<Dispatch, PipelineError> {
    let file = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE)
        .build(run_dir)
        .map_err(|source| PipelineError::LogSetup {
            path: run_dir.join(LOG_FILE),
            source,
        })?;
    let subscriber = tracing_subscriber::registry()
        .with(console_layer(verbose))
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_timer(ClockTime)
                .with_filter(file_filter(verbose)),
        );
    Ok(Dispatch::new(subscriber))
}
