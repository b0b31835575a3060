//! Console + file logging.
//!
//! `RUST_LOG` drives the filter (default `info`). The file writer is
//! non-blocking; keep the returned guard alive until shutdown or the tail
//! of the log is lost.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging(log_file: &Path) -> Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_file
        .file_name()
        .with_context(|| format!("invalid log file path: {}", log_file.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("logging already initialized")?;

    Ok(guard)
}
