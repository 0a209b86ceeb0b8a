//!
//! Logging setup
//! -------------
//! Initializes the tracing subscriber from the `[log]` configuration.
//! `RUST_LOG` always wins over the configured level. Output goes to stdout
//! for an empty or `-` file setting, otherwise to the given file through a
//! non-blocking appender; the returned guard must be held for the process
//! lifetime so buffered lines flush on shutdown.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub fn init(cfg: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .with_context(|| format!("invalid log level: {}", cfg.level))?;

    match cfg.file.as_str() {
        "" | "-" => {
            let builder = tracing_subscriber::fmt().with_env_filter(filter);
            if cfg.format.eq_ignore_ascii_case("json") {
                builder.json().init();
            } else {
                builder.init();
            }
            Ok(None)
        }
        path => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .with_context(|| format!("open log file: {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false);
            if cfg.format.eq_ignore_ascii_case("json") {
                builder.json().init();
            } else {
                builder.init();
            }
            Ok(Some(guard))
        }
    }
}
