// Local crates
use crate::helpers::load_config::{LogFormat, LoggingConfig};

// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    Layer,
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

const LOG_FILE_PREFIX: &str = "log_tracker.log";

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` wins over the configured level. The returned guard flushes the
/// non-blocking writer on drop and must be held until the process exits.
pub fn init_tracing(config: &LoggingConfig) -> Result<WorkerGuard> {
    let (writer, guard) = match &config.directory {
        Some(dir) => tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX)),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let mut filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level {:?}", config.level))?,
    };
    if let Ok(runtime_directive) = "tokio=warn".parse::<Directive>() {
        filter = filter.add_directive(runtime_directive);
    }

    let use_ansi = config.directory.is_none();
    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_ansi(use_ansi)
            .with_writer(writer)
            .with_thread_ids(true)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
    };

    let console_layer = config
        .tokio_console
        .then(|| console_subscriber::ConsoleLayer::builder().spawn());

    let subscriber = Registry::default()
        .with(console_layer)
        .with(fmt_layer.with_filter(filter))
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}

/// Route panics through `tracing` so they end up next to the other events.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
    }));
}
