//! Logging setup for the `cloudbill-invoices` binary.
//!
//! Filter priority:
//! 1. CLI flags (`-v/-q`)
//! 2. `RUST_LOG`
//! 3. `logging.default_filter` from the configuration

use crate::config::{LogFormat, LoggingConfig};
use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, config: &LoggingConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(verbosity, rust_log.as_deref(), &config.default_filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()?,
    }

    Ok(())
}

fn build_filter<L: LogLevel>(
    verbosity: &Verbosity<L>,
    rust_log: Option<&str>,
    default_filter: &str,
) -> Result<EnvFilter> {
    // Without -v/-q the verbosity still reports its default level.
    if verbosity.is_present() {
        return Ok(match verbosity.log_level() {
            Some(level) => EnvFilter::try_new(level.to_string())?,
            None => EnvFilter::new("off"),
        });
    }
    if let Some(filter) = rust_log.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(default_filter)?)
}
