//! Logging initialisation for the treedraw CLI.
//!
//! Installs a global `tracing` subscriber with optional JSON formatting and
//! bridges the `log` facade so crates using either API emit structured events.

use std::{env, sync::OnceLock};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::ParseError, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Selects `human` or `json` output.
pub const LOG_FORMAT_ENV: &str = "TREEDRAW_LOG_FORMAT";
/// Filter directives, consulted before `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "TREEDRAW_LOG";

const FALLBACK_FILTER_ENV: &str = "RUST_LOG";
const DEFAULT_FILTER: &str = "info";

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Errors raised while initialising structured logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Environment variable contained invalid UTF-8 data.
    #[error("environment variable `{name}` contained invalid UTF-8: {source}")]
    InvalidUnicode {
        /// Name of the offending environment variable.
        name: &'static str,
        /// Underlying parse failure.
        #[source]
        source: env::VarError,
    },
    /// Unsupported log format requested via `TREEDRAW_LOG_FORMAT`.
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat {
        /// Raw value supplied by the user.
        provided: String,
    },
    /// Filter directives could not be parsed.
    #[error("invalid filter in `{name}`: {source}")]
    InvalidFilter {
        /// Variable holding the directives.
        name: &'static str,
        /// Parser diagnostic.
        #[source]
        source: ParseError,
    },
    /// Failed to install the global tracing subscriber.
    #[error("failed to install tracing subscriber: {source}")]
    InstallFailed {
        /// Error raised by `tracing_subscriber`.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
}

/// Install global structured logging if it has not already been configured.
///
/// Output is human-readable unless `TREEDRAW_LOG_FORMAT=json`. Diagnostics go
/// to `stderr` so the summary on `stdout` stays parseable. The level comes
/// from `TREEDRAW_LOG`, then `RUST_LOG`, then defaults to `info`.
///
/// # Errors
/// Returns [`LoggingError`] if a variable contains invalid Unicode, the
/// format or filter is invalid, or the subscriber cannot be installed.
pub fn init_logging() -> Result<(), LoggingError> {
    if INITIALISED.get().is_some() {
        return Ok(());
    }

    match install_subscriber() {
        Ok(()) => {}
        Err(LoggingError::InstallFailed { source }) => {
            eprintln!("structured logging already configured elsewhere: {source}");
        }
        Err(err) => return Err(err),
    }
    let _ = INITIALISED.set(());
    Ok(())
}

fn install_subscriber() -> Result<(), LoggingError> {
    let use_json = match read_var(LOG_FORMAT_ENV)? {
        Some(raw) => parse_log_format(&raw)?,
        None => false,
    };
    let env_filter = filter_from(read_var(LOG_FILTER_ENV)?, read_var(FALLBACK_FILTER_ENV)?)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let fmt_layer = if use_json {
        fmt_layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        fmt_layer.boxed()
    };

    // Best-effort: another logger may already own the global slot.
    let _ = LogTracer::init();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|source| LoggingError::InstallFailed { source })
}

fn read_var(name: &'static str) -> Result<Option<String>, LoggingError> {
    match env::var(name) {
        Ok(raw) => Ok(Some(raw)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source @ env::VarError::NotUnicode(_)) => {
            Err(LoggingError::InvalidUnicode { name, source })
        }
    }
}

/// Builds the filter from the first non-blank source.
fn filter_from(primary: Option<String>, fallback: Option<String>) -> Result<EnvFilter, LoggingError> {
    let sources = [(LOG_FILTER_ENV, primary), (FALLBACK_FILTER_ENV, fallback)];
    for (name, raw) in sources {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            continue;
        };
        return EnvFilter::try_new(raw.trim())
            .map_err(|source| LoggingError::InvalidFilter { name, source });
    }
    Ok(EnvFilter::new(DEFAULT_FILTER))
}

fn parse_log_format(raw: &str) -> Result<bool, LoggingError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "human" | "" => Ok(false),
        "json" => Ok(true),
        other => Err(LoggingError::UnsupportedFormat {
            provided: other.to_owned(),
        }),
    }
}
