//! Logging setup for the driver binary.
//!
//! Output goes to stderr; stdout carries command replies.

use crate::config::LogFormat;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Expand a bare level so it only applies to this crate; dependencies stay
/// at `warn`. Full directives are used as given.
fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
    }
}

fn level_filter(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(filter_directive(level))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Arguments
///
/// * `level` - Level for this crate ("debug") or a full directive
///   ("hostlb=trace,tokio=info")
/// * `format` - Log output format (json or pretty)
pub fn init_logging(level: &str, format: &LogFormat) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_scoped_to_crate() {
        assert_eq!(filter_directive("debug"), "warn,hostlb=debug");
        assert_eq!(filter_directive(" info "), "warn,hostlb=info");
    }

    #[test]
    fn test_directives_pass_through() {
        assert_eq!(filter_directive("hostlb=trace"), "hostlb=trace");
        assert_eq!(filter_directive("info,tokio=warn"), "info,tokio=warn");
    }

    #[test]
    fn test_bad_level_rejected() {
        assert!(level_filter("hostlb=loud").is_err());
        assert!(level_filter("trace").is_ok());
    }

    // The only test in this binary that installs a subscriber
    #[test]
    fn test_second_init_fails() {
        assert!(init_logging("warn", &LogFormat::Pretty).is_ok());
        let again = init_logging("warn", &LogFormat::Json);
        assert!(matches!(again, Err(LoggingError::Init(_))));
    }
}
