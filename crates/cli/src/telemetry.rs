//! Tracing subscriber setup

use crate::config::{LogFormat, LoggingSection};
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter")]
    Filter(#[from] ParseError),

    #[error("a global tracing subscriber is already installed")]
    Init(#[from] TryInitError),
}

/// `RUST_LOG` when set, otherwise the configured directives
pub fn filter(logging: &LoggingSection) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.filter))
}

/// Install the global subscriber. Call once, before the server starts.
pub fn init(logging: &LoggingSection) -> Result<(), TelemetryError> {
    let filter = filter(logging)?;

    match logging.format {
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_target(true)
                .with_level(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .json()
                .with_current_span(true)
                .with_span_list(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_configured_filter_is_used_without_rust_log() {
        let original = std::env::var("RUST_LOG").ok();
        std::env::remove_var("RUST_LOG");

        let logging = LoggingSection {
            filter: "gazette=debug,warn".into(),
            ..LoggingSection::default()
        };
        let filter = filter(&logging).unwrap();
        assert!(filter.to_string().contains("gazette=debug"));

        if let Some(value) = original {
            std::env::set_var("RUST_LOG", value);
        }
    }

    #[test]
    #[serial]
    fn test_invalid_directives_are_rejected() {
        let original = std::env::var("RUST_LOG").ok();
        std::env::remove_var("RUST_LOG");

        let logging = LoggingSection {
            filter: "gazette=notalevel".into(),
            ..LoggingSection::default()
        };
        assert!(filter(&logging).is_err());

        if let Some(value) = original {
            std::env::set_var("RUST_LOG", value);
        }
    }
}
