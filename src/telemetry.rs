//! Tracing subscriber setup.
//!
//! One `fmt` layer, JSON lines by default or human-readable when
//! `log.pretty` is set, written to stdout, stderr or an append-mode file.
//! `RUST_LOG` takes precedence over `log.level`.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogOutput, LogSettings};
use crate::error::{PublisherError, Result};

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the level directive is invalid, the log file cannot be opened,
/// or a global subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = build_filter(settings)?;
    let writer = make_writer(settings)?;

    let layer = if settings.pretty {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(settings.output != LogOutput::File)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| PublisherError::Config(format!("failed to install subscriber: {e}")))?;

    tracing::info!(
        level = %settings.level,
        pretty = settings.pretty,
        output = ?settings.output,
        "Logging initialized"
    );
    Ok(())
}

/// `RUST_LOG` if set and valid, otherwise `settings.level`.
pub fn build_filter(settings: &LogSettings) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| PublisherError::Config(format!("invalid log.level {:?}: {e}", settings.level)))
}

fn make_writer(settings: &LogSettings) -> Result<BoxMakeWriter> {
    Ok(match settings.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File => {
            let path = settings.file.as_ref().ok_or_else(|| {
                PublisherError::Config("log.file is required when log.output is file".into())
            })?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    PublisherError::Config(format!("failed to open {}: {e}", path.display()))
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_output_requires_path() {
        let settings = LogSettings {
            output: LogOutput::File,
            file: None,
            ..LogSettings::default()
        };
        assert!(matches!(make_writer(&settings), Err(PublisherError::Config(_))));
    }

    #[test]
    fn test_file_output_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publisher.log");
        let settings = LogSettings {
            output: LogOutput::File,
            file: Some(path.clone()),
            ..LogSettings::default()
        };

        make_writer(&settings).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_filter_accepts_directives() {
        let settings = LogSettings {
            level: "debug,shared_publisher::server=trace".into(),
            ..LogSettings::default()
        };
        assert!(build_filter(&settings).is_ok());
    }
}
