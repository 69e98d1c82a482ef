//! Structured logging.
//!
//! Two sinks share one `tracing` registry:
//! - diagnostics: everything except access lines, to stderr, filtered by
//!   `RUST_LOG` or the configured level
//! - access log: only [`ACCESS_TARGET`] events, to stdout or an append-mode
//!   file, one line per request

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;
use crate::http::access_log::ACCESS_TARGET;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open access log {}: {source}", path.display())]
    AccessLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Open the access log destination: the file in append mode, or stdout.
pub fn access_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LoggingError> {
    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::AccessLog {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(io::stdout)),
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let access = access_writer(config.access_log.as_deref())?;

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| {
        format!("cellgate={level},tower_http={level}", level = config.log_level)
    });
    let diagnostics_filter = EnvFilter::try_new(format!("{},{}=off", directives, ACCESS_TARGET))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(diagnostics_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(access)
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_filter(Targets::new().with_target(ACCESS_TARGET, Level::INFO)),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[test]
    fn access_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "existing\n").unwrap();

        let writer = access_writer(Some(&path)).unwrap();
        writer.make_writer().write_all(b"next\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\nnext\n");
    }

    #[test]
    fn unopenable_access_file_is_reported() {
        let err = access_writer(Some(Path::new("/nonexistent-dir/access.log"))).unwrap_err();
        assert!(matches!(err, LoggingError::AccessLog { .. }));
    }
}
