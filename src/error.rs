//! Error types for the tuner.
//!
//! Each concern gets its own enum so the component that detects a failure
//! can decide locally whether it is fatal. Only [`TransportError::Open`] and
//! [`ConfigError`] are allowed to end the process.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The serial endpoint could not be opened at startup.
    #[error("failed to open serial endpoint {endpoint}: {source}")]
    Open {
        endpoint: String,
        #[source]
        source: serialport::Error,
    },

    /// A read or write on an open link failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial driver reported an error (e.g. device unplugged).
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The link was already shut down.
    #[error("transport closed")]
    Closed,
}

/// A telemetry frame that could not be decoded. Always recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// The payload is not a decimal number.
    #[error("malformed telemetry frame: {frame:?}")]
    Malformed { frame: String },

    /// The payload parsed but is NaN or infinite.
    #[error("non-finite angle in telemetry frame: {frame:?}")]
    NonFinite { frame: String },
}

/// Errors loading or validating a [`TunerConfig`](crate::config::TunerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected schema.
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors writing a [`TuningReport`](crate::tuning::report::TuningReport).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_error_display_quotes_frame() {
        let err = TelemetryError::Malformed {
            frame: "garbage".into(),
        };
        assert_eq!(err.to_string(), "malformed telemetry frame: \"garbage\"");
    }

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("unplugged"));
    }
}
