//! Error types for the payments pipeline
//!
//! This module defines all error types that can occur while moving a batch file
//! or a queue message through the pipeline.
//!
//! # Error Categories
//!
//! - **Malformed Records**: A CSV line that does not decode into a payment record
//! - **Dispatch Errors**: A queue or SQL sink write that failed
//! - **Configuration Errors**: Invalid routing configuration found at startup
//! - **Source Errors**: I/O failures while listing, reading or acknowledging input
//!
//! Every stage propagates its error to the orchestrator untouched. The retry scope
//! treats all kinds alike and only gives up once the attempt budget is spent.

use thiserror::Error;

/// Main error type for the payments pipeline
///
/// Each variant carries plain strings so the error can be cloned into logs,
/// compared in tests and re-raised after the retry scope is exhausted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A batch line failed schema decode
    ///
    /// Under the default fail-fast policy this aborts the rest of the batch.
    #[error("Malformed record{}: {reason} [{content}]", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    MalformedRecord {
        /// 1-based line number within the file (if known)
        line: Option<u64>,
        /// Raw content of the offending line
        content: String,
        /// What was wrong with it
        reason: String,
    },

    /// A single-message body could not be decoded as the wire format
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the decode failure
        message: String,
    },

    /// A sink write failed
    ///
    /// Retryable: the orchestrator re-runs the whole unit of work.
    #[error("Dispatch to {sink} failed: {message}")]
    TransientDispatch {
        /// Name of the sink that failed
        sink: String,
        /// Description of the failure
        message: String,
    },

    /// Routing configuration is unusable
    ///
    /// Raised before the pipeline starts and never retried.
    #[error("Configuration error: {message}")]
    FatalConfiguration {
        /// Description of the configuration problem
        message: String,
    },

    /// I/O error while reading or acknowledging source input
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// The retry scope gave up on a unit of work
    #[error("{unit} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Name of the unit (file name or message id)
        unit: String,
        /// Total attempts made, including the first
        attempts: u32,
        /// Error raised by the final attempt
        source: Box<PipelineError>,
    },
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::Io {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error keeps the line number when the reader knows it
impl From<csv::Error> for PipelineError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        PipelineError::MalformedRecord {
            line,
            content: String::new(),
            reason: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::InvalidMessage {
            message: error.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(error: rusqlite::Error) -> Self {
        PipelineError::transient_dispatch("sql", error)
    }
}

impl From<figment::Error> for PipelineError {
    fn from(error: figment::Error) -> Self {
        PipelineError::fatal_configuration(error)
    }
}

impl PipelineError {
    /// Create a MalformedRecord error without line context
    pub fn malformed_record(content: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            line: None,
            content: content.into(),
            reason: reason.into(),
        }
    }

    /// Create a TransientDispatch error for the named sink
    pub fn transient_dispatch(sink: &str, message: impl ToString) -> Self {
        PipelineError::TransientDispatch {
            sink: sink.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a FatalConfiguration error
    pub fn fatal_configuration(message: impl ToString) -> Self {
        PipelineError::FatalConfiguration {
            message: message.to_string(),
        }
    }

    /// Attach a 1-based line number to a MalformedRecord error
    ///
    /// Other variants are returned unchanged.
    pub fn at_line(self, line: u64) -> Self {
        match self {
            PipelineError::MalformedRecord {
                content, reason, ..
            } => PipelineError::MalformedRecord {
                line: Some(line),
                content,
                reason,
            },
            other => other,
        }
    }

    /// Whether this error comes from a record that failed to decode
    pub fn is_malformed(&self) -> bool {
        matches!(self, PipelineError::MalformedRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::malformed_with_line(
        PipelineError::MalformedRecord { line: Some(3), content: "1,2,3".to_string(), reason: "expected 5 fields, found 3".to_string() },
        "Malformed record at line 3: expected 5 fields, found 3 [1,2,3]"
    )]
    #[case::malformed_without_line(
        PipelineError::MalformedRecord { line: None, content: "x".to_string(), reason: "bad".to_string() },
        "Malformed record: bad [x]"
    )]
    #[case::transient_dispatch(
        PipelineError::TransientDispatch { sink: "sql".to_string(), message: "connection refused".to_string() },
        "Dispatch to sql failed: connection refused"
    )]
    #[case::fatal_configuration(
        PipelineError::FatalConfiguration { message: "queue name is empty".to_string() },
        "Configuration error: queue name is empty"
    )]
    #[case::retries_exhausted(
        PipelineError::RetriesExhausted {
            unit: "pagos.csv".to_string(),
            attempts: 4,
            source: Box::new(PipelineError::transient_dispatch("sql", "timeout")),
        },
        "pagos.csv failed after 4 attempts: Dispatch to sql failed: timeout"
    )]
    fn test_error_display(#[case] error: PipelineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_at_line_only_touches_malformed_records() {
        let malformed = PipelineError::malformed_record("a,b", "too few fields").at_line(7);
        assert!(matches!(
            malformed,
            PipelineError::MalformedRecord { line: Some(7), .. }
        ));

        let dispatch = PipelineError::transient_dispatch("queue", "down").at_line(7);
        assert_eq!(dispatch, PipelineError::transient_dispatch("queue", "down"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: PipelineError = io_error.into();
        assert!(matches!(error, PipelineError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: PipelineError = json_error.into();
        assert!(matches!(error, PipelineError::InvalidMessage { .. }));
    }
}
