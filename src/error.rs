//! Error types for the SCPI core.
//!
//! `ScpiError` is the single error type surfaced by the catalog, the builder and the
//! session sequencer. Every variant that can be caused by a caller's input names the
//! operation and parameter responsible, so a consuming UI can point at the offending
//! control instead of reporting a generic failure.
//!
//! ## Error Hierarchy
//!
//! - **`UnknownOperation`**: the operation name is not registered in the catalog.
//! - **`Validation`**: a parameter was missing, out of range, not a member of its
//!   enumeration, or violated a cross constraint. Raised before any transmission.
//! - **`InvalidTimebase`** / **`UnknownFilterType`**: inputs to the filter frequency
//!   rule were unusable.
//! - **`TransportFailure`**: a `send` was rejected or the transport errored while a
//!   plan was executing.
//! - **`QueryFailed`**: a query returned nothing or text that could not be parsed.
//! - **`TransportBusy`**: another plan or query currently owns the transport.
//! - **`Config`** / **`Figment`** / **`Io`**: configuration loading problems.

use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type ScpiResult<T> = std::result::Result<T, ScpiError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ScpiError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("{operation}: invalid parameter '{parameter}': {reason}")]
    Validation {
        operation: String,
        parameter: String,
        reason: String,
    },

    #[error("Invalid timebase {0} s: must be greater than zero")]
    InvalidTimebase(f64),

    #[error("Unknown filter type '{0}'")]
    UnknownFilterType(String),

    #[error("{operation}: step {step} ('{command}') failed: {reason}")]
    TransportFailure {
        operation: String,
        step: usize,
        command: String,
        reason: String,
    },

    #[error("Query '{query}' failed: {reason}")]
    QueryFailed { query: String, reason: String },

    #[error("Transport is busy with another transition")]
    TransportBusy,

    #[error("Configuration validation error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScpiError {
    pub(crate) fn validation(
        operation: impl ToString,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ScpiError::Validation {
            operation: operation.to_string(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn query_failed(query: impl Into<String>, reason: impl Into<String>) -> Self {
        ScpiError::QueryFailed {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// The parameter responsible for this error, when there is one.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            ScpiError::Validation { parameter, .. } => Some(parameter),
            _ => None,
        }
    }

    /// Whether the error was raised before anything reached the instrument.
    pub fn is_pre_transmission(&self) -> bool {
        matches!(
            self,
            ScpiError::UnknownOperation(_)
                | ScpiError::Validation { .. }
                | ScpiError::InvalidTimebase(_)
                | ScpiError::UnknownFilterType(_)
        )
    }
}

impl From<figment::Error> for ScpiError {
    fn from(value: figment::Error) -> Self {
        ScpiError::Figment(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_operation_and_parameter() {
        let err = ScpiError::validation("SetDigitalFilter", "w2", "W1 must be less than W2");
        assert_eq!(err.parameter(), Some("w2"));
        assert_eq!(
            err.to_string(),
            "SetDigitalFilter: invalid parameter 'w2': W1 must be less than W2"
        );
        assert!(err.is_pre_transmission());
    }

    #[test]
    fn transport_failure_is_not_pre_transmission() {
        let err = ScpiError::TransportFailure {
            operation: "ApplyFFT".into(),
            step: 1,
            command: ":MATH:FFT:SOURce CHANnel1".into(),
            reason: "send rejected".into(),
        };
        assert!(!err.is_pre_transmission());
        assert!(err.parameter().is_none());
        assert!(err.to_string().contains("step 1"));
    }
}
