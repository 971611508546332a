//! This module contains the engine's error types.

use crate::adapters::Capability;
use crate::operation::OperationKind;
use thiserror::Error;

/// The `Result` alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Boxed cause for error kinds that wrap an underlying driver or I/O fault.
pub type ErrorSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Enumerates the engine's error kinds. Note: the
/// [thiserror](https://github.com/dtolnay/thiserror) library is used to derive the error details.
///
/// Whether an error aborts a run depends on its kind: connection, setup, and capability errors
/// are fatal to the current (adapter, workload) execution; configuration errors are fatal before
/// any I/O; operation errors are recovered locally by the orchestrator, which counts the
/// iteration as a failure and keeps going.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The adapter failed to establish or validate a connection.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// A single operation faulted unrecoverably. Transient per-operation failures are reported
    /// in-band via a failed [OperationResult](crate::operation::OperationResult) instead.
    #[error("operation '{operation_id}' ({kind}) failed: {message}")]
    Operation {
        operation_id: String,
        kind: OperationKind,
        message: String,
    },

    /// Preparing the test environment or inserting the initial documents failed.
    #[error("setup failed: {message}")]
    Setup {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// User-supplied input was invalid.
    #[error("invalid configuration: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// A workload requires a capability that the selected adapter does not advertise.
    #[error("adapter '{adapter}' does not advertise {missing:?}, required by workload '{workload}'")]
    Capability {
        adapter: String,
        workload: String,
        missing: Vec<Capability>,
    },
}

impl BenchError {
    /// Constructs a [BenchError::Connection] with no underlying cause.
    pub fn connection(message: impl Into<String>) -> BenchError {
        BenchError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Constructs a [BenchError::Connection] wrapping an underlying cause.
    pub fn connection_caused_by(message: impl Into<String>, source: impl Into<ErrorSource>) -> BenchError {
        BenchError::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Constructs a [BenchError::Operation] for the specified operation.
    pub fn operation(
        operation_id: impl Into<String>,
        kind: OperationKind,
        message: impl Into<String>,
    ) -> BenchError {
        BenchError::Operation {
            operation_id: operation_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Constructs a [BenchError::Setup] with no underlying cause.
    pub fn setup(message: impl Into<String>) -> BenchError {
        BenchError::Setup {
            message: message.into(),
            source: None,
        }
    }

    /// Constructs a [BenchError::Setup] wrapping an underlying cause.
    pub fn setup_caused_by(message: impl Into<String>, source: impl Into<ErrorSource>) -> BenchError {
        BenchError::Setup {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Constructs a [BenchError::Configuration] with no underlying cause.
    pub fn configuration(message: impl Into<String>) -> BenchError {
        BenchError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Constructs a [BenchError::Configuration] wrapping an underlying cause.
    pub fn configuration_caused_by(
        message: impl Into<String>,
        source: impl Into<ErrorSource>,
    ) -> BenchError {
        BenchError::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns `true` if this error is fatal to the whole run (as opposed to just the current
    /// (adapter, workload) execution).
    pub fn is_configuration(&self) -> bool {
        matches!(self, BenchError::Configuration { .. })
    }
}
