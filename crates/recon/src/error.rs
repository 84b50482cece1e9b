use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which of the two datasets a message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSide {
    A,
    B,
}

impl fmt::Display for DatasetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "Dataset A"),
            Self::B => write!(f, "Dataset B"),
        }
    }
}

/// Input rejected before anything is sent to the service.
///
/// The workflow state is never touched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please select source type for {side}")]
    MissingSourceKind { side: DatasetSide },

    #[error("{name} threshold must be a finite number >= 0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Select at least one column mapping to proceed.")]
    NoApprovedMappings,

    #[error("mapping index {index} out of range ({len} suggested)")]
    MappingIndexOutOfRange { index: usize, len: usize },
}

/// Failure talking to the reconciliation service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Connect, TLS, or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response. Carries the raw response body text.
    #[error("Reconcile failed: {status} {body}")]
    Http { status: u16, body: String },

    /// Response body did not decode into the expected shape.
    #[error("cannot decode service response: {0}")]
    Parse(String),

    /// A 2xx response with a `status` the current phase cannot accept.
    #[error("unexpected status \"{actual}\" (expected \"{expected}\")")]
    UnexpectedStatus { expected: &'static str, actual: String },
}

impl TransportError {
    /// HTTP status code, when the service answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Another phase call is still unresolved.
    #[error("a reconciliation call is already in flight")]
    Busy,

    /// `approve` or a mapping edit without a pending approval to act on.
    #[error("no mapping approval is pending")]
    NothingPending,
}

/// A diff hint that could not be read as a number.
///
/// Never surfaced to the user: the hint is treated as absent and the
/// dimension it belongs to cannot cause a mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationAnomaly {
    pub column: String,
    pub hint: &'static str,
    pub raw: serde_json::Value,
}

impl fmt::Display for ClassificationAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column '{}': non-numeric {} hint {}", self.column, self.hint, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_carries_status_and_body() {
        let err = TransportError::Http { status: 502, body: "bad gateway".into() };
        assert_eq!(err.to_string(), "Reconcile failed: 502 bad gateway");
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(TransportError::Network("refused".into()).status_code(), None);
    }

    #[test]
    fn validation_messages_are_user_facing() {
        let err = ValidationError::MissingSourceKind { side: DatasetSide::B };
        assert_eq!(err.to_string(), "Please select source type for Dataset B");
        assert_eq!(
            ValidationError::NoApprovedMappings.to_string(),
            "Select at least one column mapping to proceed."
        );
    }

    #[test]
    fn workflow_error_is_transparent() {
        let err: WorkflowError = ValidationError::NoApprovedMappings.into();
        assert_eq!(err.to_string(), "Select at least one column mapping to proceed.");
    }
}
