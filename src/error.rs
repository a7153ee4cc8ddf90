//! Error types for consensus validation
//!
//! Verification failures (bad signature, script evaluates false, negative fee)
//! are not errors: they are reported as `Ok(false)`. The variants below cover
//! malformed input, violated arithmetic preconditions and unsupported script
//! operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Truncated {field}: needed {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Arithmetic precondition violated: {0}")]
    ArithmeticPrecondition(String),

    #[error("Point ({x}, {y}) is not on the curve")]
    NotOnCurve { x: String, y: String },

    #[error("Unsupported script operation: {0}")]
    UnsupportedOperation(String),

    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("UTXO not found: {0}")]
    UtxoNotFound(String),

    #[error("Transaction fetch failed: {0}")]
    TransactionFetch(String),

    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ConsensusError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        ConsensusError::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
