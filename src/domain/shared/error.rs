//! Engine-wide error type
//!
//! Variants line up with the error taxonomy the core distinguishes:
//! transient infrastructure failure, admission rejection, PBX rejection,
//! protocol violations, and invariant violations. Admission rejection is
//! deliberately not an error variant — callers get it back as a plain
//! `DispatchOutcome`, since saturation is a normal result, not a failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("transient infrastructure failure: {0}")]
    Transient(String),

    #[error("pbx rejected the request: {0}")]
    PbxRejection(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
