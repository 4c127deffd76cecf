//! Engine result type

use super::error::EngineError;

/// Standard result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
