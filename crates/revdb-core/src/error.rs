//! Error types for revdb core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Revision conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Storage engine error: {0}")]
    Engine(#[source] EngineError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors surfaced by a storage engine across the engine boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => Error::NotFound(msg),
            EngineError::Conflict(msg) => Error::Conflict(msg),
            other => Error::Engine(other),
        }
    }
}

/// Result type alias for revdb core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        assert!(matches!(
            Error::from(EngineError::NotFound("doc1".into())),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from(EngineError::Conflict("doc1".into())),
            Error::Conflict(_)
        ));
        assert!(matches!(
            Error::from(EngineError::Storage("disk".into())),
            Error::Engine(EngineError::Storage(_))
        ));
    }
}
