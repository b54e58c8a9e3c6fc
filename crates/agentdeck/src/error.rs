/// Unified error type for the agentdeck engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A delta, snapshot, or client record could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A directory watch could not be established.
    #[error("watch error: {0}")]
    Watch(String),

    /// The engine has been disposed; no further mutations are accepted.
    #[error("engine is disposed")]
    Disposed,
}

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl From<rusqlite::Error> for EngineError {
    fn from(error: rusqlite::Error) -> Self {
        EngineError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization(error.to_string())
    }
}
