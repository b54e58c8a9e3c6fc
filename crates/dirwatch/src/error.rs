use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Watch setup failed for {path}: {message}")]
    Setup { path: PathBuf, message: String },
}

pub type WatchResult<T> = std::result::Result<T, WatchError>;
