use thiserror::Error;

pub type MergeResult<T> = Result<T, MergeError>;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by the merged view to its callers.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No backend supports {operation}")]
    Unsupported { operation: &'static str },

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Not a file: {0}")]
    NotFile(String),

    #[error("{operation} failed in all backends: {path}")]
    AllBackendsFailed { operation: &'static str, path: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0} bytes (max 4096)")]
    PathTooLong(usize),

    #[error("Filename too long: {0} bytes (max 255)")]
    FilenameTooLong(usize),
}

impl MergeError {
    /// True for contract violations: nothing can ever service the request
    /// as issued, so retrying is pointless.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            MergeError::Unsupported { .. } | MergeError::NotDirectory(_) | MergeError::NotFile(_)
        )
    }
}

/// Failure reported by a single backend. The merge layer treats every
/// variant as recoverable and moves on to the next backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("read-only backend")]
    ReadOnly,

    #[error("io error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => BackendError::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => BackendError::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied => BackendError::PermissionDenied(err.to_string()),
            ErrorKind::NotADirectory => BackendError::NotDirectory(err.to_string()),
            ErrorKind::IsADirectory => BackendError::IsDirectory(err.to_string()),
            ErrorKind::ReadOnlyFilesystem => BackendError::ReadOnly,
            _ => BackendError::Io(err.to_string()),
        }
    }
}
