//! Error types returned by the document store

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the store
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::store::Store`] operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required name was empty
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No file or directory matched after probing
    #[error("unable to find file or directory named {0}")]
    NotFound(String),

    /// Underlying filesystem failure
    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON encode or decode failure
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Coarse category of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    IoFailure,
    EncodingFailure,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Io { .. } => ErrorKind::IoFailure,
            StoreError::Encoding(_) => ErrorKind::EncodingFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
