use std::io;

use thiserror::Error;

pub type FsResult<T> = Result<T, FsError>;

/// Which of the two injected store collaborators an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSide {
    /// The plaintext-view store (source of truth for stat/attribute queries).
    Plain,
    /// The ciphertext-backing store (holds the IV+ciphertext chunks).
    Cipher,
}

impl std::fmt::Display for StoreSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSide::Plain => write!(f, "plaintext-view"),
            StoreSide::Cipher => write!(f, "ciphertext-backing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    /// A handle or path is absent from the internal tables.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad range, flags, options, or an oversized metadata record.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Propagated unchanged from a store collaborator, tagged with the side
    /// that failed. A fan-out directory operation that fails on the second
    /// store leaves the stores inconsistent; there is no rollback.
    #[error("{side} store error: {source}")]
    Store {
        side: StoreSide,
        #[source]
        source: io::Error,
    },

    /// The metadata chunk failed to decrypt or parse into the expected shape.
    #[error("corruption: {0}")]
    Corruption(String),
}

impl FsError {
    pub fn store(side: StoreSide, source: io::Error) -> Self {
        FsError::Store { side, source }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        FsError::NotFound(what.into())
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        FsError::Corruption(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_the_failing_side() {
        let err = FsError::store(
            StoreSide::Cipher,
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("ciphertext-backing"), "got: {msg}");
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error;
        let err = FsError::store(
            StoreSide::Plain,
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.source().is_some());
    }
}
