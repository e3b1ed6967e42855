//! Error taxonomy shared by the reconciliation engine.

use thiserror::Error;

use crate::backends::LibraryError;
use crate::provider::ProviderError;

/// Errors surfaced by the reconciliation engine to its callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The music library could not be reached. Aborts the current playlist pass.
    #[error("music library is unreachable: {0}")]
    LibraryUnavailable(String),
    /// A playlist or entry is unknown to the library.
    #[error("library entry not found: {0}")]
    EntryNotFound(String),
    /// The library answered but refused the request.
    #[error("library rejected request: {0}")]
    LibraryRejected(String),
    /// Desired-track metadata could not be fetched. Aborts one track only.
    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),
    /// A desired track is missing its identity.
    #[error("malformed desired track: {0}")]
    MalformedTrack(String),
    #[error("bookkeeping store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<LibraryError> for SyncError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::Unavailable(message) => Self::LibraryUnavailable(message),
            LibraryError::NotFound(message) => Self::EntryNotFound(message),
            LibraryError::Rejected(message) => Self::LibraryRejected(message),
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(error: ProviderError) -> Self {
        Self::MetadataUnavailable(error.to_string())
    }
}
