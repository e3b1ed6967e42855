//! Media library backend abstractions and concrete implementations.

pub mod opensubsonic;

use thiserror::Error;

use crate::model::LibraryEntry;

/// Failure reported by a library backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    /// Transport failure or unparseable response.
    #[error("{0}")]
    Unavailable(String),
    /// The requested playlist or entry does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The server answered with an error other than "not found".
    #[error("{0}")]
    Rejected(String),
}

/// Playlist header as listed by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPlaylist {
    pub id: String,
    pub name: String,
}

/// Playlist with its committed entry ids, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPlaylistContents {
    pub id: String,
    pub name: String,
    pub entry_ids: Vec<String>,
}

/// Connection settings for a library backend.
#[derive(Debug, Clone)]
pub struct BackendProfileAuth {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

/// Operations the reconciliation engine needs from a media library.
pub trait LibraryBackend: Send + Sync {
    /// Returns true when the library answers a ping.
    fn ping(&self) -> bool;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<LibraryEntry>, LibraryError>;
    fn playlists(&self) -> Result<Vec<BackendPlaylist>, LibraryError>;
    /// Fails with [`LibraryError::NotFound`] when the playlist is gone.
    fn playlist(&self, playlist_id: &str) -> Result<BackendPlaylistContents, LibraryError>;
    fn create_playlist(&self, name: &str, entry_ids: &[String]) -> Result<String, LibraryError>;
    /// Replaces the full song list of an existing playlist.
    fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        entry_ids: &[String],
    ) -> Result<(), LibraryError>;
    fn delete_playlist(&self, playlist_id: &str) -> Result<(), LibraryError>;
}
