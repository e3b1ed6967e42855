//! Metadata provider abstractions: the source of desired playlists and tracks.

pub mod spotify;

use thiserror::Error;

use crate::model::{ArtistMetadata, DesiredPlaylist, DesiredTrack};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider has no record for {0}")]
    NotFound(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the external metadata provider.
pub trait MetadataProvider: Send + Sync {
    fn fetch_track(&self, track_id: &str) -> Result<DesiredTrack, ProviderError>;
    fn fetch_artist(&self, artist_id: &str) -> Result<ArtistMetadata, ProviderError>;
    fn fetch_playlist(&self, playlist_id: &str) -> Result<DesiredPlaylist, ProviderError>;
}
