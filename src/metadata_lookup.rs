//! Completes desired tracks with provider metadata, spaced by a minimum delay.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::cache::LookupCaches;
use crate::error::SyncError;
use crate::model::{ArtistMetadata, DesiredTrack};
use crate::provider::MetadataProvider;
use crate::throttle::Throttle;

pub const MIN_PROVIDER_INTERVAL: Duration = Duration::from_secs(1);

pub struct MetadataLookup {
    provider: Arc<dyn MetadataProvider>,
    caches: Arc<LookupCaches>,
    throttle: Throttle,
}

impl MetadataLookup {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        caches: Arc<LookupCaches>,
        min_interval: Duration,
    ) -> Self {
        Self {
            provider,
            caches,
            throttle: Throttle::new(min_interval),
        }
    }

    /// True when album or recording code is missing.
    pub fn needs_completion(track: &DesiredTrack) -> bool {
        track.album_name().is_none() || track.recording_code().is_none() || track.artists.is_empty()
    }

    /// Track metadata by provider id, through the track cache.
    pub fn track(&self, track_id: &str) -> Result<DesiredTrack, SyncError> {
        let track = self.caches.tracks.get_or_fetch(track_id, || {
            self.throttle.wait();
            debug!("Fetching provider track {track_id}");
            self.provider.fetch_track(track_id)
        })?;
        Ok(track)
    }

    /// Artist metadata by provider id, through the artist cache.
    pub fn artist(&self, artist_id: &str) -> Result<ArtistMetadata, SyncError> {
        let artist = self.caches.artists.get_or_fetch(artist_id, || {
            self.throttle.wait();
            debug!("Fetching provider artist {artist_id}");
            self.provider.fetch_artist(artist_id)
        })?;
        Ok(artist)
    }

    /// Fills missing fields of `track` from the provider.
    ///
    /// Fails with [`SyncError::MalformedTrack`] when the track has no id and
    /// with [`SyncError::MetadataUnavailable`] when the provider cannot answer.
    pub fn complete(&self, mut track: DesiredTrack) -> Result<DesiredTrack, SyncError> {
        if track.id.trim().is_empty() {
            return Err(SyncError::MalformedTrack(format!(
                "track '{}' has no provider id",
                track.name
            )));
        }
        if !Self::needs_completion(&track) {
            return Ok(track);
        }

        let fetched = self.track(&track.id)?;
        if track.name.trim().is_empty() {
            track.name = fetched.name;
        }
        if track.artists.is_empty() {
            track.artists = fetched.artists;
        }
        if track.album_name().is_none() {
            track.album = fetched.album.or(track.album);
        }
        if track.recording_code().is_none() {
            track.isrc = fetched.isrc;
        }
        if track.uri.is_none() {
            track.uri = fetched.uri;
        }
        if track.external_url.is_none() {
            track.external_url = fetched.external_url;
        }
        Ok(track)
    }
}
