//! Read-side views over the bookkeeping store, enriched with library and
//! provider names.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::backends::{LibraryBackend, LibraryError};
use crate::cache::LookupCaches;
use crate::db_manager::BookkeepingStore;
use crate::error::SyncError;
use crate::metadata_lookup::MetadataLookup;
use crate::model::AssociationRow;

const TRACK_URI_PREFIX: &str = "spotify:track:";
const ARTIST_URI_PREFIX: &str = "spotify:artist:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistListing {
    pub playlist_id: String,
    pub playlist_name: String,
    pub songs: Vec<AssociationRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistSong {
    pub row: AssociationRow,
    pub playlist_name: String,
    pub desired_album: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistOverview {
    pub uuid: String,
    pub name: String,
    pub provider_uri: String,
    pub genres: Vec<String>,
    pub image_url: Option<String>,
    pub songs: Vec<ArtistSong>,
}

pub struct PlaylistCatalog {
    library: Arc<dyn LibraryBackend>,
    store: Arc<dyn BookkeepingStore>,
    caches: Arc<LookupCaches>,
    lookup: Arc<MetadataLookup>,
}

impl PlaylistCatalog {
    pub fn new(
        library: Arc<dyn LibraryBackend>,
        store: Arc<dyn BookkeepingStore>,
        caches: Arc<LookupCaches>,
        lookup: Arc<MetadataLookup>,
    ) -> Self {
        Self {
            library,
            store,
            caches,
            lookup,
        }
    }

    pub fn count_playlists(&self, missing_only: bool) -> Result<usize, SyncError> {
        self.store.count_playlists(missing_only)
    }

    /// One page of bookkept playlists with their library names.
    ///
    /// Playlists the library no longer knows are purged and the page is
    /// queried again, so a page never contains a vanished playlist.
    pub fn select_all_playlists(
        &self,
        missing_only: bool,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<PlaylistListing>, SyncError> {
        'requery: loop {
            let playlists = self.store.list_playlists(missing_only, page, limit)?;
            let mut listings = Vec::with_capacity(playlists.len());
            for playlist in playlists {
                let Some(playlist_name) = self.playlist_name(&playlist.playlist_id)? else {
                    continue 'requery;
                };
                listings.push(PlaylistListing {
                    playlist_id: playlist.playlist_id,
                    playlist_name,
                    songs: playlist.rows,
                });
            }
            return Ok(listings);
        }
    }

    /// Stored artist with every association row and provider details.
    pub fn load_artist(&self, artist_uuid: &str) -> Result<ArtistOverview, SyncError> {
        let Some((artist, rows)) = self.store.artist_overview(artist_uuid)? else {
            return Err(SyncError::EntryNotFound(format!("artist {artist_uuid}")));
        };

        let (genres, image_url) = match artist.provider_uri.strip_prefix(ARTIST_URI_PREFIX) {
            Some(artist_id) => {
                let metadata = self.lookup.artist(artist_id)?;
                (metadata.genres, metadata.image_url)
            }
            None => {
                debug!("Artist {} has no provider id", artist.name);
                (Vec::new(), None)
            }
        };

        let mut vanished: HashSet<String> = HashSet::new();
        let mut songs = Vec::with_capacity(rows.len());
        for row in rows {
            if vanished.contains(&row.library_playlist_id) {
                continue;
            }
            let Some(playlist_name) = self.playlist_name(&row.library_playlist_id)? else {
                vanished.insert(row.library_playlist_id.clone());
                continue;
            };
            let desired_album = match row.desired_track_uri.strip_prefix(TRACK_URI_PREFIX) {
                Some(track_id) => self
                    .lookup
                    .track(track_id)?
                    .album_name()
                    .map(str::to_string),
                None => None,
            };
            songs.push(ArtistSong {
                row,
                playlist_name,
                desired_album,
            });
        }

        Ok(ArtistOverview {
            uuid: artist.uuid,
            name: artist.name,
            provider_uri: artist.provider_uri,
            genres,
            image_url,
            songs,
        })
    }

    /// Library name of a bookkept playlist; `None` once it has been purged.
    fn playlist_name(&self, playlist_id: &str) -> Result<Option<String>, SyncError> {
        let fetched = self.caches.playlist_names.get_or_fetch(playlist_id, || {
            self.library
                .playlist(playlist_id)
                .map(|contents| contents.name)
        });
        match fetched {
            Ok(name) => Ok(Some(name)),
            Err(LibraryError::NotFound(_)) => {
                warn!("Playlist id \"{playlist_id}\" not found, deleting its bookkeeping");
                self.store.delete_playlist_bookkeeping(playlist_id)?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
