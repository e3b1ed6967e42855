//! In-process fakes for the engine's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::backends::{BackendPlaylist, BackendPlaylistContents, LibraryBackend, LibraryError};
use crate::codes::CodeResolver;
use crate::integration::TrackDownloader;
use crate::model::{
    ArtistMetadata, DesiredAlbum, DesiredArtist, DesiredPlaylist, DesiredTrack, LibraryEntry,
};
use crate::provider::{MetadataProvider, ProviderError};
use crate::text_match::normalize_text;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn entry(id: &str, artist: &str, title: &str, album: &str) -> LibraryEntry {
    LibraryEntry {
        id: id.to_string(),
        artist: artist.to_string(),
        title: title.to_string(),
        album: album.to_string(),
        musicbrainz_id: None,
        embedded_codes: Vec::new(),
        raw: Value::Null,
    }
}

pub fn desired_track(id: &str, artist: &str, name: &str, album: Option<&str>) -> DesiredTrack {
    DesiredTrack {
        id: id.to_string(),
        name: name.to_string(),
        artists: vec![DesiredArtist {
            id: Some(format!("artist-{}", normalize_text(artist).replace(' ', "-"))),
            name: artist.to_string(),
            uri: None,
        }],
        album: album.map(|name| DesiredAlbum {
            id: None,
            name: Some(name.to_string()),
        }),
        ..DesiredTrack::default()
    }
}

#[derive(Default)]
struct FakeLibraryState {
    songs: Vec<LibraryEntry>,
    playlists: Vec<BackendPlaylistContents>,
    next_playlist_id: usize,
    offline: bool,
    offline_after_replacements: Option<usize>,
    replace_calls: usize,
    search_queries: Vec<String>,
}

/// Library whose search matches entries containing every query token.
#[derive(Default)]
pub struct FakeLibrary {
    state: Mutex<FakeLibraryState>,
}

impl FakeLibrary {
    pub fn add_song(&self, song: LibraryEntry) {
        lock(&self.state).songs.push(song);
    }

    pub fn add_playlist(&self, name: &str, entry_ids: &[&str]) -> String {
        let mut state = lock(&self.state);
        state.next_playlist_id += 1;
        let id = format!("pl-{}", state.next_playlist_id);
        state.playlists.push(BackendPlaylistContents {
            id: id.clone(),
            name: name.to_string(),
            entry_ids: entry_ids.iter().map(|id| id.to_string()).collect(),
        });
        id
    }

    /// Deletes a playlist behind the engine's back.
    pub fn remove_playlist(&self, playlist_id: &str) {
        lock(&self.state)
            .playlists
            .retain(|playlist| playlist.id != playlist_id);
    }

    pub fn remove_playlist_entry(&self, playlist_id: &str, entry_id: &str) {
        let mut state = lock(&self.state);
        if let Some(playlist) = state
            .playlists
            .iter_mut()
            .find(|playlist| playlist.id == playlist_id)
        {
            playlist.entry_ids.retain(|id| id != entry_id);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    /// Goes offline once `count` playlist replacements have succeeded.
    pub fn go_offline_after_replacements(&self, count: usize) {
        lock(&self.state).offline_after_replacements = Some(count);
    }

    pub fn playlist_entries(&self, playlist_id: &str) -> Option<Vec<String>> {
        lock(&self.state)
            .playlists
            .iter()
            .find(|playlist| playlist.id == playlist_id)
            .map(|playlist| playlist.entry_ids.clone())
    }

    pub fn playlist_id_by_name(&self, name: &str) -> Option<String> {
        lock(&self.state)
            .playlists
            .iter()
            .find(|playlist| playlist.name == name)
            .map(|playlist| playlist.id.clone())
    }

    pub fn playlist_count(&self) -> usize {
        lock(&self.state).playlists.len()
    }

    pub fn search_queries(&self) -> Vec<String> {
        lock(&self.state).search_queries.clone()
    }

    fn check_online(state: &FakeLibraryState) -> Result<(), LibraryError> {
        if state.offline {
            return Err(LibraryError::Unavailable("library offline".to_string()));
        }
        Ok(())
    }
}

impl LibraryBackend for FakeLibrary {
    fn ping(&self) -> bool {
        !lock(&self.state).offline
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<LibraryEntry>, LibraryError> {
        let mut state = lock(&self.state);
        Self::check_online(&state)?;
        state.search_queries.push(query.to_string());
        let query_text = normalize_text(query);
        let query_tokens: Vec<&str> = query_text.split_whitespace().collect();
        Ok(state
            .songs
            .iter()
            .filter(|song| {
                let haystack =
                    normalize_text(&format!("{} {} {}", song.artist, song.title, song.album));
                let song_tokens: Vec<&str> = haystack.split_whitespace().collect();
                query_tokens.iter().all(|token| song_tokens.contains(token))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn playlists(&self) -> Result<Vec<BackendPlaylist>, LibraryError> {
        let state = lock(&self.state);
        Self::check_online(&state)?;
        Ok(state
            .playlists
            .iter()
            .map(|playlist| BackendPlaylist {
                id: playlist.id.clone(),
                name: playlist.name.clone(),
            })
            .collect())
    }

    fn playlist(&self, playlist_id: &str) -> Result<BackendPlaylistContents, LibraryError> {
        let state = lock(&self.state);
        Self::check_online(&state)?;
        state
            .playlists
            .iter()
            .find(|playlist| playlist.id == playlist_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(format!("playlist {playlist_id}")))
    }

    fn create_playlist(&self, name: &str, entry_ids: &[String]) -> Result<String, LibraryError> {
        {
            let state = lock(&self.state);
            Self::check_online(&state)?;
        }
        let ids: Vec<&str> = entry_ids.iter().map(String::as_str).collect();
        Ok(self.add_playlist(name.trim(), &ids))
    }

    fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        entry_ids: &[String],
    ) -> Result<(), LibraryError> {
        let mut state = lock(&self.state);
        Self::check_online(&state)?;
        let Some(playlist) = state
            .playlists
            .iter_mut()
            .find(|playlist| playlist.id == playlist_id)
        else {
            return Err(LibraryError::NotFound(format!("playlist {playlist_id}")));
        };
        playlist.entry_ids = entry_ids.to_vec();
        state.replace_calls += 1;
        if state
            .offline_after_replacements
            .is_some_and(|count| state.replace_calls >= count)
        {
            state.offline = true;
        }
        Ok(())
    }

    fn delete_playlist(&self, playlist_id: &str) -> Result<(), LibraryError> {
        let mut state = lock(&self.state);
        Self::check_online(&state)?;
        let before = state.playlists.len();
        state.playlists.retain(|playlist| playlist.id != playlist_id);
        if state.playlists.len() == before {
            return Err(LibraryError::NotFound(format!("playlist {playlist_id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProvider {
    tracks: Mutex<HashMap<String, DesiredTrack>>,
    artists: Mutex<HashMap<String, ArtistMetadata>>,
    playlists: Mutex<HashMap<String, DesiredPlaylist>>,
    track_calls: AtomicUsize,
    artist_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn add_track(&self, track: DesiredTrack) {
        lock(&self.tracks).insert(track.id.clone(), track);
    }

    pub fn add_artist(&self, artist: ArtistMetadata) {
        lock(&self.artists).insert(artist.id.clone(), artist);
    }

    pub fn add_playlist(&self, playlist: DesiredPlaylist) {
        lock(&self.playlists).insert(playlist.id.clone(), playlist);
    }

    pub fn track_calls(&self) -> usize {
        self.track_calls.load(Ordering::SeqCst)
    }

    pub fn artist_calls(&self) -> usize {
        self.artist_calls.load(Ordering::SeqCst)
    }
}

impl MetadataProvider for FakeProvider {
    fn fetch_track(&self, track_id: &str) -> Result<DesiredTrack, ProviderError> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tracks)
            .get(track_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("track {track_id}")))
    }

    fn fetch_artist(&self, artist_id: &str) -> Result<ArtistMetadata, ProviderError> {
        self.artist_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.artists)
            .get(artist_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("artist {artist_id}")))
    }

    fn fetch_playlist(&self, playlist_id: &str) -> Result<DesiredPlaylist, ProviderError> {
        lock(&self.playlists)
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("playlist {playlist_id}")))
    }
}

/// Resolves codes from a fixed table, counting lookups.
#[derive(Default)]
pub struct FixedCodeResolver {
    codes: Mutex<HashMap<String, Vec<String>>>,
    calls: AtomicUsize,
}

impl FixedCodeResolver {
    pub fn with_codes(self, entry_id: &str, codes: &[&str]) -> Self {
        lock(&self.codes).insert(
            entry_id.to_string(),
            codes.iter().map(|code| code.to_string()).collect(),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeResolver for FixedCodeResolver {
    fn resolve_codes(&self, entry: &LibraryEntry) -> Vec<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.codes)
            .get(&entry.id)
            .cloned()
            .unwrap_or_else(|| entry.embedded_codes.clone())
    }
}

#[derive(Default)]
pub struct RecordingDownloader {
    urls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingDownloader {
    pub fn failing() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

impl TrackDownloader for RecordingDownloader {
    fn download(&self, external_url: &str) -> Result<(), String> {
        if self.fail {
            return Err("downloader exited with status 1".to_string());
        }
        lock(&self.urls).push(external_url.to_string());
        Ok(())
    }
}

impl TrackDownloader for Arc<RecordingDownloader> {
    fn download(&self, external_url: &str) -> Result<(), String> {
        self.as_ref().download(external_url)
    }
}
