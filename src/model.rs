//! Domain types threaded through search, matching and reconciliation.

use std::collections::HashSet;

use serde_json::Value;

/// One contributing artist of a desired track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredArtist {
    pub id: Option<String>,
    pub name: String,
    pub uri: Option<String>,
}

impl DesiredArtist {
    /// Stable key used by the bookkeeping store.
    pub fn storage_key(&self) -> String {
        if let Some(uri) = self.uri.as_deref().filter(|uri| !uri.trim().is_empty()) {
            return uri.trim().to_string();
        }
        if let Some(id) = self.id.as_deref().filter(|id| !id.trim().is_empty()) {
            return format!("spotify:artist:{}", id.trim());
        }
        format!("name:{}", self.name.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DesiredAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One track of a provider playlist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DesiredTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<DesiredArtist>,
    pub album: Option<DesiredAlbum>,
    pub isrc: Option<String>,
    pub uri: Option<String>,
    /// Resolvable external link, handed to the downloader on a miss.
    pub external_url: Option<String>,
}

impl DesiredTrack {
    /// Normalized recording code, if the track carries a non-empty one.
    pub fn recording_code(&self) -> Option<String> {
        self.isrc
            .as_deref()
            .map(crate::text_match::normalize_code)
            .filter(|code| !code.is_empty())
    }

    pub fn album_name(&self) -> Option<&str> {
        self.album.as_ref().and_then(|album| album.name.as_deref())
    }

    /// Provider URI, derived from the id when the provider omitted it.
    pub fn provider_uri(&self) -> String {
        self.uri
            .clone()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| format!("spotify:track:{}", self.id))
    }
}

/// A provider playlist: its display name and desired tracks in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredPlaylist {
    pub id: String,
    pub name: String,
    pub tracks: Vec<DesiredTrack>,
}

/// Artist details shown by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistMetadata {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub image_url: Option<String>,
}

/// One search hit from the media library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub musicbrainz_id: Option<String>,
    /// Recording codes the server reported inline with the song.
    pub embedded_codes: Vec<String>,
    pub raw: Value,
}

impl LibraryEntry {
    /// Dedup key for text-based claims: "artist title album".
    pub fn placeholder(&self) -> String {
        format!("{} {} {}", self.artist, self.title, self.album)
    }

    pub fn has_complete_tags(&self) -> bool {
        !self.artist.is_empty() && !self.title.is_empty() && !self.album.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOutcome {
    MatchedExisting,
    MatchedByCode,
    MatchedByText,
    MatchedRandomFallback,
    Excluded,
    Unmatched,
}

/// Per-pass accumulator threaded from the reconciler into the matcher.
///
/// The entry-id sequence and the claimed placeholders live for one playlist
/// pass. `found`, `excluded`, `outcome` and `entry_id` describe the track
/// currently being evaluated and are reset by [`MatchDecision::begin_track`].
#[derive(Debug, Clone)]
pub struct MatchDecision {
    pub outcome: MatchOutcome,
    pub entry_id: Option<String>,
    pub found: bool,
    pub excluded: bool,
    entry_ids: Vec<String>,
    entry_id_set: HashSet<String>,
    claimed_placeholders: HashSet<String>,
}

impl MatchDecision {
    pub fn new() -> Self {
        Self {
            outcome: MatchOutcome::Unmatched,
            entry_id: None,
            found: false,
            excluded: false,
            entry_ids: Vec::new(),
            entry_id_set: HashSet::new(),
            claimed_placeholders: HashSet::new(),
        }
    }

    pub fn begin_track(&mut self) {
        self.found = false;
        self.begin_artist();
    }

    /// Resets the per-artist state; `found` carries over within a track.
    pub fn begin_artist(&mut self) {
        self.excluded = false;
        if !self.found {
            self.outcome = MatchOutcome::Unmatched;
            self.entry_id = None;
        }
    }

    pub fn entry_ids(&self) -> &[String] {
        &self.entry_ids
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.entry_id_set.contains(entry_id)
    }

    pub fn is_claimed(&self, placeholder: &str) -> bool {
        self.claimed_placeholders.contains(placeholder)
    }

    /// Appends an accepted entry. Returns false when the id was already committed.
    pub fn accept(
        &mut self,
        entry: &LibraryEntry,
        outcome: MatchOutcome,
        claim_placeholder: bool,
    ) -> bool {
        if !self.entry_id_set.insert(entry.id.clone()) {
            return false;
        }
        self.entry_ids.push(entry.id.clone());
        if claim_placeholder {
            self.claimed_placeholders.insert(entry.placeholder());
        }
        self.found = true;
        self.outcome = outcome;
        self.entry_id = Some(entry.id.clone());
        true
    }

    pub fn mark_excluded(&mut self) {
        self.excluded = true;
        self.outcome = MatchOutcome::Excluded;
        self.entry_id = None;
    }
}

impl Default for MatchDecision {
    fn default() -> Self {
        Self::new()
    }
}

/// Library playlist the current pass writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTarget {
    pub id: String,
    pub name: String,
}

/// One persisted (playlist, desired track) association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRow {
    pub library_playlist_id: String,
    pub library_entry_id: Option<String>,
    pub library_artist: Option<String>,
    pub library_title: Option<String>,
    pub library_album: Option<String>,
    pub desired_track_uuid: String,
    pub desired_track_uri: String,
    pub desired_title: String,
    pub desired_artist_uuid: String,
    pub desired_artist_name: String,
}

/// Artist row as stored by the bookkeeping layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtist {
    pub uuid: String,
    pub provider_uri: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::{DesiredArtist, DesiredTrack, MatchDecision, MatchOutcome};
    use crate::test_support::entry;

    #[test]
    fn test_accept_never_appends_the_same_entry_twice() {
        let mut decision = MatchDecision::new();
        let first = entry("1", "Artist", "Song", "Album");

        assert!(decision.accept(&first, MatchOutcome::MatchedByText, true));
        assert!(!decision.accept(&first, MatchOutcome::MatchedByCode, true));
        assert_eq!(decision.entry_ids(), ["1".to_string()]);
        assert!(decision.is_claimed("Artist Song Album"));
    }

    #[test]
    fn test_begin_track_resets_flags_but_keeps_sequence() {
        let mut decision = MatchDecision::new();
        decision.accept(
            &entry("7", "Artist", "Song", "Album"),
            MatchOutcome::MatchedExisting,
            false,
        );
        decision.mark_excluded();

        decision.begin_track();

        assert!(!decision.found);
        assert!(!decision.excluded);
        assert_eq!(decision.outcome, MatchOutcome::Unmatched);
        assert_eq!(decision.entry_ids().len(), 1);
        assert!(!decision.is_claimed("Artist Song Album"));
    }

    #[test]
    fn test_recording_code_is_normalized_and_empty_codes_ignored() {
        let mut track = DesiredTrack {
            id: "t1".to_string(),
            isrc: Some(" us-123-4567890 ".to_string()),
            ..DesiredTrack::default()
        };
        assert_eq!(track.recording_code().as_deref(), Some("US1234567890"));
        track.isrc = Some("   ".to_string());
        assert_eq!(track.recording_code(), None);
    }

    #[test]
    fn test_artist_storage_key_prefers_uri_then_id_then_name() {
        let mut artist = DesiredArtist {
            id: Some("abc".to_string()),
            name: "Artist A".to_string(),
            uri: Some("spotify:artist:xyz".to_string()),
        };
        assert_eq!(artist.storage_key(), "spotify:artist:xyz");
        artist.uri = None;
        assert_eq!(artist.storage_key(), "spotify:artist:abc");
        artist.id = None;
        assert_eq!(artist.storage_key(), "name:artist a");
    }
}
