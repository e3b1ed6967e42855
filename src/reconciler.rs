//! Converges one library playlist towards one desired track list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{error, info, warn};

use crate::backends::{LibraryBackend, LibraryError};
use crate::db_manager::BookkeepingStore;
use crate::error::SyncError;
use crate::matcher::CandidateMatcher;
use crate::metadata_lookup::MetadataLookup;
use crate::model::{DesiredTrack, MatchDecision, MatchOutcome, PlaylistTarget};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `None` when the playlist was deleted because nothing matched.
    pub playlist_id: Option<String>,
    pub playlist_name: String,
    pub committed: Vec<String>,
    pub counts: HashMap<MatchOutcome, usize>,
    /// Desired tracks dropped before matching (malformed or metadata unavailable).
    pub skipped_tracks: usize,
}

impl ReconcileReport {
    pub fn count(&self, outcome: MatchOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }
}

pub struct PlaylistReconciler {
    library: Arc<dyn LibraryBackend>,
    store: Arc<dyn BookkeepingStore>,
    lookup: Arc<MetadataLookup>,
    matcher: CandidateMatcher,
    prefix: String,
}

impl PlaylistReconciler {
    pub fn new(
        library: Arc<dyn LibraryBackend>,
        store: Arc<dyn BookkeepingStore>,
        lookup: Arc<MetadataLookup>,
        matcher: CandidateMatcher,
        prefix: &str,
    ) -> Self {
        Self {
            library,
            store,
            lookup,
            matcher,
            prefix: prefix.replace('"', ""),
        }
    }

    /// Library-side name: configured prefix + provider name.
    pub fn library_playlist_name(&self, playlist_name: &str) -> String {
        format!("{}{}", self.prefix, playlist_name)
    }

    /// Reconciles `desired_tracks` into the playlist named after `playlist_name`.
    ///
    /// A [`SyncError::LibraryUnavailable`] aborts the pass; whatever was pushed
    /// incrementally before the failure stays in the library.
    pub fn reconcile(
        &mut self,
        desired_tracks: Vec<DesiredTrack>,
        playlist_name: &str,
    ) -> Result<ReconcileReport, SyncError> {
        let name = self.library_playlist_name(playlist_name);
        match self.reconcile_named(desired_tracks, &name) {
            Err(SyncError::LibraryUnavailable(message)) => {
                error!(
                    "Reconciliation of playlist {name} aborted, is the library offline? {message}"
                );
                Err(SyncError::LibraryUnavailable(message))
            }
            other => other,
        }
    }

    fn reconcile_named(
        &mut self,
        desired_tracks: Vec<DesiredTrack>,
        name: &str,
    ) -> Result<ReconcileReport, SyncError> {
        if !self.library.ping() {
            return Err(SyncError::LibraryUnavailable(format!(
                "library did not answer before reconciling {name}"
            )));
        }
        let (playlist, existing_entry_ids) = self.locate_playlist(name)?;

        let mut report = ReconcileReport {
            playlist_name: name.to_string(),
            ..ReconcileReport::default()
        };
        let mut decision = MatchDecision::new();
        for desired in desired_tracks {
            let track = match self.lookup.complete(desired) {
                Ok(track) => track,
                Err(SyncError::MalformedTrack(message)) => {
                    warn!("Skipping malformed track in {name}: {message}");
                    report.skipped_tracks += 1;
                    continue;
                }
                Err(SyncError::MetadataUnavailable(message)) => {
                    warn!("Skipping track in {name}, metadata unavailable: {message}");
                    report.skipped_tracks += 1;
                    continue;
                }
                Err(other) => return Err(other),
            };
            let outcome =
                self.reconcile_track(&mut decision, &track, &existing_entry_ids, &playlist)?;
            *report.counts.entry(outcome).or_insert(0) += 1;
        }

        report.committed = decision.entry_ids().to_vec();
        if report.committed.is_empty() {
            info!("No songs found for playlist {name}, deleting it");
            match self.library.delete_playlist(&playlist.id) {
                Ok(()) | Err(LibraryError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            self.store.delete_playlist_bookkeeping(&playlist.id)?;
        } else {
            self.library
                .replace_playlist_tracks(&playlist.id, &report.committed)?;
            info!(
                "Playlist {name} now holds {} songs",
                report.committed.len()
            );
            report.playlist_id = Some(playlist.id);
        }
        Ok(report)
    }

    /// Finds the playlist by trimmed name, creating it when missing or vanished.
    fn locate_playlist(
        &self,
        name: &str,
    ) -> Result<(PlaylistTarget, HashSet<String>), SyncError> {
        let existing = self
            .library
            .playlists()?
            .into_iter()
            .find(|playlist| playlist.name.trim() == name.trim());

        if let Some(found) = existing {
            match self.library.playlist(&found.id) {
                Ok(contents) => {
                    let entry_ids = contents
                        .entry_ids
                        .into_iter()
                        .filter(|id| !id.trim().is_empty())
                        .collect();
                    return Ok((
                        PlaylistTarget {
                            id: found.id,
                            name: name.to_string(),
                        },
                        entry_ids,
                    ));
                }
                Err(LibraryError::NotFound(_)) => {
                    warn!(
                        "Playlist id \"{}\" disappeared from the library, purging its bookkeeping",
                        found.id
                    );
                    self.store.delete_playlist_bookkeeping(&found.id)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let id = self.library.create_playlist(name, &[])?;
        info!("Created playlist {name} with id {id}");
        self.store.delete_playlist_bookkeeping(&id)?;
        Ok((
            PlaylistTarget {
                id,
                name: name.to_string(),
            },
            HashSet::new(),
        ))
    }

    /// Tries each named artist until one matches, then hands a miss to the downloader.
    fn reconcile_track(
        &mut self,
        decision: &mut MatchDecision,
        track: &DesiredTrack,
        existing_entry_ids: &HashSet<String>,
        playlist: &PlaylistTarget,
    ) -> Result<MatchOutcome, SyncError> {
        decision.begin_track();
        let mut last_artist = None;
        for artist in track.artists.iter().filter(|artist| !artist.name.trim().is_empty()) {
            last_artist = Some(artist);
            self.matcher
                .match_artist(decision, track, artist, existing_entry_ids, playlist)?;
            if decision.found {
                break;
            }
        }

        let Some(artist) = last_artist else {
            warn!("Track {} has no named artist, nothing to search", track.name);
            return Ok(MatchOutcome::Unmatched);
        };
        if !decision.found && !decision.excluded {
            self.matcher.handle_miss(track, artist);
        }
        Ok(decision.outcome)
    }
}
