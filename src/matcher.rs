//! Candidate matching for one desired track.
//!
//! Candidates are scanned in search order. A candidate already committed to
//! the playlist wins outright; otherwise a recording-code hit, an exclusion
//! word, or a full artist/title/album text match each end the scan. Candidates
//! that only disagree on the album are pooled, and when nothing else matched
//! one of them is picked at random.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::backends::LibraryBackend;
use crate::codes::CodeResolver;
use crate::db_manager::BookkeepingStore;
use crate::error::SyncError;
use crate::integration::{MissHandler, MissHandling};
use crate::library_search::LibrarySearch;
use crate::model::{
    DesiredArtist, DesiredTrack, LibraryEntry, MatchDecision, MatchOutcome, PlaylistTarget,
};
use crate::text_match::{compare_strings, find_excluded_word, normalize_code};

fn entropy_rng() -> StdRng {
    let mut seed = [0u8; 32];
    match getrandom::fill(&mut seed) {
        Ok(()) => StdRng::from_seed(seed),
        Err(err) => {
            warn!("OS randomness unavailable ({err}), seeding fallback shuffle from the clock");
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|duration| duration.as_nanos() as u64)
                .unwrap_or(0);
            StdRng::seed_from_u64(nanos)
        }
    }
}

pub struct CandidateMatcher {
    library: Arc<dyn LibraryBackend>,
    search: LibrarySearch,
    codes: Arc<dyn CodeResolver>,
    store: Arc<dyn BookkeepingStore>,
    misses: Arc<MissHandler>,
    excluded_words: Vec<String>,
    rng: StdRng,
}

impl CandidateMatcher {
    pub fn new(
        library: Arc<dyn LibraryBackend>,
        codes: Arc<dyn CodeResolver>,
        store: Arc<dyn BookkeepingStore>,
        misses: Arc<MissHandler>,
        excluded_words: Vec<String>,
    ) -> Self {
        Self {
            search: LibrarySearch::new(Arc::clone(&library)),
            library,
            codes,
            store,
            misses,
            excluded_words,
            rng: entropy_rng(),
        }
    }

    /// Replaces the fallback shuffle's seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Searches the library for `artist` + track name and evaluates the hits.
    pub fn match_artist(
        &mut self,
        decision: &mut MatchDecision,
        track: &DesiredTrack,
        artist: &DesiredArtist,
        existing_entry_ids: &HashSet<String>,
        playlist: &PlaylistTarget,
    ) -> Result<MatchOutcome, SyncError> {
        info!(
            "Searching {} - {} in the library",
            artist.name, track.name
        );
        let candidates = self
            .search
            .search(&format!("{} {}", artist.name, track.name))?;
        self.evaluate(
            decision,
            track,
            artist,
            &candidates,
            existing_entry_ids,
            playlist,
        )
    }

    /// Runs the matching algorithm over `candidates`, updating `decision`.
    pub fn evaluate(
        &mut self,
        decision: &mut MatchDecision,
        track: &DesiredTrack,
        artist: &DesiredArtist,
        candidates: &[LibraryEntry],
        existing_entry_ids: &HashSet<String>,
        playlist: &PlaylistTarget,
    ) -> Result<MatchOutcome, SyncError> {
        decision.begin_artist();
        let desired_code = track.recording_code();
        let desired_album = track.album_name().filter(|name| !name.trim().is_empty());
        let mut skipped: Vec<&LibraryEntry> = Vec::new();

        for candidate in candidates {
            if existing_entry_ids.contains(&candidate.id) && !decision.contains_entry(&candidate.id)
            {
                info!(
                    "Track with id \"{}\" already in playlist \"{}\"",
                    candidate.id, playlist.name
                );
                decision.accept(candidate, MatchOutcome::MatchedExisting, false);
                self.persist(playlist, Some(candidate), artist, track)?;
                return Ok(MatchOutcome::MatchedExisting);
            }
            if decision.contains_entry(&candidate.id)
                || !candidate.has_complete_tags()
                || track.name.trim().is_empty()
            {
                continue;
            }
            debug!(
                "Comparing \"{} - {} - {}\" with \"{} - {} - {}\"",
                candidate.artist,
                candidate.title,
                candidate.album,
                artist.name,
                track.name,
                desired_album.unwrap_or_default()
            );

            if let Some(code) = desired_code.as_deref() {
                let candidate_codes = self.codes.resolve_codes(candidate);
                if candidate_codes
                    .iter()
                    .any(|candidate_code| normalize_code(candidate_code) == code)
                {
                    info!(
                        "Adding \"{} - {} - {}\" to playlist \"{}\", matched by recording code {code}",
                        candidate.artist, candidate.title, candidate.album, playlist.name
                    );
                    return self.commit(
                        decision,
                        candidate,
                        MatchOutcome::MatchedByCode,
                        artist,
                        track,
                        playlist,
                    );
                }
            }

            let excluded_by = find_excluded_word(&candidate.title, &self.excluded_words)
                .or_else(|| find_excluded_word(&candidate.album, &self.excluded_words));
            if let Some(word) = excluded_by {
                info!(
                    "Skipping {} - {}: candidate \"{} - {}\" contains excluded word \"{word}\"",
                    artist.name, track.name, candidate.title, candidate.album
                );
                decision.mark_excluded();
                return Ok(MatchOutcome::Excluded);
            }

            if compare_strings(&artist.name, &candidate.artist)
                && compare_strings(&track.name, &candidate.title)
                && !decision.is_claimed(&candidate.placeholder())
            {
                let album_compatible =
                    desired_album.map_or(true, |album| compare_strings(album, &candidate.album));
                if album_compatible {
                    info!(
                        "Adding \"{} - {} - {}\" to playlist \"{}\", matched by text comparison",
                        candidate.artist, candidate.title, candidate.album, playlist.name
                    );
                    return self.commit(
                        decision,
                        candidate,
                        MatchOutcome::MatchedByText,
                        artist,
                        track,
                        playlist,
                    );
                }
                skipped.push(candidate);
            }
        }

        if !skipped.is_empty() {
            skipped.shuffle(&mut self.rng);
            if let Some(choice) = skipped
                .into_iter()
                .find(|candidate| !decision.is_claimed(&candidate.placeholder()))
            {
                warn!(
                    "No matching album found for {} - {}, using a random one",
                    artist.name, track.name
                );
                info!(
                    "Adding \"{} - {} - {}\" to playlist \"{}\", random match",
                    choice.artist, choice.title, choice.album, playlist.name
                );
                return self.commit(
                    decision,
                    choice,
                    MatchOutcome::MatchedRandomFallback,
                    artist,
                    track,
                    playlist,
                );
            }
        }

        warn!(
            "Track {} - {} not found in the library",
            artist.name, track.name
        );
        self.persist(playlist, None, artist, track)?;
        Ok(MatchOutcome::Unmatched)
    }

    /// Hands a track that no artist matched to the download capability.
    pub fn handle_miss(&self, track: &DesiredTrack, artist: &DesiredArtist) -> MissHandling {
        self.misses.handle_miss(track, artist)
    }

    fn ensure_reachable(&self) -> Result<(), SyncError> {
        if self.library.ping() {
            Ok(())
        } else {
            Err(SyncError::LibraryUnavailable(
                "library stopped answering mid-pass".to_string(),
            ))
        }
    }

    fn persist(
        &self,
        playlist: &PlaylistTarget,
        entry: Option<&LibraryEntry>,
        artist: &DesiredArtist,
        track: &DesiredTrack,
    ) -> Result<(), SyncError> {
        self.ensure_reachable()?;
        self.store
            .insert_association(&playlist.id, entry, artist, track)
    }

    /// Accepts `candidate`, records it and pushes the grown sequence to the library.
    fn commit(
        &self,
        decision: &mut MatchDecision,
        candidate: &LibraryEntry,
        outcome: MatchOutcome,
        artist: &DesiredArtist,
        track: &DesiredTrack,
        playlist: &PlaylistTarget,
    ) -> Result<MatchOutcome, SyncError> {
        if !decision.accept(candidate, outcome, true) {
            return Ok(decision.outcome);
        }
        self.persist(playlist, Some(candidate), artist, track)?;
        self.library
            .replace_playlist_tracks(&playlist.id, decision.entry_ids())?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::CandidateMatcher;
    use crate::codes::{CodeResolver, NoCodeResolver};
    use crate::db_manager::{BookkeepingStore, DbManager};
    use crate::error::SyncError;
    use crate::integration::MissHandler;
    use crate::model::{DesiredTrack, LibraryEntry, MatchDecision, MatchOutcome, PlaylistTarget};
    use crate::test_support::{desired_track, entry, FakeLibrary, FixedCodeResolver};

    struct Fixture {
        library: Arc<FakeLibrary>,
        store: Arc<DbManager>,
        playlist: PlaylistTarget,
    }

    impl Fixture {
        fn new() -> Self {
            let library = Arc::new(FakeLibrary::default());
            let id = library.add_playlist("Mix", &[]);
            Self {
                library,
                store: Arc::new(DbManager::new_in_memory().expect("in-memory store")),
                playlist: PlaylistTarget {
                    id,
                    name: "Mix".to_string(),
                },
            }
        }

        fn matcher(&self, codes: Arc<dyn CodeResolver>, seed: u64) -> CandidateMatcher {
            CandidateMatcher::new(
                self.library.clone(),
                codes,
                self.store.clone(),
                Arc::new(MissHandler::disabled()),
                vec!["live".to_string(), "karaoke".to_string()],
            )
            .with_seed(seed)
        }

        fn run(
            &self,
            matcher: &mut CandidateMatcher,
            decision: &mut MatchDecision,
            track: &DesiredTrack,
            candidates: &[LibraryEntry],
            existing: &HashSet<String>,
        ) -> MatchOutcome {
            decision.begin_track();
            matcher
                .evaluate(
                    decision,
                    track,
                    &track.artists[0],
                    candidates,
                    existing,
                    &self.playlist,
                )
                .expect("evaluation should succeed")
        }
    }

    #[test]
    fn test_equal_codes_match_even_when_text_differs() {
        let fixture = Fixture::new();
        let codes = Arc::new(FixedCodeResolver::default().with_codes("1", &["US1234567890"]));
        let mut matcher = fixture.matcher(codes, 1);
        let mut track = desired_track("t1", "Artist A", "Song X", None);
        track.isrc = Some("US1234567890".to_string());
        let candidates = vec![entry("1", "artist a", "song x (remastered)", "Album")];
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::MatchedByCode);
        assert_eq!(decision.entry_ids(), ["1".to_string()]);
        assert_eq!(
            fixture.library.playlist_entries(&fixture.playlist.id),
            Some(vec!["1".to_string()])
        );
    }

    #[test]
    fn test_code_match_wins_over_unrelated_text() {
        let fixture = Fixture::new();
        let codes = Arc::new(FixedCodeResolver::default().with_codes("7", &["gb-aye-04-00123"]));
        let mut matcher = fixture.matcher(codes, 1);
        let mut track = desired_track("t1", "Someone", "Different Name", Some("Other"));
        track.isrc = Some("GBAYE0400123".to_string());
        let candidates = vec![entry("7", "Unrelated", "Title", "Album")];
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::MatchedByCode);
    }

    #[test]
    fn test_codes_are_not_resolved_for_tracks_without_one() {
        let fixture = Fixture::new();
        let codes = Arc::new(FixedCodeResolver::default());
        let mut matcher = fixture.matcher(codes.clone(), 1);
        let track = desired_track("t1", "Björk", "Hyperballad", Some("Post"));
        let candidates = vec![entry("1", "bjork", "hyperballad", "Post")];
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::MatchedByText);
        assert_eq!(codes.calls(), 0);
    }

    #[test]
    fn test_existing_entry_short_circuits_without_pushing() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song", Some("Album"));
        let candidates = vec![
            entry("2", "Artist", "Song", "Album"),
            entry("5", "Artist", "Song", "Other Album"),
        ];
        let existing: HashSet<String> = ["5".to_string()].into_iter().collect();
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &existing);

        assert_eq!(outcome, MatchOutcome::MatchedByText);
        assert_eq!(decision.entry_ids(), ["2".to_string()]);

        let mut rerun = MatchDecision::new();
        let candidates = vec![
            entry("5", "Artist", "Song", "Other Album"),
            entry("2", "Artist", "Song", "Album"),
        ];
        let outcome = fixture.run(&mut matcher, &mut rerun, &track, &candidates, &existing);
        assert_eq!(outcome, MatchOutcome::MatchedExisting);
        assert_eq!(rerun.entry_ids(), ["5".to_string()]);
        assert!(!rerun.is_claimed("Artist Song Other Album"));
        assert_eq!(
            fixture.library.playlist_entries(&fixture.playlist.id),
            Some(vec!["2".to_string()])
        );
    }

    #[test]
    fn test_exclusion_stops_scan_and_skips_fallback() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song", Some("Studio Album"));
        let candidates = vec![
            entry("1", "Artist", "Song", "Another Album"),
            entry("2", "Artist", "Song (Live)", "Tour"),
            entry("3", "Artist", "Song", "Studio Album"),
        ];
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::Excluded);
        assert!(decision.excluded);
        assert!(decision.entry_ids().is_empty());
        assert_eq!(fixture.store.count_playlists(false).expect("count"), 0);
    }

    #[test]
    fn test_exclusion_applies_even_when_the_desired_title_carries_the_word() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song (Live)", Some("Tour"));
        let candidates = vec![entry("2", "Artist", "Song (Live)", "Tour")];
        let mut decision = MatchDecision::new();

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::Excluded);
        assert!(decision.entry_ids().is_empty());
        assert_eq!(
            fixture.library.playlist_entries(&fixture.playlist.id),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_text_match_requires_compatible_album() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song", None);
        let candidates = vec![entry("1", "Artist", "Song", "Whatever")];
        let mut decision = MatchDecision::new();

        assert_eq!(
            fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new()),
            MatchOutcome::MatchedByText
        );

        let other = desired_track("t2", "Artist", "Song", Some("Different"));
        let mut second_pass = MatchDecision::new();
        assert_eq!(
            fixture.run(&mut matcher, &mut second_pass, &other, &candidates, &HashSet::new()),
            MatchOutcome::MatchedRandomFallback
        );
    }

    #[test]
    fn test_incomplete_candidates_and_committed_ids_are_skipped() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song", Some("Album"));
        let mut decision = MatchDecision::new();
        decision.accept(&entry("1", "Artist", "Song", "Album"), MatchOutcome::MatchedByText, false);
        let candidates = vec![
            entry("1", "Artist", "Song", "Album"),
            entry("2", "Artist", "Song", ""),
        ];

        let outcome = fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());

        assert_eq!(outcome, MatchOutcome::Unmatched);
        assert_eq!(decision.entry_ids(), ["1".to_string()]);
        let listing = fixture.store.list_playlists(true, None, None).expect("listing");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].rows[0].library_entry_id, None);
    }

    #[test]
    fn test_claimed_placeholder_blocks_a_second_text_match() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let first = desired_track("t1", "Artist", "Song", Some("Album"));
        let second = desired_track("t2", "Artist", "Song", Some("Album"));
        let mut decision = MatchDecision::new();

        fixture.run(
            &mut matcher,
            &mut decision,
            &first,
            &[entry("1", "Artist", "Song", "Album")],
            &HashSet::new(),
        );
        let outcome = fixture.run(
            &mut matcher,
            &mut decision,
            &second,
            &[entry("9", "Artist", "Song", "Album")],
            &HashSet::new(),
        );

        assert_eq!(outcome, MatchOutcome::Unmatched);
        assert_eq!(decision.entry_ids(), ["1".to_string()]);
    }

    #[test]
    fn test_fallback_reaches_every_unclaimed_skipped_candidate() {
        let fixture = Fixture::new();
        let track = desired_track("t1", "Artist", "Song", Some("Original"));
        let candidates = vec![
            entry("a", "Artist", "Song", "Compilation One"),
            entry("b", "Artist", "Song", "Compilation Two"),
            entry("c", "Artist", "Song", "Compilation Three"),
            entry("d", "Artist", "Song", "Compilation Four"),
        ];
        let mut reached: HashSet<String> = HashSet::new();

        for seed in 0..64 {
            let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), seed);
            let mut decision = MatchDecision::new();
            decision.accept(
                &entry("claimed", "Artist", "Song", "Compilation Four"),
                MatchOutcome::MatchedByText,
                true,
            );
            let outcome =
                fixture.run(&mut matcher, &mut decision, &track, &candidates, &HashSet::new());
            assert_eq!(outcome, MatchOutcome::MatchedRandomFallback);
            if let Some(id) = decision.entry_id.clone() {
                reached.insert(id);
            }
        }

        let expected: HashSet<String> = ["a", "b", "c"].iter().map(|id| id.to_string()).collect();
        assert_eq!(reached, expected);
    }

    #[test]
    fn test_push_to_unreachable_library_aborts_with_library_unavailable() {
        let fixture = Fixture::new();
        let mut matcher = fixture.matcher(Arc::new(NoCodeResolver), 1);
        let track = desired_track("t1", "Artist", "Song", Some("Album"));
        let candidates = vec![entry("1", "Artist", "Song", "Album")];
        let mut decision = MatchDecision::new();
        decision.begin_track();
        fixture.library.set_offline(true);

        let result = matcher.evaluate(
            &mut decision,
            &track,
            &track.artists[0],
            &candidates,
            &HashSet::new(),
            &fixture.playlist,
        );

        assert!(matches!(result, Err(SyncError::LibraryUnavailable(_))));
    }
}
