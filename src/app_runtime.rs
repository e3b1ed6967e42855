//! Builds every service once from configuration and runs sync passes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::backends::opensubsonic::OpenSubsonicAdapter;
use crate::backends::{BackendProfileAuth, LibraryBackend};
use crate::cache::LookupCaches;
use crate::catalog::PlaylistCatalog;
use crate::codes::{CodeResolver, MusicBrainzCodeResolver, MusicBrainzSettings, NoCodeResolver};
use crate::config::{Config, MatchingConfig, SyncConfig};
use crate::db_manager::{BookkeepingStore, DbManager};
use crate::drift::{DriftCorrector, DriftReport};
use crate::error::SyncError;
use crate::integration::credentials::resolve_library_password;
use crate::integration::lidarr::LidarrMonitor;
use crate::integration::spotdl::SpotdlDownloader;
use crate::integration::{DownloadCapability, MissHandler, MonitorCapability};
use crate::matcher::CandidateMatcher;
use crate::metadata_lookup::MetadataLookup;
use crate::model::MatchOutcome;
use crate::provider::spotify::{SpotifyCredentials, SpotifyProvider};
use crate::provider::MetadataProvider;
use crate::reconciler::{PlaylistReconciler, ReconcileReport};

/// Collaborators a runtime is assembled from.
pub struct RuntimeServices {
    pub library: Arc<dyn LibraryBackend>,
    pub provider: Arc<dyn MetadataProvider>,
    pub store: Arc<dyn BookkeepingStore>,
    pub codes: Arc<dyn CodeResolver>,
    pub misses: Arc<MissHandler>,
    pub caches: Arc<LookupCaches>,
    pub provider_interval: Duration,
}

/// Outcome of one pass over every configured playlist.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub reports: Vec<ReconcileReport>,
    /// Provider playlist id and the error that stopped it.
    pub failed: Vec<(String, String)>,
    pub drift: DriftReport,
}

pub struct SyncRuntime {
    library: Arc<dyn LibraryBackend>,
    provider: Arc<dyn MetadataProvider>,
    store: Arc<dyn BookkeepingStore>,
    codes: Arc<dyn CodeResolver>,
    misses: Arc<MissHandler>,
    caches: Arc<LookupCaches>,
    lookup: Arc<MetadataLookup>,
    matching: MatchingConfig,
    sync: SyncConfig,
}

impl SyncRuntime {
    /// Wires the concrete adapters described by `config`.
    pub fn build(config: &Config) -> Result<Self, SyncError> {
        let password = resolve_library_password(
            &config.library.username,
            config.library.password.as_deref(),
        )
        .map_err(SyncError::Config)?;
        let library: Arc<dyn LibraryBackend> =
            Arc::new(OpenSubsonicAdapter::new(BackendProfileAuth {
                endpoint: config.library.endpoint.clone(),
                username: config.library.username.clone(),
                password,
            }));

        if config.provider.client_id.is_empty() || config.provider.client_secret.is_empty() {
            return Err(SyncError::Config(
                "provider client_id and client_secret are required".to_string(),
            ));
        }
        let provider: Arc<dyn MetadataProvider> =
            Arc::new(SpotifyProvider::new(SpotifyCredentials {
                client_id: config.provider.client_id.clone(),
                client_secret: config.provider.client_secret.clone(),
            }));

        let db_path = match config.database.path.as_deref() {
            Some(path) => PathBuf::from(path),
            None => DbManager::default_path().ok_or_else(|| {
                SyncError::Config("no per-user data directory available".to_string())
            })?,
        };
        info!("Opening bookkeeping store at {}", db_path.display());
        let store: Arc<dyn BookkeepingStore> = Arc::new(DbManager::new(&db_path)?);

        let codes: Arc<dyn CodeResolver> = if config.musicbrainz.enabled {
            Arc::new(MusicBrainzCodeResolver::new(MusicBrainzSettings {
                base_url: config.musicbrainz.base_url.clone(),
                user_agent: config.musicbrainz.user_agent.clone(),
                rate_limit: Duration::from_millis(config.musicbrainz.rate_limit_ms),
                cache_capacity: config.cache.capacity,
                cache_ttl: config.cache.ttl(),
            }))
        } else {
            Arc::new(NoCodeResolver)
        };

        let download = if config.download.enabled {
            info!("Download on miss enabled using {}", config.download.program);
            DownloadCapability::Enabled(Box::new(SpotdlDownloader::new(
                config.download.program.clone(),
                PathBuf::from(&config.download.output_dir),
                config.download.extra_args.clone(),
            )))
        } else {
            DownloadCapability::Disabled
        };
        let monitor = if config.monitor.enabled {
            MonitorCapability::Enabled(Box::new(LidarrMonitor::new(
                &config.monitor.base_url,
                config.monitor.api_key.clone(),
            )))
        } else {
            MonitorCapability::Disabled
        };

        let services = RuntimeServices {
            library,
            provider,
            store,
            codes,
            misses: Arc::new(MissHandler::new(download, monitor)),
            caches: Arc::new(LookupCaches::new(config.cache.capacity, config.cache.ttl())),
            provider_interval: Duration::from_millis(config.provider.min_interval_ms),
        };
        Ok(Self::from_services(
            services,
            config.matching.clone(),
            config.sync.clone(),
        ))
    }

    pub fn from_services(
        services: RuntimeServices,
        matching: MatchingConfig,
        sync: SyncConfig,
    ) -> Self {
        let lookup = Arc::new(MetadataLookup::new(
            Arc::clone(&services.provider),
            Arc::clone(&services.caches),
            services.provider_interval,
        ));
        Self {
            library: services.library,
            provider: services.provider,
            store: services.store,
            codes: services.codes,
            misses: services.misses,
            caches: services.caches,
            lookup,
            matching,
            sync,
        }
    }

    pub fn catalog(&self) -> PlaylistCatalog {
        PlaylistCatalog::new(
            Arc::clone(&self.library),
            Arc::clone(&self.store),
            Arc::clone(&self.caches),
            Arc::clone(&self.lookup),
        )
    }

    fn reconciler(&self) -> PlaylistReconciler {
        let matcher = CandidateMatcher::new(
            Arc::clone(&self.library),
            Arc::clone(&self.codes),
            Arc::clone(&self.store),
            Arc::clone(&self.misses),
            self.matching.excluded_words.clone(),
        );
        PlaylistReconciler::new(
            Arc::clone(&self.library),
            Arc::clone(&self.store),
            Arc::clone(&self.lookup),
            matcher,
            &self.matching.playlist_prefix,
        )
    }

    /// Reconciles every configured playlist, then runs the drift pass.
    ///
    /// A failing playlist is logged and skipped; an unreachable library
    /// aborts the whole pass.
    pub fn run_once(&self) -> Result<SyncSummary, SyncError> {
        if !self.library.ping() {
            return Err(SyncError::LibraryUnavailable(
                "library did not answer before the sync pass".to_string(),
            ));
        }

        let mut summary = SyncSummary::default();
        for source in &self.sync.playlists {
            let desired = match self.provider.fetch_playlist(&source.provider_id) {
                Ok(desired) => desired,
                Err(err) => {
                    warn!("Could not fetch provider playlist {}: {err}", source.provider_id);
                    summary
                        .failed
                        .push((source.provider_id.clone(), err.to_string()));
                    continue;
                }
            };
            let name = source.name.clone().unwrap_or(desired.name);
            match self.reconciler().reconcile(desired.tracks, &name) {
                Ok(report) => {
                    info!(
                        "Playlist {} reconciled: {} tracks committed, {} unmatched",
                        report.playlist_name,
                        report.committed.len(),
                        report.count(MatchOutcome::Unmatched)
                    );
                    summary.reports.push(report);
                }
                Err(SyncError::LibraryUnavailable(message)) => {
                    return Err(SyncError::LibraryUnavailable(message));
                }
                Err(err) => {
                    error!("Reconciliation of playlist {name} failed: {err}");
                    summary
                        .failed
                        .push((source.provider_id.clone(), err.to_string()));
                }
            }
        }

        summary.drift = DriftCorrector::new(Arc::clone(&self.library), Arc::clone(&self.store))
            .run()?;
        Ok(summary)
    }

    /// Runs one pass, or one pass every `sync.interval_minutes` forever.
    pub fn run(&self) -> Result<(), SyncError> {
        let Some(minutes) = self.sync.interval_minutes else {
            self.run_once()?;
            return self.log_missing_tracks();
        };
        let interval = Duration::from_secs(minutes.saturating_mul(60));
        loop {
            match self.run_once() {
                Ok(_) => {
                    if let Err(err) = self.log_missing_tracks() {
                        warn!("Could not count playlists with missing tracks: {err}");
                    }
                }
                Err(err) => error!("Sync pass failed: {err}"),
            }
            info!("Next sync pass in {minutes} minutes");
            std::thread::sleep(interval);
        }
    }

    fn log_missing_tracks(&self) -> Result<(), SyncError> {
        let missing = self.catalog().count_playlists(true)?;
        if missing > 0 {
            info!("{missing} playlists still have tracks missing from the library");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{RuntimeServices, SyncRuntime};
    use crate::cache::LookupCaches;
    use crate::codes::NoCodeResolver;
    use crate::config::{MatchingConfig, SourcePlaylistConfig, SyncConfig};
    use crate::db_manager::{BookkeepingStore, DbManager};
    use crate::error::SyncError;
    use crate::integration::MissHandler;
    use crate::model::DesiredPlaylist;
    use crate::test_support::{desired_track, entry, FakeLibrary, FakeProvider};

    struct Harness {
        library: Arc<FakeLibrary>,
        provider: Arc<FakeProvider>,
        store: Arc<DbManager>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                library: Arc::new(FakeLibrary::default()),
                provider: Arc::new(FakeProvider::default()),
                store: Arc::new(DbManager::new_in_memory().expect("store")),
            }
        }

        fn runtime(&self, playlists: Vec<SourcePlaylistConfig>) -> SyncRuntime {
            let services = RuntimeServices {
                library: self.library.clone(),
                provider: self.provider.clone(),
                store: self.store.clone(),
                codes: Arc::new(NoCodeResolver),
                misses: Arc::new(MissHandler::disabled()),
                caches: Arc::new(LookupCaches::default()),
                provider_interval: Duration::from_millis(1),
            };
            let matching = MatchingConfig {
                playlist_prefix: "Sync - ".to_string(),
                excluded_words: vec!["live".to_string()],
            };
            SyncRuntime::from_services(
                services,
                matching,
                SyncConfig {
                    interval_minutes: None,
                    playlists,
                },
            )
        }
    }

    fn source(provider_id: &str, name: Option<&str>) -> SourcePlaylistConfig {
        SourcePlaylistConfig {
            provider_id: provider_id.to_string(),
            name: name.map(str::to_string),
        }
    }

    fn with_isrc(id: &str, artist: &str, title: &str, album: &str) -> crate::model::DesiredTrack {
        let mut track = desired_track(id, artist, title, Some(album));
        track.isrc = Some(format!("US{id:0>10}"));
        track
    }

    #[test]
    fn test_run_once_reconciles_sources_and_purges_drift() {
        let h = Harness::new();
        h.library.add_song(entry("1", "Artist A", "Song X", "Album"));
        h.provider.add_playlist(DesiredPlaylist {
            id: "src-1".to_string(),
            name: "Provider Name".to_string(),
            tracks: vec![with_isrc("t1", "Artist A", "Song X", "Album")],
        });
        let stale = desired_track("old", "Someone", "Gone", None);
        h.store
            .insert_association("pl-deleted", None, &stale.artists[0], &stale)
            .expect("seed stale bookkeeping");

        let summary = h
            .runtime(vec![source("src-1", Some("Override"))])
            .run_once()
            .expect("pass succeeds");

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].playlist_name, "Sync - Override");
        let Some(playlist_id) = h.library.playlist_id_by_name("Sync - Override") else {
            panic!("playlist should be created under the overridden name");
        };
        assert_eq!(
            h.library.playlist_entries(&playlist_id),
            Some(vec!["1".to_string()])
        );
        assert_eq!(summary.drift.purged, vec!["pl-deleted".to_string()]);
        assert_eq!(h.store.playlist_ids().expect("ids"), vec![playlist_id]);
    }

    #[test]
    fn test_unknown_source_playlist_is_reported_and_others_still_run() {
        let h = Harness::new();
        h.library.add_song(entry("1", "Artist A", "Song X", "Album"));
        h.provider.add_playlist(DesiredPlaylist {
            id: "src-ok".to_string(),
            name: "Good".to_string(),
            tracks: vec![with_isrc("t1", "Artist A", "Song X", "Album")],
        });

        let summary = h
            .runtime(vec![source("src-missing", None), source("src-ok", None)])
            .run_once()
            .expect("pass succeeds");

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "src-missing");
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].playlist_name, "Sync - Good");
    }

    #[test]
    fn test_unreachable_library_aborts_the_pass() {
        let h = Harness::new();
        h.library.set_offline(true);

        let result = h.runtime(vec![source("src-1", None)]).run_once();

        assert!(matches!(result, Err(SyncError::LibraryUnavailable(_))));
    }
}
