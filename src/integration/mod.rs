//! Optional collaborators consulted when a desired track is missing from the library.

pub mod credentials;
pub mod lidarr;
pub mod spotdl;

use log::{info, warn};

use crate::model::{DesiredArtist, DesiredTrack};

/// Fetches a missing track into the library's music directory.
pub trait TrackDownloader: Send + Sync {
    fn download(&self, external_url: &str) -> Result<(), String>;
}

/// Tells whether an artist is tracked by an external artist-monitoring service.
pub trait ArtistMonitor: Send + Sync {
    fn is_artist_monitored(&self, artist_name: &str) -> bool;
}

/// Download-on-miss capability, chosen once at startup.
pub enum DownloadCapability {
    Enabled(Box<dyn TrackDownloader>),
    Disabled,
}

/// Artist-monitoring gate for downloads, chosen once at startup.
pub enum MonitorCapability {
    Enabled(Box<dyn ArtistMonitor>),
    Disabled,
}

impl MonitorCapability {
    /// Without a monitor every artist is allowed.
    pub fn allows(&self, artist_name: &str) -> bool {
        match self {
            Self::Enabled(monitor) => monitor.is_artist_monitored(artist_name),
            Self::Disabled => true,
        }
    }
}

/// What happened to a missed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissHandling {
    Downloaded,
    NotMonitored,
    NoExternalUrl,
    DownloadFailed,
    Disabled,
}

/// Routes missed tracks to the downloader, gated by the monitor.
pub struct MissHandler {
    download: DownloadCapability,
    monitor: MonitorCapability,
}

impl MissHandler {
    pub fn new(download: DownloadCapability, monitor: MonitorCapability) -> Self {
        Self { download, monitor }
    }

    pub fn disabled() -> Self {
        Self::new(DownloadCapability::Disabled, MonitorCapability::Disabled)
    }

    /// Never fails: problems are logged and reported through the return value.
    pub fn handle_miss(&self, track: &DesiredTrack, artist: &DesiredArtist) -> MissHandling {
        let DownloadCapability::Enabled(downloader) = &self.download else {
            return MissHandling::Disabled;
        };
        let Some(external_url) = track
            .external_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            return MissHandling::NoExternalUrl;
        };
        if !self.monitor.allows(&artist.name) {
            warn!(
                "Track {} - {} not found in the library and its artist is not monitored, skipping download",
                artist.name, track.name
            );
            return MissHandling::NotMonitored;
        }
        warn!(
            "Track {} - {} not found in the library, downloading it",
            artist.name, track.name
        );
        match downloader.download(external_url) {
            Ok(()) => {
                info!("Downloaded {external_url}; it will appear after the next library scan");
                MissHandling::Downloaded
            }
            Err(err) => {
                warn!("Download of {external_url} failed: {err}");
                MissHandling::DownloadFailed
            }
        }
    }
}
