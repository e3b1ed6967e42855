//! Runner configuration model, defaults and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::error::SyncError;

pub const CONFIG_PATH_ENV: &str = "SYNCSONIC_CONFIG";
/// Floor for every outbound rate limit.
pub const MIN_RATE_LIMIT_MS: u64 = 1_000;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub musicbrainz: MusicBrainzConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// OpenSubsonic server the playlists are written to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub username: String,
    /// Looked up in the OS keyring when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Minimum spacing between metadata fetches.
    #[serde(default = "default_rate_limit_ms")]
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MatchingConfig {
    /// Prepended to provider playlist names. Double quotes are ignored.
    #[serde(default = "default_playlist_prefix")]
    pub playlist_prefix: String,
    #[serde(default = "default_excluded_words")]
    pub excluded_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MusicBrainzConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

/// External downloader run for tracks the library lacks.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DownloadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_download_program")]
    pub program: String,
    #[serde(default)]
    pub output_dir: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Artist-monitoring service gating downloads.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
pub struct SyncConfig {
    /// Repeat the whole pass this often; a single pass when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    #[serde(default)]
    pub playlists: Vec<SourcePlaylistConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SourcePlaylistConfig {
    pub provider_id: String,
    /// Overrides the provider's playlist name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
pub struct DatabaseConfig {
    /// Defaults to the per-user data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            library: LibraryConfig::default(),
            provider: ProviderConfig::default(),
            matching: MatchingConfig::default(),
            cache: CacheConfig::default(),
            musicbrainz: MusicBrainzConfig::default(),
            download: DownloadConfig::default(),
            monitor: MonitorConfig::default(),
            sync: SyncConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_library_endpoint(),
            username: String::new(),
            password: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            min_interval_ms: default_rate_limit_ms(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            playlist_prefix: default_playlist_prefix(),
            excluded_words: default_excluded_words(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            user_agent: default_user_agent(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: default_download_program(),
            output_dir: String::new(),
            extra_args: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_library_endpoint() -> String {
    "http://127.0.0.1:4533".to_string()
}

fn default_rate_limit_ms() -> u64 {
    MIN_RATE_LIMIT_MS
}

fn default_playlist_prefix() -> String {
    "Syncsonic - ".to_string()
}

fn default_excluded_words() -> Vec<String> {
    ["acoustic", "instrumental", "karaoke", "live", "remix"]
        .iter()
        .map(|word| word.to_string())
        .collect()
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CACHE_CAPACITY
}

fn default_cache_ttl_secs() -> u64 {
    crate::cache::DEFAULT_CACHE_TTL.as_secs()
}

fn default_user_agent() -> String {
    format!("syncsonic/{}", env!("CARGO_PKG_VERSION"))
}

fn default_download_program() -> String {
    "spotdl".to_string()
}

fn trim_endpoint(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

/// Applies floors and trims free-form values.
pub fn sanitize_config(config: Config) -> Config {
    let excluded_words = config
        .matching
        .excluded_words
        .iter()
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect();

    Config {
        log_level: config.log_level.trim().to_lowercase(),
        library: LibraryConfig {
            endpoint: trim_endpoint(&config.library.endpoint),
            username: config.library.username.trim().to_string(),
            password: config.library.password,
        },
        provider: ProviderConfig {
            client_id: config.provider.client_id.trim().to_string(),
            client_secret: config.provider.client_secret.trim().to_string(),
            min_interval_ms: config.provider.min_interval_ms.max(MIN_RATE_LIMIT_MS),
        },
        matching: MatchingConfig {
            playlist_prefix: config.matching.playlist_prefix,
            excluded_words,
        },
        cache: CacheConfig {
            capacity: config.cache.capacity.max(1),
            ttl_secs: config.cache.ttl_secs.max(1),
        },
        musicbrainz: MusicBrainzConfig {
            enabled: config.musicbrainz.enabled,
            base_url: config
                .musicbrainz
                .base_url
                .as_deref()
                .map(trim_endpoint)
                .filter(|url| !url.is_empty()),
            user_agent: config.musicbrainz.user_agent.trim().to_string(),
            rate_limit_ms: config.musicbrainz.rate_limit_ms.max(MIN_RATE_LIMIT_MS),
        },
        download: DownloadConfig {
            program: config.download.program.trim().to_string(),
            output_dir: config.download.output_dir.trim().to_string(),
            ..config.download
        },
        monitor: MonitorConfig {
            base_url: trim_endpoint(&config.monitor.base_url),
            api_key: config.monitor.api_key.trim().to_string(),
            ..config.monitor
        },
        sync: SyncConfig {
            interval_minutes: config.sync.interval_minutes.filter(|minutes| *minutes > 0),
            playlists: config
                .sync
                .playlists
                .into_iter()
                .map(|playlist| SourcePlaylistConfig {
                    provider_id: playlist.provider_id.trim().to_string(),
                    name: playlist.name,
                })
                .filter(|playlist| !playlist.provider_id.is_empty())
                .collect(),
        },
        database: config.database,
    }
}

/// `$SYNCSONIC_CONFIG`, else `<config dir>/syncsonic/config.toml`.
pub fn config_file_path() -> Result<PathBuf, SyncError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("syncsonic").join("config.toml"))
        .ok_or_else(|| SyncError::Config("no per-user config directory available".to_string()))
}

/// Reads and sanitizes `config_file`, writing the defaults first when it is missing.
pub fn load_or_create_config(config_file: &Path) -> Result<Config, SyncError> {
    if !config_file.exists() {
        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                SyncError::Config(format!(
                    "failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        let default_text = toml::to_string(&Config::default())
            .map_err(|err| SyncError::Config(format!("failed to serialize defaults: {err}")))?;
        std::fs::write(config_file, default_text).map_err(|err| {
            SyncError::Config(format!(
                "failed to write {}: {err}",
                config_file.display()
            ))
        })?;
    }

    let config_content = std::fs::read_to_string(config_file).map_err(|err| {
        SyncError::Config(format!("failed to read {}: {err}", config_file.display()))
    })?;
    let config = toml::from_str::<Config>(&config_content).map_err(|err| {
        SyncError::Config(format!("failed to parse {}: {err}", config_file.display()))
    })?;
    Ok(sanitize_config(config))
}
