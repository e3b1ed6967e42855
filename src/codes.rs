//! Recording-code (ISRC) resolution for library entries.
//!
//! Codes the library embeds in a song are used as-is. Otherwise the MusicBrainz
//! resolver looks the recording up, by MusicBrainz id when the entry carries
//! one and by an artist/title/album search otherwise. Resolution is
//! best-effort: every failure yields an empty list.

use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::cache::LookupCache;
use crate::model::LibraryEntry;
use crate::text_match::normalize_code;
use crate::throttle::Throttle;

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const MIN_MATCH_SCORE: i64 = 90;
const SEARCH_LIMIT: usize = 5;

/// Looks up the recording codes of a library entry.
pub trait CodeResolver: Send + Sync {
    fn resolve_codes(&self, entry: &LibraryEntry) -> Vec<String>;
}

/// Uses only the codes the library reported inline.
pub struct NoCodeResolver;

impl CodeResolver for NoCodeResolver {
    fn resolve_codes(&self, entry: &LibraryEntry) -> Vec<String> {
        entry.embedded_codes.clone()
    }
}

pub struct MusicBrainzSettings {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub rate_limit: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

pub struct MusicBrainzCodeResolver {
    http_client: ureq::Agent,
    base_url: String,
    throttle: Throttle,
    codes: LookupCache<Vec<String>>,
}

impl MusicBrainzCodeResolver {
    pub fn new(settings: MusicBrainzSettings) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .user_agent(&settings.user_agent)
            .build();
        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim()
            .trim_end_matches('/')
            .to_string();
        Self {
            http_client,
            base_url,
            throttle: Throttle::new(settings.rate_limit),
            codes: LookupCache::new(settings.cache_capacity, settings.cache_ttl),
        }
    }

    fn cache_key(entry: &LibraryEntry) -> String {
        match entry.musicbrainz_id.as_deref() {
            Some(mbid) => format!("mbid:{mbid}"),
            None => format!("text:{}", entry.placeholder().to_lowercase()),
        }
    }

    fn get_json(&self, url: &str) -> Result<Value, String> {
        self.throttle.wait();
        debug!("MusicBrainz GET {url}");
        let response = self
            .http_client
            .get(url)
            .call()
            .map_err(|err| format!("musicbrainz request failed: {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("musicbrainz response parse failed: {err}"))
    }

    fn lookup(&self, entry: &LibraryEntry) -> Result<Vec<String>, String> {
        if let Some(mbid) = entry.musicbrainz_id.as_deref() {
            let url = format!(
                "{}/recording/{}?inc=isrcs&fmt=json",
                self.base_url,
                urlencoding::encode(mbid)
            );
            let payload = self.get_json(&url)?;
            return Ok(recording_codes(&payload));
        }

        let query = build_query(&entry.title, &entry.artist, Some(&entry.album));
        let url = format!(
            "{}/recording?query={}&limit={SEARCH_LIMIT}&fmt=json",
            self.base_url,
            urlencoding::encode(&query)
        );
        let payload = self.get_json(&url)?;
        Ok(search_codes(&payload))
    }
}

impl CodeResolver for MusicBrainzCodeResolver {
    fn resolve_codes(&self, entry: &LibraryEntry) -> Vec<String> {
        if !entry.embedded_codes.is_empty() {
            return entry.embedded_codes.clone();
        }
        let key = Self::cache_key(entry);
        match self.codes.get_or_fetch(&key, || self.lookup(entry)) {
            Ok(codes) => codes,
            Err(err) => {
                warn!(
                    "Code lookup failed for {} - {}: {err}",
                    entry.artist, entry.title
                );
                Vec::new()
            }
        }
    }
}

fn escape_query(raw: &str) -> String {
    raw.replace('"', "\\\"")
}

fn build_query(title: &str, artist: &str, album: Option<&str>) -> String {
    let mut parts = vec![
        format!("artist:\"{}\"", escape_query(artist)),
        format!("recording:\"{}\"", escape_query(title)),
    ];
    if let Some(album) = album.filter(|album| !album.trim().is_empty()) {
        parts.push(format!("release:\"{}\"", escape_query(album)));
    }
    parts.join(" AND ")
}

fn push_codes(recording: &Value, codes: &mut Vec<String>) {
    let Some(isrcs) = recording.get("isrcs").and_then(Value::as_array) else {
        return;
    };
    for code in isrcs.iter().filter_map(Value::as_str).map(normalize_code) {
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
}

fn recording_codes(recording: &Value) -> Vec<String> {
    let mut codes = Vec::new();
    push_codes(recording, &mut codes);
    codes
}

/// Codes of every confidently matching recording in a search response.
fn search_codes(payload: &Value) -> Vec<String> {
    let mut codes = Vec::new();
    let recordings = payload
        .get("recordings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for recording in recordings {
        let score = recording.get("score").and_then(Value::as_i64).unwrap_or(0);
        if score >= MIN_MATCH_SCORE {
            push_codes(recording, &mut codes);
        }
    }
    codes
}
