//! Lidarr artist-monitoring lookup.

use std::time::Duration;

use log::warn;
use serde_json::Value;

use crate::integration::ArtistMonitor;
use crate::text_match::compare_strings;

pub struct LidarrMonitor {
    http_client: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl LidarrMonitor {
    pub fn new(base_url: &str, api_key: String) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn fetch_artists(&self) -> Result<Value, String> {
        let response = self
            .http_client
            .get(&format!("{}/api/v1/artist", self.base_url))
            .set("X-Api-Key", &self.api_key)
            .call()
            .map_err(|err| format!("Lidarr request failed: {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("Lidarr response parse failed: {err}"))
    }
}

/// True when a monitored artist in the listing matches `artist_name`.
fn listing_monitors(listing: &Value, artist_name: &str) -> bool {
    listing
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|artist| {
            artist
                .get("monitored")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .filter_map(|artist| artist.get("artistName").and_then(Value::as_str))
        .any(|name| compare_strings(name, artist_name))
}

impl ArtistMonitor for LidarrMonitor {
    fn is_artist_monitored(&self, artist_name: &str) -> bool {
        match self.fetch_artists() {
            Ok(listing) => listing_monitors(&listing, artist_name),
            Err(err) => {
                warn!("Could not check monitoring for {artist_name}: {err}");
                false
            }
        }
    }
}
