//! Spotify Web API provider using the client-credentials flow.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde_json::Value;

use crate::model::{ArtistMetadata, DesiredAlbum, DesiredArtist, DesiredPlaylist, DesiredTrack};
use crate::provider::{MetadataProvider, ProviderError};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const PLAYLIST_PAGE_SIZE: usize = 100;
/// Refresh the token this long before the provider says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyProvider {
    http_client: ureq::Agent,
    credentials: SpotifyCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyProvider {
    pub fn new(credentials: SpotifyCredentials) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            credentials,
            token: Mutex::new(None),
        }
    }

    fn basic_auth_header(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        );
        format!("Basic {}", STANDARD.encode(raw))
    }

    fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http_client
            .post(TOKEN_URL)
            .set("Authorization", &self.basic_auth_header())
            .send_form(&[("grant_type", "client_credentials")])
            .map_err(|err| ProviderError::Unavailable(format!("token request failed: {err}")))?;
        let payload: Value = response
            .into_json()
            .map_err(|err| ProviderError::Unavailable(format!("token parse failed: {err}")))?;
        let value = payload
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Unavailable("token response missing".to_string()))?
            .to_string();
        let lifetime = payload
            .get("expires_in")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));
        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(value)
    }

    fn get_json(&self, url: &str, subject: &str) -> Result<Value, ProviderError> {
        let token = self.access_token()?;
        debug!("Spotify GET {url}");
        let response = self
            .http_client
            .get(url)
            .set("Authorization", &format!("Bearer {token}"))
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(404, _) => ProviderError::NotFound(subject.to_string()),
                other => ProviderError::Unavailable(format!("{subject}: {other}")),
            })?;
        response
            .into_json()
            .map_err(|err| ProviderError::Unavailable(format!("{subject}: {err}")))
    }

    fn optional_string(value: &Value, key: &str) -> Option<String> {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToOwned::to_owned)
    }

    fn parse_artist_ref(artist: &Value) -> Option<DesiredArtist> {
        let name = artist.get("name").and_then(Value::as_str)?.to_string();
        Some(DesiredArtist {
            id: Self::optional_string(artist, "id"),
            name,
            uri: Self::optional_string(artist, "uri"),
        })
    }

    fn parse_track(track: &Value) -> Option<DesiredTrack> {
        let id = Self::optional_string(track, "id")?;
        let artists = track
            .get("artists")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::parse_artist_ref).collect())
            .unwrap_or_default();
        let album = track
            .get("album")
            .filter(|album| album.is_object())
            .map(|album| DesiredAlbum {
                id: Self::optional_string(album, "id"),
                name: Self::optional_string(album, "name"),
            });
        let isrc = track
            .get("external_ids")
            .and_then(|ids| Self::optional_string(ids, "isrc"));
        let external_url = track
            .get("external_urls")
            .and_then(|urls| Self::optional_string(urls, "spotify"));
        Some(DesiredTrack {
            id,
            name: track
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            artists,
            album,
            isrc,
            uri: Self::optional_string(track, "uri"),
            external_url,
        })
    }

    fn parse_artist(artist: &Value) -> Option<ArtistMetadata> {
        let id = Self::optional_string(artist, "id")?;
        let genres = artist
            .get("genres")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let image_url = artist
            .get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(|image| Self::optional_string(image, "url"));
        Some(ArtistMetadata {
            id,
            name: artist
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            genres,
            image_url,
        })
    }

    /// Tracks of one playlist page; removed or local items come back as null and are dropped.
    fn parse_playlist_items(page: &Value) -> Vec<DesiredTrack> {
        page.get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("track"))
                    .filter_map(Self::parse_track)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_page_url(page: &Value) -> Option<String> {
        Self::optional_string(page, "next")
    }
}

impl MetadataProvider for SpotifyProvider {
    fn fetch_track(&self, track_id: &str) -> Result<DesiredTrack, ProviderError> {
        let subject = format!("track {track_id}");
        let payload = self.get_json(
            &format!("{API_BASE}/tracks/{}", urlencoding::encode(track_id)),
            &subject,
        )?;
        Self::parse_track(&payload).ok_or(ProviderError::NotFound(subject))
    }

    fn fetch_artist(&self, artist_id: &str) -> Result<ArtistMetadata, ProviderError> {
        let subject = format!("artist {artist_id}");
        let payload = self.get_json(
            &format!("{API_BASE}/artists/{}", urlencoding::encode(artist_id)),
            &subject,
        )?;
        Self::parse_artist(&payload).ok_or(ProviderError::NotFound(subject))
    }

    fn fetch_playlist(&self, playlist_id: &str) -> Result<DesiredPlaylist, ProviderError> {
        let subject = format!("playlist {playlist_id}");
        let encoded_id = urlencoding::encode(playlist_id);
        let header = self.get_json(&format!("{API_BASE}/playlists/{encoded_id}"), &subject)?;
        let name = header
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut tracks = Vec::new();
        let mut next_url = Some(format!(
            "{API_BASE}/playlists/{encoded_id}/tracks?limit={PLAYLIST_PAGE_SIZE}&offset=0"
        ));
        while let Some(url) = next_url {
            let page = self.get_json(&url, &subject)?;
            tracks.extend(Self::parse_playlist_items(&page));
            next_url = Self::next_page_url(&page);
        }
        Ok(DesiredPlaylist {
            id: playlist_id.to_string(),
            name,
            tracks,
        })
    }
}
