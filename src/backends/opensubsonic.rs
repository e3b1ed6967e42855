//! OpenSubsonic backend adapter implementation.

use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::backends::{
    BackendPlaylist, BackendPlaylistContents, BackendProfileAuth, LibraryBackend, LibraryError,
};
use crate::model::LibraryEntry;
use crate::text_match::normalize_code;

const API_VERSION: &str = "1.16.1";
const CLIENT_ID: &str = "syncsonic";
/// Subsonic "requested data was not found" error code.
const ERROR_CODE_NOT_FOUND: i64 = 70;

/// OpenSubsonic adapter backed by `ureq`.
pub struct OpenSubsonicAdapter {
    http_client: ureq::Agent,
    profile: BackendProfileAuth,
}

impl OpenSubsonicAdapter {
    /// Creates a new OpenSubsonic adapter bound to one server profile.
    pub fn new(profile: BackendProfileAuth) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            profile,
        }
    }

    fn make_salt() -> String {
        let mut bytes = [0u8; 8];
        let _ = getrandom::fill(&mut bytes);
        bytes.iter().map(|value| format!("{value:02x}")).collect()
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let salt = Self::make_salt();
        let token = format!(
            "{:x}",
            md5::compute(format!("{}{}", self.profile.password, salt))
        );
        vec![
            ("u".to_string(), self.profile.username.clone()),
            ("t".to_string(), token),
            ("s".to_string(), salt),
            ("f".to_string(), "json".to_string()),
            ("v".to_string(), API_VERSION.to_string()),
            ("c".to_string(), CLIENT_ID.to_string()),
        ]
    }

    fn endpoint_base(endpoint: &str) -> String {
        endpoint.trim().trim_end_matches('/').to_string()
    }

    fn api_url(&self, method: &str, params: &[(String, String)]) -> String {
        let mut query_parts: Vec<String> = self
            .auth_params()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect();
        query_parts.extend(
            params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value))),
        );
        format!(
            "{}/rest/{}.view?{}",
            Self::endpoint_base(&self.profile.endpoint),
            method,
            query_parts.join("&")
        )
    }

    fn request_json(
        &self,
        method: &str,
        params: &[(String, String)],
    ) -> Result<Value, LibraryError> {
        let url = self.api_url(method, params);
        let response = self.http_client.get(&url).call().map_err(|err| {
            LibraryError::Unavailable(format!("OpenSubsonic request failed ({method}): {err}"))
        })?;
        let parsed: Value = response.into_json().map_err(|err| {
            LibraryError::Unavailable(format!(
                "OpenSubsonic response parse failed ({method}): {err}"
            ))
        })?;
        Self::check_status(method, parsed)
    }

    fn check_status(method: &str, parsed: Value) -> Result<Value, LibraryError> {
        let status = parsed
            .get("subsonic-response")
            .and_then(|value| value.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if status == "ok" {
            return Ok(parsed);
        }
        let error = parsed
            .get("subsonic-response")
            .and_then(|value| value.get("error"));
        let error_message = error
            .and_then(|value| value.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("OpenSubsonic returned an error");
        let message = format!("{method}: {error_message}");
        let code = error
            .and_then(|value| value.get("code"))
            .and_then(Value::as_i64);
        if code == Some(ERROR_CODE_NOT_FOUND) {
            Err(LibraryError::NotFound(message))
        } else {
            Err(LibraryError::Rejected(message))
        }
    }

    fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
        match value {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        }
    }

    fn string_field(song: &Value, key: &str) -> String {
        song.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }

    /// Codes reported inline by servers that expose the OpenSubsonic `isrc` field.
    fn parse_embedded_codes(song: &Value) -> Vec<String> {
        let raw_codes: Vec<&str> = match song.get("isrc") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(code)) => vec![code.as_str()],
            _ => Vec::new(),
        };
        raw_codes
            .into_iter()
            .map(normalize_code)
            .filter(|code| !code.is_empty())
            .collect()
    }

    fn parse_entry(song: &Value) -> Option<LibraryEntry> {
        let id = song.get("id")?.as_str()?.to_string();
        let musicbrainz_id = song
            .get("musicBrainzId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        Some(LibraryEntry {
            id,
            artist: Self::string_field(song, "artist"),
            title: Self::string_field(song, "title"),
            album: Self::string_field(song, "album"),
            musicbrainz_id,
            embedded_codes: Self::parse_embedded_codes(song),
            raw: song.clone(),
        })
    }

    fn parse_search_entries(payload: &Value) -> Vec<LibraryEntry> {
        let songs = Self::array_or_single(
            payload
                .get("subsonic-response")
                .and_then(|value| value.get("searchResult3"))
                .and_then(|value| value.get("song")),
        );
        songs.into_iter().filter_map(Self::parse_entry).collect()
    }

    fn parse_playlists(payload: &Value) -> Vec<BackendPlaylist> {
        let playlists = Self::array_or_single(
            payload
                .get("subsonic-response")
                .and_then(|value| value.get("playlists"))
                .and_then(|value| value.get("playlist")),
        );
        playlists
            .into_iter()
            .filter_map(|playlist| {
                let id = playlist.get("id").and_then(Value::as_str)?.to_string();
                let name = playlist
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(BackendPlaylist { id, name })
            })
            .collect()
    }

    fn parse_playlist_contents(payload: &Value) -> Option<BackendPlaylistContents> {
        let playlist = payload
            .get("subsonic-response")
            .and_then(|value| value.get("playlist"))?;
        let id = playlist.get("id").and_then(Value::as_str)?.to_string();
        let name = playlist
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entry_ids = Self::array_or_single(playlist.get("entry"))
            .into_iter()
            .filter_map(|entry| entry.get("id").and_then(Value::as_str))
            .map(ToOwned::to_owned)
            .collect();
        Some(BackendPlaylistContents {
            id,
            name,
            entry_ids,
        })
    }
}

impl LibraryBackend for OpenSubsonicAdapter {
    fn ping(&self) -> bool {
        match self.request_json("ping", &[]) {
            Ok(_) => true,
            Err(err) => {
                debug!("OpenSubsonic ping failed: {err}");
                false
            }
        }
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<LibraryEntry>, LibraryError> {
        let payload = self.request_json(
            "search3",
            &[
                ("query".to_string(), query.to_string()),
                ("songCount".to_string(), limit.to_string()),
                ("artistCount".to_string(), "0".to_string()),
                ("albumCount".to_string(), "0".to_string()),
            ],
        )?;
        Ok(Self::parse_search_entries(&payload))
    }

    fn playlists(&self) -> Result<Vec<BackendPlaylist>, LibraryError> {
        let payload = self.request_json("getPlaylists", &[])?;
        Ok(Self::parse_playlists(&payload))
    }

    fn playlist(&self, playlist_id: &str) -> Result<BackendPlaylistContents, LibraryError> {
        let payload =
            self.request_json("getPlaylist", &[("id".to_string(), playlist_id.to_string())])?;
        Self::parse_playlist_contents(&payload).ok_or_else(|| {
            LibraryError::NotFound(format!("getPlaylist: playlist {playlist_id} missing"))
        })
    }

    fn create_playlist(&self, name: &str, entry_ids: &[String]) -> Result<String, LibraryError> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(LibraryError::Rejected(
                "playlist name cannot be empty".to_string(),
            ));
        }

        let mut params = vec![("name".to_string(), trimmed_name.to_string())];
        for entry_id in entry_ids {
            params.push(("songId".to_string(), entry_id.clone()));
        }

        let payload = self.request_json("createPlaylist", &params)?;
        let created_id = payload
            .get("subsonic-response")
            .and_then(|value| value.get("playlist"))
            .and_then(|value| value.get("id"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        if let Some(created_id) = created_id {
            return Ok(created_id);
        }
        // Servers implementing the pre-1.14 API return an empty body here.
        self.playlists()?
            .into_iter()
            .find(|playlist| playlist.name.trim() == trimmed_name)
            .map(|playlist| playlist.id)
            .ok_or_else(|| {
                LibraryError::Rejected(
                    "OpenSubsonic createPlaylist response missing playlist id".to_string(),
                )
            })
    }

    fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        entry_ids: &[String],
    ) -> Result<(), LibraryError> {
        let mut params = vec![("playlistId".to_string(), playlist_id.to_string())];
        for entry_id in entry_ids {
            params.push(("songId".to_string(), entry_id.clone()));
        }
        let _ = self.request_json("createPlaylist", &params)?;
        Ok(())
    }

    fn delete_playlist(&self, playlist_id: &str) -> Result<(), LibraryError> {
        let _ = self.request_json(
            "deletePlaylist",
            &[("id".to_string(), playlist_id.to_string())],
        )?;
        Ok(())
    }
}
