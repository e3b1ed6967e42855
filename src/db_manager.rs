//! SQLite bookkeeping of playlist/desired-track associations.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::{AssociationRow, DesiredArtist, DesiredTrack, LibraryEntry, StoredArtist};

/// One bookkept playlist with its association rows, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRows {
    pub playlist_id: String,
    pub rows: Vec<AssociationRow>,
}

/// Record store for the associations the matcher produces.
pub trait BookkeepingStore: Send + Sync {
    /// Upserts the row for (`playlist_id`, `track`). `entry` is `None` for a miss.
    fn insert_association(
        &self,
        playlist_id: &str,
        entry: Option<&LibraryEntry>,
        artist: &DesiredArtist,
        track: &DesiredTrack,
    ) -> Result<(), SyncError>;
    /// Returns the number of rows removed.
    fn delete_playlist_bookkeeping(&self, playlist_id: &str) -> Result<usize, SyncError>;
    fn playlist_ids(&self) -> Result<Vec<String>, SyncError>;
    /// Pages over playlists; `page` is zero-based and only applies with a `limit`.
    fn list_playlists(
        &self,
        missing_only: bool,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<PlaylistRows>, SyncError>;
    fn count_playlists(&self, missing_only: bool) -> Result<usize, SyncError>;
    fn artist_overview(
        &self,
        artist_uuid: &str,
    ) -> Result<Option<(StoredArtist, Vec<AssociationRow>)>, SyncError>;
}

const ASSOCIATION_COLUMNS: &str = "a.library_playlist_id, a.library_entry_id, a.library_artist,
    a.library_title, a.library_album, t.uuid, t.provider_uri, t.title, ar.uuid, ar.name
    FROM playlist_associations a
    JOIN desired_tracks t ON t.uuid = a.desired_track_uuid
    JOIN desired_artists ar ON ar.uuid = a.desired_artist_uuid";

pub struct DbManager {
    conn: Mutex<Connection>,
}

impl DbManager {
    pub fn new(db_path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                SyncError::Config(format!(
                    "could not create data directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn new_in_memory() -> Result<Self, SyncError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// `<data dir>/syncsonic/syncsonic.db`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("syncsonic").join("syncsonic.db"))
    }

    fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        let db_manager = Self {
            conn: Mutex::new(conn),
        };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now_unix_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS desired_artists (
                uuid TEXT PRIMARY KEY,
                provider_uri TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS desired_tracks (
                uuid TEXT PRIMARY KEY,
                provider_uri TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                album TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS playlist_associations (
                library_playlist_id TEXT NOT NULL,
                desired_track_uuid TEXT NOT NULL,
                desired_artist_uuid TEXT NOT NULL,
                library_entry_id TEXT,
                library_artist TEXT,
                library_title TEXT,
                library_album TEXT,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY(library_playlist_id, desired_track_uuid),
                FOREIGN KEY(desired_track_uuid) REFERENCES desired_tracks(uuid),
                FOREIGN KEY(desired_artist_uuid) REFERENCES desired_artists(uuid)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_associations_artist
                ON playlist_associations(desired_artist_uuid)",
            [],
        )?;
        Ok(())
    }

    fn upsert_artist(conn: &Connection, artist: &DesiredArtist) -> Result<String, rusqlite::Error> {
        let provider_uri = artist.storage_key();
        conn.execute(
            "INSERT INTO desired_artists (uuid, provider_uri, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(provider_uri) DO UPDATE SET name = excluded.name",
            params![Uuid::new_v4().to_string(), provider_uri, artist.name],
        )?;
        conn.query_row(
            "SELECT uuid FROM desired_artists WHERE provider_uri = ?1",
            params![provider_uri],
            |row| row.get(0),
        )
    }

    fn upsert_track(conn: &Connection, track: &DesiredTrack) -> Result<String, rusqlite::Error> {
        let provider_uri = track.provider_uri();
        conn.execute(
            "INSERT INTO desired_tracks (uuid, provider_uri, title, album) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(provider_uri) DO UPDATE SET title = excluded.title,
                album = COALESCE(excluded.album, desired_tracks.album)",
            params![
                Uuid::new_v4().to_string(),
                provider_uri,
                track.name,
                track.album_name()
            ],
        )?;
        conn.query_row(
            "SELECT uuid FROM desired_tracks WHERE provider_uri = ?1",
            params![provider_uri],
            |row| row.get(0),
        )
    }

    fn read_association(row: &rusqlite::Row<'_>) -> Result<AssociationRow, rusqlite::Error> {
        Ok(AssociationRow {
            library_playlist_id: row.get(0)?,
            library_entry_id: row.get(1)?,
            library_artist: row.get(2)?,
            library_title: row.get(3)?,
            library_album: row.get(4)?,
            desired_track_uuid: row.get(5)?,
            desired_track_uri: row.get(6)?,
            desired_title: row.get(7)?,
            desired_artist_uuid: row.get(8)?,
            desired_artist_name: row.get(9)?,
        })
    }

    fn playlist_rows(
        conn: &Connection,
        playlist_id: &str,
        missing_only: bool,
    ) -> Result<Vec<AssociationRow>, rusqlite::Error> {
        let sql = format!(
            "SELECT {ASSOCIATION_COLUMNS}
             WHERE a.library_playlist_id = ?1 AND (?2 = 0 OR a.library_entry_id IS NULL)
             ORDER BY a.rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![playlist_id, missing_only], Self::read_association)?;
        rows.collect()
    }
}

impl BookkeepingStore for DbManager {
    fn insert_association(
        &self,
        playlist_id: &str,
        entry: Option<&LibraryEntry>,
        artist: &DesiredArtist,
        track: &DesiredTrack,
    ) -> Result<(), SyncError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let artist_uuid = Self::upsert_artist(&tx, artist)?;
        let track_uuid = Self::upsert_track(&tx, track)?;
        tx.execute(
            "INSERT INTO playlist_associations (
                library_playlist_id, desired_track_uuid, desired_artist_uuid,
                library_entry_id, library_artist, library_title, library_album, updated_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(library_playlist_id, desired_track_uuid) DO UPDATE SET
                desired_artist_uuid = excluded.desired_artist_uuid,
                library_entry_id = excluded.library_entry_id,
                library_artist = excluded.library_artist,
                library_title = excluded.library_title,
                library_album = excluded.library_album,
                updated_at_ms = excluded.updated_at_ms",
            params![
                playlist_id,
                track_uuid,
                artist_uuid,
                entry.map(|entry| entry.id.as_str()),
                entry.map(|entry| entry.artist.as_str()),
                entry.map(|entry| entry.title.as_str()),
                entry.map(|entry| entry.album.as_str()),
                Self::now_unix_ms()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_playlist_bookkeeping(&self, playlist_id: &str) -> Result<usize, SyncError> {
        let removed = self.lock().execute(
            "DELETE FROM playlist_associations WHERE library_playlist_id = ?1",
            params![playlist_id],
        )?;
        Ok(removed)
    }

    fn playlist_ids(&self) -> Result<Vec<String>, SyncError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT library_playlist_id FROM playlist_associations
             ORDER BY library_playlist_id",
        )?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        Ok(ids.collect::<Result<Vec<String>, _>>()?)
    }

    fn list_playlists(
        &self,
        missing_only: bool,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<PlaylistRows>, SyncError> {
        let conn = self.lock();
        let (limit_value, offset_value): (i64, i64) = match limit {
            Some(limit) => (
                limit as i64,
                page.unwrap_or(0).saturating_mul(limit) as i64,
            ),
            None => (-1, 0),
        };
        let playlist_ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT library_playlist_id FROM playlist_associations
                 WHERE (?1 = 0 OR library_entry_id IS NULL)
                 ORDER BY library_playlist_id
                 LIMIT ?2 OFFSET ?3",
            )?;
            let ids = stmt.query_map(params![missing_only, limit_value, offset_value], |row| {
                row.get(0)
            })?;
            ids.collect::<Result<_, _>>()?
        };

        let mut playlists = Vec::with_capacity(playlist_ids.len());
        for playlist_id in playlist_ids {
            let rows = Self::playlist_rows(&conn, &playlist_id, missing_only)?;
            playlists.push(PlaylistRows { playlist_id, rows });
        }
        Ok(playlists)
    }

    fn count_playlists(&self, missing_only: bool) -> Result<usize, SyncError> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(DISTINCT library_playlist_id) FROM playlist_associations
             WHERE (?1 = 0 OR library_entry_id IS NULL)",
            params![missing_only],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn artist_overview(
        &self,
        artist_uuid: &str,
    ) -> Result<Option<(StoredArtist, Vec<AssociationRow>)>, SyncError> {
        let conn = self.lock();
        let artist = conn
            .query_row(
                "SELECT uuid, provider_uri, name FROM desired_artists WHERE uuid = ?1",
                params![artist_uuid],
                |row| {
                    Ok(StoredArtist {
                        uuid: row.get(0)?,
                        provider_uri: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        let Some(artist) = artist else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {ASSOCIATION_COLUMNS}
             WHERE a.desired_artist_uuid = ?1
             ORDER BY a.library_playlist_id, a.rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![artist_uuid], Self::read_association)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((artist, rows)))
    }
}
