//! Purges bookkeeping of playlists deleted directly in the library.
//!
//! Only whole playlists are checked. Songs removed from a playlist that still
//! exists are left alone; the next reconciliation pass rewrites the list.

use std::sync::Arc;

use log::{info, warn};

use crate::backends::{LibraryBackend, LibraryError};
use crate::db_manager::BookkeepingStore;
use crate::error::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub checked: usize,
    pub purged: Vec<String>,
}

pub struct DriftCorrector {
    library: Arc<dyn LibraryBackend>,
    store: Arc<dyn BookkeepingStore>,
}

impl DriftCorrector {
    pub fn new(library: Arc<dyn LibraryBackend>, store: Arc<dyn BookkeepingStore>) -> Self {
        Self { library, store }
    }

    pub fn run(&self) -> Result<DriftReport, SyncError> {
        if !self.library.ping() {
            return Err(SyncError::LibraryUnavailable(
                "library did not answer before the drift pass".to_string(),
            ));
        }

        let mut report = DriftReport::default();
        for playlist_id in self.store.playlist_ids()? {
            report.checked += 1;
            match self.library.playlist(&playlist_id) {
                Ok(_) => {}
                Err(LibraryError::NotFound(_)) => {
                    warn!(
                        "Playlist id \"{playlist_id}\" not found, it may have been deleted from the library"
                    );
                    warn!("Deleting bookkeeping of playlist \"{playlist_id}\"");
                    self.store.delete_playlist_bookkeeping(&playlist_id)?;
                    report.purged.push(playlist_id);
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!(
            "Drift pass checked {} playlists, purged {}",
            report.checked,
            report.purged.len()
        );
        Ok(report)
    }
}
