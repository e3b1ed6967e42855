//! Fuzzy multi-variant search against the media library.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::backends::LibraryBackend;
use crate::error::SyncError;
use crate::model::LibraryEntry;
use crate::text_match::search_variants;

/// Result cap for each issued search.
pub const SEARCH_RESULT_LIMIT: usize = 500;

pub struct LibrarySearch {
    library: Arc<dyn LibraryBackend>,
}

impl LibrarySearch {
    pub fn new(library: Arc<dyn LibraryBackend>) -> Self {
        Self { library }
    }

    /// Searches every normalized variant of `text` and merges hits by entry id.
    ///
    /// Order is first-seen order across variants; a later variant never
    /// replaces an entry an earlier one returned.
    pub fn search(&self, text: &str) -> Result<Vec<LibraryEntry>, SyncError> {
        if !self.library.ping() {
            return Err(SyncError::LibraryUnavailable(format!(
                "library did not answer before searching '{text}'"
            )));
        }

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut merged = Vec::new();
        for variant in search_variants(text) {
            let hits = self.library.search(&variant, SEARCH_RESULT_LIMIT)?;
            debug!("Search '{variant}' returned {} entries", hits.len());
            for hit in hits {
                if seen_ids.insert(hit.id.clone()) {
                    merged.push(hit);
                }
            }
        }
        Ok(merged)
    }
}
