//! Page/lemma index maintenance
//!
//! The builder turns a page's lemma counts into lemma counters and index
//! rows. A page is always indexed from scratch: existing rows are removed
//! (settling lemma frequencies) before the new ones are written.

use crate::storage::{self, SharedStorage, SqliteStorage, Storage};
use crate::{IndexerError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Writes pages and their index rows to the shared store
#[derive(Clone)]
pub struct IndexBuilder {
    storage: SharedStorage,
}

impl IndexBuilder {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Indexes an existing page, replacing any previous index rows
    ///
    /// Returns the number of index rows written.
    pub fn index_page(&self, page_id: i64, lemmas: &HashMap<String, u32>) -> Result<usize> {
        let mut guard = storage::lock(&self.storage)?;
        if guard.get_page(page_id)?.is_none() {
            return Err(IndexerError::NotFound(format!("page {} not found", page_id)));
        }
        write_index(&mut guard, page_id, lemmas)
    }

    /// Stores a new page and indexes it
    ///
    /// Returns `None` without touching the index when the site already has a
    /// page at `path`.
    pub fn store_page(
        &self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
        lemmas: &HashMap<String, u32>,
    ) -> Result<Option<i64>> {
        let mut guard = storage::lock(&self.storage)?;

        let Some(page_id) = guard.insert_page(site_id, path, code, content)? else {
            debug!("Page {} already stored for site {}", path, site_id);
            return Ok(None);
        };

        write_index(&mut guard, page_id, lemmas)?;
        Ok(Some(page_id))
    }

    /// Stores a page, first deleting any page at the same path
    pub fn replace_page(
        &self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
        lemmas: &HashMap<String, u32>,
    ) -> Result<i64> {
        let mut guard = storage::lock(&self.storage)?;

        if let Some(existing) = guard.get_page_by_path(site_id, path)? {
            debug!("Replacing page {} ({})", existing.id, path);
            guard.delete_page(existing.id)?;
        }

        let page_id = guard
            .insert_page(site_id, path, code, content)?
            .ok_or_else(|| IndexerError::Conflict(format!("page {} already exists", path)))?;

        write_index(&mut guard, page_id, lemmas)?;
        Ok(page_id)
    }
}

fn write_index(
    store: &mut SqliteStorage,
    page_id: i64,
    lemmas: &HashMap<String, u32>,
) -> Result<usize> {
    let cleared = store.clear_page_index(page_id)?;
    if cleared > 0 {
        debug!("Cleared {} stale index rows of page {}", cleared, page_id);
    }

    let mut entries: Vec<(String, u32)> = lemmas
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(lemma, count)| (lemma.clone(), *count))
        .collect();
    entries.sort();

    store.write_page_index(page_id, &entries)?;
    Ok(entries.len())
}
