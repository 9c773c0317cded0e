//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::SiteStatus;
use crate::storage::{IndexRecord, LemmaRecord, PageRecord, SiteRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("Page not found: {0}")]
    PageNotFound(i64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This is the page/lemma/index store the crawl pipeline writes into. All
/// multi-row writes are atomic.
pub trait Storage {
    // ===== Sites =====

    /// Registers a site, or returns the existing site's ID
    ///
    /// New sites start out QUEUED.
    fn upsert_site(&mut self, url: &str, name: Option<&str>) -> StorageResult<i64>;

    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>>;

    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>>;

    /// Writes status, status time and last error in one update
    fn update_site_status(
        &mut self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    /// Records an error on the site without touching its status
    fn set_site_error(&mut self, site_id: i64, last_error: &str) -> StorageResult<()>;

    /// Deletes every page of a site together with its index rows
    ///
    /// Lemma frequencies are decremented for each removed page and lemmas
    /// left with no pages are deleted. Returns the number of removed pages.
    fn delete_site_pages(&mut self, site_id: i64) -> StorageResult<u64>;

    // ===== Pages =====

    /// Inserts a page unless (site_id, path) already exists
    ///
    /// Returns `None` when the page was already present.
    fn insert_page(
        &mut self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
    ) -> StorageResult<Option<i64>>;

    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>>;

    fn get_page_by_path(&self, site_id: i64, path: &str) -> StorageResult<Option<PageRecord>>;

    fn page_exists(&self, site_id: i64, path: &str) -> StorageResult<bool>;

    /// Deletes a page and its index rows, decrementing lemma frequencies
    fn delete_page(&mut self, page_id: i64) -> StorageResult<()>;

    fn list_pages(&self, site_id: i64) -> StorageResult<Vec<PageRecord>>;

    fn count_pages(&self, site_id: Option<i64>) -> StorageResult<u64>;

    // ===== Lemmas and index =====

    /// Writes the index rows of a page in one transaction
    ///
    /// For each (lemma, rank): the lemma is created with frequency 1 or its
    /// frequency is incremented, then an index row is inserted.
    fn write_page_index(&mut self, page_id: i64, entries: &[(String, u32)]) -> StorageResult<()>;

    /// Removes the index rows of a page, decrementing lemma frequencies
    ///
    /// Returns the number of removed rows.
    fn clear_page_index(&mut self, page_id: i64) -> StorageResult<u64>;

    fn get_page_index(&self, page_id: i64) -> StorageResult<Vec<IndexRecord>>;

    fn get_lemma(&self, lemma: &str) -> StorageResult<Option<LemmaRecord>>;

    // ===== Statistics =====

    fn count_lemmas(&self) -> StorageResult<u64>;

    fn count_index_entries(&self) -> StorageResult<u64>;

    fn count_sites_by_status(&self) -> StorageResult<HashMap<SiteStatus, u64>>;
}
