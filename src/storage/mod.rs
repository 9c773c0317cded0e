//! Storage module for persisting the index
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Site status persistence
//! - Page storage with (site, path) uniqueness
//! - Lemma counters and page/lemma index rows

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::SiteStatus;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between crawl tasks
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens a storage database and wraps it for sharing
pub fn open_shared(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks a shared storage handle
///
/// A poisoned lock is reported as a storage error rather than propagated as
/// a panic.
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Represents a site in the database
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub status: SiteStatus,
    pub status_time: String,
    pub last_error: Option<String>,
}

/// Represents a fetched page
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub site_id: i64,
    pub path: String,
    pub code: u16,
    pub content: String,
}

/// Represents a lemma and the number of pages containing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LemmaRecord {
    pub id: i64,
    pub lemma: String,
    pub frequency: u32,
}

/// Represents one page/lemma link with its lemma text resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: i64,
    pub page_id: i64,
    pub lemma_id: i64,
    pub lemma: String,
    pub rank: u32,
}
