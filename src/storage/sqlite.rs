//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::SiteStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{IndexRecord, LemmaRecord, PageRecord, SiteRecord};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;

const SITE_COLUMNS: &str = "id, url, name, status, status_time, last_error";
const PAGE_COLUMNS: &str = "id, site_id, path, code, content";

/// Selects a single page by ID (`?1`)
const ONE_PAGE: &str = "SELECT ?1";
/// Selects every page of a site (`?1`)
const SITE_PAGES: &str = "SELECT id FROM page WHERE site_id = ?1";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates a database file and initializes the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    let status: String = row.get(3)?;
    Ok(SiteRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        status: SiteStatus::from_db_string(&status)
            .ok_or(rusqlite::Error::InvalidColumnType(3, status, Type::Text))?,
        status_time: row.get(4)?,
        last_error: row.get(5)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        path: row.get(2)?,
        code: row.get(3)?,
        content: row.get(4)?,
    })
}

/// Removes the index rows of the selected pages and settles lemma counters
///
/// Each lemma loses one unit of frequency per selected page that contained
/// it; lemmas left at zero are deleted.
fn remove_index_rows(tx: &Transaction<'_>, page_filter: &str, key: i64) -> rusqlite::Result<u64> {
    tx.execute(
        &format!(
            "UPDATE lemma SET frequency = frequency - (
                 SELECT COUNT(*) FROM search_index si
                 WHERE si.lemma_id = lemma.id AND si.page_id IN ({filter})
             )
             WHERE id IN (SELECT lemma_id FROM search_index WHERE page_id IN ({filter}))",
            filter = page_filter
        ),
        params![key],
    )?;

    let removed = tx.execute(
        &format!(
            "DELETE FROM search_index WHERE page_id IN ({})",
            page_filter
        ),
        params![key],
    )?;

    tx.execute("DELETE FROM lemma WHERE frequency <= 0", [])?;

    Ok(removed as u64)
}

impl Storage for SqliteStorage {
    // ===== Sites =====

    fn upsert_site(&mut self, url: &str, name: Option<&str>) -> StorageResult<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM site WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(id) = existing {
            if name.is_some() {
                self.conn
                    .execute("UPDATE site SET name = ?1 WHERE id = ?2", params![name, id])?;
            }
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO site (url, name, status, status_time) VALUES (?1, ?2, ?3, ?4)",
            params![url, name, SiteStatus::Queued.to_db_string(), now],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>> {
        let site = self
            .conn
            .query_row(
                &format!("SELECT {} FROM site WHERE id = ?1", SITE_COLUMNS),
                params![site_id],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM site ORDER BY id", SITE_COLUMNS))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn update_site_status(
        &mut self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE site SET status = ?1, status_time = ?2, last_error = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, last_error, site_id],
        )?;

        if updated == 0 {
            return Err(crate::storage::StorageError::SiteNotFound(site_id));
        }
        Ok(())
    }

    fn set_site_error(&mut self, site_id: i64, last_error: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE site SET last_error = ?1, status_time = ?2 WHERE id = ?3",
            params![last_error, now, site_id],
        )?;

        if updated == 0 {
            return Err(crate::storage::StorageError::SiteNotFound(site_id));
        }
        Ok(())
    }

    fn delete_site_pages(&mut self, site_id: i64) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        remove_index_rows(&tx, SITE_PAGES, site_id)?;
        let removed = tx.execute("DELETE FROM page WHERE site_id = ?1", params![site_id])?;
        tx.commit()?;
        Ok(removed as u64)
    }

    // ===== Pages =====

    fn insert_page(
        &mut self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
    ) -> StorageResult<Option<i64>> {
        let inserted = self.conn.execute(
            "INSERT INTO page (site_id, path, code, content) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(site_id, path) DO NOTHING",
            params![site_id, path, code, content],
        )?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM page WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn get_page_by_path(&self, site_id: i64, path: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM page WHERE site_id = ?1 AND path = ?2",
                    PAGE_COLUMNS
                ),
                params![site_id, path],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn page_exists(&self, site_id: i64, path: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM page WHERE site_id = ?1 AND path = ?2",
            params![site_id, path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete_page(&mut self, page_id: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        remove_index_rows(&tx, ONE_PAGE, page_id)?;
        let removed = tx.execute("DELETE FROM page WHERE id = ?1", params![page_id])?;
        if removed == 0 {
            return Err(crate::storage::StorageError::PageNotFound(page_id));
        }
        tx.commit()?;
        Ok(())
    }

    fn list_pages(&self, site_id: i64) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM page WHERE site_id = ?1 ORDER BY id",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map(params![site_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn count_pages(&self, site_id: Option<i64>) -> StorageResult<u64> {
        let count: i64 = match site_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM page WHERE site_id = ?1",
                params![id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM page", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    // ===== Lemmas and index =====

    fn write_page_index(&mut self, page_id: i64, entries: &[(String, u32)]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert_lemma = tx.prepare(
                "INSERT INTO lemma (lemma, frequency) VALUES (?1, 1)
                 ON CONFLICT(lemma) DO UPDATE SET frequency = frequency + 1
                 RETURNING id",
            )?;
            let mut insert_index = tx.prepare(
                "INSERT INTO search_index (page_id, lemma_id, rank) VALUES (?1, ?2, ?3)",
            )?;

            for (lemma, rank) in entries {
                let lemma_id: i64 = upsert_lemma.query_row(params![lemma], |row| row.get(0))?;
                insert_index.execute(params![page_id, lemma_id, rank])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_page_index(&mut self, page_id: i64) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        let removed = remove_index_rows(&tx, ONE_PAGE, page_id)?;
        tx.commit()?;
        Ok(removed)
    }

    fn get_page_index(&self, page_id: i64) -> StorageResult<Vec<IndexRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT si.id, si.page_id, si.lemma_id, l.lemma, si.rank
             FROM search_index si JOIN lemma l ON l.id = si.lemma_id
             WHERE si.page_id = ?1
             ORDER BY l.lemma",
        )?;
        let rows = stmt
            .query_map(params![page_id], |row| {
                Ok(IndexRecord {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    lemma_id: row.get(2)?,
                    lemma: row.get(3)?,
                    rank: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_lemma(&self, lemma: &str) -> StorageResult<Option<LemmaRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, lemma, frequency FROM lemma WHERE lemma = ?1",
                params![lemma],
                |row| {
                    Ok(LemmaRecord {
                        id: row.get(0)?,
                        lemma: row.get(1)?,
                        frequency: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ===== Statistics =====

    fn count_lemmas(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM lemma", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_index_entries(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_sites_by_status(&self) -> StorageResult<HashMap<SiteStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM site GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            let status = SiteStatus::from_db_string(&status).ok_or_else(|| {
                crate::storage::StorageError::Corrupt(format!("unknown site status '{}'", status))
            })?;
            counts.insert(status, count as u64);
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with_site() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let site_id = storage.upsert_site("https://example.com", None).unwrap();
        (storage, site_id)
    }

    fn entries(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
        pairs.iter().map(|(l, r)| (l.to_string(), *r)).collect()
    }

    #[test]
    fn test_new_site_is_queued() {
        let (storage, site_id) = storage_with_site();
        let site = storage.get_site(site_id).unwrap().unwrap();
        assert_eq!(site.status, SiteStatus::Queued);
        assert!(site.last_error.is_none());
    }

    #[test]
    fn test_upsert_site_returns_existing() {
        let (mut storage, site_id) = storage_with_site();
        let again = storage
            .upsert_site("https://example.com", Some("Example"))
            .unwrap();
        assert_eq!(site_id, again);
        assert_eq!(
            storage.get_site(site_id).unwrap().unwrap().name.as_deref(),
            Some("Example")
        );
        assert_eq!(storage.list_sites().unwrap().len(), 1);
    }

    #[test]
    fn test_update_site_status() {
        let (mut storage, site_id) = storage_with_site();
        storage
            .update_site_status(site_id, SiteStatus::Failed, Some("boom"))
            .unwrap();

        let site = storage.get_site(site_id).unwrap().unwrap();
        assert_eq!(site.status, SiteStatus::Failed);
        assert_eq!(site.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_update_unknown_site() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.update_site_status(42, SiteStatus::Indexing, None);
        assert!(matches!(
            result,
            Err(crate::storage::StorageError::SiteNotFound(42))
        ));
    }

    #[test]
    fn test_set_site_error_keeps_status() {
        let (mut storage, site_id) = storage_with_site();
        storage
            .update_site_status(site_id, SiteStatus::Indexing, None)
            .unwrap();
        storage.set_site_error(site_id, "HTTP 404").unwrap();

        let site = storage.get_site(site_id).unwrap().unwrap();
        assert_eq!(site.status, SiteStatus::Indexing);
        assert_eq!(site.last_error.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn test_insert_duplicate_page() {
        let (mut storage, site_id) = storage_with_site();

        let first = storage.insert_page(site_id, "/", 200, "<html/>").unwrap();
        let second = storage.insert_page(site_id, "/", 200, "<html/>").unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(storage.count_pages(Some(site_id)).unwrap(), 1);
    }

    #[test]
    fn test_same_path_on_two_sites() {
        let (mut storage, site_a) = storage_with_site();
        let site_b = storage.upsert_site("https://example.org", None).unwrap();

        assert!(storage.insert_page(site_a, "/", 200, "").unwrap().is_some());
        assert!(storage.insert_page(site_b, "/", 200, "").unwrap().is_some());
        assert_eq!(storage.count_pages(None).unwrap(), 2);
    }

    #[test]
    fn test_write_page_index_counts_frequency() {
        let (mut storage, site_id) = storage_with_site();
        let p1 = storage.insert_page(site_id, "/a", 200, "").unwrap().unwrap();
        let p2 = storage.insert_page(site_id, "/b", 200, "").unwrap().unwrap();

        storage
            .write_page_index(p1, &entries(&[("кот", 3), ("дом", 1)]))
            .unwrap();
        storage.write_page_index(p2, &entries(&[("кот", 1)])).unwrap();

        assert_eq!(storage.get_lemma("кот").unwrap().unwrap().frequency, 2);
        assert_eq!(storage.get_lemma("дом").unwrap().unwrap().frequency, 1);

        let index = storage.get_page_index(p1).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[1].lemma, "кот");
        assert_eq!(index[1].rank, 3);
    }

    #[test]
    fn test_duplicate_index_row_rejected() {
        let (mut storage, site_id) = storage_with_site();
        let page = storage.insert_page(site_id, "/", 200, "").unwrap().unwrap();
        storage.write_page_index(page, &entries(&[("кот", 1)])).unwrap();

        let again = storage.write_page_index(page, &entries(&[("кот", 1)]));
        assert!(again.is_err());
        // The failed transaction must not have bumped the counter
        assert_eq!(storage.get_lemma("кот").unwrap().unwrap().frequency, 1);
    }

    #[test]
    fn test_clear_page_index_decrements_and_prunes() {
        let (mut storage, site_id) = storage_with_site();
        let p1 = storage.insert_page(site_id, "/a", 200, "").unwrap().unwrap();
        let p2 = storage.insert_page(site_id, "/b", 200, "").unwrap().unwrap();
        storage
            .write_page_index(p1, &entries(&[("кот", 2), ("дом", 1)]))
            .unwrap();
        storage.write_page_index(p2, &entries(&[("кот", 1)])).unwrap();

        let removed = storage.clear_page_index(p1).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(storage.get_lemma("кот").unwrap().unwrap().frequency, 1);
        assert!(storage.get_lemma("дом").unwrap().is_none());
        assert!(storage.get_page_index(p1).unwrap().is_empty());
        assert_eq!(storage.get_page_index(p2).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_page_cascades() {
        let (mut storage, site_id) = storage_with_site();
        let page = storage.insert_page(site_id, "/", 200, "").unwrap().unwrap();
        storage.write_page_index(page, &entries(&[("кот", 1)])).unwrap();

        storage.delete_page(page).unwrap();

        assert!(storage.get_page(page).unwrap().is_none());
        assert_eq!(storage.count_index_entries().unwrap(), 0);
        assert_eq!(storage.count_lemmas().unwrap(), 0);
    }

    #[test]
    fn test_delete_missing_page() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.delete_page(7).is_err());
    }

    #[test]
    fn test_delete_site_pages_only_touches_that_site() {
        let (mut storage, site_a) = storage_with_site();
        let site_b = storage.upsert_site("https://example.org", None).unwrap();

        for path in ["/", "/x"] {
            let page = storage.insert_page(site_a, path, 200, "").unwrap().unwrap();
            storage.write_page_index(page, &entries(&[("кот", 1)])).unwrap();
        }
        let page_b = storage.insert_page(site_b, "/", 200, "").unwrap().unwrap();
        storage.write_page_index(page_b, &entries(&[("кот", 4)])).unwrap();

        assert_eq!(storage.get_lemma("кот").unwrap().unwrap().frequency, 3);

        let removed = storage.delete_site_pages(site_a).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(storage.count_pages(Some(site_a)).unwrap(), 0);
        assert_eq!(storage.count_pages(Some(site_b)).unwrap(), 1);
        assert_eq!(storage.get_lemma("кот").unwrap().unwrap().frequency, 1);
        assert_eq!(storage.count_index_entries().unwrap(), 1);
    }

    #[test]
    fn test_count_sites_by_status() {
        let (mut storage, site_a) = storage_with_site();
        storage.upsert_site("https://example.org", None).unwrap();
        storage
            .update_site_status(site_a, SiteStatus::Indexing, None)
            .unwrap();

        let counts = storage.count_sites_by_status().unwrap();
        assert_eq!(counts.get(&SiteStatus::Indexing), Some(&1));
        assert_eq!(counts.get(&SiteStatus::Queued), Some(&1));
    }
}
