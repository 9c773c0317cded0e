//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Lemma-Indexer database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Sites being indexed
CREATE TABLE IF NOT EXISTS site (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    name TEXT,
    status TEXT NOT NULL,
    status_time TEXT NOT NULL,
    last_error TEXT
);

-- Fetched pages, one per (site, path)
CREATE TABLE IF NOT EXISTS page (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    code INTEGER NOT NULL,
    content TEXT NOT NULL,
    UNIQUE(site_id, path)
);

CREATE INDEX IF NOT EXISTS idx_page_path ON page(path);

-- Global lemma counters
CREATE TABLE IF NOT EXISTS lemma (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lemma TEXT NOT NULL UNIQUE,
    frequency INTEGER NOT NULL CHECK (frequency >= 0)
);

-- Page <-> lemma links weighted by occurrence count
CREATE TABLE IF NOT EXISTS search_index (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES page(id) ON DELETE CASCADE,
    lemma_id INTEGER NOT NULL REFERENCES lemma(id),
    rank INTEGER NOT NULL CHECK (rank > 0),
    UNIQUE(page_id, lemma_id)
);

CREATE INDEX IF NOT EXISTS idx_search_index_lemma ON search_index(lemma_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
