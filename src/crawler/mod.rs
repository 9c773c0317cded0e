//! Crawler module for fetching, analyzing and indexing sites
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching
//! - HTML parsing, link and text extraction
//! - Per-site crawl sessions with cancellation
//! - The controller that starts and stops indexing runs

mod controller;
mod fetcher;
mod parser;
mod session;

pub use controller::IndexingController;
pub use fetcher::{build_http_client, FetchedPage, Fetcher};
pub use parser::{extract_text, parse_html, ParsedPage};
pub use session::{analyze_page, CrawlSession, PageAnalysis, CANCELLED_MESSAGE};

use crate::config::{Config, IndexingConfig};
use crate::index::IndexBuilder;
use crate::lemma::Lemmatizer;
use crate::state::SiteTracker;
use crate::storage::SharedStorage;
use std::sync::Arc;

/// Services shared by every crawl session of a controller
pub struct CrawlContext {
    pub storage: SharedStorage,
    pub fetcher: Fetcher,
    pub lemmatizer: Arc<Lemmatizer>,
    pub index: IndexBuilder,
    pub tracker: SiteTracker,
    pub indexing: IndexingConfig,
    pub allowlist: Vec<String>,
}

impl CrawlContext {
    /// Builds the shared services from configuration
    pub fn new(config: &Config, storage: SharedStorage) -> crate::Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(&config.fetcher)?,
            lemmatizer: Arc::new(Lemmatizer::new(&config.lemmatizer)),
            index: IndexBuilder::new(storage.clone()),
            tracker: SiteTracker::new(storage.clone()),
            indexing: config.indexing.clone(),
            allowlist: config.allowed_domains(),
            storage,
        })
    }
}
