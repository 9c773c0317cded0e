//! Statistics generation from the index database
//!
//! This module provides functionality for extracting and displaying
//! index statistics from the storage layer.

use crate::state::SiteStatus;
use crate::storage::{Storage, StorageResult};
use std::collections::HashMap;

/// Per-site line of the statistics report
#[derive(Debug, Clone)]
pub struct SiteSummary {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub status: SiteStatus,
    pub status_time: String,
    pub last_error: Option<String>,
    pub pages: u64,
}

/// Index statistics summary
#[derive(Debug, Clone)]
pub struct IndexStatistics {
    /// Total number of stored pages
    pub total_pages: u64,

    /// Number of distinct lemmas
    pub total_lemmas: u64,

    /// Number of page/lemma index rows
    pub total_index_entries: u64,

    /// Count of sites by status
    pub sites_by_status: HashMap<SiteStatus, u64>,

    /// One entry per registered site
    pub sites: Vec<SiteSummary>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<IndexStatistics> {
    let mut sites = Vec::new();
    for site in storage.list_sites()? {
        let pages = storage.count_pages(Some(site.id))?;
        sites.push(SiteSummary {
            id: site.id,
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: site.status_time,
            last_error: site.last_error,
            pages,
        });
    }

    Ok(IndexStatistics {
        total_pages: storage.count_pages(None)?,
        total_lemmas: storage.count_lemmas()?,
        total_index_entries: storage.count_index_entries()?,
        sites_by_status: storage.count_sites_by_status()?,
        sites,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IndexStatistics) {
    println!("=== Index Statistics ===\n");

    println!("Overview:");
    println!("  Sites: {}", stats.sites.len());
    println!("  Pages: {}", stats.total_pages);
    println!("  Lemmas: {}", stats.total_lemmas);
    println!("  Index entries: {}", stats.total_index_entries);
    println!();

    if !stats.sites_by_status.is_empty() {
        println!("Sites by Status:");
        for status in [
            SiteStatus::Queued,
            SiteStatus::Indexing,
            SiteStatus::Indexed,
            SiteStatus::Failed,
        ] {
            if let Some(count) = stats.sites_by_status.get(&status) {
                println!("  {}: {}", status, count);
            }
        }
        println!();
    }

    for site in &stats.sites {
        let label = site.name.as_deref().unwrap_or(&site.url);
        println!("[{}] {} ({})", site.id, label, site.url);
        println!("  Status: {} since {}", site.status, site.status_time);
        println!("  Pages: {}", site.pages);
        if let Some(error) = &site.last_error {
            println!("  Last error: {}", error);
        }
    }
}
