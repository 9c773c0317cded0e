//! Site lifecycle tracking over the shared store

use crate::state::SiteStatus;
use crate::storage::{self, SharedStorage, Storage};
use crate::{IndexerError, Result};
use tracing::{debug, info};

/// Reads and updates site status in the store
///
/// Every status change goes through [`SiteStatus::can_transition_to`], so a
/// finished site cannot be moved back to INDEXING without a [`reset`].
///
/// [`reset`]: SiteTracker::reset
#[derive(Clone)]
pub struct SiteTracker {
    storage: SharedStorage,
}

impl SiteTracker {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Current status of a site
    pub fn get_status(&self, site_id: i64) -> Result<SiteStatus> {
        let guard = storage::lock(&self.storage)?;
        let site = guard
            .get_site(site_id)?
            .ok_or_else(|| IndexerError::NotFound(format!("site {} not found", site_id)))?;
        Ok(site.status)
    }

    /// Moves a site to `status`, replacing its last error
    pub fn set_status(&self, site_id: i64, status: SiteStatus, error: Option<&str>) -> Result<()> {
        let mut guard = storage::lock(&self.storage)?;
        let current = guard
            .get_site(site_id)?
            .ok_or_else(|| IndexerError::NotFound(format!("site {} not found", site_id)))?
            .status;

        if !current.can_transition_to(status) {
            return Err(IndexerError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        guard.update_site_status(site_id, status, error)?;
        debug!("Site {}: {} -> {}", site_id, current, status);
        Ok(())
    }

    /// QUEUED -> INDEXING
    pub fn begin(&self, site_id: i64) -> Result<()> {
        self.set_status(site_id, SiteStatus::Indexing, None)
    }

    /// INDEXING -> INDEXED, keeping any error recorded during the crawl
    pub fn complete(&self, site_id: i64) -> Result<()> {
        let last_error = storage::lock(&self.storage)?
            .get_site(site_id)?
            .and_then(|site| site.last_error);
        self.set_status(site_id, SiteStatus::Indexed, last_error.as_deref())
    }

    /// Marks the site FAILED with a message
    pub fn fail(&self, site_id: i64, message: &str) -> Result<()> {
        self.set_status(site_id, SiteStatus::Failed, Some(message))
    }

    /// Records an error without changing the status
    pub fn record_error(&self, site_id: i64, message: &str) -> Result<()> {
        let mut guard = storage::lock(&self.storage)?;
        guard.set_site_error(site_id, message)?;
        Ok(())
    }

    /// Starts a fresh cycle: drops the site's pages and sets it QUEUED
    ///
    /// Returns the number of pages removed.
    pub fn reset(&self, site_id: i64) -> Result<u64> {
        let mut guard = storage::lock(&self.storage)?;
        if guard.get_site(site_id)?.is_none() {
            return Err(IndexerError::NotFound(format!("site {} not found", site_id)));
        }

        let removed = guard.delete_site_pages(site_id)?;
        guard.update_site_status(site_id, SiteStatus::Queued, None)?;

        info!("Site {} reset, {} old pages removed", site_id, removed);
        Ok(removed)
    }
}
