//! Starting and stopping indexing runs
//!
//! A run indexes every configured site, one after another, in a background
//! task. At most one run is active per controller.

use crate::config::Config;
use crate::crawler::session::{analyze_page, CrawlSession, CANCELLED_MESSAGE};
use crate::crawler::CrawlContext;
use crate::state::SiteStatus;
use crate::storage::{self, SharedStorage, Storage};
use crate::url::{normalize_url, page_path, SiteScope};
use crate::{ConfigError, IndexerError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The registered run
///
/// Stays registered until a stop has fully drained it; `handle` is taken by
/// the stop that claims it.
struct ActiveRun {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    finished: watch::Receiver<bool>,
}

impl ActiveRun {
    fn is_active(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| !handle.is_finished())
    }

    fn is_stopping(&self) -> bool {
        self.handle.is_none()
    }
}

/// Control surface for indexing
pub struct IndexingController {
    config: Arc<Config>,
    ctx: Arc<CrawlContext>,
    active: Mutex<Option<ActiveRun>>,
}

impl IndexingController {
    pub fn new(config: Config, storage: SharedStorage) -> Result<Self> {
        let ctx = CrawlContext::new(&config, storage)?;
        Ok(Self {
            config: Arc::new(config),
            ctx: Arc::new(ctx),
            active: Mutex::new(None),
        })
    }

    /// Starts indexing all configured sites in the background
    ///
    /// Every site is registered and reset to QUEUED before the first one is
    /// crawled. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `Conflict` if a run is already active, `Config` if no sites are
    /// configured.
    pub fn start_indexing(&self) -> Result<()> {
        if self.config.sites.is_empty() {
            return Err(ConfigError::Validation("no sites configured".to_string()).into());
        }

        let mut active = self.registry()?;
        if let Some(run) = active.as_ref().filter(|run| run.is_active()) {
            let message = if run.is_stopping() {
                "Indexing is stopping"
            } else {
                "Indexing is already running"
            };
            return Err(IndexerError::Conflict(message.to_string()));
        }

        let sites = self.register_sites()?;

        let token = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(false);
        let ctx = Arc::clone(&self.ctx);
        let run_token = token.clone();

        let handle = tokio::spawn(async move {
            run_sites(ctx, sites, run_token).await;
            let _ = finished_tx.send(true);
        });

        info!("Indexing started for {} sites", self.config.sites.len());
        *active = Some(ActiveRun {
            token,
            handle: Some(handle),
            finished: finished_rx,
        });
        Ok(())
    }

    /// Stops the active run
    ///
    /// Cancels the run, waits up to the configured grace period for it to
    /// wind down, aborts it if it has not, and finally marks any site still
    /// INDEXING as FAILED. The run stays registered until then, so a new
    /// run cannot start while this one drains.
    ///
    /// # Errors
    ///
    /// `Conflict` if no run is active or another stop is in progress.
    pub async fn stop_indexing(&self) -> Result<()> {
        let mut handle = {
            let mut active = self.registry()?;
            let run = match active.as_mut() {
                Some(run) if run.is_active() => run,
                _ => {
                    return Err(IndexerError::Conflict(
                        "Indexing is not running".to_string(),
                    ))
                }
            };
            let Some(handle) = run.handle.take() else {
                return Err(IndexerError::Conflict(
                    "Indexing is already stopping".to_string(),
                ));
            };
            run.token.cancel();
            handle
        };

        info!("Stopping indexing");

        let grace = Duration::from_secs(self.config.indexing.stop_grace_secs);
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Indexing task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Indexing did not stop within {}s, aborting",
                    grace.as_secs()
                );
                handle.abort();
                let _ = handle.await;
            }
        }

        let marked = self.fail_indexing_sites();
        *self.registry()? = None;
        marked?;

        info!("Indexing stopped");
        Ok(())
    }

    /// Fetches and (re)indexes a single page of a known site
    ///
    /// Returns the new page ID. The site's status is left unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` if the site does not exist, `OutsideSite` if the URL does
    /// not belong to it, `Fetch` if the page cannot be retrieved.
    pub async fn process_page(&self, url: &str, site_id: i64) -> Result<i64> {
        let site = storage::lock(&self.ctx.storage)?
            .get_site(site_id)?
            .ok_or_else(|| IndexerError::NotFound(format!("site {} not found", site_id)))?;

        let root = normalize_url(&site.url)?;
        let scope = SiteScope::new(root, self.ctx.allowlist.clone())?;
        let target = normalize_url(url)?;
        if !scope.contains(&target) {
            return Err(IndexerError::OutsideSite {
                url: url.to_string(),
                site: site.url,
            });
        }

        let page = self.ctx.fetcher.fetch(&target).await?;
        let analysis = analyze_page(Arc::clone(&self.ctx.lemmatizer), &page).await?;

        let path = page_path(&target);
        let page_id = self.ctx.index.replace_page(
            site_id,
            &path,
            page.status,
            &page.body,
            &analysis.lemmas,
        )?;

        info!(
            "Indexed {} as page {} ({} lemmas)",
            target,
            page_id,
            analysis.lemmas.len()
        );
        Ok(page_id)
    }

    /// Waits for the active run, if any, to finish
    pub async fn wait(&self) -> Result<()> {
        let finished = match self.registry()?.as_ref() {
            Some(run) => run.finished.clone(),
            None => return Ok(()),
        };

        let mut finished = finished;
        // A dropped sender means the run task was aborted
        let _ = finished.wait_for(|done| *done).await;
        Ok(())
    }

    /// Marks every site still INDEXING as cancelled
    fn fail_indexing_sites(&self) -> Result<()> {
        let sites = storage::lock(&self.ctx.storage)?.list_sites()?;
        for site in sites.iter().filter(|s| s.status == SiteStatus::Indexing) {
            self.ctx.tracker.fail(site.id, CANCELLED_MESSAGE)?;
        }
        Ok(())
    }

    /// Returns true while a run is active or being stopped
    pub fn is_running(&self) -> bool {
        self.registry()
            .map(|active| active.as_ref().is_some_and(ActiveRun::is_active))
            .unwrap_or(false)
    }

    /// Registers the configured sites and resets each to a fresh cycle
    fn register_sites(&self) -> Result<Vec<(i64, SiteScope)>> {
        let mut sites = Vec::with_capacity(self.config.sites.len());

        for entry in &self.config.sites {
            let root = normalize_url(&entry.url)?;
            let site_id =
                storage::lock(&self.ctx.storage)?.upsert_site(root.as_str(), entry.name.as_deref())?;
            self.ctx.tracker.reset(site_id)?;

            sites.push((site_id, SiteScope::new(root, self.ctx.allowlist.clone())?));
        }

        Ok(sites)
    }

    fn registry(&self) -> Result<std::sync::MutexGuard<'_, Option<ActiveRun>>> {
        self.active
            .lock()
            .map_err(|_| IndexerError::Task("controller state lock poisoned".to_string()))
    }
}

/// Indexes sites one after another until done or cancelled
///
/// Sites not yet started when the run is cancelled stay QUEUED.
async fn run_sites(ctx: Arc<CrawlContext>, sites: Vec<(i64, SiteScope)>, token: CancellationToken) {
    for (site_id, scope) in sites {
        if token.is_cancelled() {
            info!("Run cancelled before site {} started", site_id);
            break;
        }

        let mut session = CrawlSession::new(Arc::clone(&ctx), site_id, scope, token.child_token());
        let state = session.run().await;
        if !state.is_finished() {
            error!("Session for site {} ended in state {:?}", site_id, state);
        }
    }

    info!("Indexing run finished");
}
