//! One crawl of one site
//!
//! A session walks the site as a tree of tasks: each visited page spawns a
//! child task per new same-site link and waits for all of them before
//! returning. Concurrency is bounded by a worker semaphore whose permit is
//! held only while a page is fetched and indexed, never while a parent
//! waits for its children.

use crate::crawler::parser::parse_html;
use crate::crawler::{CrawlContext, FetchedPage};
use crate::lemma::{strip_html, Lemmatizer};
use crate::state::SessionState;
use crate::storage::{self, Storage};
use crate::url::{normalize_url, page_path, SiteScope};
use crate::{IndexerError, Result};
use dashmap::DashSet;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Error recorded on a site whose crawl was stopped by the operator
pub const CANCELLED_MESSAGE: &str = "Indexing cancelled by operator";

type VisitFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Lemmas and outbound links of one fetched page
pub struct PageAnalysis {
    pub lemmas: HashMap<String, u32>,
    pub links: Vec<Url>,
}

/// Extracts text and links from a fetched page and lemmatizes the text
///
/// Runs on the blocking pool since both HTML parsing and lemmatization are
/// CPU-bound.
pub async fn analyze_page(lemmatizer: Arc<Lemmatizer>, page: &FetchedPage) -> Result<PageAnalysis> {
    let body = page.body.clone();
    let base = page.url.clone();
    let is_html = page.is_html();

    tokio::task::spawn_blocking(move || {
        if is_html {
            let parsed = parse_html(&body, &base);
            PageAnalysis {
                lemmas: lemmatizer.extract_lemmas(&parsed.text),
                links: parsed.links,
            }
        } else {
            PageAnalysis {
                lemmas: lemmatizer.extract_lemmas(&strip_html(&body)),
                links: Vec::new(),
            }
        }
    })
    .await
    .map_err(|e| IndexerError::Task(format!("lemmatization task failed: {}", e)))
}

/// Crawl of a single site
pub struct CrawlSession {
    inner: Arc<SessionInner>,
    state: SessionState,
}

struct SessionInner {
    ctx: Arc<CrawlContext>,
    site_id: i64,
    scope: SiteScope,
    token: CancellationToken,
    workers: Semaphore,
    claimed: DashSet<String>,
    scheduled: AtomicUsize,
    cancel_recorded: AtomicBool,
}

impl CrawlSession {
    pub fn new(
        ctx: Arc<CrawlContext>,
        site_id: i64,
        scope: SiteScope,
        token: CancellationToken,
    ) -> Self {
        let workers = Semaphore::new(ctx.indexing.pool_size.max(1) as usize);
        Self {
            inner: Arc::new(SessionInner {
                ctx,
                site_id,
                scope,
                token,
                workers,
                claimed: DashSet::new(),
                scheduled: AtomicUsize::new(0),
                cancel_recorded: AtomicBool::new(false),
            }),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Crawls the site from its root and records the outcome
    ///
    /// The site must be QUEUED. It ends INDEXED on completion and FAILED on
    /// a fatal error or cancellation.
    ///
    /// A session runs once; calling `run` again returns the final state
    /// without crawling.
    pub async fn run(&mut self) -> SessionState {
        if self.state != SessionState::Idle {
            return self.state;
        }

        let inner = Arc::clone(&self.inner);
        let site_id = inner.site_id;
        let root = inner.scope.root().clone();

        if let Err(e) = inner.ctx.tracker.begin(site_id) {
            error!("Cannot start indexing site {}: {}", site_id, e);
            self.state = SessionState::Failed;
            return self.state;
        }
        self.state = SessionState::Running;
        info!("Indexing site {} from {}", site_id, root);

        inner.claimed.insert(page_path(&root));
        inner.scheduled.fetch_add(1, Ordering::SeqCst);

        let result = visit(Arc::clone(&inner), root, 0).await;

        let state = if inner.token.is_cancelled() {
            inner.mark_cancelled();
            SessionState::Cancelled
        } else {
            match result {
                Ok(()) => match inner.ctx.tracker.complete(site_id) {
                    Ok(()) => SessionState::Completed,
                    Err(e) => {
                        error!("Failed to mark site {} indexed: {}", site_id, e);
                        SessionState::Failed
                    }
                },
                Err(e) => {
                    error!("Indexing of site {} failed: {}", site_id, e);
                    if let Err(track_err) = inner.ctx.tracker.fail(site_id, &e.to_string()) {
                        error!("Failed to mark site {} failed: {}", site_id, track_err);
                    }
                    SessionState::Failed
                }
            }
        };

        info!(
            "Site {} finished as {:?} after {} scheduled pages",
            site_id,
            state,
            inner.scheduled.load(Ordering::SeqCst)
        );
        self.state = state;
        state
    }
}

fn visit(inner: Arc<SessionInner>, url: Url, depth: u32) -> VisitFuture {
    Box::pin(async move {
        if inner.token.is_cancelled() {
            inner.mark_cancelled();
            return Ok(());
        }

        let delay = inner.politeness_delay();
        tokio::select! {
            _ = inner.token.cancelled() => {
                inner.mark_cancelled();
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let links = {
            let _permit = tokio::select! {
                _ = inner.token.cancelled() => {
                    inner.mark_cancelled();
                    return Ok(());
                }
                permit = inner.workers.acquire() => {
                    permit.map_err(|e| IndexerError::Task(e.to_string()))?
                }
            };

            // Queued branches may have waited out a stop request
            if inner.token.is_cancelled() {
                inner.mark_cancelled();
                return Ok(());
            }

            match inner.process(&url, depth).await? {
                Some(links) => links,
                None => return Ok(()),
            }
        };

        if depth >= inner.ctx.indexing.max_depth {
            debug!("Depth limit reached at {}", url);
            return Ok(());
        }

        if inner.token.is_cancelled() {
            inner.mark_cancelled();
            return Ok(());
        }

        let mut children = JoinSet::new();
        for link in links {
            if inner.claim(&link)? {
                children.spawn(visit(Arc::clone(&inner), link, depth + 1));
            }
        }

        // Returning early drops the set, which aborts the remaining children
        while let Some(joined) = children.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(IndexerError::Task(e.to_string())),
            }
        }

        Ok(())
    })
}

impl SessionInner {
    /// Fetches, analyzes and stores one page
    ///
    /// Returns the page's in-scope links, or `None` when the branch ends here.
    async fn process(&self, url: &Url, depth: u32) -> Result<Option<Vec<Url>>> {
        let page = match self.ctx.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) if depth == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                self.ctx.tracker.record_error(self.site_id, &e.to_string())?;
                return Ok(None);
            }
        };

        let analysis = analyze_page(Arc::clone(&self.ctx.lemmatizer), &page).await?;

        // An in-flight fetch finishes, but its page is dropped after a stop
        if self.token.is_cancelled() {
            debug!("Discarding {} fetched after cancellation", url);
            self.mark_cancelled();
            return Ok(None);
        }

        let path = page_path(url);
        let stored = self.ctx.index.store_page(
            self.site_id,
            &path,
            page.status,
            &page.body,
            &analysis.lemmas,
        )?;

        let Some(page_id) = stored else {
            debug!("{} was stored by another branch", path);
            return Ok(None);
        };
        debug!(
            "Indexed {} as page {} ({} lemmas)",
            path,
            page_id,
            analysis.lemmas.len()
        );

        let links = analysis
            .links
            .into_iter()
            .filter_map(|link| normalize_url(link.as_str()).ok())
            .filter(|link| self.scope.contains(link))
            .collect();

        Ok(Some(links))
    }

    /// Claims a link for this session
    ///
    /// A link is claimed at most once per session, is skipped if the site
    /// already has a page at its path, and is refused once the page cap is
    /// reached.
    fn claim(&self, url: &Url) -> Result<bool> {
        let path = page_path(url);
        if !self.claimed.insert(path.clone()) {
            return Ok(false);
        }

        if storage::lock(&self.ctx.storage)?.page_exists(self.site_id, &path)? {
            return Ok(false);
        }

        let cap = self.ctx.indexing.max_pages_per_site as usize;
        if self.scheduled.fetch_add(1, Ordering::SeqCst) >= cap {
            debug!("Page limit reached, not following {}", url);
            return Ok(false);
        }

        Ok(true)
    }

    fn politeness_delay(&self) -> Duration {
        let min = self.ctx.indexing.min_delay_ms;
        let max = self.ctx.indexing.max_delay_ms.max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Marks the site FAILED for cancellation, once per session
    fn mark_cancelled(&self) {
        if self.cancel_recorded.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Indexing of site {} cancelled", self.site_id);
        if let Err(e) = self.ctx.tracker.fail(self.site_id, CANCELLED_MESSAGE) {
            error!("Failed to mark site {} cancelled: {}", self.site_id, e);
        }
    }
}
