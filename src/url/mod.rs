//! URL handling module for Lemma-Indexer
//!
//! This module provides URL normalization, page-path extraction, allow-list
//! matching and the per-site scope check used while following links.

mod domain;
mod matcher;
mod normalize;

use ::url::Url;

// Re-export main functions
pub use domain::{extract_domain, page_path};
pub use matcher::{is_allowed, matches_suffix};
pub use normalize::normalize_url;

/// The set of URLs that belong to one site
///
/// A URL is in scope when it uses http(s), its host equals the site's host
/// (ignoring a leading `www.`), its port matches, and the host passes the
/// allow-list. An empty allow-list admits any host that equals the site's.
#[derive(Debug, Clone)]
pub struct SiteScope {
    root: Url,
    host: String,
    allowlist: Vec<String>,
}

impl SiteScope {
    /// Creates a scope rooted at the given site URL
    pub fn new(root: Url, allowlist: Vec<String>) -> crate::UrlResult<Self> {
        let host = extract_domain(&root).ok_or(crate::UrlError::MissingDomain)?;
        Ok(Self {
            root,
            host,
            allowlist,
        })
    }

    /// The site's root URL
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Returns true if the URL belongs to this site
    pub fn contains(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let host = match extract_domain(url) {
            Some(h) => h,
            None => return false,
        };

        if strip_www(&host) != strip_www(&self.host) {
            return false;
        }

        if url.port_or_known_default() != self.root.port_or_known_default() {
            return false;
        }

        self.allowlist.is_empty() || is_allowed(&self.allowlist, &host)
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
