//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients from the `[fetcher]` configuration
//! - GET requests to fetch page content
//! - Error classification
//!
//! Every request is a single attempt; callers decide what a failure means.

use crate::config::FetcherConfig;
use crate::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A successfully retrieved page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status: u16,
    /// Content-Type header value (empty if absent)
    pub content_type: String,
    /// Page body content
    pub body: String,
}

impl FetchedPage {
    /// Returns true if the body should be parsed as an HTML document
    pub fn is_html(&self) -> bool {
        let content_type = self.content_type.to_ascii_lowercase();
        content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("application/xhtml")
    }
}

/// Builds an HTTP client with the configured identity and limits
///
/// # Example
///
/// ```no_run
/// use lemma_indexer::config::FetcherConfig;
/// use lemma_indexer::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Some(referrer) = &config.referrer {
        match HeaderValue::from_str(referrer) {
            Ok(value) => {
                headers.insert(REFERER, value);
            }
            Err(_) => warn!("Ignoring referrer that is not a valid header value: {}", referrer),
        }
    }

    if config.accept_invalid_certs {
        warn!("TLS certificate validation is DISABLED for all fetches");
    }

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .redirect(Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Retrieves pages over HTTP(S)
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetches a URL
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Non-2xx status | `FetchError::Status` |
    /// | Timeout | `FetchError::Timeout` |
    /// | Connection, TLS or redirect failure | `FetchError::Network` |
    /// | Unreadable body | `FetchError::Body` |
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn classify(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else if error.is_redirect() {
        FetchError::Network {
            url: url.to_string(),
            message: "Too many redirects".to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
