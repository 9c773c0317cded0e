use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use lemma_indexer::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the page path stored for a URL: its path plus the query string
///
/// # Examples
///
/// ```
/// use url::Url;
/// use lemma_indexer::url::page_path;
///
/// let url = Url::parse("https://example.com/news?id=3").unwrap();
/// assert_eq!(page_path(&url), "/news?id=3");
/// ```
pub fn page_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
