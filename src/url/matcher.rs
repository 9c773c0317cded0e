/// Checks if a host is covered by an allow-listed domain
///
/// Matching is by suffix on label boundaries: `example.com` covers
/// `example.com` itself and every subdomain of it, but not `badexample.com`.
/// A leading `*.` on the pattern is accepted and ignored.
///
/// # Examples
///
/// ```
/// use lemma_indexer::url::matches_suffix;
///
/// assert!(matches_suffix("example.com", "example.com"));
/// assert!(matches_suffix("example.com", "blog.example.com"));
/// assert!(matches_suffix("*.example.com", "api.v2.example.com"));
/// assert!(!matches_suffix("example.com", "badexample.com"));
/// ```
pub fn matches_suffix(pattern: &str, candidate: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    let base = base.trim_end_matches('.').to_lowercase();
    let candidate = candidate.trim_end_matches('.').to_lowercase();

    candidate == base || candidate.ends_with(&format!(".{}", base))
}

/// Checks a host against a whole allow-list
pub fn is_allowed<S: AsRef<str>>(allowlist: &[S], host: &str) -> bool {
    allowlist
        .iter()
        .any(|pattern| matches_suffix(pattern.as_ref(), host))
}
