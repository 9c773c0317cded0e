use serde::Deserialize;

/// Default excluded grammatical categories: conjunctions, interjections,
/// prepositions and particles
pub const DEFAULT_EXCLUDED_TAGS: &[&str] = &["СОЮЗ", "МЕЖД", "ПРЕДЛ", "ЧАСТ"];

/// Main configuration structure for Lemma-Indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub lemmatizer: LemmatizerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub allowlist: AllowlistConfig,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

impl Config {
    /// The effective allow-list: the configured domains, or the hosts of the
    /// configured sites when none are given
    pub fn allowed_domains(&self) -> Vec<String> {
        if !self.allowlist.domains.is_empty() {
            return self.allowlist.domains.clone();
        }

        self.sites
            .iter()
            .filter_map(|site| url::Url::parse(&site.url).ok())
            .filter_map(|url| crate::url::extract_domain(&url))
            .collect()
    }
}

/// Crawl session behavior
#[derive(Debug, Clone, Deserialize)]
pub struct IndexingConfig {
    /// Number of concurrent fetch-and-index work units per session
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: u32,

    /// Lower bound of the politeness delay before each fetch (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the politeness delay before each fetch (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum number of pages fetched per site in one session
    #[serde(rename = "max-pages-per-site", default = "default_max_pages")]
    pub max_pages_per_site: u32,

    /// Maximum link depth from the site root
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// How long a stop request waits for in-flight work before aborting it
    #[serde(rename = "stop-grace-secs", default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_pages_per_site: default_max_pages(),
            max_depth: default_max_depth(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Value sent in the Referer header, if any
    #[serde(default = "default_referrer")]
    pub referrer: Option<String>,

    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Disables TLS certificate and hostname validation. Off unless set.
    #[serde(rename = "accept-invalid-certs", default)]
    pub accept_invalid_certs: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referrer: default_referrer(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            accept_invalid_certs: false,
        }
    }
}

/// Lemmatizer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LemmatizerConfig {
    /// Grammatical tags whose words are dropped
    #[serde(rename = "excluded-tags", default = "default_excluded_tags")]
    pub excluded_tags: Vec<String>,
}

impl Default for LemmatizerConfig {
    fn default() -> Self {
        Self {
            excluded_tags: default_excluded_tags(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Allow-listed domains, suffix-matched against link hosts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowlistConfig {
    #[serde(default)]
    pub domains: Vec<String>,
}

/// A site to index
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Root URL the crawl starts from
    pub url: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
}

fn default_pool_size() -> u32 {
    8
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_pages() -> u32 {
    10_000
}

fn default_max_depth() -> u32 {
    32
}

fn default_stop_grace_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("LemmaIndexer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_referrer() -> Option<String> {
    Some("http://www.google.com".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

fn default_excluded_tags() -> Vec<String> {
    DEFAULT_EXCLUDED_TAGS.iter().map(|s| s.to_string()).collect()
}

fn default_database_path() -> String {
    "./lemma-index.db".to_string()
}
