//! Site and crawl-session state definitions
use std::fmt;

/// Lifecycle stage of a site's indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    /// Site is registered and its prior data has been cleared
    Queued,

    /// A crawl session is running for the site
    Indexing,

    // ===== Terminal States =====
    /// The last crawl session completed
    Indexed,

    /// The last crawl session failed or was cancelled
    Failed,
}

impl SiteStatus {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed)
    }

    /// Returns true if the tracker may move a site from `self` to `next`
    ///
    /// QUEUED→INDEXING→{INDEXED, FAILED}. FAILED→FAILED is allowed so that
    /// concurrent branches observing cancellation can all record it. Returning
    /// to QUEUED is only possible through a reset, which is not a transition.
    pub fn can_transition_to(&self, next: SiteStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Indexing)
                | (Self::Queued, Self::Failed)
                | (Self::Indexing, Self::Indexed)
                | (Self::Indexing, Self::Failed)
                | (Self::Failed, Self::Failed)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Indexing => "INDEXING",
            Self::Indexed => "INDEXED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "INDEXING" => Some(Self::Indexing),
            "INDEXED" => Some(Self::Indexed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// State of one crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}
