//! State module for tracking indexing progress
//!
//! # Components
//!
//! - `SiteStatus`: Persisted lifecycle of a site (queued, indexing, indexed, failed)
//! - `SessionState`: In-memory state of one crawl session
//! - `SiteTracker`: Applies status transitions to the store

mod site_status;
mod tracker;

// Re-export main types
pub use site_status::{SessionState, SiteStatus};
pub use tracker::SiteTracker;
