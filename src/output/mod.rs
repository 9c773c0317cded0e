//! Output module for reporting index contents
//!
//! This module handles:
//! - Collecting index statistics from storage
//! - Printing them for the command line

pub mod stats;

pub use stats::{load_statistics, print_statistics, IndexStatistics, SiteSummary};
