//! Configuration module for Lemma-Indexer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use lemma_indexer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("indexer.toml")).unwrap();
//! println!("Worker pool size: {}", config.indexing.pool_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AllowlistConfig, Config, FetcherConfig, IndexingConfig, LemmatizerConfig, SiteEntry,
    StorageConfig, DEFAULT_EXCLUDED_TAGS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
