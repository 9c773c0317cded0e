use crate::config::types::{Config, IndexingConfig, SiteEntry, StorageConfig};
use crate::url::is_allowed;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_indexing_config(&config.indexing)?;
    validate_storage_config(&config.storage)?;

    if config.fetcher.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    for domain in &config.allowlist.domains {
        validate_domain_pattern(domain)?;
    }

    validate_sites(&config.sites, &config.allowed_domains())?;
    Ok(())
}

fn validate_indexing_config(config: &IndexingConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 256 {
        return Err(ConfigError::Validation(format!(
            "pool_size must be between 1 and 256, got {}",
            config.pool_size
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.max_pages_per_site < 1 {
        return Err(ConfigError::Validation(
            "max_pages_per_site must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_sites(sites: &[SiteEntry], allowlist: &[String]) -> Result<(), ConfigError> {
    for site in sites {
        let url = Url::parse(&site.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site URL '{}': {}", site.url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Site URL '{}' must use http or https",
                site.url
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Site URL '{}' has no host", site.url)))?;

        if !is_allowed(allowlist, host) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' is not covered by the allow-list",
                site.url
            )));
        }
    }

    Ok(())
}

/// Validates an allow-list domain (an optional `*.` prefix is tolerated)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}
