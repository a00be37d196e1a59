use crate::config::types::{ArchiveConfig, Config, CrawlerConfig, SectionEntry, UserAgentConfig};
use crate::crawler::SECTION_PARAM;
use crate::storage::layout::section_dir_name;
use crate::url::query_param;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_archive_config(&config.archive)?;
    validate_sections(&config.sections)?;

    if config.metrics.history_path.is_empty() {
        return Err(ConfigError::Validation(
            "history_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_delay < 100 {
        return Err(ConfigError::Validation(format!(
            "request_delay must be >= 100ms, got {}ms",
            config.request_delay
        )));
    }

    if config.items_per_page < 1 {
        return Err(ConfigError::Validation(
            "items_per_page must be >= 1".to_string(),
        ));
    }

    if config.posts_per_page < 1 {
        return Err(ConfigError::Validation(
            "posts_per_page must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates archive, backup and quota settings
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation("root cannot be empty".to_string()));
    }

    if config.backup_dir.is_empty() {
        return Err(ConfigError::Validation(
            "backup_dir cannot be empty".to_string(),
        ));
    }

    let prefix = &config.backup_prefix;
    if prefix.is_empty()
        || prefix.ends_with('-')
        || !prefix
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "backup_prefix must be a non-empty name of alphanumerics, '-' or '_' not ending in '-', got '{}'",
            prefix
        )));
    }

    if !(0.0..=100.0).contains(&config.quota_warning_percent) {
        return Err(ConfigError::Validation(format!(
            "quota_warning_percent must be between 0 and 100, got {}",
            config.quota_warning_percent
        )));
    }

    Ok(())
}

/// Validates section entries: parseable URLs whose section parameter matches the id
fn validate_sections(sections: &[SectionEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in sections {
        if entry.id.is_empty() {
            return Err(ConfigError::Validation(
                "section id cannot be empty".to_string(),
            ));
        }

        if let Err(e) = section_dir_name(&entry.id) {
            return Err(ConfigError::Validation(format!(
                "section '{}' cannot be stored: {}",
                entry.id, e
            )));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "section '{}' is listed more than once",
                entry.id
            )));
        }

        let url = Url::parse(&entry.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid section URL '{}': {}", entry.url, e))
        })?;

        match query_param(&url, SECTION_PARAM) {
            Some(value) if value == entry.id => {}
            Some(value) => {
                return Err(ConfigError::Validation(format!(
                    "section '{}' URL points at section '{}'",
                    entry.id, value
                )))
            }
            None => {
                return Err(ConfigError::Validation(format!(
                    "section '{}' URL is missing the '{}' parameter",
                    entry.id, SECTION_PARAM
                )))
            }
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
