//! Configuration validation.

use std::collections::HashSet;

use weft_core::{AccountRecord, PluginRecord};

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, SyncConfig, WeftConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &WeftConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_sync(&config.sync)?;
    validate_accounts(&config.accounts)?;
    validate_plugins(&config.plugins)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: '{module}'"
            )));
        }
    }
    Ok(())
}

fn validate_sync(sync: &SyncConfig) -> ConfigResult<()> {
    if sync.retry_delay_secs == 0 {
        return Err(ConfigError::validation(
            "sync.retry_delay_secs must be greater than 0",
        ));
    }
    if sync.timeout_ms == 0 {
        return Err(ConfigError::validation(
            "sync.timeout_ms must be greater than 0",
        ));
    }
    if sync.timeline_limit == 0 {
        return Err(ConfigError::validation(
            "sync.timeline_limit must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_accounts(accounts: &[AccountRecord]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for account in accounts {
        if !seen.insert(account.user_id.as_str()) {
            return Err(ConfigError::DuplicateAccount(account.user_id.clone()));
        }
        validate_account(account)?;
    }
    Ok(())
}

fn validate_account(account: &AccountRecord) -> ConfigResult<()> {
    if !account.user_id.starts_with('@') || !account.user_id.contains(':') {
        return Err(ConfigError::validation(format!(
            "Invalid user id '{}', expected @localpart:server",
            account.user_id
        )));
    }
    if account.homeserver.is_empty() {
        return Err(ConfigError::missing_field("accounts.homeserver"));
    }
    validate_url(&account.homeserver)
}

fn validate_plugins(plugins: &[PluginRecord]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for plugin in plugins {
        if plugin.id.is_empty() {
            return Err(ConfigError::missing_field("plugins.id"));
        }
        if plugin.plugin_type.is_empty() {
            return Err(ConfigError::missing_field("plugins.type"));
        }
        if !seen.insert(plugin.id.as_str()) {
            return Err(ConfigError::DuplicatePlugin(plugin.id.clone()));
        }
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    const SCHEMES: [&str; 2] = ["http://", "https://"];
    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {SCHEMES:?}"),
        ));
    }
    Ok(())
}
