//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::SiteConfig;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
///
/// Reads `<project_dir>/kiln.toml`, parses it, validates it, and resolves
/// relative directories against `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<SiteConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    let mut config = load_config_from_str(&content)?;
    config.resolve_paths(project_dir);
    Ok(config)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies. Paths are left as written.
pub fn load_config_from_str(content: &str) -> Result<SiteConfig, ConfigError> {
    let mut config: SiteConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&mut config)?;
    Ok(config)
}

/// Checks aging rules and puts them in increasing `max_age_days` order.
fn validate_config(config: &mut SiteConfig) -> Result<(), ConfigError> {
    if let Some(i) = config.isg.aging.iter().position(|r| r.max_age_days == 0) {
        return Err(ConfigError::ValidationError(format!(
            "isg.aging[{i}].max_age_days must be greater than zero"
        )));
    }
    config.isg.aging.sort_by_key(|r| r.max_age_days);
    if let Some(pair) = config
        .isg
        .aging
        .windows(2)
        .find(|w| w[0].max_age_days == w[1].max_age_days)
    {
        return Err(ConfigError::ValidationError(format!(
            "duplicate aging rule for max_age_days = {}",
            pair[0].max_age_days
        )));
    }
    if config.isg.max_age_cap_days == Some(0) {
        return Err(ConfigError::ValidationError(
            "isg.max_age_cap_days must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
