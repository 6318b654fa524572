//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `kiln.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    let content = std::fs::read_to_string(project_dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` from a string.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks required fields and cross-entry consistency.
///
/// Duplicate file declarations inside a package are deliberately not
/// checked here; they are reported by the source classifier with their own
/// diagnostics.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.build.architectures.is_empty() {
        return Err(ConfigError::MissingField("build.architectures".to_string()));
    }
    if config.build.jobs == Some(0) {
        return Err(ConfigError::ValidationError(
            "build.jobs must be at least 1".to_string(),
        ));
    }
    for (index, plugin) in config.plugins.iter().enumerate() {
        if plugin.package.is_empty() {
            return Err(ConfigError::MissingField(format!("plugins[{index}].package")));
        }
        if plugin.extensions.is_empty() && plugin.filenames.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "plugins[{index}].extensions"
            )));
        }
        if let Some(ext) = plugin.extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            return Err(ConfigError::ValidationError(format!(
                "plugins[{index}]: extension `{ext}` must be non-empty and have no leading dot"
            )));
        }
    }
    let mut names = HashSet::new();
    for package in &config.packages {
        if package.name.is_empty() {
            return Err(ConfigError::MissingField("packages.name".to_string()));
        }
        if !names.insert(package.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "package `{}` is declared more than once",
                package.name
            )));
        }
    }
    Ok(())
}
