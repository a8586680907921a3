//! Configuration file loading and validation.

use crate::env::apply_env_overrides;
use crate::error::ConfigError;
use crate::types::{CacheSettings, XrcacheConfig};
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "xrcache.toml";

/// Largest accepted `filename_hash_digits` (a full SHA-256 hex digest).
const MAX_FILENAME_HASH_DIGITS: usize = 64;

/// Loads and validates `xrcache.toml` from a project directory.
///
/// A missing file is not an error: defaults are returned instead.
pub fn load_config(project_dir: &Path) -> Result<XrcacheConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(XrcacheConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates an `xrcache.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<XrcacheConfig, ConfigError> {
    let config: XrcacheConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_settings(&config.cache)?;
    Ok(config)
}

/// Loads the cache settings for a project directory with environment
/// overrides from the process environment applied.
pub fn load_settings(project_dir: &Path) -> Result<CacheSettings, ConfigError> {
    let config = load_config(project_dir)?;
    let settings = apply_env_overrides(config.cache, |name| std::env::var(name).ok())?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Validates that configuration values are usable.
pub(crate) fn validate_settings(settings: &CacheSettings) -> Result<(), ConfigError> {
    if settings.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.dir must not be empty".to_string(),
        ));
    }
    if settings.filename_hash_digits == 0
        || settings.filename_hash_digits > MAX_FILENAME_HASH_DIGITS
    {
        return Err(ConfigError::ValidationError(format!(
            "cache.filename_hash_digits must be in 1..={MAX_FILENAME_HASH_DIGITS}, got {}",
            settings.filename_hash_digits
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.cache.dir, PathBuf::from("cache"));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.filename_hash_digits, 3);
        assert!(!config.cache.verbose);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
dir = ".xrcache"
enabled = false
filename_hash_digits = 8
verbose = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.dir, PathBuf::from(".xrcache"));
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.filename_hash_digits, 8);
        assert!(config.cache.verbose);
    }

    #[test]
    fn reject_zero_digits() {
        let toml = "[cache]\nfilename_hash_digits = 0\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn reject_too_many_digits() {
        let toml = "[cache]\nfilename_hash_digits = 65\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("got 65"));
    }

    #[test]
    fn reject_empty_dir() {
        let toml = "[cache]\ndir = \"\"\n";
        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn reject_unknown_field() {
        let toml = "[cache]\nmax_size = 10\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn reject_malformed_toml() {
        let err = load_config_from_str("[cache\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[cache]\ndir = \"results\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("results"));
    }
}
