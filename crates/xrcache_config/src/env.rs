//! Environment variable overrides for cache settings.
//!
//! Overrides are read through a lookup function instead of `std::env`
//! directly, so tests can supply a controlled set of values without
//! mutating the process environment.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::types::CacheSettings;

/// Overrides `cache.dir`.
pub const ENV_DIR: &str = "XRCACHE_DIR";
/// Overrides `cache.enabled` (`1`/`0`, `true`/`false`, `on`/`off`).
pub const ENV_ENABLED: &str = "XRCACHE_ENABLED";
/// Overrides `cache.verbose` (same boolean forms as [`ENV_ENABLED`]).
pub const ENV_VERBOSE: &str = "XRCACHE_VERBOSE";

/// Applies environment overrides on top of file-based settings.
///
/// Unset variables leave the setting untouched; a set but unparseable
/// boolean is a [`ConfigError::ValidationError`].
pub fn apply_env_overrides<F>(
    mut settings: CacheSettings,
    lookup: F,
) -> Result<CacheSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DIR).filter(|d| !d.is_empty()) {
        settings.dir = PathBuf::from(dir);
    }
    if let Some(val) = lookup(ENV_ENABLED) {
        settings.enabled = parse_bool(ENV_ENABLED, &val)?;
    }
    if let Some(val) = lookup(ENV_VERBOSE) {
        settings.verbose = parse_bool(ENV_VERBOSE, &val)?;
    }
    Ok(settings)
}

fn parse_bool(name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ValidationError(format!(
            "invalid {name} value: {val}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn no_variables_keeps_settings() {
        let settings = apply_env_overrides(CacheSettings::default(), lookup_from(&[])).unwrap();
        assert_eq!(settings, CacheSettings::default());
    }

    #[test]
    fn overrides_dir_and_flags() {
        let settings = apply_env_overrides(
            CacheSettings::default(),
            lookup_from(&[(ENV_DIR, "/tmp/xr"), (ENV_ENABLED, "off"), (ENV_VERBOSE, "1")]),
        )
        .unwrap();
        assert_eq!(settings.dir, PathBuf::from("/tmp/xr"));
        assert!(!settings.enabled);
        assert!(settings.verbose);
    }

    #[test]
    fn empty_dir_is_ignored() {
        let settings =
            apply_env_overrides(CacheSettings::default(), lookup_from(&[(ENV_DIR, "")])).unwrap();
        assert_eq!(settings.dir, PathBuf::from("cache"));
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let err = apply_env_overrides(
            CacheSettings::default(),
            lookup_from(&[(ENV_ENABLED, "maybe")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_ENABLED));
    }
}
