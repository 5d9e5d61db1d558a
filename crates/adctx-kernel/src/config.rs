//! Configuration loading from `~/.adctx/config.toml` with defaults and
//! environment overrides.
//!
//! Environment variables win over the file:
//! `ADCTX_DB_PATH` (or `DATABASE_URL` as `sqlite:///path`), `EMBED_PROVIDER`,
//! `EMBED_MODEL`, `ADCTX_AUTOSAVE`, `ADCTX_LOG`.

use adctx_types::config::AdctxConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> AdctxConfig {
    let mut config = read_config_file(path);
    apply_env_overrides(&mut config);
    config
}

/// Load configuration from a TOML file only. A missing, unreadable, or
/// invalid file yields defaults.
pub fn read_config_file(path: Option<&Path>) -> AdctxConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<AdctxConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
    }

    AdctxConfig::default()
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut AdctxConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides<F>(config: &mut AdctxConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("ADCTX_DB_PATH").filter(|v| !v.is_empty()) {
        config.storage.db_path = Some(PathBuf::from(path));
    } else if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
        match sqlite_path_from_url(&url) {
            Some(path) => config.storage.db_path = Some(path),
            None => warn!(url = %url, "DATABASE_URL is not a sqlite URL, ignoring"),
        }
    }

    if let Some(provider) = lookup("EMBED_PROVIDER").filter(|v| !v.is_empty()) {
        config.embedding.provider = provider;
    }
    if let Some(model) = lookup("EMBED_MODEL").filter(|v| !v.is_empty()) {
        config.embedding.model = model;
    }

    if let Some(raw) = lookup("ADCTX_AUTOSAVE") {
        match parse_bool(&raw) {
            Some(enabled) => config.autosave.enabled = enabled,
            None => warn!(value = %raw, "ADCTX_AUTOSAVE is not a boolean, ignoring"),
        }
    }

    if let Some(level) = lookup("ADCTX_LOG").filter(|v| !v.is_empty()) {
        config.log_level = level;
    }
}

/// `sqlite:///abs/path` and `sqlite://rel/path` map to a file path; a bare
/// path is taken as is. Other schemes are rejected.
fn sqlite_path_from_url(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        return (!rest.is_empty()).then(|| PathBuf::from(rest));
    }
    if let Some(rest) = url.strip_prefix("sqlite:") {
        return (!rest.is_empty()).then(|| PathBuf::from(rest));
    }
    (!url.contains("://")).then(|| PathBuf::from(url))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Database path from config, defaulting to `~/.adctx/data.db`.
pub fn resolve_db_path(config: &AdctxConfig) -> PathBuf {
    config
        .storage
        .db_path
        .clone()
        .unwrap_or_else(|| adctx_home().join("data.db"))
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    adctx_home().join("config.toml")
}

/// Get the default adctx home directory.
pub fn adctx_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".adctx")
}
