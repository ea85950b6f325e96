//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ARCHIVIST_CONFIG` (environment variable)
//! 2. `~/.config/archivist/config.toml` (Linux/macOS)
//!    `%APPDATA%\archivist\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::meta::MetaOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Meta-index tuning.
    pub index: IndexConfig,
    /// Contact listing defaults.
    pub contacts: ContactsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override the directory holding the store, index and log.
    pub data_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Meta-index tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum snippet length in characters.
    pub snippet_max_chars: usize,
    /// Page size used when counting query results.
    pub count_batch_size: usize,
    /// Threads returned per search page when none is requested.
    pub default_page_size: usize,
    /// Number of decoded message records kept in memory.
    pub record_cache_size: usize,
}

/// Contact listing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsConfig {
    /// Contacts returned when no limit is given.
    pub default_limit: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snippet_max_chars: 100,
            count_batch_size: 1000,
            default_page_size: 20,
            record_cache_size: 256,
        }
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

impl IndexConfig {
    pub fn meta_options(&self) -> MetaOptions {
        MetaOptions {
            snippet_max_chars: self.snippet_max_chars,
            count_batch_size: self.count_batch_size.max(1),
            record_cache_size: self.record_cache_size.max(1),
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("ARCHIVIST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("archivist").join("config.toml"))
}

/// Return the data directory holding the store, index and log.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("archivist")
}

pub fn store_path(config: &Config) -> PathBuf {
    data_dir(config).join("store.bin")
}

pub fn index_path(config: &Config) -> PathBuf {
    data_dir(config).join("index.bin")
}

/// Return the log file name inside [`data_dir`].
pub fn log_file_name() -> &'static str {
    "archivist.log"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.index.snippet_max_chars, 100);
        assert_eq!(cfg.index.count_batch_size, 1000);
        assert_eq!(cfg.contacts.default_limit, 20);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[general]
data_dir = "/tmp/mail"

[index]
count_batch_size = 50
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.general.data_dir, Some(PathBuf::from("/tmp/mail")));
        assert_eq!(cfg.index.count_batch_size, 50);
        // Other fields use defaults
        assert_eq!(cfg.index.snippet_max_chars, 100);
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(store_path(&cfg), PathBuf::from("/tmp/mail/store.bin"));
    }

    #[test]
    fn test_meta_options_clamp_zero_sizes() {
        let cfg = IndexConfig {
            count_batch_size: 0,
            record_cache_size: 0,
            ..Default::default()
        };
        let opts = cfg.meta_options();
        assert_eq!(opts.count_batch_size, 1);
        assert_eq!(opts.record_cache_size, 1);
    }

    #[test]
    fn test_save_then_load_from_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        std::env::set_var("ARCHIVIST_CONFIG", &path);

        let mut cfg = Config::default();
        cfg.contacts.default_limit = 7;
        save_config(&cfg).unwrap();
        assert!(path.exists());
        assert_eq!(load_config().contacts.default_limit, 7);

        std::env::remove_var("ARCHIVIST_CONFIG");
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.index.default_page_size, cfg.index.default_page_size);
    }
}
