//! Configuration management for upcrypt

use crate::crypto::KeySize;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Default in-memory threshold: 10KB
pub const DEFAULT_SIZE_THRESHOLD: usize = 10240;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Item storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Max encrypted bytes kept in memory per item
    pub size_threshold: usize,

    /// Directory for temp files (system temp dir if unset)
    pub repository: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            repository: None,
        }
    }
}

/// Encryption configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Key strength for new items
    pub key_size: KeySize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Encryption configuration
    pub encryption: EncryptionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl Config {
    /// Load configuration from a file (YAML or JSON), with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let content = Self::substitute_env_vars(&content)?;

        let mut config: Config = if is_yaml(path_ref) {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Substitute environment variables in config content
    /// Supports ${VAR_NAME} syntax
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| Error::Config(format!("Invalid substitution pattern: {}", e)))?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            if let Ok(value) = std::env::var(&cap[1]) {
                result = result.replace(&cap[0], &value);
            }
        }

        Ok(result)
    }

    /// Apply `UPCRYPT_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threshold) = lookup("UPCRYPT_SIZE_THRESHOLD") {
            match threshold.trim().parse::<usize>() {
                Ok(size) => self.storage.size_threshold = size,
                Err(_) => warn!("Ignoring invalid UPCRYPT_SIZE_THRESHOLD: {}", threshold),
            }
        }

        if let Some(repository) = lookup("UPCRYPT_REPOSITORY") {
            let repository = repository.trim();
            if !repository.is_empty() {
                self.storage.repository = Some(PathBuf::from(repository));
            }
        }

        if let Some(key_size) = lookup("UPCRYPT_KEY_SIZE") {
            match key_size.parse::<KeySize>() {
                Ok(size) => self.encryption.key_size = size,
                Err(e) => warn!("Ignoring UPCRYPT_KEY_SIZE: {}", e),
            }
        }

        if let Some(level) = lookup("UPCRYPT_LOG_LEVEL") {
            let level = level.trim();
            if !level.is_empty() {
                self.logging.level = level.to_string();
            }
        }
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        std::fs::write(path_ref, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(repository) = &self.storage.repository {
            if repository.exists() && !repository.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "Repository is not a directory: {}",
                    repository.display()
                )));
            }
        }

        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            Error::InvalidConfig(format!("Invalid log level '{}': {}", self.logging.level, e))
        })?;

        Ok(())
    }

    /// Ensure the repository directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(repository) = &self.storage.repository {
            std::fs::create_dir_all(repository)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.storage.size_threshold, DEFAULT_SIZE_THRESHOLD);
        assert!(config.storage.repository.is_none());
        assert_eq!(config.encryption.key_size, KeySize::Aes128);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "storage": { "size_threshold": 4096 }, "encryption": { "key_size": "aes256" } }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.storage.size_threshold, 4096);
        assert_eq!(config.encryption.key_size, KeySize::Aes256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        let yaml = format!(
            "storage:\n  size_threshold: 512\n  repository: {}\nlogging:\n  level: debug\n",
            temp.path().display()
        );
        std::fs::write(&path, yaml).unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.storage.size_threshold, 512);
        assert_eq!(config.storage.repository.as_deref(), Some(temp.path()));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.size_threshold = 99;
        config.encryption.key_size = KeySize::Aes192;

        for name in ["saved.json", "saved.yml"] {
            let path = temp.path().join(name);
            config.save(&path).unwrap();

            let loaded = Config::load(&path).unwrap();
            assert_eq!(loaded.storage.size_threshold, 99);
            assert_eq!(loaded.encryption.key_size, KeySize::Aes192);
        }
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("UPCRYPT_TEST_SUBST_LEVEL", "warn");
        let substituted =
            Config::substitute_env_vars(r#"{"level": "${UPCRYPT_TEST_SUBST_LEVEL}"}"#).unwrap();
        assert_eq!(substituted, r#"{"level": "warn"}"#);

        // Unknown variables are left alone
        let untouched = Config::substitute_env_vars("${UPCRYPT_TEST_NOT_SET_ANYWHERE}").unwrap();
        assert_eq!(untouched, "${UPCRYPT_TEST_NOT_SET_ANYWHERE}");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("UPCRYPT_SIZE_THRESHOLD", " 2048 "),
            ("UPCRYPT_REPOSITORY", "/var/tmp/uploads"),
            ("UPCRYPT_KEY_SIZE", "256"),
            ("UPCRYPT_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.size_threshold, 2048);
        assert_eq!(
            config.storage.repository,
            Some(PathBuf::from("/var/tmp/uploads"))
        );
        assert_eq!(config.encryption.key_size, KeySize::Aes256);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "UPCRYPT_SIZE_THRESHOLD" => Some("lots".to_string()),
            "UPCRYPT_KEY_SIZE" => Some("1024".to_string()),
            _ => None,
        });

        assert_eq!(config.storage.size_threshold, DEFAULT_SIZE_THRESHOLD);
        assert_eq!(config.encryption.key_size, KeySize::Aes128);
    }

    #[test]
    fn test_repository_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let mut config = Config::default();
        config.storage.repository = Some(file);

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "upcrypt=notalevel".to_string();

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_ensure_directories() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.repository = Some(temp.path().join("nested").join("uploads"));

        config.ensure_directories().unwrap();
        assert!(temp.path().join("nested").join("uploads").is_dir());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load("/definitely/not/here/upcrypt.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
