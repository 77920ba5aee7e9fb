//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use toolchain_components::secrets::StorageCredentials;
use toolchain_components::ChartCatalog;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of toolchain namespaces
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Chart archive configuration
    #[serde(default)]
    pub charts: ChartsConfig,

    /// Backup object store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Teardown configuration
    #[serde(default)]
    pub uninstall: UninstallConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
            charts: ChartsConfig::default(),
            storage: StorageConfig::default(),
            uninstall: UninstallConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Chart archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartsConfig {
    /// Directory holding `<name>-<version>.tgz` archives
    #[serde(default = "default_charts_dir")]
    pub dir: PathBuf,

    /// Time allowed for a release to become ready, in seconds
    #[serde(default = "default_chart_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            dir: default_charts_dir(),
            timeout_secs: default_chart_timeout(),
        }
    }
}

impl ChartsConfig {
    pub fn catalog(&self) -> ChartCatalog {
        ChartCatalog::new(self.dir.clone(), Duration::from_secs(self.timeout_secs))
    }
}

/// Backup object store credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,
}

impl StorageConfig {
    pub fn credentials(&self) -> StorageCredentials {
        StorageCredentials {
            url: self.url.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }
}

/// Teardown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallConfig {
    /// Maximum teardown tasks running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for UninstallConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_namespace_prefix() -> String {
    "ts-toolchain-".to_string()
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

fn default_chart_timeout() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `TOOLCHAIN_`-prefixed environment variables (`__` separates nested
    /// keys, e.g. `TOOLCHAIN_UNINSTALL__MAX_CONCURRENCY`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TOOLCHAIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.namespace_prefix, "ts-toolchain-");
        assert_eq!(config.charts.timeout_secs, 300);
        assert_eq!(config.uninstall.max_concurrency, 8);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_applies_serde_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.charts.catalog().timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "toolchain-engine-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "namespace_prefix = \"tc-\"\n\n[uninstall]\nmax_concurrency = 2\n\n[storage]\nurl = \"s3:https://s3.local/b\"\n",
        )
        .unwrap();

        let config = EngineConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.namespace_prefix, "tc-");
        assert_eq!(config.uninstall.max_concurrency, 2);
        assert_eq!(config.storage.credentials().url, "s3:https://s3.local/b");
        assert_eq!(config.charts.timeout_secs, 300);
    }

    #[test]
    fn test_load_rejects_malformed_value() {
        let path = std::env::temp_dir().join(format!(
            "toolchain-engine-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[uninstall]\nmax_concurrency = \"many\"\n").unwrap();

        let result = EngineConfig::load(path.to_str());
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
