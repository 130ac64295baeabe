use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::connection::{AdapterConfig, StorageConfig};

const DEFAULT_CONFIG_PATH: &str = "storage.toml";

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from `STORAGE_CONFIG` (or `storage.toml`) and the environment.
    pub fn load() -> Result<Self> {
        let config_path =
            env::var("STORAGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load configuration from `config_path` if it exists, overlaid by
    /// `STORAGE_*` environment variables (`STORAGE_STORAGE_URL`,
    /// `STORAGE_LOGGING_LEVEL`, ...).
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = config::Config::builder();

        if config_path.exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(config_path)));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("STORAGE")
                .separator("_")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        Ok(config)
    }

    /// The storage the binary should connect to.
    pub fn storage_config(&self) -> Result<StorageConfig> {
        self.storage.to_runtime()
    }
}

/// Either a connection URL or an explicit adapter table, never both.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub url: Option<String>,
    pub adapter: Option<AdapterConfig>,
}

impl StorageSection {
    pub fn to_runtime(&self) -> Result<StorageConfig> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());

        match (url, &self.adapter) {
            (Some(_), Some(_)) => {
                bail!("storage.url and storage.adapter are mutually exclusive")
            }
            (Some(url), None) => Ok(StorageConfig::Url(url.to_string())),
            (None, Some(adapter)) => Ok(StorageConfig::Adapter(adapter.clone())),
            (None, None) => bail!("either storage.url or storage.adapter must be specified"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}
