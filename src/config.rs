// Export Configuration Module
// Persistent settings for listing, downloads and API endpoints

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::providers::google_drive::DRIVE_API_BASE;
use crate::providers::onedrive::GRAPH_API_BASE;
use crate::providers::{HttpRetryConfig, MAX_PAGE_SIZE};

/// Upper bound for concurrent leaf downloads
pub const MAX_PARALLEL_DOWNLOADS: usize = 8;

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Entries requested per listing page (1-100)
    pub page_size: u32,
    /// Leaf downloads in flight during an export (1-8)
    pub max_parallel_downloads: usize,
    /// Extra attempts for a leaf failing with a recoverable error
    pub leaf_retries: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// HTTP-level retry on 429/5xx
    pub retry: HttpRetryConfig,
    pub google_api_base: String,
    pub graph_api_base: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_parallel_downloads: 1,
            leaf_retries: 2,
            request_timeout_secs: 60,
            retry: HttpRetryConfig::default(),
            google_api_base: DRIVE_API_BASE.to_string(),
            graph_api_base: GRAPH_API_BASE.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ExportConfig {
    /// Clamp numeric settings into range and check the API base URLs
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.max_parallel_downloads = self.max_parallel_downloads.clamp(1, MAX_PARALLEL_DOWNLOADS);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = 60;
        }

        for base in [&self.google_api_base, &self.graph_api_base] {
            let url = url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("API base {}: {}", base, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!("API base {} must be http(s)", base)));
            }
        }
        Ok(())
    }
}

/// Default location: `<config_dir>/drive-export/config.json`
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("drive-export").join("config.json")
}

/// Load configuration from the default location
pub fn load_config() -> ExportConfig {
    load_config_from(&config_path())
}

/// Load configuration, falling back to defaults on a missing or bad file
pub fn load_config_from(path: &Path) -> ExportConfig {
    if !path.exists() {
        return ExportConfig::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|content| serde_json::from_str::<ExportConfig>(&content).map_err(ConfigError::from))
        .and_then(|mut config| config.validate().map(|_| config));

    match parsed {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default export config: {}", e);
            ExportConfig::default()
        }
    }
}

/// Save configuration to the default location
pub fn save_config(config: &ExportConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &ExportConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Export config saved to {:?}", path);
    Ok(())
}
