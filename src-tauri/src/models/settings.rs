// Settings data models
use crate::file_manager::{read_json_file_or_default, write_json_file, StoreError};
use crate::table::PAGE_SIZE_OPTIONS;
use crate::utils::get_fallback_downloads_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides `api_base_url` at load time
pub const API_URL_ENV: &str = "SILICON_CONSOLE_API_URL";
pub const DEFAULT_API_BASE_URL: &str = "https://localhost:8443";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid API base URL {url:?}: {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("page size must be 5, 10 or 25, got {0}")]
    InvalidPageSize(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_page_size() -> usize {
    crate::table::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default)]
    pub download_path: Option<String>,
    #[serde(default)]
    pub report_catalog_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_page_size: default_page_size(),
            download_path: None,
            report_catalog_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsParams {
    pub api_base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub default_page_size: Option<usize>,
    pub download_path: Option<String>,
    pub report_catalog_path: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Where run archives and report exports are written
    pub fn download_dir(&self) -> PathBuf {
        self.download_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(get_fallback_downloads_dir)
    }

    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.and_then(non_empty) {
            log::info!("API base URL overridden by {}: {}", API_URL_ENV, url);
            self.api_base_url = url;
        }
        self
    }

    /// Apply a partial update; empty strings clear the optional paths
    pub fn apply(&mut self, params: UpdateSettingsParams) -> Result<(), SettingsError> {
        if let Some(url) = params.api_base_url {
            let url = url.trim().to_string();
            Url::parse(&url).map_err(|source| SettingsError::InvalidApiUrl {
                url: url.clone(),
                source,
            })?;
            self.api_base_url = url;
        }
        if let Some(interval) = params.poll_interval_ms {
            self.poll_interval_ms = interval.max(MIN_POLL_INTERVAL_MS);
        }
        if let Some(size) = params.default_page_size {
            if !PAGE_SIZE_OPTIONS.contains(&size) {
                return Err(SettingsError::InvalidPageSize(size));
            }
            self.default_page_size = size;
        }
        if let Some(path) = params.download_path {
            self.download_path = non_empty(path);
        }
        if let Some(path) = params.report_catalog_path {
            self.report_catalog_path = non_empty(path);
        }
        Ok(())
    }
}

/// Read settings from disk (defaults when the file is missing) and apply the env override
pub fn load_settings(path: &Path) -> Result<Settings, StoreError> {
    let settings: Settings = read_json_file_or_default(path)?;
    Ok(settings.with_api_url_override(std::env::var(API_URL_ENV).ok()))
}

pub fn update_settings_file(
    path: &Path,
    params: UpdateSettingsParams,
) -> Result<Settings, SettingsError> {
    let mut settings: Settings = read_json_file_or_default(path)?;
    settings.apply(params)?;
    write_json_file(path, &settings)?;
    log::info!("Settings updated");
    Ok(settings.with_api_url_override(std::env::var(API_URL_ENV).ok()))
}
