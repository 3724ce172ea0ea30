use crate::core::rate::SymbolTable;
use crate::extract::rates::MalformedPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_DOCUMENT_URL: &str = "https://www.stanbicbank.com.gh/static_file/ghana/Downloadable%20Files/Rates/Daily_Forex_Rates.pdf";
pub const DEFAULT_CACHE_FILE: &str = "Daily_Forex_Rates.pdf";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Where the fetched document is cached. Relative paths resolve against
    /// the data directory.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: default_url(),
            cache_file: default_cache_file(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "default_symbols")]
    pub symbols: SymbolTable,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            source: SourceConfig::default(),
            symbols: default_symbols(),
            server: ServerConfig::default(),
            schedule: ScheduleConfig::default(),
            extraction: ExtractionConfig::default(),
            default_currency: default_currency(),
            data_path: None,
        }
    }
}

fn default_url() -> String {
    DEFAULT_DOCUMENT_URL.to_string()
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> usize {
    2
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tick_secs() -> u64 {
    60 * 60
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_symbols() -> SymbolTable {
    [("United States Dollars", "USD")].into_iter().collect()
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("gh", "fxrates", "fxrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("gh", "fxrates", "fxrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Resolved location of the cached rate document.
    pub fn cache_file_path(&self) -> Result<PathBuf> {
        let cache_file = PathBuf::from(&self.source.cache_file);
        if cache_file.is_absolute() {
            return Ok(cache_file);
        }
        Ok(self.default_data_path()?.join(cache_file))
    }

    /// Directory holding the rate store keyspace.
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.default_data_path()?.join("rates"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
