use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use serde::{Deserialize, Serialize};

use crate::jpeg::JpegCarrier;
use crate::synchronized::CoverPolicy;

const APP_DIR: &str = "synced-playlists";

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8888/callback".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Client id of the Spotify app used for the PKCE login.
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<String>,
    #[serde(default)]
    pub cover: CoverConfig,
}

/// Placeholder cover size and the bounds used while provisioning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub width: u32,
    pub height: u32,
    pub upload_attempts: usize,
    pub upload_retry_delay_ms: u64,
    pub poll_attempts: usize,
    pub poll_interval_ms: u64,
}

impl Default for CoverConfig {
    fn default() -> Self {
        let policy = CoverPolicy::default();
        Self {
            width: 3,
            height: 3,
            upload_attempts: policy.upload_attempts,
            upload_retry_delay_ms: policy.upload_retry_delay.as_millis() as u64,
            poll_attempts: policy.poll_attempts,
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: "your-spotify-client-id".to_string(),
            redirect_uri: default_redirect_uri(),
            token_path: None,
            cover: CoverConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join(APP_DIR))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|path| path.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path =
            Self::config_path().ok_or_else(|| eyre!("Could not determine the config directory"))?;

        Self::from_file(&config_path)
    }

    /// Writes the default config to `path`. An existing file is left untouched and
    /// reported as an error.
    pub fn create_default_at(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(eyre!("Config file already exists: {}", path.display()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents =
            toml::to_string_pretty(&Config::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn create_default() -> Result<PathBuf> {
        let path =
            Self::config_path().ok_or_else(|| eyre!("Could not determine the config directory"))?;
        Self::create_default_at(&path)?;
        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(Self::expand_path(path)),
            None => Self::config_dir()
                .map(|dir| dir.join("tokens.json"))
                .ok_or_else(|| eyre!("Could not determine where to store tokens, set token_path")),
        }
    }

    pub fn cover_policy(&self) -> CoverPolicy {
        CoverPolicy {
            upload_attempts: self.cover.upload_attempts.max(1),
            upload_retry_delay: Duration::from_millis(self.cover.upload_retry_delay_ms),
            poll_attempts: self.cover.poll_attempts,
            poll_interval: Duration::from_millis(self.cover.poll_interval_ms),
        }
    }

    pub fn carrier(&self) -> JpegCarrier {
        JpegCarrier::new(self.cover.width, self.cover.height)
    }
}
