use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::provider::Units;

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_COUNTRY: &str = "RU";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// language = "en"
/// units = "imperial"
/// country = "US"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// OpenWeather `appid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Language of condition descriptions, e.g. "ru" or "en".
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub units: Units,

    /// ISO 3166 country code used for city and postal-code lookups.
    #[serde(default = "default_country")]
    pub country: String,

    /// Where weather icons are cached; defaults to the platform cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            language: default_language(),
            units: Units::default(),
            country: default_country(),
            icon_dir: None,
        }
    }
}

impl Config {
    /// Load config from disk (or defaults on first run), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Ok(Self::load_from(&path)?.with_env_overrides(std::env::vars()))
    }

    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    pub(crate) fn with_env_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            if key.as_ref() == API_KEY_ENV {
                let value: String = value.into();
                if !value.trim().is_empty() {
                    self.api_key = Some(value.trim().to_string());
                }
            }
        }
        self
    }

    /// Returns the API key, if present and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key.trim().to_string());
    }

    /// Directory for cached icon files.
    pub fn icon_dir(&self) -> Result<PathBuf> {
        match &self.icon_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("icons")),
        }
    }
}
