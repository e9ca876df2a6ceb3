//! Lazily downloaded condition icons.
//!
//! Icons live at `{base}/{category}{period}{resolution}.png` on the provider's
//! CDN and are kept in a local directory once fetched.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::model::{PartOfDay, WeatherCondition};

pub const ICON_BASE_URL: &str = "https://openweathermap.org/img/wn";

/// Every icon category the provider publishes.
pub const ICON_CATEGORIES: [&str; 9] = ["01", "02", "03", "04", "09", "10", "11", "13", "50"];

#[derive(Debug, Error)]
pub enum IconError {
    #[error("unknown icon identifier '{0}'")]
    UnknownIcon(String),

    #[error("failed to download {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("icon storage failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Icon identifier as sent in [`WeatherCondition::icon`], e.g. `"10n"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconKey {
    category: String,
    period: PartOfDay,
}

impl IconKey {
    pub fn new(category: &str, period: PartOfDay) -> Result<Self, IconError> {
        if category.len() != 2 || !category.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IconError::UnknownIcon(format!("{category}{}", period.suffix())));
        }
        Ok(Self {
            category: category.to_string(),
            period,
        })
    }

    pub fn for_condition(condition: &WeatherCondition) -> Result<Self, IconError> {
        condition.icon.parse()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn period(&self) -> PartOfDay {
        self.period
    }
}

impl FromStr for IconKey {
    type Err = IconError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unknown = || IconError::UnknownIcon(value.to_string());

        let (category, period) = match value.char_indices().nth(2) {
            Some((split, _)) => value.split_at(split),
            None => return Err(unknown()),
        };
        let period = match period {
            "d" => PartOfDay::Day,
            "n" => PartOfDay::Night,
            _ => return Err(unknown()),
        };

        Self::new(category, period).map_err(|_| unknown())
    }
}

impl fmt::Display for IconKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.category, self.period.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resolution {
    /// 50x50
    #[default]
    Standard,
    /// 100x100, the `@2x` variant.
    Double,
}

impl Resolution {
    pub fn suffix(self) -> &'static str {
        match self {
            Resolution::Standard => "",
            Resolution::Double => "@2x",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IconStore {
    dir: PathBuf,
    base_url: String,
    http: Client,
}

impl IconStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_base_url(dir, ICON_BASE_URL)
    }

    pub fn with_base_url(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(key: &IconKey, resolution: Resolution) -> String {
        format!("{key}{}.png", resolution.suffix())
    }

    pub fn url(&self, key: &IconKey, resolution: Resolution) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            Self::file_name(key, resolution)
        )
    }

    pub fn path(&self, key: &IconKey, resolution: Resolution) -> PathBuf {
        self.dir.join(Self::file_name(key, resolution))
    }

    /// Local path of the icon, downloading it first if it isn't stored yet.
    pub async fn fetch(&self, key: &IconKey, resolution: Resolution) -> Result<PathBuf, IconError> {
        let path = self.path(key, resolution);
        let stored = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| IconError::Io { path: path.clone(), source })?;
        if stored {
            tracing::debug!(icon = %key, "icon already stored");
            return Ok(path);
        }

        let url = self.url(key, resolution);
        tracing::debug!(%url, "downloading icon");

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| IconError::Request { url: url.clone(), source })?;

        let status = res.status();
        if !status.is_success() {
            return Err(IconError::Status { url, status });
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|source| IconError::Request { url: url.clone(), source })?;

        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Make sure every category is stored for both day and night.
    pub async fn prefetch_all(&self, resolution: Resolution) -> Result<Vec<PathBuf>, IconError> {
        let mut paths = Vec::with_capacity(ICON_CATEGORIES.len() * 2);
        for category in ICON_CATEGORIES {
            for period in [PartOfDay::Day, PartOfDay::Night] {
                let key = IconKey::new(category, period)?;
                paths.push(self.fetch(&key, resolution).await?);
            }
        }
        Ok(paths)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IconError> {
    let io = |source| IconError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    tokio::fs::write(&tmp_path, bytes).await.map_err(io)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io)?;
    Ok(())
}
