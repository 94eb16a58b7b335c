//! Settings file at ~/.shrine-atlas/config.json.
//!
//! Every field has a default, so a partial file (or none at all) works.
//! Command-line flags are applied on top by the binary.

use crate::geo::GeoPoint;
use crate::session::SessionOptions;
use crate::store::{HttpStore, MemoryStore, RecordStore, StoreError};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown timezone '{0}', use an IANA name such as Asia/Tokyo")]
    InvalidTimezone(String),

    #[error("no record store configured: set store_url or dataset")]
    NoStore,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote record store.
    pub store_url: Option<String>,
    /// JSON dataset served from memory instead of the remote store.
    pub dataset: Option<PathBuf>,
    pub offline: bool,
    /// IANA zone that decides what "today" is.
    pub timezone: String,
    pub hidden_zoom: u8,
    pub search_page_size: usize,
    pub fetch_page_size: usize,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
    pub shrine_collection: String,
    pub city_collection: String,
    pub default_center: GeoPoint,
    pub default_zoom: u8,
    pub host: String,
    pub port: u16,
    /// Server sessions unused for this long are dropped.
    pub session_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            dataset: None,
            offline: false,
            timezone: "Asia/Tokyo".into(),
            hidden_zoom: 10,
            search_page_size: 20,
            fetch_page_size: 100,
            max_pages: 50,
            request_timeout_secs: 10,
            shrine_collection: "shrines".into(),
            city_collection: "cities".into(),
            default_center: GeoPoint { lat: 35.6895, lon: 139.6917 },
            default_zoom: 15,
            host: "127.0.0.1".into(),
            port: 8787,
            session_ttl_secs: 1800,
        }
    }
}

impl Config {
    /// Load from the default location; a missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.tz()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shrine-atlas")
            .join("config.json")
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source: std::io::Error| ConfigError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(io)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    /// Today's date in the configured zone.
    pub fn today(&self) -> Result<NaiveDate, ConfigError> {
        Ok(Utc::now().with_timezone(&self.tz()?).date_naive())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            hidden_zoom: self.hidden_zoom,
            shrine_collection: self.shrine_collection.clone(),
            page_size: self.fetch_page_size,
            max_pages: self.max_pages,
        }
    }

    /// The record store this config points at.
    ///
    /// A dataset wins over a store URL; offline mode requires a dataset.
    pub fn open_store(&self) -> Result<Arc<dyn RecordStore>, ConfigError> {
        if let Some(path) = &self.dataset {
            let store = MemoryStore::load(path, &self.shrine_collection, &self.city_collection)?;
            return Ok(Arc::new(store));
        }
        match &self.store_url {
            Some(url) if !self.offline => {
                debug!(url = %url, "using remote record store");
                Ok(Arc::new(HttpStore::new(url, Duration::from_secs(self.request_timeout_secs))))
            }
            _ => Err(ConfigError::NoStore),
        }
    }
}
