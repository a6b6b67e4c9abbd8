//! Storage settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a presigned URL.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 3600;

/// Default cap on listed objects.
pub const DEFAULT_LIST_MAX_KEYS: usize = 1000;

/// Default URL prefix for locally stored files.
pub const DEFAULT_MEDIA_URL: &str = "/media/";

/// Settings for the document storage façade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding locally stored files.
    pub media_root: PathBuf,
    /// URL prefix under which local files are served.
    pub media_url: String,
    /// Lifetime of presigned URLs, in seconds.
    pub url_expiry_secs: u64,
    /// Cap on objects returned by one listing.
    pub list_max_keys: usize,
}

impl StorageSettings {
    /// Settings rooted at `media_root`, other values default.
    pub fn with_media_root(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            ..Self::default()
        }
    }

    /// Presigned URL lifetime.
    pub fn url_expiry(&self) -> Duration {
        Duration::from_secs(self.url_expiry_secs)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let media_root = dirs::data_dir()
            .map(|dir| dir.join("casefile").join("media"))
            .unwrap_or_else(|| PathBuf::from("media"));

        Self {
            media_root,
            media_url: DEFAULT_MEDIA_URL.to_string(),
            url_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
            list_max_keys: DEFAULT_LIST_MAX_KEYS,
        }
    }
}
