//! CLI settings: JSON file, then `CASEFILE_*` environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use casefile_storage::StorageSettings;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database holding credentials and documents.
    pub database_path: PathBuf,
    #[serde(flatten)]
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let database_path = dirs::data_dir()
            .map(|dir| dir.join("casefile").join("casefile.db"))
            .unwrap_or_else(|| PathBuf::from("casefile.db"));

        Self {
            database_path,
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("casefile").join(CONFIG_FILE))
    }

    /// Load settings from `path`, or from the default file when it exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Apply `CASEFILE_DATABASE`, `CASEFILE_MEDIA_ROOT`, `CASEFILE_MEDIA_URL`
    /// and `CASEFILE_URL_EXPIRY` from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("CASEFILE_DATABASE") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("CASEFILE_MEDIA_ROOT") {
            self.storage.media_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("CASEFILE_MEDIA_URL") {
            self.storage.media_url = value;
        }
        if let Some(value) = lookup("CASEFILE_URL_EXPIRY") {
            self.storage.url_expiry_secs = value
                .trim()
                .parse()
                .with_context(|| format!("CASEFILE_URL_EXPIRY must be seconds, got '{}'", value))?;
        }
        Ok(())
    }

    /// Create the database's parent directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_file_values_and_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"database_path": "/srv/casefile/casefile.db", "media_url": "/files/"}"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/srv/casefile/casefile.db"));
        assert_eq!(settings.storage.media_url, "/files/");
        assert_eq!(settings.storage.url_expiry_secs, 3600);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CASEFILE_MEDIA_ROOT", "/var/media"),
            ("CASEFILE_URL_EXPIRY", "600"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.storage.media_root, PathBuf::from("/var/media"));
        assert_eq!(settings.storage.url_expiry_secs, 600);
    }

    #[test]
    fn test_bad_expiry_rejected() {
        let mut settings = Settings::default();
        let result = settings.apply_env(|key| (key == "CASEFILE_URL_EXPIRY").then(|| "soon".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(Settings::load(Some(&temp.path().join("absent.json"))).is_err());
    }
}
