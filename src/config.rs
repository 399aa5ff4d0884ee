use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown timezone: {0}")]
    Timezone(String),
    #[error("config mutex poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Overrides the SQLite file under the data root.
    pub database_path: Option<PathBuf>,
    pub scrape_function_url: Option<String>,
    pub scrape_api_key: Option<String>,
    /// Base URL objects in the image bucket are served from.
    pub storage_public_url: Option<String>,
    pub image_bucket: String,
    /// IANA name used for date-range bounds and display formatting.
    pub timezone: String,
    pub default_radius_miles: f64,
    pub radius_options: Vec<u32>,
    /// `HH:MM` assumed when a scraped event has a date but no time.
    pub default_start_time: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            scrape_function_url: None,
            scrape_api_key: None,
            storage_public_url: None,
            image_bucket: "event-images".to_string(),
            timezone: "UTC".to_string(),
            default_radius_miles: 25.0,
            radius_options: vec![10, 25, 50, 75, 100, 150, 200],
            default_start_time: "19:00".to_string(),
        }
    }
}

impl AppConfig {
    /// Applies `GIGDOG_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = lookup("GIGDOG_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("GIGDOG_SCRAPE_URL") {
            self.scrape_function_url = Some(url);
        }
        if let Some(key) = lookup("GIGDOG_SCRAPE_KEY") {
            self.scrape_api_key = Some(key);
        }
        if let Some(tz) = lookup("GIGDOG_TIMEZONE") {
            self.timezone = tz;
        }
        self
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(utils::config_path())
    }

    /// Reads the config at `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let data = read_config(&path)?;
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppConfig {
        self.data
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().map_err(|_| ConfigError::Poisoned)?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load_from(dir.path().join("config.json")).expect("load");
        let config = store.read();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_radius_miles, 25.0);
        assert_eq!(config.timezone().expect("tz"), chrono_tz::UTC);
    }

    #[test]
    fn updates_persist_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::load_from(path.clone()).expect("load");
        store
            .update(|config| {
                config.timezone = "America/Chicago".to_string();
                config.default_radius_miles = 50.0;
            })
            .expect("update");

        let reloaded = ConfigStore::load_from(path).expect("reload").read();
        assert_eq!(reloaded.timezone().expect("tz"), chrono_tz::America::Chicago);
        assert_eq!(reloaded.default_radius_miles, 50.0);
        assert_eq!(reloaded.image_bucket, "event-images");
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "image_bucket": "posters" }"#).expect("write");
        let config = ConfigStore::load_from(path).expect("load").read();
        assert_eq!(config.image_bucket, "posters");
        assert_eq!(config.default_start_time, "19:00");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").expect("write");
        assert!(matches!(ConfigStore::load_from(path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("GIGDOG_DATABASE", "/tmp/gigdog-test.sqlite"),
            ("GIGDOG_TIMEZONE", "America/Denver"),
            ("GIGDOG_SCRAPE_KEY", "  "),
        ]
        .into_iter()
        .collect();
        let config =
            AppConfig::default().with_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/gigdog-test.sqlite")
        );
        assert_eq!(config.timezone, "America/Denver");
        assert_eq!(config.scrape_api_key, None);
    }

    #[test]
    fn bad_timezone_is_reported() {
        let config = AppConfig {
            timezone: "Mars/Olympus".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.timezone(), Err(ConfigError::Timezone(_))));
    }
}
