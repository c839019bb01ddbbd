//! Handler configuration.
//!
//! Reads JSON at `~/.config/handoff/config.json`. A missing or broken
//! file is not an error; the handler falls back to defaults so transfers
//! keep working on a fresh machine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_CONCURRENT_JOBS: usize = 10;

/// On-disk config format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    download_directory: String,
    #[serde(default)]
    ask_before_saving: bool,
    #[serde(default)]
    max_concurrent_jobs: usize,
}

/// Handler configuration.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Where incoming transfers land when nobody is asked.
    pub download_directory: PathBuf,
    /// Route every incoming transfer through the destination oracle.
    pub ask_before_saving: bool,
    /// Budget of simultaneously running jobs.
    pub max_concurrent_jobs: usize,
}

fn default_download_directory() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join("Downloads"),
        Err(_) => PathBuf::from("."),
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            ask_before_saving: false,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

impl HandlerConfig {
    /// Loads configuration from the default location.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Loads configuration from `path`, falling back to defaults for
    /// anything missing, unreadable or out of range.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::default();
        if !path.exists() {
            return config;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cannot read handler config");
                return config;
            }
        };
        if let Ok(file) = serde_json::from_str::<ConfigFile>(&content) {
            if !file.download_directory.is_empty() {
                config.download_directory = PathBuf::from(file.download_directory);
            }
            config.ask_before_saving = file.ask_before_saving;
            if (1..=64).contains(&file.max_concurrent_jobs) {
                config.max_concurrent_jobs = file.max_concurrent_jobs;
            }
        } else {
            tracing::warn!(
                path = %path.display(),
                "failed to parse handler config, using defaults"
            );
        }
        config
    }
}

fn config_file_path() -> PathBuf {
    config_base_dir().join("handoff").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HandlerConfig::load_from(&dir.path().join("config.json"));
        assert!(!config.ask_before_saving);
        assert_eq!(config.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
    }

    #[test]
    fn values_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"downloadDirectory": "/data/incoming", "askBeforeSaving": true, "maxConcurrentJobs": 3}"#,
        )
        .unwrap();
        let config = HandlerConfig::load_from(&path);
        assert_eq!(config.download_directory, PathBuf::from("/data/incoming"));
        assert!(config.ask_before_saving);
        assert_eq!(config.max_concurrent_jobs, 3);
    }

    #[test]
    fn broken_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let config = HandlerConfig::load_from(&path);
        assert_eq!(config.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
    }

    #[test]
    fn out_of_range_budget_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxConcurrentJobs": 0}"#).unwrap();
        assert_eq!(
            HandlerConfig::load_from(&path).max_concurrent_jobs,
            DEFAULT_MAX_CONCURRENT_JOBS
        );
        std::fs::write(&path, r#"{"maxConcurrentJobs": 1000}"#).unwrap();
        assert_eq!(
            HandlerConfig::load_from(&path).max_concurrent_jobs,
            DEFAULT_MAX_CONCURRENT_JOBS
        );
    }
}
