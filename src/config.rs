use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "SSY_API_URL";
/// Environment variable overriding the container CLI
pub const CONTAINER_CLI_ENV: &str = "SSY_CONTAINER_CLI";

/// Read an environment variable, treating empty strings as if the variable is not set.
pub(crate) fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// User-level CLI configuration stored at `~/.config/ssy/config.json`
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub container_cli: Option<String>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".config").join("ssy").join("config.json"))
    }

    /// Load configuration from disk, or defaults if no file exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// API base URL override: environment first, then the config file
    pub fn get_api_url(&self) -> Option<String> {
        env_var_non_empty(API_URL_ENV).or_else(|| self.api_url.clone())
    }

    /// Container CLI: environment first, then the config file, then `docker`
    pub fn get_container_cli(&self) -> String {
        env_var_non_empty(CONTAINER_CLI_ENV)
            .or_else(|| self.container_cli.clone())
            .unwrap_or_else(|| "docker".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.api_url.is_none());
        assert!(config.container_cli.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"api_url": "http://localhost:8080", "container_cli": "podman"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.container_cli.as_deref(), Some("podman"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_var_non_empty() {
        std::env::set_var("SSY_TEST_EMPTY_VAR", "");
        assert_eq!(env_var_non_empty("SSY_TEST_EMPTY_VAR"), None);
        std::env::set_var("SSY_TEST_EMPTY_VAR", "value");
        assert_eq!(
            env_var_non_empty("SSY_TEST_EMPTY_VAR"),
            Some("value".to_string())
        );
        std::env::remove_var("SSY_TEST_EMPTY_VAR");
    }
}
