use crate::constants::{
    DEFAULT_LOG_DIRECTIVE, DEFAULT_LOG_DIRECTORY, DEFAULT_LOG_FILE_PREFIX,
    DEFAULT_RCRAINFO_BASE_URL, DEFAULT_SEARCH_WINDOW_DAYS, DEFAULT_TIMEOUT_SECONDS,
    DEFAULT_USERNAME,
};
use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rcrainfo: RcrainfoConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RcrainfoConfig {
    pub base_url: String,
    pub api_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RcrainfoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RCRAINFO_BASE_URL.to_string(),
            api_id: None,
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub username: String,
    pub search_window_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            search_window_days: DEFAULT_SEARCH_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: DEFAULT_LOG_DIRECTORY.to_string(),
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            default_directive: DEFAULT_LOG_DIRECTIVE.to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` style settings from `path`, then apply `.env` and
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenv::dotenv();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env("RCRAINFO_API_ID") {
            self.rcrainfo.api_id = Some(v);
        }
        if let Some(v) = non_empty_env("RCRAINFO_API_KEY") {
            self.rcrainfo.api_key = Some(v);
        }
        if let Some(v) = non_empty_env("RCRAINFO_BASE_URL") {
            self.rcrainfo.base_url = v;
        }
        if let Some(v) = non_empty_env("TRAK_SYNC_USERNAME") {
            self.sync.username = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sync.search_window_days <= 0 {
            return Err(SyncError::Config(
                "sync.search_window_days must be positive".to_string(),
            ));
        }
        if self.rcrainfo.base_url.trim().is_empty() {
            return Err(SyncError::Config("rcrainfo.base_url is empty".to_string()));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.rcrainfo.base_url, DEFAULT_RCRAINFO_BASE_URL);
        assert_eq!(config.sync.search_window_days, 1080);
        assert_eq!(config.logging.default_directive, "trak_sync=info");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rcrainfo]\napi_id = \"abc\"\ntimeout_seconds = 5\n\n[sync]\nusername = \"testuser1\""
        )
        .unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.rcrainfo.api_id.as_deref(), Some("abc"));
        assert_eq!(config.rcrainfo.timeout_seconds, 5);
        assert_eq!(config.rcrainfo.base_url, DEFAULT_RCRAINFO_BASE_URL);
        assert_eq!(config.sync.username, "testuser1");
        assert_eq!(config.logging.directory, "logs");
    }

    #[test]
    fn malformed_file_is_a_toml_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rcrainfo\nbase_url = ").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(SyncError::Toml(_))
        ));
    }

    #[test]
    fn non_positive_window_is_rejected() {
        let mut config = Config::default();
        config.sync.search_window_days = 0;
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
