//! Client settings: service base URL and request timeout.
//!
//! Read from `<config dir>/recon/client.json`. The `RECON_API_BASE_URL`
//! environment variable overrides the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const API_BASE_ENV: &str = "RECON_API_BASE_URL";
pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api";
/// Phase 2 runs the whole comparison server-side, so this is generous.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL, e.g. "https://recon.example.com/api". Endpoints are
    /// appended as `/reconcile` and `/reconcile/approve`.
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self { api_base: api_base.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply `RECON_API_BASE_URL` if it is set and non-empty.
    pub fn with_env_override(self) -> Self {
        self.with_api_base_override(std::env::var(API_BASE_ENV).ok())
    }

    fn with_api_base_override(mut self, value: Option<String>) -> Self {
        if let Some(base) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            log::debug!("api base overridden by {API_BASE_ENV}: {base}");
            self.api_base = base;
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Returns the path to the settings file.
pub fn settings_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("recon/client.json"))
}

/// Settings from the default location, falling back to defaults when the
/// file is missing or unreadable, then the environment override.
pub fn load_settings() -> ClientSettings {
    let from_file = settings_file_path()
        .filter(|path| path.exists())
        .and_then(|path| match load_settings_from(&path) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("{e}; using defaults");
                None
            }
        });
    from_file.unwrap_or_default().with_env_override()
}

pub fn load_settings_from(path: &Path) -> Result<ClientSettings, SettingsError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| SettingsError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&contents)
        .map_err(|e| SettingsError::Parse { path: path.to_path_buf(), message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = ClientSettings::default();
        assert_eq!(s.api_base, DEFAULT_API_BASE);
        assert_eq!(s.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: ClientSettings =
            serde_json::from_str(r#"{"api_base":"https://recon.test/api"}"#).unwrap();
        assert_eq!(parsed.api_base, "https://recon.test/api");
        assert_eq!(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_override() {
        let s =
            ClientSettings::default().with_api_base_override(Some(" https://other/api ".into()));
        assert_eq!(s.api_base, "https://other/api");
        let s = ClientSettings::default().with_api_base_override(Some("   ".into()));
        assert_eq!(s.api_base, DEFAULT_API_BASE);
        let s = ClientSettings::default().with_api_base_override(None);
        assert_eq!(s.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_settings_file_path() {
        let path = settings_file_path().unwrap();
        assert!(path.to_string_lossy().contains("recon"));
        assert!(path.to_string_lossy().ends_with("client.json"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        let contents = r#"{ "api_base": "https://recon.test/api", "timeout_secs": 30 }"#;
        std::fs::write(&path, contents).unwrap();

        let settings =
            ClientSettings { api_base: "https://recon.test/api".into(), timeout_secs: 30 };
        assert_eq!(load_settings_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, "not json").unwrap();
        let err = load_settings_from(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));

        let err = load_settings_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
