//! Tool settings loaded from an optional TOML file.
//!
//! ```toml
//! organisation = "apache"
//! github_api = "https://api.github.com"
//! timeout_secs = 30
//! state_dir = "/var/lib/asfyaml"
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// GitHub REST endpoint used by default.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Request timeout used by default.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings that do not belong in `.asf.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// GitHub organisation owning the repositories. `None` defers to the
    /// `origin` remote.
    pub organisation: Option<String>,
    /// Base URL of the GitHub REST API.
    pub github_api: String,
    /// Timeout for every collaborator request.
    pub timeout_secs: u64,
    /// Directory of the settings store. `None` means the XDG state directory.
    pub state_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            organisation: None,
            github_api: DEFAULT_GITHUB_API.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            state_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Load from `path` if given, otherwise from [`default_path`].
    ///
    /// # Errors
    ///
    /// See [`Settings::load`].
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => default_path().map_or_else(|| Ok(Self::default()), |p| Self::load(&p)),
        }
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Settings store directory, falling back to `$XDG_STATE_HOME/asfyaml`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            xdg_dir("XDG_STATE_HOME", &[".local", "state"]).join("asfyaml")
        })
    }
}

/// `$XDG_CONFIG_HOME/asfyaml/settings.toml` (or `~/.config/…`).
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    let dir = xdg_dir("XDG_CONFIG_HOME", &[".config"]);
    dir.is_absolute()
        .then(|| dir.join("asfyaml").join("settings.toml"))
}

fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(
            || {
                let home = std::env::var("HOME")
                    .or_else(|_| std::env::var("USERPROFILE"))
                    .map_or_else(|_| PathBuf::from("."), PathBuf::from);
                fallback.iter().fold(home, |p, c| p.join(c))
            },
            PathBuf::from,
        )
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::TEST_ENV_MUTEX;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.organisation, None);
        assert_eq!(settings.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "organisation = \"example\"\ntimeout_secs = 5\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.organisation.as_deref(), Some("example"));
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(settings.github_api, DEFAULT_GITHUB_API);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "organization = \"typo\"\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse settings file"));
    }

    #[test]
    fn explicit_state_dir_wins() {
        let settings = Settings {
            state_dir: Some(PathBuf::from("/srv/state")),
            ..Settings::default()
        };
        assert_eq!(settings.state_dir(), PathBuf::from("/srv/state"));
    }

    #[test]
    fn state_dir_follows_xdg() {
        let _lock = TEST_ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let original = std::env::var("XDG_STATE_HOME").ok();
        // SAFETY: Protected by TEST_ENV_MUTEX; restored before the lock is released.
        #[allow(unsafe_code)]
        unsafe {
            std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-state");
        }
        let dir = Settings::default().state_dir();
        // SAFETY: Protected by TEST_ENV_MUTEX.
        #[allow(unsafe_code)]
        unsafe {
            match original {
                Some(v) => std::env::set_var("XDG_STATE_HOME", v),
                None => std::env::remove_var("XDG_STATE_HOME"),
            }
        }
        assert_eq!(dir, PathBuf::from("/tmp/xdg-state/asfyaml"));
    }
}
