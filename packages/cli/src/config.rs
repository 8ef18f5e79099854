//! CLI configuration: `~/.devdb.toml` plus flag and environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
const CONFIG_FILE: &str = ".devdb.toml";

#[derive(Debug, Default, Deserialize)]
pub struct ApiSection {
    pub url: Option<String>,
}

/// Contents of the config file.
///
/// ```toml
/// owner = "acme"
///
/// [api]
/// url = "https://devdb.internal"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiSection,
    pub owner: Option<String>,
}

impl FileConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE))
    }

    /// Read `path`. A missing file yields the empty config.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Effective settings after merging all sources.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub owner: Option<String>,
}

impl Settings {
    /// `flag_url` already carries `DEVDB_API_URL` when the flag is absent.
    pub fn resolve(flag_url: Option<String>, file: FileConfig) -> Self {
        let api_url = flag_url
            .or(file.api.url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: file.owner,
        }
    }

    /// Owner for project commands: explicit value, config file, then the
    /// login name of the current user, lowercased.
    pub fn owner(&self, explicit: Option<String>) -> anyhow::Result<String> {
        explicit
            .or_else(|| self.owner.clone())
            .or_else(current_user)
            .map(|owner| common::names::normalize(&owner))
            .context("Cannot determine the owner; pass --owner")
    }
}

fn current_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_file_and_default() {
        let file = FileConfig {
            api: ApiSection {
                url: Some("http://from-file:5000".into()),
            },
            owner: None,
        };
        let settings = Settings::resolve(Some("http://flag:8080/".into()), file);
        assert_eq!(settings.api_url, "http://flag:8080");
    }

    #[test]
    fn falls_back_to_file_then_default() {
        let file = FileConfig {
            api: ApiSection {
                url: Some("http://from-file:5000".into()),
            },
            owner: None,
        };
        assert_eq!(Settings::resolve(None, file).api_url, "http://from-file:5000");
        assert_eq!(
            Settings::resolve(None, FileConfig::default()).api_url,
            DEFAULT_API_URL
        );
    }

    #[test]
    fn loads_toml_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(FileConfig::load(&path).unwrap().api.url.is_none());

        std::fs::write(&path, "owner = \"Acme\"\n\n[api]\nurl = \"http://devdb.internal\"\n")
            .unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.api.url.as_deref(), Some("http://devdb.internal"));

        let settings = Settings::resolve(None, file);
        assert_eq!(settings.owner(None).unwrap(), "acme");
        assert_eq!(settings.owner(Some("Globex ".into())).unwrap(), "globex");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[api\nurl = 1").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
