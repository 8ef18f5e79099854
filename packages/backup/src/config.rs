use std::path::PathBuf;
use std::time::Duration;

use common::config::StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Settings of the backup capture and staging pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    /// Scratch directory for dumps awaiting upload. Default: system temp dir.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Timeout of the TCP reachability probe. Default: 10.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Region used to sign IAM auth tokens. Falls back to the AWS default chain.
    #[serde(default)]
    pub aws_region: Option<String>,
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("devdb-backups")
}
fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            probe_timeout_secs: default_probe_timeout_secs(),
            aws_region: None,
        }
    }
}

impl BackupConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Configuration of the standalone `devdb-backup` binary.
///
/// Reads the same file and environment layout as the server, so a pod
/// can hand its storage settings to the restore init container through
/// `DEVDB__STORAGE__*` variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl ToolConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DEVDB_CONFIG").unwrap_or_else(|_| "config/config".into());
        Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("DEVDB").separator("__"))
            .build()?
            .try_deserialize()
    }
}
