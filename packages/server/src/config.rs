use std::time::Duration;

use backup::config::BackupConfig;
use common::config::StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Sent back as `X-Release` on every response.
    #[serde(default = "unknown_release")]
    pub release: String,
}

fn unknown_release() -> String {
    "unknown".into()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    pub url: String,
    /// Prepended to every key, so several deployments can share one store.
    pub key_prefix: String,
}

/// In-process backends. [`AppConfig::load`] defaults to Redis and Kubernetes instead.
impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Memory,
            url: "redis://127.0.0.1:6379".into(),
            key_prefix: "devdb:".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlatformBackend {
    Kubernetes,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlatformConfig {
    pub backend: PlatformBackend,
    /// Shared namespace all instances are created in.
    pub namespace: String,
    /// Cluster default when unset.
    pub storage_class: Option<String>,
    pub volume_size: String,
    pub service_type: String,
    pub snapshot_class: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: PlatformBackend::Memory,
            namespace: "devdb".into(),
            storage_class: None,
            volume_size: "10Gi".into(),
            service_type: "LoadBalancer".into(),
            snapshot_class: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    /// Ready snapshots kept per project after a capture. 0 keeps all.
    pub retain: usize,
    pub settle_delay_secs: u64,
    pub readiness_poll_secs: u64,
    /// Must be at least 1; a snapshot is only used once it reports ready.
    pub readiness_max_attempts: u32,
}

impl SnapshotConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.readiness_max_attempts == 0 {
            return Err(ConfigError::Message(
                "snapshots.readiness_max_attempts must be at least 1 while snapshots are enabled"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retain: 5,
            settle_delay_secs: 10,
            readiness_poll_secs: 5,
            readiness_max_attempts: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Lifetime of the per-project lease; bounds how long a crashed flow blocks others.
    pub lock_ttl_secs: u64,
    /// How long a creation request waits for the lease before answering 409.
    pub lock_wait_secs: u64,
    pub delete_volumes: bool,
    /// Image providing `devdb-backup`, run as the restore init container.
    pub restore_image: String,
    /// Secret exposed to the restore init container, e.g. object storage credentials.
    pub restore_secret: Option<String>,
    pub recovery_on_startup: bool,
    /// How long finished flow records are kept for inspection.
    pub flow_retention_secs: u64,
}

impl OrchestratorConfig {
    pub fn flow_retention(&self) -> Duration {
        Duration::from_secs(self.flow_retention_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 120,
            lock_wait_secs: 10,
            delete_volumes: true,
            restore_image: "ghcr.io/devdb/devdb-backup:latest".into(),
            restore_secret: None,
            recovery_on_startup: true,
            flow_retention_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Credentials used when a create-project request omits them.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DefaultsConfig {
    pub username: String,
    /// Falls back to the project name.
    pub database: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            username: "devdb".into(),
            database: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DEVDB_CONFIG").unwrap_or_else(|_| "config/config".into());
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("server.release", "unknown")?
            .set_default("registry.backend", "redis")?
            .set_default("registry.url", "redis://127.0.0.1:6379")?
            .set_default("registry.key_prefix", "devdb:")?
            .set_default("platform.backend", "kubernetes")?
            .set_default("platform.namespace", "devdb")?
            .set_default("platform.volume_size", "10Gi")?
            .set_default("platform.service_type", "LoadBalancer")?
            // Load from config/config.toml
            .add_source(File::with_name(&path).required(false))
            // Override from environment (e.g., DEVDB__REGISTRY__URL)
            .add_source(Environment::with_prefix("DEVDB").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.snapshots.validate()?;
        if self.orchestrator.flow_retention_secs == 0 {
            return Err(ConfigError::Message(
                "orchestrator.flow_retention_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_readiness_attempts_is_rejected() {
        let snapshots = SnapshotConfig {
            readiness_max_attempts: 0,
            ..SnapshotConfig::default()
        };
        let err = snapshots.validate().unwrap_err();
        assert!(err.to_string().contains("readiness_max_attempts"));

        let disabled = SnapshotConfig {
            enabled: false,
            readiness_max_attempts: 0,
            ..SnapshotConfig::default()
        };
        assert!(disabled.validate().is_ok());
        assert!(SnapshotConfig::default().validate().is_ok());
    }
}
