use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use backup::{
    BackupCapture, BackupImporter, DumpRunner, ProcessDumpRunner, RdsTokenProvider, TokenProvider,
};
use common::storage::{self, ObjectStore};
use tracing::info;

use crate::config::{AppConfig, PlatformBackend, RegistryBackend};
use crate::orchestrator::{Reconciler, ReconcilerSettings, SnapshotManager};
use crate::platform::{InMemoryPlatform, KubePlatform, Platform};
use crate::registry::{
    FlowJournal, KeyValueStore, LeaseManager, MemoryKv, ProjectRegistry, RedisKv,
};

/// External collaborators the service is wired to.
pub struct Backends {
    pub kv: Arc<dyn KeyValueStore>,
    pub platform: Arc<dyn Platform>,
    pub store: Arc<dyn ObjectStore>,
    pub tokens: Arc<dyn TokenProvider>,
    pub dumps: Arc<dyn DumpRunner>,
}

impl Backends {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match config.registry.backend {
            RegistryBackend::Redis => Arc::new(
                RedisKv::connect(&config.registry.url)
                    .await
                    .context("Failed to connect to Redis")?,
            ),
            RegistryBackend::Memory => Arc::new(MemoryKv::new()),
        };
        let platform: Arc<dyn Platform> = match config.platform.backend {
            PlatformBackend::Kubernetes => Arc::new(
                KubePlatform::connect()
                    .await
                    .context("Failed to create Kubernetes client")?,
            ),
            PlatformBackend::Memory => Arc::new(InMemoryPlatform::new()),
        };
        let store = storage::from_config(&config.storage)
            .await
            .context("Failed to initialize object storage")?;

        info!(
            registry = ?config.registry.backend,
            platform = ?config.platform.backend,
            storage = ?config.storage.backend,
            "Backends initialized"
        );

        Ok(Self {
            kv,
            platform,
            store,
            tokens: Arc::new(RdsTokenProvider::new(config.backup.aws_region.clone())),
            dumps: Arc::new(ProcessDumpRunner),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub platform: Arc<dyn Platform>,
    pub projects: ProjectRegistry,
    pub journal: FlowJournal,
    pub reconciler: Arc<Reconciler>,
    pub snapshots: Arc<SnapshotManager>,
    pub capture: Arc<BackupCapture>,
}

impl AppState {
    pub fn new(config: AppConfig, backends: Backends) -> anyhow::Result<Self> {
        let prefix = config.registry.key_prefix.as_str();
        let projects = ProjectRegistry::new(backends.kv.clone(), prefix);
        let journal = FlowJournal::new(backends.kv.clone(), prefix)
            .with_retention(config.orchestrator.flow_retention());
        let leases = LeaseManager::new(
            backends.kv.clone(),
            prefix,
            Duration::from_secs(config.orchestrator.lock_ttl_secs),
            Duration::from_secs(config.orchestrator.lock_wait_secs),
        );
        let snapshots = Arc::new(SnapshotManager::new(
            backends.platform.clone(),
            config.snapshots.clone(),
            config.platform.snapshot_class.clone(),
        ));
        let importer = Arc::new(
            BackupImporter::new(backends.store.clone(), config.backup.probe_timeout())
                .context("Failed to build backup importer")?,
        );
        let reconciler = Arc::new(Reconciler::new(
            backends.platform.clone(),
            projects.clone(),
            leases,
            journal.clone(),
            snapshots.clone(),
            importer,
            ReconcilerSettings::from_config(&config),
        ));
        let capture = Arc::new(BackupCapture::new(
            backends.store,
            backends.tokens,
            backends.dumps,
            config.storage.bucket.clone(),
            config.backup.staging_dir.clone(),
            config.backup.probe_timeout(),
        ));

        Ok(Self {
            config: Arc::new(config),
            platform: backends.platform,
            projects,
            journal,
            reconciler,
            snapshots,
            capture,
        })
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let backends = Backends::from_config(&config).await?;
        Self::new(config, backends)
    }
}
