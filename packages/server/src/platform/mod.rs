//! The orchestration platform seam: volumes, snapshots, compute units and
//! network endpoints, addressed by name within a namespace.

pub mod kubernetes;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EngineType;
use thiserror::Error;

pub use kubernetes::KubePlatform;
pub use memory::InMemoryPlatform;

pub const LABEL_PROJECT: &str = "devdb.io/project-id";
pub const LABEL_INSTANCE: &str = "devdb.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "devdb";
/// Set on the short-lived instance that seeds a project's first snapshot.
pub const LABEL_ROLE: &str = "devdb.io/role";
pub const ROLE_SNAPSHOT_SEED: &str = "snapshot-seed";

pub const ANNOTATION_CREATION_TIME: &str = "devdb.io/creation-time";
pub const ANNOTATION_ENGINE_VERSION: &str = "devdb.io/engine-version";
pub const ANNOTATION_BACKUP_URL: &str = "devdb.io/backup-url";
pub const ANNOTATION_SOURCE_SNAPSHOT: &str = "devdb.io/source-snapshot";
pub const ANNOTATION_SOURCE_SNAPSHOT_TIME: &str = "devdb.io/source-snapshot-time";

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("platform request failed: {0}")]
    Api(String),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Labels every managed object of an instance carries.
pub fn instance_labels(project_id: &str, instance: &str) -> Labels {
    Labels::from([
        (LABEL_PROJECT.to_string(), project_id.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

pub fn seed_labels(project_id: &str, instance: &str) -> Labels {
    let mut labels = instance_labels(project_id, instance);
    labels.insert(LABEL_ROLE.to_string(), ROLE_SNAPSHOT_SEED.to_string());
    labels
}

/// Whether `labels` mark an object as belonging to `instance` of `project_id`.
///
/// Object names join project id and instance name with `-`, so two projects
/// can derive the same name. Ownership is decided by labels, never by name.
pub fn owned_by(labels: &Labels, project_id: &str, instance: &str) -> bool {
    labels.get(LABEL_PROJECT).map(String::as_str) == Some(project_id)
        && labels.get(LABEL_INSTANCE).map(String::as_str) == Some(instance)
}

pub fn project_selector(project_id: &str) -> Labels {
    Labels::from([(LABEL_PROJECT.to_string(), project_id.to_string())])
}

pub fn matches_selector(labels: &Labels, selector: &Labels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub name: String,
    pub namespace: String,
    pub size: String,
    pub storage_class: Option<String>,
    /// Snapshot the volume is cloned from.
    pub source_snapshot: Option<String>,
    pub labels: Labels,
    pub annotations: Labels,
}

/// A created volume. Creation does not imply the volume is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
}

#[derive(Debug, Clone)]
pub struct SnapshotSpec {
    pub name: String,
    pub namespace: String,
    pub source_volume: String,
    pub snapshot_class: Option<String>,
    pub labels: Labels,
    pub annotations: Labels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub name: String,
    pub namespace: String,
    pub source_volume: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub ready_to_use: bool,
    pub labels: Labels,
    pub annotations: Labels,
}

/// Init step that stages a backup artifact into the engine's init directory.
#[derive(Debug, Clone)]
pub struct RestoreInit {
    pub image: String,
    pub source: String,
    /// Secret whose keys are exposed to the init step as environment.
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ComputeSpec {
    pub name: String,
    pub namespace: String,
    pub engine: EngineType,
    pub image: String,
    pub port: u16,
    pub env: Vec<(String, String)>,
    pub volume: String,
    pub labels: Labels,
    pub restore: Option<RestoreInit>,
}

#[derive(Debug, Clone)]
pub struct ComputeUnit {
    pub name: String,
    pub labels: Labels,
    pub phase: Option<String>,
    pub ready: bool,
    pub deleting: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl ComputeUnit {
    pub fn instance_name(&self) -> Option<&str> {
        self.labels.get(LABEL_INSTANCE).map(String::as_str)
    }

    /// Seed units are internal and never listed as databases.
    pub fn is_seed(&self) -> bool {
        self.labels.get(LABEL_ROLE).map(String::as_str) == Some(ROLE_SNAPSHOT_SEED)
    }
}

#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    pub service_type: String,
    pub selector: Labels,
    pub labels: Labels,
}

#[derive(Debug, Clone)]
pub struct EndpointInfo {
    pub name: String,
    /// External address once assigned, otherwise the in-cluster DNS name.
    pub host: Option<String>,
    pub port: u16,
    pub labels: Labels,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Fails with `AlreadyExists` when the namespace is present.
    async fn create_namespace(&self, namespace: &str) -> Result<(), PlatformError>;

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<VolumeHandle, PlatformError>;
    async fn get_volume(&self, namespace: &str, name: &str) -> Result<VolumeHandle, PlatformError>;
    async fn delete_volume(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;

    async fn create_snapshot(&self, spec: &SnapshotSpec) -> Result<SnapshotInfo, PlatformError>;
    async fn list_snapshots(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<SnapshotInfo>, PlatformError>;
    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;

    async fn create_compute(&self, spec: &ComputeSpec) -> Result<ComputeUnit, PlatformError>;
    async fn get_compute(&self, namespace: &str, name: &str) -> Result<ComputeUnit, PlatformError>;
    async fn list_compute(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<ComputeUnit>, PlatformError>;
    async fn delete_compute(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<EndpointInfo, PlatformError>;
    async fn get_endpoint(&self, namespace: &str, name: &str)
    -> Result<EndpointInfo, PlatformError>;
    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<(), PlatformError>;
}

/// The per-instance objects a flow or a teardown addresses by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Compute,
    Endpoint,
    Volume,
}

impl ResourceKind {
    async fn labels(
        self,
        platform: &dyn Platform,
        namespace: &str,
        name: &str,
    ) -> Result<Labels, PlatformError> {
        match self {
            Self::Compute => platform.get_compute(namespace, name).await.map(|u| u.labels),
            Self::Endpoint => platform.get_endpoint(namespace, name).await.map(|e| e.labels),
            Self::Volume => platform.get_volume(namespace, name).await.map(|v| v.labels),
        }
    }

    async fn delete(
        self,
        platform: &dyn Platform,
        namespace: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        match self {
            Self::Compute => platform.delete_compute(namespace, name).await,
            Self::Endpoint => platform.delete_endpoint(namespace, name).await,
            Self::Volume => platform.delete_volume(namespace, name).await,
        }
    }
}

/// Who holds an object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Free,
    Owner,
    Foreign,
}

/// Look up `name` and compare its labels against the instance.
pub async fn occupant(
    platform: &dyn Platform,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    project_id: &str,
    instance: &str,
) -> Result<Occupant, PlatformError> {
    match kind.labels(platform, namespace, name).await {
        Ok(labels) if owned_by(&labels, project_id, instance) => Ok(Occupant::Owner),
        Ok(_) => Ok(Occupant::Foreign),
        Err(e) if e.is_not_found() => Ok(Occupant::Free),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    Missing,
    /// The name is held by another project's object, which was left alone.
    Foreign,
}

/// Delete `name` only when it belongs to `instance` of `project_id`.
pub async fn remove_owned(
    platform: &dyn Platform,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    project_id: &str,
    instance: &str,
) -> Result<Removal, PlatformError> {
    match occupant(platform, kind, namespace, name, project_id, instance).await? {
        Occupant::Free => return Ok(Removal::Missing),
        Occupant::Foreign => return Ok(Removal::Foreign),
        Occupant::Owner => {}
    }
    match kind.delete(platform, namespace, name).await {
        Ok(()) => Ok(Removal::Deleted),
        Err(e) if e.is_not_found() => Ok(Removal::Missing),
        Err(e) => Err(e),
    }
}
