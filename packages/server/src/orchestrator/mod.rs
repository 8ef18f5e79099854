//! The instance lifecycle orchestrator.

pub mod readiness;
pub mod reconciler;
pub mod recovery;
pub mod snapshots;
pub mod volumes;

use chrono::{DateTime, Utc};
use backup::ImportError;
use common::{InstanceStatus, Project};
use common::api::SeedStrategyKind;
use common::names::NameError;
use thiserror::Error;

use crate::platform::{PlatformError, SnapshotInfo};
use crate::registry::RegistryError;

pub use readiness::{ReadinessPolicy, wait_until_ready};
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use recovery::recover_abandoned_flows;
pub use snapshots::{CaptureTarget, SnapshotManager};
pub use volumes::VolumeProvisioner;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("Database '{instance}' not found in project '{project_id}'")]
    InstanceNotFound { project_id: String, instance: String },

    #[error("Database '{instance}' already exists in project '{project_id}'")]
    InstanceExists { project_id: String, instance: String },

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error("Invalid backup location '{0}': expected an http(s):// URL or s3://bucket/key")]
    InvalidBackupLocation(String),

    #[error("Backup URL is not accessible: {0}")]
    BackupUnreachable(String),

    #[error("Backup cannot be restored: {0}")]
    UnrestorableBackup(#[source] ImportError),

    /// Another project's object already holds the derived name.
    #[error("Database '{instance}' in project '{project_id}' needs the name '{resource}', which another project already uses")]
    NameTaken {
        project_id: String,
        instance: String,
        resource: String,
    },

    #[error("Project '{0}' has no backup location to seed a snapshot from")]
    NoBackupLocation(String),

    #[error("Snapshots are disabled")]
    SnapshotsDisabled,

    #[error("Seeding a snapshot for project '{project_id}' failed: {reason}")]
    SeedFailed {
        project_id: String,
        reason: &'static str,
    },

    /// A platform call failed part way through a flow.
    #[error("{step} failed: {source}")]
    Platform {
        step: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ReconcileError {
    fn platform(step: &'static str) -> impl FnOnce(PlatformError) -> Self {
        move |source| Self::Platform { step, source }
    }
}

/// How a new instance's volume gets its initial contents.
#[derive(Debug, Clone)]
pub enum SeedStrategy {
    FreshEmpty,
    CloneFromSnapshot(SnapshotInfo),
    RestoreFromBackup(String),
}

impl SeedStrategy {
    pub fn kind(&self) -> SeedStrategyKind {
        match self {
            Self::FreshEmpty => SeedStrategyKind::FreshEmpty,
            Self::CloneFromSnapshot(_) => SeedStrategyKind::CloneFromSnapshot,
            Self::RestoreFromBackup(_) => SeedStrategyKind::RestoreFromBackup,
        }
    }
}

/// An instance as observed on the platform.
#[derive(Debug, Clone)]
pub struct InstanceView {
    pub name: String,
    pub status: InstanceStatus,
    pub host: Option<String>,
    pub port: u16,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreatedInstance {
    /// The project as read when the flow started.
    pub project: Project,
    pub instance: InstanceView,
    pub strategy: SeedStrategy,
    /// Whether a post-initialisation snapshot was scheduled.
    pub snapshot_scheduled: bool,
}
