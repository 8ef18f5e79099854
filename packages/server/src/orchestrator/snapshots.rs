//! Point-in-time snapshots of instance volumes, scoped to a project.
//!
//! Snapshot support is a degraded feature: capture and selection never fail
//! the caller, they log and return `None`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::SnapshotConfig;
use crate::platform::{
    ANNOTATION_BACKUP_URL, ANNOTATION_CREATION_TIME, ANNOTATION_ENGINE_VERSION, Labels, Platform,
    PlatformError, SnapshotInfo, SnapshotSpec, instance_labels, project_selector,
};

/// Deterministic snapshot name for `volume` captured at `at`.
pub fn snapshot_name(volume: &str, at: DateTime<Utc>) -> String {
    format!("{volume}-{}", at.format("%Y%m%d%H%M%S"))
}

/// The ready snapshot with the greatest creation time, ties broken by the
/// lexicographically greatest name. Snapshots without a creation time are
/// never selected.
pub fn latest_ready(snapshots: &[SnapshotInfo]) -> Option<&SnapshotInfo> {
    snapshots
        .iter()
        .filter(|s| s.ready_to_use && s.created_at.is_some())
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        })
}

/// What to snapshot and the provenance recorded on the snapshot.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub project_id: String,
    pub instance: String,
    pub namespace: String,
    pub volume: String,
    pub engine_version: String,
    /// Backup the volume was seeded from, if any.
    pub backup_location: Option<String>,
}

pub struct SnapshotManager {
    platform: Arc<dyn Platform>,
    config: SnapshotConfig,
    snapshot_class: Option<String>,
}

impl SnapshotManager {
    pub fn new(
        platform: Arc<dyn Platform>,
        config: SnapshotConfig,
        snapshot_class: Option<String>,
    ) -> Self {
        Self {
            platform,
            config,
            snapshot_class,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Snapshot the target volume, then prune old snapshots of the project.
    ///
    /// Returns `None` when snapshots are disabled or creation fails.
    #[instrument(skip(self, target), fields(project_id = %target.project_id, volume = %target.volume))]
    pub async fn capture(&self, target: &CaptureTarget) -> Option<SnapshotInfo> {
        if !self.config.enabled {
            info!("Snapshots disabled, skipping capture");
            return None;
        }

        let now = Utc::now();
        let mut annotations = Labels::from([
            (ANNOTATION_CREATION_TIME.to_string(), now.to_rfc3339()),
            (
                ANNOTATION_ENGINE_VERSION.to_string(),
                target.engine_version.clone(),
            ),
        ]);
        if let Some(location) = &target.backup_location {
            annotations.insert(ANNOTATION_BACKUP_URL.to_string(), location.clone());
        }

        let spec = SnapshotSpec {
            name: snapshot_name(&target.volume, now),
            namespace: target.namespace.clone(),
            source_volume: target.volume.clone(),
            snapshot_class: self.snapshot_class.clone(),
            labels: instance_labels(&target.project_id, &target.instance),
            annotations,
        };

        match self.platform.create_snapshot(&spec).await {
            Ok(snapshot) => {
                info!(snapshot = %snapshot.name, "Snapshot created");
                self.prune(&target.project_id, &target.namespace).await;
                Some(snapshot)
            }
            Err(e) => {
                warn!(snapshot = %spec.name, error = %e, "Snapshot creation failed");
                None
            }
        }
    }

    /// Most recent ready snapshot of the project, or `None` when there is
    /// none, snapshots are disabled, or the query fails.
    #[instrument(skip(self))]
    pub async fn select_latest(&self, project_id: &str, namespace: &str) -> Option<SnapshotInfo> {
        if !self.config.enabled {
            return None;
        }
        match self
            .platform
            .list_snapshots(namespace, &project_selector(project_id))
            .await
        {
            Ok(snapshots) => latest_ready(&snapshots).cloned(),
            Err(e) => {
                warn!(error = %e, "Listing snapshots failed");
                None
            }
        }
    }

    /// All snapshots of the project, newest first.
    pub async fn list(
        &self,
        project_id: &str,
        namespace: &str,
    ) -> Result<Vec<SnapshotInfo>, PlatformError> {
        let mut snapshots = self
            .platform
            .list_snapshots(namespace, &project_selector(project_id))
            .await?;
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    /// Delete the project's ready snapshots beyond the newest `retain`.
    pub async fn prune(&self, project_id: &str, namespace: &str) {
        if self.config.retain == 0 {
            return;
        }
        let snapshots = match self.list(project_id, namespace).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(project_id, error = %e, "Listing snapshots for pruning failed");
                return;
            }
        };

        for stale in snapshots
            .iter()
            .filter(|s| s.ready_to_use)
            .skip(self.config.retain)
        {
            match self.platform.delete_snapshot(namespace, &stale.name).await {
                Ok(()) => info!(project_id, snapshot = %stale.name, "Pruned snapshot"),
                Err(e) => {
                    warn!(project_id, snapshot = %stale.name, error = %e, "Pruning snapshot failed")
                }
            }
        }
    }
}

fn sort_newest_first(snapshots: &mut [SnapshotInfo]) {
    snapshots.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
}
