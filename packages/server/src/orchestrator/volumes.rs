use std::sync::Arc;

use tracing::{info, instrument};

use crate::platform::{
    ANNOTATION_SOURCE_SNAPSHOT, ANNOTATION_SOURCE_SNAPSHOT_TIME, Labels, Platform, PlatformError,
    SnapshotInfo, VolumeHandle, VolumeSpec,
};

/// Creates instance data volumes, empty or cloned from a snapshot.
#[derive(Clone)]
pub struct VolumeProvisioner {
    platform: Arc<dyn Platform>,
}

impl VolumeProvisioner {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    #[instrument(skip(self, labels))]
    pub async fn create_fresh(
        &self,
        name: &str,
        namespace: &str,
        size: &str,
        storage_class: Option<&str>,
        labels: Labels,
    ) -> Result<VolumeHandle, PlatformError> {
        let handle = self
            .platform
            .create_volume(&VolumeSpec {
                name: name.to_string(),
                namespace: namespace.to_string(),
                size: size.to_string(),
                storage_class: storage_class.map(str::to_string),
                source_snapshot: None,
                labels,
                annotations: Labels::new(),
            })
            .await?;
        info!("Created empty volume");
        Ok(handle)
    }

    /// Create a copy-on-write clone of `snapshot`. The volume records the
    /// snapshot it was cloned from.
    #[instrument(skip(self, snapshot, labels), fields(snapshot = %snapshot.name))]
    pub async fn create_from_snapshot(
        &self,
        name: &str,
        namespace: &str,
        snapshot: &SnapshotInfo,
        size: &str,
        storage_class: Option<&str>,
        labels: Labels,
    ) -> Result<VolumeHandle, PlatformError> {
        let mut annotations = Labels::from([(
            ANNOTATION_SOURCE_SNAPSHOT.to_string(),
            snapshot.name.clone(),
        )]);
        if let Some(created_at) = snapshot.created_at {
            annotations.insert(
                ANNOTATION_SOURCE_SNAPSHOT_TIME.to_string(),
                created_at.to_rfc3339(),
            );
        }

        let handle = self
            .platform
            .create_volume(&VolumeSpec {
                name: name.to_string(),
                namespace: namespace.to_string(),
                size: size.to_string(),
                storage_class: storage_class.map(str::to_string),
                source_snapshot: Some(snapshot.name.clone()),
                labels,
                annotations,
            })
            .await?;
        info!("Created volume from snapshot");
        Ok(handle)
    }
}
