use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};

use super::{
    ComputeSpec, ComputeUnit, EndpointInfo, EndpointSpec, Labels, Platform, PlatformError,
    SnapshotInfo, SnapshotSpec, VolumeHandle, VolumeSpec, matches_selector,
};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// In-process [`Platform`] for local development and tests.
///
/// Compute units become ready immediately (unless disabled with
/// [`InMemoryPlatform::set_compute_ready`]) and snapshots are ready as soon
/// as they are created. Every trait call is counted by operation name, and
/// individual operations can be made to fail.
pub struct InMemoryPlatform {
    namespaces: DashSet<String>,
    volumes: DashMap<Key, VolumeSpec>,
    snapshots: DashMap<Key, SnapshotInfo>,
    compute: DashMap<Key, (ComputeSpec, ComputeUnit)>,
    endpoints: DashMap<Key, EndpointSpec>,
    calls: DashMap<&'static str, usize>,
    failing: DashSet<&'static str>,
    compute_ready: AtomicBool,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self {
            namespaces: DashSet::new(),
            volumes: DashMap::new(),
            snapshots: DashMap::new(),
            compute: DashMap::new(),
            endpoints: DashMap::new(),
            calls: DashMap::new(),
            failing: DashSet::new(),
            compute_ready: AtomicBool::new(true),
        }
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `op` (a [`Platform`] method name) has been called.
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// Make every subsequent call to `op` fail with an API error.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    pub fn set_compute_ready(&self, ready: bool) {
        self.compute_ready.store(ready, Ordering::SeqCst);
    }

    pub fn insert_snapshot(&self, snapshot: SnapshotInfo) {
        self.snapshots
            .insert(key(&snapshot.namespace, &snapshot.name), snapshot);
    }

    pub fn volume(&self, namespace: &str, name: &str) -> Option<VolumeSpec> {
        self.volumes.get(&key(namespace, name)).map(|v| v.clone())
    }

    pub fn compute_spec(&self, namespace: &str, name: &str) -> Option<ComputeSpec> {
        self.compute.get(&key(namespace, name)).map(|c| c.0.clone())
    }

    pub fn has_endpoint(&self, namespace: &str, name: &str) -> bool {
        self.endpoints.contains_key(&key(namespace, name))
    }

    pub fn snapshot_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshots
            .iter()
            .filter(|s| s.namespace == namespace)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    fn enter(&self, op: &'static str) -> Result<(), PlatformError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failing.contains(op) {
            return Err(PlatformError::Api(format!("injected failure in {op}")));
        }
        Ok(())
    }

    fn unit(&self, spec: &ComputeSpec) -> ComputeUnit {
        let ready = self.compute_ready.load(Ordering::SeqCst);
        ComputeUnit {
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            phase: Some(if ready { "Running" } else { "Pending" }.to_string()),
            ready,
            deleting: false,
            created_at: Some(Utc::now()),
        }
    }

    fn volume_handle(spec: &VolumeSpec) -> VolumeHandle {
        VolumeHandle {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            labels: spec.labels.clone(),
        }
    }

    fn endpoint_info(namespace: &str, spec: &EndpointSpec) -> EndpointInfo {
        EndpointInfo {
            name: spec.name.clone(),
            host: Some(format!("{}.{namespace}.svc.cluster.local", spec.name)),
            port: spec.port,
            labels: spec.labels.clone(),
        }
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn create_namespace(&self, namespace: &str) -> Result<(), PlatformError> {
        self.enter("create_namespace")?;
        if !self.namespaces.insert(namespace.to_string()) {
            return Err(PlatformError::AlreadyExists(format!("namespace {namespace}")));
        }
        Ok(())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<VolumeHandle, PlatformError> {
        self.enter("create_volume")?;
        let k = key(&spec.namespace, &spec.name);
        if self.volumes.contains_key(&k) {
            return Err(PlatformError::AlreadyExists(format!("volume {}", spec.name)));
        }
        if let Some(snapshot) = &spec.source_snapshot
            && !self.snapshots.contains_key(&key(&spec.namespace, snapshot))
        {
            return Err(PlatformError::NotFound(format!("snapshot {snapshot}")));
        }
        self.volumes.insert(k, spec.clone());
        Ok(Self::volume_handle(spec))
    }

    async fn get_volume(&self, namespace: &str, name: &str) -> Result<VolumeHandle, PlatformError> {
        self.enter("get_volume")?;
        self.volumes
            .get(&key(namespace, name))
            .map(|spec| Self::volume_handle(&spec))
            .ok_or_else(|| PlatformError::NotFound(format!("volume {name}")))
    }

    async fn delete_volume(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.enter("delete_volume")?;
        self.volumes
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("volume {name}")))
    }

    async fn create_snapshot(&self, spec: &SnapshotSpec) -> Result<SnapshotInfo, PlatformError> {
        self.enter("create_snapshot")?;
        let k = key(&spec.namespace, &spec.name);
        if self.snapshots.contains_key(&k) {
            return Err(PlatformError::AlreadyExists(format!("snapshot {}", spec.name)));
        }
        if !self.volumes.contains_key(&key(&spec.namespace, &spec.source_volume)) {
            return Err(PlatformError::NotFound(format!("volume {}", spec.source_volume)));
        }
        let info = SnapshotInfo {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            source_volume: Some(spec.source_volume.clone()),
            created_at: Some(Utc::now()),
            ready_to_use: true,
            labels: spec.labels.clone(),
            annotations: spec.annotations.clone(),
        };
        self.snapshots.insert(k, info.clone());
        Ok(info)
    }

    async fn list_snapshots(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<SnapshotInfo>, PlatformError> {
        self.enter("list_snapshots")?;
        Ok(self
            .snapshots
            .iter()
            .filter(|s| s.namespace == namespace && matches_selector(&s.labels, selector))
            .map(|s| s.clone())
            .collect())
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.enter("delete_snapshot")?;
        self.snapshots
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("snapshot {name}")))
    }

    async fn create_compute(&self, spec: &ComputeSpec) -> Result<ComputeUnit, PlatformError> {
        self.enter("create_compute")?;
        let k = key(&spec.namespace, &spec.name);
        if self.compute.contains_key(&k) {
            return Err(PlatformError::AlreadyExists(format!("compute unit {}", spec.name)));
        }
        let unit = self.unit(spec);
        self.compute.insert(k, (spec.clone(), unit.clone()));
        Ok(unit)
    }

    async fn get_compute(&self, namespace: &str, name: &str) -> Result<ComputeUnit, PlatformError> {
        self.enter("get_compute")?;
        let entry = self
            .compute
            .get(&key(namespace, name))
            .ok_or_else(|| PlatformError::NotFound(format!("compute unit {name}")))?;
        Ok(self.unit(&entry.0))
    }

    async fn list_compute(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<ComputeUnit>, PlatformError> {
        self.enter("list_compute")?;
        Ok(self
            .compute
            .iter()
            .filter(|c| c.key().0 == namespace && matches_selector(&c.0.labels, selector))
            .map(|c| self.unit(&c.0))
            .collect())
    }

    async fn delete_compute(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.enter("delete_compute")?;
        self.compute
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("compute unit {name}")))
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<EndpointInfo, PlatformError> {
        self.enter("create_endpoint")?;
        let k = key(&spec.namespace, &spec.name);
        if self.endpoints.contains_key(&k) {
            return Err(PlatformError::AlreadyExists(format!("endpoint {}", spec.name)));
        }
        let info = Self::endpoint_info(&spec.namespace, spec);
        self.endpoints.insert(k, spec.clone());
        Ok(info)
    }

    async fn get_endpoint(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<EndpointInfo, PlatformError> {
        self.enter("get_endpoint")?;
        self.endpoints
            .get(&key(namespace, name))
            .map(|spec| Self::endpoint_info(namespace, &spec))
            .ok_or_else(|| PlatformError::NotFound(format!("endpoint {name}")))
    }

    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.enter("delete_endpoint")?;
        self.endpoints
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("endpoint {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{instance_labels, project_selector};

    #[tokio::test]
    async fn second_namespace_create_reports_already_exists() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace("devdb").await.unwrap();
        assert!(matches!(
            platform.create_namespace("devdb").await,
            Err(PlatformError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn deletes_of_missing_objects_are_not_found() {
        let platform = InMemoryPlatform::new();
        assert!(platform.delete_compute("devdb", "x").await.unwrap_err().is_not_found());
        assert!(platform.delete_endpoint("devdb", "x").await.unwrap_err().is_not_found());
        assert!(platform.delete_volume("devdb", "x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_compute_filters_by_selector() {
        let platform = InMemoryPlatform::new();
        for (project, instance) in [("acme-shop", "db1"), ("acme-shop", "db2"), ("acme-blog", "db1")] {
            platform
                .create_compute(&ComputeSpec {
                    name: format!("{project}-{instance}"),
                    namespace: "devdb".into(),
                    engine: common::EngineType::Postgres,
                    image: "postgres:16".into(),
                    port: 5432,
                    env: vec![],
                    volume: format!("{project}-{instance}-data"),
                    labels: instance_labels(project, instance),
                    restore: None,
                })
                .await
                .unwrap();
        }

        let units = platform
            .list_compute("devdb", &project_selector("acme-shop"))
            .await
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(platform.calls("list_compute"), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_api_errors() {
        let platform = InMemoryPlatform::new();
        platform.fail_on("create_namespace");
        assert!(matches!(
            platform.create_namespace("devdb").await,
            Err(PlatformError::Api(_))
        ));
        platform.clear_failures();
        platform.create_namespace("devdb").await.unwrap();
    }
}
