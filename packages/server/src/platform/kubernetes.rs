use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::engine::INIT_SCRIPTS_DIR;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvFromSource, EnvVar, Namespace,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, Pod,
    PodSpec, Probe, SecretEnvSource, Service, ServicePort, ServiceSpec, TCPSocketAction,
    TypedLocalObjectReference, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::{Api, Client};
use serde_json::{Value, json};
use tracing::debug;

use super::{
    ComputeSpec, ComputeUnit, EndpointInfo, EndpointSpec, LABEL_MANAGED_BY, Labels, MANAGED_BY,
    Platform, PlatformError, SnapshotInfo, SnapshotSpec, VolumeHandle, VolumeSpec,
};

const SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";
const DATA_VOLUME: &str = "data";
const INIT_VOLUME: &str = "initdb";

/// [`Platform`] backed by a Kubernetes cluster: pods, services, PVCs and
/// CSI `VolumeSnapshot`s.
pub struct KubePlatform {
    client: Client,
    snapshots: ApiResource,
}

impl KubePlatform {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(SNAPSHOT_GROUP, "v1", "VolumeSnapshot");
        Self {
            client,
            snapshots: ApiResource::from_gvk_with_plural(&gvk, "volumesnapshots"),
        }
    }

    /// Connect using the in-cluster service account or the local kubeconfig.
    pub async fn connect() -> Result<Self, PlatformError> {
        let client = Client::try_default()
            .await
            .map_err(|e| PlatformError::Api(format!("failed to create client: {e}")))?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn volume_snapshots(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.snapshots)
    }
}

fn map_err(err: kube::Error, what: impl Into<String>) -> PlatformError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => PlatformError::AlreadyExists(what.into()),
        kube::Error::Api(resp) if resp.code == 404 => PlatformError::NotFound(what.into()),
        other => PlatformError::Api(format!("{}: {other}", what.into())),
    }
}

fn label_selector(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn meta(name: &str, labels: &Labels, annotations: Option<&Labels>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone()),
        annotations: annotations.filter(|a| !a.is_empty()).cloned(),
        ..Default::default()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Read a metadata timestamp through its RFC 3339 wire form.
fn meta_timestamp(time: Option<&Time>) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time?).ok()?;
    parse_timestamp(value.as_str()?)
}

fn snapshot_info(namespace: &str, obj: DynamicObject) -> SnapshotInfo {
    let source_volume = obj
        .data
        .pointer("/spec/source/persistentVolumeClaimName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let ready_to_use = obj
        .data
        .pointer("/status/readyToUse")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let created_at = obj
        .data
        .pointer("/status/creationTime")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .or_else(|| meta_timestamp(obj.metadata.creation_timestamp.as_ref()));

    SnapshotInfo {
        name: obj.metadata.name.unwrap_or_default(),
        namespace: namespace.to_string(),
        source_volume,
        created_at,
        ready_to_use,
        labels: obj.metadata.labels.unwrap_or_default(),
        annotations: obj.metadata.annotations.unwrap_or_default(),
    }
}

fn compute_unit(pod: Pod) -> ComputeUnit {
    let status = pod.status.unwrap_or_default();
    let ready = status
        .conditions
        .unwrap_or_default()
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    ComputeUnit {
        name: pod.metadata.name.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
        phase: status.phase,
        ready,
        deleting: pod.metadata.deletion_timestamp.is_some(),
        created_at: meta_timestamp(pod.metadata.creation_timestamp.as_ref()),
    }
}

fn endpoint_info(namespace: &str, svc: Service) -> EndpointInfo {
    let name = svc.metadata.name.unwrap_or_default();
    let labels = svc.metadata.labels.unwrap_or_default();
    let port = svc
        .spec
        .and_then(|s| s.ports)
        .and_then(|ports| ports.first().map(|p| p.port))
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or_default();
    let ingress_host = svc
        .status
        .and_then(|s| s.load_balancer)
        .and_then(|lb| lb.ingress)
        .and_then(|ingress| ingress.into_iter().next())
        .and_then(|i| i.ip.or(i.hostname));
    let host = ingress_host.or_else(|| Some(format!("{name}.{namespace}.svc.cluster.local")));
    EndpointInfo {
        name,
        host,
        port,
        labels,
    }
}

fn pod_manifest(spec: &ComputeSpec) -> Pod {
    let mut volume_mounts = vec![VolumeMount {
        name: DATA_VOLUME.into(),
        mount_path: spec.engine.data_mount_path().into(),
        sub_path: Some(spec.engine.data_sub_path().into()),
        ..Default::default()
    }];
    let mut volumes = vec![Volume {
        name: DATA_VOLUME.into(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: spec.volume.clone(),
            read_only: None,
        }),
        ..Default::default()
    }];

    let init_containers = spec.restore.as_ref().map(|restore| {
        volume_mounts.push(VolumeMount {
            name: INIT_VOLUME.into(),
            mount_path: INIT_SCRIPTS_DIR.into(),
            ..Default::default()
        });
        volumes.push(Volume {
            name: INIT_VOLUME.into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        vec![Container {
            name: "restore".into(),
            image: Some(restore.image.clone()),
            args: Some(vec![
                "stage".into(),
                "--source".into(),
                restore.source.clone(),
                "--engine".into(),
                spec.engine.to_string(),
                "--dest".into(),
                INIT_SCRIPTS_DIR.into(),
            ]),
            env_from: restore.secret.as_ref().map(|secret| {
                vec![EnvFromSource {
                    secret_ref: Some(SecretEnvSource {
                        name: secret.clone(),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }]
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: INIT_VOLUME.into(),
                mount_path: INIT_SCRIPTS_DIR.into(),
                ..Default::default()
            }]),
            ..Default::default()
        }]
    });

    let port = i32::from(spec.port);
    let engine = Container {
        name: spec.engine.as_str().into(),
        image: Some(spec.image.clone()),
        env: Some(
            spec.env
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.clone(),
                    value: Some(value.clone()),
                    ..Default::default()
                })
                .collect(),
        ),
        ports: Some(vec![ContainerPort {
            container_port: port,
            name: Some("db".into()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                host: None,
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(5),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Pod {
        metadata: meta(&spec.name, &spec.labels, None),
        spec: Some(PodSpec {
            init_containers,
            containers: vec![engine],
            volumes: Some(volumes),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Platform for KubePlatform {
    async fn create_namespace(&self, namespace: &str) -> Result<(), PlatformError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let labels = Labels::from([(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string())]);
        let ns = Namespace {
            metadata: meta(namespace, &labels, None),
            ..Default::default()
        };
        api.create(&PostParams::default(), &ns)
            .await
            .map_err(|e| map_err(e, format!("namespace {namespace}")))?;
        Ok(())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<VolumeHandle, PlatformError> {
        let data_source = spec
            .source_snapshot
            .as_ref()
            .map(|snapshot| TypedLocalObjectReference {
                api_group: Some(SNAPSHOT_GROUP.into()),
                kind: "VolumeSnapshot".into(),
                name: snapshot.clone(),
            });
        let claim = PersistentVolumeClaim {
            metadata: meta(&spec.name, &spec.labels, Some(&spec.annotations)),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".into()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(
                        [("storage".to_string(), Quantity(spec.size.clone()))].into(),
                    ),
                    ..Default::default()
                }),
                storage_class_name: spec.storage_class.clone(),
                data_source,
                ..Default::default()
            }),
            ..Default::default()
        };

        self.claims(&spec.namespace)
            .create(&PostParams::default(), &claim)
            .await
            .map_err(|e| map_err(e, format!("volume {}", spec.name)))?;
        Ok(VolumeHandle {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            labels: spec.labels.clone(),
        })
    }

    async fn get_volume(&self, namespace: &str, name: &str) -> Result<VolumeHandle, PlatformError> {
        let claim = self
            .claims(namespace)
            .get(name)
            .await
            .map_err(|e| map_err(e, format!("volume {name}")))?;
        Ok(VolumeHandle {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: claim.metadata.labels.unwrap_or_default(),
        })
    }

    async fn delete_volume(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.claims(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, format!("volume {name}")))?;
        Ok(())
    }

    async fn create_snapshot(&self, spec: &SnapshotSpec) -> Result<SnapshotInfo, PlatformError> {
        let mut body = json!({ "source": { "persistentVolumeClaimName": spec.source_volume } });
        if let Some(class) = &spec.snapshot_class {
            body["volumeSnapshotClassName"] = json!(class);
        }

        let mut obj = DynamicObject::new(&spec.name, &self.snapshots)
            .within(&spec.namespace)
            .data(json!({ "spec": body }));
        obj.metadata.labels = Some(spec.labels.clone());
        obj.metadata.annotations = Some(spec.annotations.clone());

        let created = self
            .volume_snapshots(&spec.namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| map_err(e, format!("snapshot {}", spec.name)))?;
        debug!(snapshot = %spec.name, "Created volume snapshot");
        Ok(snapshot_info(&spec.namespace, created))
    }

    async fn list_snapshots(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<SnapshotInfo>, PlatformError> {
        let list = self
            .volume_snapshots(namespace)
            .list(&ListParams::default().labels(&label_selector(selector)))
            .await
            .map_err(|e| map_err(e, "snapshots"))?;
        Ok(list
            .items
            .into_iter()
            .map(|obj| snapshot_info(namespace, obj))
            .collect())
    }

    async fn delete_snapshot(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.volume_snapshots(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, format!("snapshot {name}")))?;
        Ok(())
    }

    async fn create_compute(&self, spec: &ComputeSpec) -> Result<ComputeUnit, PlatformError> {
        let pod = self
            .pods(&spec.namespace)
            .create(&PostParams::default(), &pod_manifest(spec))
            .await
            .map_err(|e| map_err(e, format!("compute unit {}", spec.name)))?;
        Ok(compute_unit(pod))
    }

    async fn get_compute(&self, namespace: &str, name: &str) -> Result<ComputeUnit, PlatformError> {
        let pod = self
            .pods(namespace)
            .get(name)
            .await
            .map_err(|e| map_err(e, format!("compute unit {name}")))?;
        Ok(compute_unit(pod))
    }

    async fn list_compute(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<ComputeUnit>, PlatformError> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(&label_selector(selector)))
            .await
            .map_err(|e| map_err(e, "compute units"))?;
        Ok(list.items.into_iter().map(compute_unit).collect())
    }

    async fn delete_compute(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, format!("compute unit {name}")))?;
        Ok(())
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<EndpointInfo, PlatformError> {
        let port = i32::from(spec.port);
        let svc = Service {
            metadata: meta(&spec.name, &spec.labels, None),
            spec: Some(ServiceSpec {
                type_: Some(spec.service_type.clone()),
                selector: Some(spec.selector.clone()),
                ports: Some(vec![ServicePort {
                    name: Some("db".into()),
                    port,
                    target_port: Some(IntOrString::Int(port)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .services(&spec.namespace)
            .create(&PostParams::default(), &svc)
            .await
            .map_err(|e| map_err(e, format!("endpoint {}", spec.name)))?;
        Ok(endpoint_info(&spec.namespace, created))
    }

    async fn get_endpoint(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<EndpointInfo, PlatformError> {
        let svc = self
            .services(namespace)
            .get(name)
            .await
            .map_err(|e| map_err(e, format!("endpoint {name}")))?;
        Ok(endpoint_info(namespace, svc))
    }

    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_err(e, format!("endpoint {name}")))?;
        Ok(())
    }
}
