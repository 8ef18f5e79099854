//! Instance Reconciler: drives creation and teardown of database instances.
//!
//! Creation runs `ensure namespace -> choose seed strategy -> provision
//! volume -> launch compute unit -> bind endpoint`, with the read-decide-act
//! span held under the project's lease and every step written to the flow
//! journal. A snapshot capture is scheduled in the background for instances
//! that were not cloned.

use std::sync::Arc;

use backup::{BackupImporter, restorable_format, validate_url};
use common::api::CreateDatabaseRequest;
use common::names::{MAX_RESOURCE_NAME_LEN, instance_resource_name, validate_label, volume_name};
use common::{InstanceStatus, Project};
use tracing::{Instrument, error, info, info_span, instrument, warn};
use uuid::Uuid;

use super::readiness::{ReadinessPolicy, wait_until_ready};
use super::snapshots::{CaptureTarget, SnapshotManager};
use super::volumes::VolumeProvisioner;
use super::{CreatedInstance, InstanceView, ReconcileError, SeedStrategy};
use crate::config::AppConfig;
use crate::platform::{
    ComputeSpec, ComputeUnit, EndpointSpec, Labels, Occupant, Platform, PlatformError, Removal,
    ResourceKind, RestoreInit, SnapshotInfo, instance_labels, occupant, project_selector,
    remove_owned, seed_labels,
};
use crate::registry::{
    FlowJournal, FlowOutcome, FlowRecord, FlowStep, LeaseManager, ProjectRegistry, RegistryError,
};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub namespace: String,
    pub volume_size: String,
    pub storage_class: Option<String>,
    pub service_type: String,
    pub restore_image: String,
    pub restore_secret: Option<String>,
    pub delete_volumes: bool,
    pub readiness: ReadinessPolicy,
}

impl ReconcilerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            namespace: config.platform.namespace.clone(),
            volume_size: config.platform.volume_size.clone(),
            storage_class: config.platform.storage_class.clone(),
            service_type: config.platform.service_type.clone(),
            restore_image: config.orchestrator.restore_image.clone(),
            restore_secret: config.orchestrator.restore_secret.clone(),
            delete_volumes: config.orchestrator.delete_volumes,
            readiness: ReadinessPolicy::from(&config.snapshots),
        }
    }
}

pub struct Reconciler {
    platform: Arc<dyn Platform>,
    projects: ProjectRegistry,
    leases: LeaseManager,
    journal: FlowJournal,
    snapshots: Arc<SnapshotManager>,
    volumes: VolumeProvisioner,
    importer: Arc<BackupImporter>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn Platform>,
        projects: ProjectRegistry,
        leases: LeaseManager,
        journal: FlowJournal,
        snapshots: Arc<SnapshotManager>,
        importer: Arc<BackupImporter>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            volumes: VolumeProvisioner::new(platform.clone()),
            platform,
            projects,
            leases,
            journal,
            snapshots,
            importer,
            settings,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    pub async fn project(&self, project_id: &str) -> Result<Project, ReconcileError> {
        match self.projects.get(project_id).await {
            Ok(project) => Ok(project),
            Err(RegistryError::NotFound(_)) => {
                Err(ReconcileError::ProjectNotFound(project_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a namespace, treating "already exists" as success.
    async fn ensure_namespace(&self) -> Result<(), ReconcileError> {
        match self.platform.create_namespace(&self.settings.namespace).await {
            Ok(()) => {
                info!(namespace = %self.settings.namespace, "Created namespace");
                Ok(())
            }
            Err(PlatformError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(ReconcileError::platform("ensure namespace")(e)),
        }
    }

    #[instrument(skip(self, request), fields(project_id = %project_id, instance = %request.name))]
    pub async fn create_instance(
        &self,
        project_id: &str,
        request: &CreateDatabaseRequest,
    ) -> Result<CreatedInstance, ReconcileError> {
        validate_label("database name", &request.name, MAX_RESOURCE_NAME_LEN)?;
        if let Some(location) = &request.backup_location
            && !validate_url(location)
        {
            return Err(ReconcileError::InvalidBackupLocation(location.clone()));
        }
        let project = self.project(project_id).await?;
        let resource = instance_resource_name(&project.id, &request.name)?;
        if let Some(location) = &request.backup_location {
            restorable_format(location, project.engine_type)
                .map_err(ReconcileError::UnrestorableBackup)?;
        }

        self.ensure_namespace().await?;

        let lease = self.leases.acquire(&project.id).await?;
        let result = self.provision(&project, request, &resource).await;
        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release project lease");
        }
        let (instance, strategy) = result?;

        let snapshot_scheduled = !matches!(strategy, SeedStrategy::CloneFromSnapshot(_))
            && self.snapshots.enabled();
        if snapshot_scheduled {
            self.schedule_capture(&project, &request.name, &resource, &strategy);
        }

        info!(strategy = ?strategy.kind(), status = %instance.status, "Database instance created");
        Ok(CreatedInstance {
            project,
            instance,
            strategy,
            snapshot_scheduled,
        })
    }

    /// The part of creation that runs under the project lease.
    async fn provision(
        &self,
        project: &Project,
        request: &CreateDatabaseRequest,
        resource: &str,
    ) -> Result<(InstanceView, SeedStrategy), ReconcileError> {
        let mut existing = self
            .platform
            .list_compute(&self.settings.namespace, &project_selector(&project.id))
            .await
            .map_err(ReconcileError::platform("list instances"))?;
        existing.retain(|unit| !unit.is_seed());
        if existing
            .iter()
            .any(|unit| unit.instance_name() == Some(request.name.as_str()))
        {
            return Err(ReconcileError::InstanceExists {
                project_id: project.id.clone(),
                instance: request.name.clone(),
            });
        }
        self.ensure_names_free(&project.id, &request.name, resource, true)
            .await?;

        let strategy = self
            .choose_strategy(project, request, existing.len())
            .await?;
        info!(strategy = ?strategy.kind(), existing = existing.len(), "Seed strategy chosen");

        let mut flow = self
            .journal
            .begin(
                &project.id,
                &request.name,
                &self.settings.namespace,
                strategy.kind(),
            )
            .await?;

        match self.launch(project, resource, &strategy, &mut flow).await {
            Ok(instance) => {
                if let Err(e) = self.journal.finish(&mut flow, FlowOutcome::Ready, None).await {
                    warn!(flow_id = %flow.id, error = %e, "Failed to record flow completion");
                }
                Ok((instance, strategy))
            }
            Err(e) => {
                error!(flow_id = %flow.id, step = ?flow.step, error = %e, "Instance creation failed");
                if let Err(journal_err) = self
                    .journal
                    .finish(&mut flow, FlowOutcome::Failed, Some(e.to_string()))
                    .await
                {
                    warn!(flow_id = %flow.id, error = %journal_err, "Failed to record flow failure");
                }
                Err(e)
            }
        }
    }

    /// Refuse a derived name that another project's object already holds,
    /// or any holder at all unless `owner_allowed`. Names join project id and
    /// instance with `-`, so `acme-shop`/`db-1` and `acme-shop-db`/`1` both
    /// derive `acme-shop-db-1`.
    async fn ensure_names_free(
        &self,
        project_id: &str,
        instance: &str,
        resource: &str,
        owner_allowed: bool,
    ) -> Result<(), ReconcileError> {
        let namespace = self.settings.namespace.as_str();
        let volume = volume_name(resource);
        for (kind, name) in [
            (ResourceKind::Compute, resource),
            (ResourceKind::Endpoint, resource),
            (ResourceKind::Volume, volume.as_str()),
        ] {
            let held = occupant(
                self.platform.as_ref(),
                kind,
                namespace,
                name,
                project_id,
                instance,
            )
            .await
            .map_err(ReconcileError::platform("check resource names"))?;
            if held == Occupant::Foreign || (held == Occupant::Owner && !owner_allowed) {
                return Err(ReconcileError::NameTaken {
                    project_id: project_id.to_string(),
                    instance: instance.to_string(),
                    resource: name.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn choose_strategy(
        &self,
        project: &Project,
        request: &CreateDatabaseRequest,
        existing: usize,
    ) -> Result<SeedStrategy, ReconcileError> {
        if existing == 0 {
            let backup = request
                .backup_location
                .as_ref()
                .or(project.backup_location.as_ref());
            return match backup {
                Some(location) => {
                    restorable_format(location, project.engine_type)
                        .map_err(ReconcileError::UnrestorableBackup)?;
                    if !self.importer.verify_reachable(location).await {
                        return Err(ReconcileError::BackupUnreachable(location.clone()));
                    }
                    Ok(SeedStrategy::RestoreFromBackup(location.clone()))
                }
                None => Ok(SeedStrategy::FreshEmpty),
            };
        }

        match self
            .snapshots
            .select_latest(&project.id, &self.settings.namespace)
            .await
        {
            Some(snapshot) => Ok(SeedStrategy::CloneFromSnapshot(snapshot)),
            None => {
                warn!("No ready snapshot for project, starting empty");
                Ok(SeedStrategy::FreshEmpty)
            }
        }
    }

    /// Create volume, compute unit and endpoint. Each resource is named in
    /// the journal before it is created.
    async fn launch(
        &self,
        project: &Project,
        resource: &str,
        strategy: &SeedStrategy,
        flow: &mut FlowRecord,
    ) -> Result<InstanceView, ReconcileError> {
        let namespace = self.settings.namespace.as_str();
        let labels = instance_labels(&project.id, &flow.instance);
        let unit = self
            .launch_unit(project, resource, strategy, labels.clone(), flow)
            .await?;

        flow.resources.endpoint = Some(resource.to_string());
        self.journal.save(flow).await?;
        let endpoint = self
            .platform
            .create_endpoint(&EndpointSpec {
                name: resource.to_string(),
                namespace: namespace.to_string(),
                port: project.engine_type.default_port(),
                service_type: self.settings.service_type.clone(),
                selector: labels.clone(),
                labels,
            })
            .await
            .map_err(ReconcileError::platform("bind endpoint"))?;
        self.journal.record(flow, FlowStep::EndpointBound).await?;

        Ok(InstanceView {
            name: flow.instance.clone(),
            status: InstanceStatus::from_phase(unit.phase.as_deref(), unit.ready, unit.deleting),
            host: endpoint.host,
            port: endpoint.port,
            created_at: unit.created_at,
        })
    }

    /// Volume and compute unit, without an endpoint.
    async fn launch_unit(
        &self,
        project: &Project,
        resource: &str,
        strategy: &SeedStrategy,
        labels: Labels,
        flow: &mut FlowRecord,
    ) -> Result<ComputeUnit, ReconcileError> {
        let namespace = self.settings.namespace.as_str();
        let volume = volume_name(resource);
        let storage_class = self.settings.storage_class.as_deref();

        flow.resources.volume = Some(volume.clone());
        self.journal.save(flow).await?;
        let provisioned = match strategy {
            SeedStrategy::CloneFromSnapshot(snapshot) => {
                self.volumes
                    .create_from_snapshot(
                        &volume,
                        namespace,
                        snapshot,
                        &self.settings.volume_size,
                        storage_class,
                        labels.clone(),
                    )
                    .await
            }
            SeedStrategy::FreshEmpty | SeedStrategy::RestoreFromBackup(_) => {
                self.volumes
                    .create_fresh(
                        &volume,
                        namespace,
                        &self.settings.volume_size,
                        storage_class,
                        labels.clone(),
                    )
                    .await
            }
        };
        provisioned.map_err(ReconcileError::platform("provision volume"))?;
        self.journal.record(flow, FlowStep::VolumeProvisioned).await?;

        let engine = project.engine_type;
        let credentials = &project.default_credentials;
        let restore = match strategy {
            SeedStrategy::RestoreFromBackup(location) => Some(RestoreInit {
                image: self.settings.restore_image.clone(),
                source: location.clone(),
                secret: self.settings.restore_secret.clone(),
            }),
            _ => None,
        };
        let compute = ComputeSpec {
            name: resource.to_string(),
            namespace: namespace.to_string(),
            engine,
            image: project.image(),
            port: engine.default_port(),
            env: engine.bootstrap_env(
                &credentials.username,
                &credentials.password,
                &credentials.database_name,
            ),
            volume,
            labels,
            restore,
        };

        flow.resources.compute = Some(resource.to_string());
        self.journal.save(flow).await?;
        let unit = self
            .platform
            .create_compute(&compute)
            .await
            .map_err(ReconcileError::platform("launch compute unit"))?;
        self.journal.record(flow, FlowStep::ComputeLaunched).await?;
        Ok(unit)
    }

    /// Snapshot the new instance once it is ready, without blocking the
    /// caller.
    fn schedule_capture(
        &self,
        project: &Project,
        instance: &str,
        resource: &str,
        strategy: &SeedStrategy,
    ) {
        let platform = self.platform.clone();
        let snapshots = self.snapshots.clone();
        let policy = self.settings.readiness;
        let compute = resource.to_string();
        let target = CaptureTarget {
            project_id: project.id.clone(),
            instance: instance.to_string(),
            namespace: self.settings.namespace.clone(),
            volume: volume_name(resource),
            engine_version: project.engine_version.clone(),
            backup_location: match strategy {
                SeedStrategy::RestoreFromBackup(location) => Some(location.clone()),
                _ => None,
            },
        };

        let span = info_span!("snapshot_capture", project_id = %target.project_id, instance = %target.instance);
        tokio::spawn(
            async move {
                if !wait_until_ready(platform.as_ref(), &target.namespace, &compute, policy).await {
                    warn!("Instance not ready, skipping snapshot capture");
                    return;
                }
                snapshots.capture(&target).await;
            }
            .instrument(span),
        );
    }

    /// Restore the project's backup into a temporary seed instance, snapshot
    /// its volume once ready, then remove the seed. Later instances of the
    /// project clone from the snapshot instead of restoring.
    #[instrument(skip(self))]
    pub async fn initialize_snapshot(&self, project_id: &str) -> Result<SnapshotInfo, ReconcileError> {
        let project = self.project(project_id).await?;
        if !self.snapshots.enabled() {
            return Err(ReconcileError::SnapshotsDisabled);
        }
        let location = project
            .backup_location
            .clone()
            .ok_or_else(|| ReconcileError::NoBackupLocation(project.id.clone()))?;
        restorable_format(&location, project.engine_type)
            .map_err(ReconcileError::UnrestorableBackup)?;
        if !self.importer.verify_reachable(&location).await {
            return Err(ReconcileError::BackupUnreachable(location));
        }

        self.ensure_namespace().await?;

        let seed = format!("seed-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let resource = instance_resource_name(&project.id, &seed)?;
        self.ensure_names_free(&project.id, &seed, &resource, false)
            .await?;
        let strategy = SeedStrategy::RestoreFromBackup(location.clone());
        let mut flow = self
            .journal
            .begin(&project.id, &seed, &self.settings.namespace, strategy.kind())
            .await?;
        info!(seed = %seed, "Seeding project snapshot from backup");

        let result = self
            .seed_snapshot(&project, &resource, &strategy, &mut flow)
            .await;

        if !self.remove_seed(&project.id, &seed, &resource).await {
            warn!(flow_id = %flow.id, "Seed instance left in place for recovery");
            return result;
        }
        let (outcome, error) = match &result {
            Ok(_) => (FlowOutcome::Ready, None),
            Err(e) => (FlowOutcome::Failed, Some(e.to_string())),
        };
        if let Err(e) = self.journal.finish(&mut flow, outcome, error).await {
            warn!(flow_id = %flow.id, error = %e, "Failed to record seed flow outcome");
        }
        result
    }

    async fn seed_snapshot(
        &self,
        project: &Project,
        resource: &str,
        strategy: &SeedStrategy,
        flow: &mut FlowRecord,
    ) -> Result<SnapshotInfo, ReconcileError> {
        let labels = seed_labels(&project.id, &flow.instance);
        self.launch_unit(project, resource, strategy, labels, flow)
            .await?;

        let namespace = self.settings.namespace.as_str();
        if !wait_until_ready(self.platform.as_ref(), namespace, resource, self.settings.readiness)
            .await
        {
            return Err(ReconcileError::SeedFailed {
                project_id: project.id.clone(),
                reason: "seed instance never became ready",
            });
        }

        let target = CaptureTarget {
            project_id: project.id.clone(),
            instance: flow.instance.clone(),
            namespace: namespace.to_string(),
            volume: volume_name(resource),
            engine_version: project.engine_version.clone(),
            backup_location: match strategy {
                SeedStrategy::RestoreFromBackup(location) => Some(location.clone()),
                _ => None,
            },
        };
        self.snapshots
            .capture(&target)
            .await
            .ok_or_else(|| ReconcileError::SeedFailed {
                project_id: project.id.clone(),
                reason: "snapshot capture failed",
            })
    }

    /// Remove the seed's compute unit and volume. Returns whether both are gone.
    async fn remove_seed(&self, project_id: &str, seed: &str, resource: &str) -> bool {
        let namespace = self.settings.namespace.as_str();
        let volume = volume_name(resource);
        let mut removed = true;
        for (kind, name) in [
            (ResourceKind::Compute, resource),
            (ResourceKind::Volume, volume.as_str()),
        ] {
            match remove_owned(self.platform.as_ref(), kind, namespace, name, project_id, seed).await
            {
                Ok(Removal::Deleted | Removal::Missing) => {}
                Ok(Removal::Foreign) => {
                    warn!(resource = %name, "Seed name held by another project, left in place");
                }
                Err(e) => {
                    warn!(resource = %name, error = %e, "Failed to remove seed resource");
                    removed = false;
                }
            }
        }
        removed
    }

    /// Instances of `project`, observed from the platform, sorted by name.
    pub async fn list_instances(&self, project: &Project) -> Result<Vec<InstanceView>, ReconcileError> {
        let namespace = self.settings.namespace.as_str();
        let units = self
            .platform
            .list_compute(namespace, &project_selector(&project.id))
            .await
            .map_err(ReconcileError::platform("list instances"))?;

        let mut instances = Vec::with_capacity(units.len());
        for unit in units {
            if unit.is_seed() {
                continue;
            }
            let Some(name) = unit.instance_name().map(str::to_string) else {
                continue;
            };
            let (host, port) = match self.platform.get_endpoint(namespace, &unit.name).await {
                Ok(endpoint) => (endpoint.host, endpoint.port),
                Err(e) if e.is_not_found() => (None, project.engine_type.default_port()),
                Err(e) => return Err(ReconcileError::platform("read endpoint")(e)),
            };
            instances.push(InstanceView {
                name,
                status: InstanceStatus::from_phase(unit.phase.as_deref(), unit.ready, unit.deleting),
                host,
                port,
                created_at: unit.created_at,
            });
        }
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    /// Tear an instance down. A missing compute unit is an error, a missing
    /// endpoint or volume is not. Objects are only removed when their labels
    /// name this project and instance. Returns whether the volume was removed.
    #[instrument(skip(self))]
    pub async fn delete_instance(
        &self,
        project_id: &str,
        instance: &str,
    ) -> Result<bool, ReconcileError> {
        validate_label("database name", instance, MAX_RESOURCE_NAME_LEN)?;
        let project = self.project(project_id).await?;
        let resource = instance_resource_name(&project.id, instance)?;
        let namespace = self.settings.namespace.as_str();
        let platform = self.platform.as_ref();

        let compute = remove_owned(
            platform,
            ResourceKind::Compute,
            namespace,
            &resource,
            &project.id,
            instance,
        )
        .await
        .map_err(ReconcileError::platform("remove compute unit"))?;
        if compute != Removal::Deleted {
            if compute == Removal::Foreign {
                warn!(resource = %resource, "Compute unit belongs to another project");
            }
            return Err(ReconcileError::InstanceNotFound {
                project_id: project.id.clone(),
                instance: instance.to_string(),
            });
        }

        let endpoint = remove_owned(
            platform,
            ResourceKind::Endpoint,
            namespace,
            &resource,
            &project.id,
            instance,
        )
        .await
        .map_err(ReconcileError::platform("remove endpoint"))?;
        if endpoint == Removal::Foreign {
            warn!(resource = %resource, "Endpoint belongs to another project, left in place");
        }

        let volume_deleted = if self.settings.delete_volumes {
            let volume = volume_name(&resource);
            match remove_owned(
                platform,
                ResourceKind::Volume,
                namespace,
                &volume,
                &project.id,
                instance,
            )
            .await
            .map_err(ReconcileError::platform("remove volume"))?
            {
                Removal::Foreign => {
                    warn!(volume = %volume, "Volume belongs to another project, left in place");
                    false
                }
                Removal::Deleted | Removal::Missing => true,
            }
        } else {
            false
        };

        info!(volume_deleted, "Database instance deleted");
        Ok(volume_deleted)
    }
}
