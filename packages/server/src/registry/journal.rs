//! Persisted progress of instance creation flows.
//!
//! Each flow is written at every step so that a crash leaves a record of
//! which platform resources exist. Flows still in progress are kept in an
//! index set that recovery walks on startup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::api::SeedStrategyKind;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{KeyValueStore, RegistryError, decode, encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    SeedStrategyChosen,
    VolumeProvisioned,
    ComputeLaunched,
    EndpointBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    InProgress,
    Ready,
    /// Aborted by an error; created resources are left for diagnosis.
    Failed,
    /// Found in progress after a restart and cleaned up by recovery.
    Abandoned,
}

/// Names of the platform objects a flow has created so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResources {
    pub volume: Option<String>,
    pub compute: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: Uuid,
    pub project_id: String,
    pub instance: String,
    pub namespace: String,
    pub step: FlowStep,
    pub strategy: SeedStrategyKind,
    pub resources: FlowResources,
    pub outcome: FlowOutcome,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct FlowJournal {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    retention: Duration,
}

impl FlowJournal {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep finished records for `retention`; in-progress records never expire.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn record_key(&self, id: &Uuid) -> String {
        format!("{}flow:{id}", self.prefix)
    }

    fn active_index(&self) -> String {
        format!("{}flows:active", self.prefix)
    }

    async fn write(&self, record: &FlowRecord) -> Result<(), RegistryError> {
        self.kv
            .set(&self.record_key(&record.id), &encode(record)?)
            .await
    }

    /// Start journaling a flow whose seed strategy has been chosen.
    pub async fn begin(
        &self,
        project_id: &str,
        instance: &str,
        namespace: &str,
        strategy: SeedStrategyKind,
    ) -> Result<FlowRecord, RegistryError> {
        let now = Utc::now();
        let record = FlowRecord {
            id: Uuid::now_v7(),
            project_id: project_id.to_string(),
            instance: instance.to_string(),
            namespace: namespace.to_string(),
            step: FlowStep::SeedStrategyChosen,
            strategy,
            resources: FlowResources::default(),
            outcome: FlowOutcome::InProgress,
            error: None,
            started_at: now,
            updated_at: now,
        };
        self.write(&record).await?;
        self.kv
            .add_member(&self.active_index(), &record.id.to_string())
            .await?;
        Ok(record)
    }

    /// Persist the record as is, e.g. after naming a resource about to be
    /// created.
    pub async fn save(&self, record: &mut FlowRecord) -> Result<(), RegistryError> {
        record.updated_at = Utc::now();
        self.write(record).await
    }

    /// Persist a step transition.
    pub async fn record(&self, record: &mut FlowRecord, step: FlowStep) -> Result<(), RegistryError> {
        record.step = step;
        self.save(record).await
    }

    /// Persist the final outcome and drop the flow from the active index.
    /// The record expires after the retention period.
    pub async fn finish(
        &self,
        record: &mut FlowRecord,
        outcome: FlowOutcome,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        record.outcome = outcome;
        record.error = error;
        record.updated_at = Utc::now();
        self.kv
            .set_expiring(&self.record_key(&record.id), &encode(record)?, self.retention)
            .await?;
        self.kv
            .remove_member(&self.active_index(), &record.id.to_string())
            .await
    }

    pub async fn get(&self, id: &Uuid) -> Result<FlowRecord, RegistryError> {
        let key = self.record_key(id);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("flow {id}")))?;
        decode(&key, &raw)
    }

    /// Flows that have not reached an outcome.
    pub async fn active(&self) -> Result<Vec<FlowRecord>, RegistryError> {
        let index = self.active_index();
        let mut flows = Vec::new();
        for member in self.kv.members(&index).await? {
            let Ok(id) = member.parse::<Uuid>() else {
                warn!(member = %member, "Dropping malformed flow index entry");
                self.kv.remove_member(&index, &member).await?;
                continue;
            };
            match self.get(&id).await {
                Ok(flow) if flow.outcome == FlowOutcome::InProgress => flows.push(flow),
                Ok(_) | Err(RegistryError::NotFound(_)) => {
                    self.kv.remove_member(&index, &member).await?;
                }
                Err(e) => return Err(e),
            }
        }
        flows.sort_by_key(|f| f.started_at);
        Ok(flows)
    }
}
