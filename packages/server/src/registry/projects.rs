use std::sync::Arc;

use common::Project;
use tracing::{instrument, warn};

use super::{KeyValueStore, RegistryError, decode, encode};

/// Durable mapping from project id to project metadata.
///
/// Each project is one schema-versioned record. Enumeration goes through
/// index sets (one per owner plus a global one), never key scans. Index
/// updates are not atomic with the record write, so `list` skips index
/// entries whose record is missing.
#[derive(Clone)]
pub struct ProjectRegistry {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ProjectRegistry {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}project:{id}", self.prefix)
    }

    fn owner_index(&self, owner: &str) -> String {
        format!("{}projects:owner:{owner}", self.prefix)
    }

    fn global_index(&self) -> String {
        format!("{}projects:all", self.prefix)
    }

    async fn index(&self, project: &Project) -> Result<(), RegistryError> {
        self.kv
            .add_member(&self.owner_index(&project.owner), &project.id)
            .await?;
        self.kv.add_member(&self.global_index(), &project.id).await
    }

    /// Store a new project, failing with `AlreadyExists` if the id is taken.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub async fn create(&self, project: &Project) -> Result<(), RegistryError> {
        let written = self
            .kv
            .set_nx(&self.record_key(&project.id), &encode(project)?, None)
            .await?;
        if !written {
            return Err(RegistryError::AlreadyExists(format!("project {}", project.id)));
        }
        self.index(project).await
    }

    /// Store a project, overwriting any existing record with the same id.
    pub async fn put(&self, project: &Project) -> Result<(), RegistryError> {
        self.kv
            .set(&self.record_key(&project.id), &encode(project)?)
            .await?;
        self.index(project).await
    }

    pub async fn get(&self, id: &str) -> Result<Project, RegistryError> {
        let key = self.record_key(id);
        let raw = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))?;
        decode(&key, &raw)
    }

    /// List projects, optionally restricted to one owner, oldest first.
    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<Project>, RegistryError> {
        let index = match owner {
            Some(owner) => self.owner_index(owner),
            None => self.global_index(),
        };

        let mut projects = Vec::new();
        for id in self.kv.members(&index).await? {
            match self.get(&id).await {
                Ok(project) => projects.push(project),
                Err(RegistryError::NotFound(_)) => {
                    warn!(project_id = %id, index = %index, "Index entry without record, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }
}
