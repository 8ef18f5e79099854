//! Request and response bodies of the HTTP API, shared by the server and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineType;
use crate::instance_status::InstanceStatus;
use crate::project::Project;

/// How a new instance's volume was populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SeedStrategyKind {
    /// Empty volume; the engine initialises a new data directory.
    FreshEmpty,
    /// Copy-on-write clone of the project's latest ready snapshot.
    CloneFromSnapshot,
    /// Empty volume loaded from a backup artifact before first start.
    RestoreFromBackup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsInput {
    #[schema(example = "app")]
    pub username: Option<String>,
    /// Generated when omitted.
    pub password: Option<String>,
    #[schema(example = "shop")]
    pub database_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[schema(example = "acme")]
    pub owner: String,
    #[schema(example = "shop")]
    pub name: String,
    pub engine_type: EngineType,
    #[schema(example = "16")]
    pub engine_version: String,
    /// `http(s)://` URL or `s3://bucket/key` reference of a backup artifact.
    #[schema(example = "https://backups.example.com/db.dump")]
    pub backup_location: Option<String>,
    #[serde(default)]
    pub credentials: Option<CredentialsInput>,
}

/// Credentials as exposed to API clients. The password is only returned
/// from create calls.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsView {
    pub username: String,
    pub database_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    #[schema(example = "acme-shop")]
    pub id: String,
    pub owner: String,
    pub name: String,
    pub engine_type: EngineType,
    pub engine_version: String,
    pub backup_location: Option<String>,
    pub default_credentials: CredentialsView,
    pub created_at: DateTime<Utc>,
}

impl ProjectResponse {
    /// Build a response, optionally revealing the default password.
    pub fn from_project(project: Project, reveal_password: bool) -> Self {
        let creds = project.default_credentials;
        Self {
            id: project.id,
            owner: project.owner,
            name: project.name,
            engine_type: project.engine_type,
            engine_version: project.engine_version,
            backup_location: project.backup_location,
            default_credentials: CredentialsView {
                username: creds.username,
                database_name: creds.database_name,
                password: reveal_password.then_some(creds.password),
            },
            created_at: project.created_at,
        }
    }
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self::from_project(project, false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub databases: Vec<DatabaseResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListQuery {
    /// Only return projects owned by this owner.
    #[param(example = "acme")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    #[schema(example = "db1")]
    pub name: String,
    /// Overrides the project's backup location for a first instance.
    pub backup_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResponse {
    #[schema(example = "db1")]
    pub name: String,
    pub project_id: String,
    pub status: InstanceStatus,
    /// Externally reachable host, once the endpoint has been assigned one.
    pub host: Option<String>,
    pub port: u16,
    pub credentials: CredentialsView,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseResponse {
    #[serde(flatten)]
    pub database: DatabaseResponse,
    pub strategy: SeedStrategyKind,
    pub restored_from_snapshot: bool,
    pub source_snapshot: Option<String>,
    pub source_backup: Option<String>,
    /// Whether a post-initialisation snapshot capture was scheduled.
    pub snapshot_scheduled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DatabaseListResponse {
    pub databases: Vec<DatabaseResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDatabaseResponse {
    pub name: String,
    pub project_id: String,
    /// Whether the instance's volume was removed along with it.
    pub volume_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub name: String,
    pub source_volume: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub ready_to_use: bool,
    pub engine_version: Option<String>,
    pub backup_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    #[schema(example = "orders.abc123.eu-west-1.rds.amazonaws.com")]
    pub host: String,
    /// Defaults to the engine's standard port.
    pub port: Option<u16>,
    pub username: String,
    /// Required unless `useIamAuth` is set.
    pub password: Option<String>,
    #[serde(default)]
    pub use_iam_auth: bool,
    pub database: String,
    /// Address to connect to instead of `host`, e.g. a VPC endpoint or proxy.
    /// IAM tokens are still issued for `host`.
    pub endpoint_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub bucket: String,
    #[schema(example = "acme/acme-shop/20260101T120000Z.dump")]
    pub key: String,
    /// `s3://bucket/key` reference usable as a project backup location.
    pub location: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub version: String,
}

/// Error payload returned by the server on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
