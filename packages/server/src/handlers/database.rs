use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::Project;
use common::api::{
    CreateDatabaseRequest, CreateDatabaseResponse, CredentialsView, DatabaseListResponse,
    DatabaseResponse, DeleteDatabaseResponse,
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::orchestrator::{InstanceView, SeedStrategy};
use crate::state::AppState;

/// Combine an observed instance with its project's credentials.
pub(crate) fn database_response(
    project: &Project,
    instance: InstanceView,
    reveal_password: bool,
) -> DatabaseResponse {
    let creds = &project.default_credentials;
    DatabaseResponse {
        name: instance.name,
        project_id: project.id.clone(),
        status: instance.status,
        host: instance.host,
        port: instance.port,
        credentials: CredentialsView {
            username: creds.username.clone(),
            database_name: creds.database_name.clone(),
            password: reveal_password.then(|| creds.password.clone()),
        },
        created_at: instance.created_at,
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/databases",
    tag = "Databases",
    operation_id = "listDatabases",
    summary = "List a project's databases",
    description = "Instances are observed from the platform; status follows the compute unit's phase and readiness.",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Databases of the project", body = DatabaseListResponse),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Platform failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_databases(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DatabaseListResponse>, AppError> {
    let project = state.reconciler.project(&id).await?;
    let databases = state
        .reconciler
        .list_instances(&project)
        .await?
        .into_iter()
        .map(|instance| database_response(&project, instance, false))
        .collect();
    Ok(Json(DatabaseListResponse { databases }))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/databases",
    tag = "Databases",
    operation_id = "createDatabase",
    summary = "Create a database instance",
    description = "The first instance of a project is restored from the backup location (request or project) or starts empty. Later instances clone the project's latest ready snapshot. Instances that were not cloned are snapshotted in the background once ready.",
    params(("id" = String, Path, description = "Project id")),
    request_body = CreateDatabaseRequest,
    responses(
        (status = 201, description = "Instance created", body = CreateDatabaseResponse),
        (status = 400, description = "Validation error or unreachable backup (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Instance exists or project busy (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Platform failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(name = %payload.name))]
pub async fn create_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<CreateDatabaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.reconciler.create_instance(&id, &payload).await?;

    let (source_snapshot, source_backup) = match &created.strategy {
        SeedStrategy::CloneFromSnapshot(snapshot) => (Some(snapshot.name.clone()), None),
        SeedStrategy::RestoreFromBackup(location) => (None, Some(location.clone())),
        SeedStrategy::FreshEmpty => (None, None),
    };
    let response = CreateDatabaseResponse {
        strategy: created.strategy.kind(),
        restored_from_snapshot: source_snapshot.is_some(),
        source_snapshot,
        source_backup,
        snapshot_scheduled: created.snapshot_scheduled,
        database: database_response(&created.project, created.instance, true),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/databases/{name}",
    tag = "Databases",
    operation_id = "deleteDatabase",
    summary = "Delete a database instance",
    description = "Removes the compute unit, then the endpoint and (unless disabled) the volume. A missing endpoint or volume is ignored.",
    params(
        ("id" = String, Path, description = "Project id"),
        ("name" = String, Path, description = "Database name"),
    ),
    responses(
        (status = 200, description = "Instance deleted", body = DeleteDatabaseResponse),
        (status = 404, description = "Project or instance not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Platform failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn delete_database(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<DeleteDatabaseResponse>, AppError> {
    let volume_deleted = state.reconciler.delete_instance(&id, &name).await?;
    Ok(Json(DeleteDatabaseResponse {
        name,
        project_id: id,
        volume_deleted,
    }))
}
