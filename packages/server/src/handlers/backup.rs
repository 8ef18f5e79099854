use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use backup::{CaptureRequest, ConnectionDescriptor};
use common::api::{BackupRequest, BackupResponse};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::state::AppState;

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/projects/{id}/backup",
    tag = "Backups",
    operation_id = "createBackup",
    summary = "Capture a live database into object storage",
    description = "Connects with a password or an IAM auth token, dumps the database with the engine's native tool over TLS and uploads the dump under `{owner}/{projectId}/{timestamp}.{ext}`. The returned location can be used as a project backup location.",
    params(("id" = String, Path, description = "Project id")),
    request_body = BackupRequest,
    responses(
        (status = 201, description = "Backup uploaded", body = BackupResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Capture failed, with remediation hints (BACKUP_FAILED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(host = %payload.host, database = %payload.database))]
pub async fn create_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<BackupRequest>,
) -> Result<impl IntoResponse, AppError> {
    require("host", &payload.host)?;
    require("username", &payload.username)?;
    require("database", &payload.database)?;
    let project = state.reconciler.project(&id).await?;

    let connection = ConnectionDescriptor::new(
        payload.host,
        payload
            .port
            .unwrap_or_else(|| project.engine_type.default_port()),
        payload.username,
        payload.password,
        payload.use_iam_auth,
        payload.database,
        payload.endpoint_override,
    )?;

    let artifact = state
        .capture
        .run(&CaptureRequest {
            owner: project.owner,
            project_id: project.id,
            engine: project.engine_type,
            connection,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BackupResponse {
            bucket: artifact.object.bucket().to_string(),
            key: artifact.object.key().to_string(),
            location: artifact.object.to_string(),
            content_type: artifact.content_type,
            size_bytes: artifact.size_bytes,
        }),
    ))
}
