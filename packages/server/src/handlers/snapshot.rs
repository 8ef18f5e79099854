use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::api::SnapshotResponse;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::platform::{ANNOTATION_BACKUP_URL, ANNOTATION_ENGINE_VERSION, SnapshotInfo};
use crate::state::AppState;

fn snapshot_response(mut s: SnapshotInfo) -> SnapshotResponse {
    SnapshotResponse {
        engine_version: s.annotations.remove(ANNOTATION_ENGINE_VERSION),
        backup_location: s.annotations.remove(ANNOTATION_BACKUP_URL),
        name: s.name,
        source_volume: s.source_volume,
        created_at: s.created_at,
        ready_to_use: s.ready_to_use,
    }
}

#[utoipa::path(
    get,
    path = "/projects/{id}/snapshots",
    tag = "Snapshots",
    operation_id = "listSnapshots",
    summary = "List a project's snapshots",
    description = "Newest first. Only snapshots with `readyToUse` can seed new instances.",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Snapshots of the project", body = Vec<SnapshotResponse>),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SnapshotResponse>>, AppError> {
    let project = state.reconciler.project(&id).await?;
    let snapshots = state
        .snapshots
        .list(&project.id, state.reconciler.namespace())
        .await?;

    Ok(Json(snapshots.into_iter().map(snapshot_response).collect()))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/snapshots/initialize",
    tag = "Snapshots",
    operation_id = "initializeSnapshot",
    summary = "Seed a snapshot from the project's backup",
    description = "Restores the project's backup into a temporary instance, snapshots its volume once \
        the instance is ready, and removes the instance again. Responds when the snapshot exists; \
        later databases of the project can clone from it.",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 201, description = "Snapshot created", body = SnapshotResponse),
        (status = 400, description = "No usable backup or snapshots disabled (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Seed name already in use (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Seed instance or capture failed (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn initialize_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SnapshotResponse>), AppError> {
    let snapshot = state.reconciler.initialize_snapshot(&id).await?;
    Ok((StatusCode::CREATED, Json(snapshot_response(snapshot))))
}
