use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use backup::{restorable_format, validate_url};
use chrono::Utc;
use common::api::{
    CreateProjectRequest, ProjectDetailResponse, ProjectListQuery, ProjectResponse,
};
use common::names::{derive_project_id, normalize};
use common::project::generate_password;
use common::{Credentials, Project};
use tracing::{info, instrument};

use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::handlers::database::database_response;
use crate::state::AppState;

const GENERATED_PASSWORD_LEN: usize = 24;

fn validate_create_project(payload: &CreateProjectRequest) -> Result<(), AppError> {
    let engine = payload.engine_type;
    if !engine.is_supported_version(&payload.engine_version) {
        return Err(AppError::Validation(format!(
            "Unsupported {engine} version '{}'. Supported versions: {}",
            payload.engine_version,
            engine.supported_versions().join(", ")
        )));
    }
    if let Some(location) = &payload.backup_location
        && !validate_url(location)
    {
        return Err(AppError::Validation(format!(
            "Invalid backup location '{location}': expected an http(s):// URL or s3://bucket/key"
        )));
    }
    if let Some(location) = &payload.backup_location {
        restorable_format(location, engine).map_err(|e| AppError::Validation(e.to_string()))?;
    }
    if let Some(creds) = &payload.credentials {
        let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
        if blank(&creds.username) || blank(&creds.password) || blank(&creds.database_name) {
            return Err(AppError::Validation(
                "Credential fields must not be blank when provided".into(),
            ));
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    operation_id = "createProject",
    summary = "Create a project",
    description = "Registers a project. The id is derived from `owner` and `name`. Omitted credentials fall back to the configured defaults; a missing password is generated and returned only in this response.",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Project id already taken (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(owner = %payload.owner, name = %payload.name))]
pub async fn create_project(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = derive_project_id(&payload.owner, &payload.name)?;
    validate_create_project(&payload)?;

    let name = normalize(&payload.name);
    let defaults = &state.config.defaults;
    let input = payload.credentials.unwrap_or_default();
    let default_credentials = Credentials {
        username: input.username.unwrap_or_else(|| defaults.username.clone()),
        password: input
            .password
            .unwrap_or_else(|| generate_password(GENERATED_PASSWORD_LEN)),
        database_name: input
            .database_name
            .or_else(|| defaults.database.clone())
            .unwrap_or_else(|| name.clone()),
    };

    let project = Project {
        id,
        owner: normalize(&payload.owner),
        name,
        engine_type: payload.engine_type,
        engine_version: payload.engine_version,
        backup_location: payload.backup_location,
        default_credentials,
        created_at: Utc::now(),
    };
    state.projects.create(&project).await?;

    info!(project_id = %project.id, "Project created");
    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse::from_project(project, true)),
    ))
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    operation_id = "listProjects",
    summary = "List projects",
    description = "Returns all projects, oldest first, optionally filtered by owner.",
    params(ProjectListQuery),
    responses(
        (status = 200, description = "List of projects", body = Vec<ProjectResponse>),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<ProjectResponse>>, AppError> {
    let owner = query.owner.as_deref().map(normalize);
    let projects = state.projects.list(owner.as_deref()).await?;
    Ok(Json(projects.into_iter().map(ProjectResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    operation_id = "getProject",
    summary = "Get a project with its databases",
    params(("id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project details", body = ProjectDetailResponse),
        (status = 404, description = "Project not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetailResponse>, AppError> {
    let project = state.reconciler.project(&id).await?;
    let databases = state
        .reconciler
        .list_instances(&project)
        .await?
        .into_iter()
        .map(|instance| database_response(&project, instance, false))
        .collect();

    Ok(Json(ProjectDetailResponse {
        project: ProjectResponse::from(project),
        databases,
    }))
}
