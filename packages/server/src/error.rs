use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use backup::CaptureError;
use common::names::NameError;
use serde::Serialize;

use crate::orchestrator::ReconcileError;
use crate::platform::PlatformError;
use crate::registry::RegistryError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `NOT_FOUND`,
    /// `CONFLICT`, `BACKUP_FAILED`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Unsupported postgres version '9'")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    /// The capture pipeline failed; the message carries remediation hints.
    BackupFailed(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::BackupFailed(msg) => {
                tracing::error!("Backup failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "BACKUP_FAILED",
                        message: msg,
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<NameError> for AppError {
    fn from(err: NameError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::AlreadyExists(what) => AppError::Conflict(format!("{what} already exists")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            RegistryError::AlreadyExists(what) => {
                AppError::Conflict(format!("{what} already exists"))
            }
            RegistryError::Busy(_) => {
                tracing::warn!("Lease not acquired: {err}");
                AppError::Conflict(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::ProjectNotFound(_) | ReconcileError::InstanceNotFound { .. } => {
                AppError::NotFound(err.to_string())
            }
            ReconcileError::InstanceExists { .. } | ReconcileError::NameTaken { .. } => {
                AppError::Conflict(err.to_string())
            }
            ReconcileError::InvalidName(_)
            | ReconcileError::InvalidBackupLocation(_)
            | ReconcileError::BackupUnreachable(_)
            | ReconcileError::UnrestorableBackup(_)
            | ReconcileError::NoBackupLocation(_)
            | ReconcileError::SnapshotsDisabled => AppError::Validation(err.to_string()),
            ReconcileError::Platform { .. } | ReconcileError::SeedFailed { .. } => {
                AppError::Internal(err.to_string())
            }
            ReconcileError::Registry(e) => e.into(),
        }
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::MissingPassword => AppError::Validation(err.to_string()),
            other => AppError::BackupFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn reconcile_errors_map_to_http_codes() {
        assert_eq!(
            status(ReconcileError::ProjectNotFound("acme-shop".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ReconcileError::InstanceExists {
                project_id: "acme-shop".into(),
                instance: "db1".into(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ReconcileError::NameTaken {
                project_id: "acme-shop-db".into(),
                instance: "1".into(),
                resource: "acme-shop-db-1".into(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ReconcileError::BackupUnreachable("https://x/db.dump".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ReconcileError::UnrestorableBackup(
                backup::ImportError::UnsupportedFormat {
                    file: "db.dump".into(),
                    engine: common::EngineType::Mysql,
                }
            )),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ReconcileError::NoBackupLocation("acme-shop".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ReconcileError::SeedFailed {
                project_id: "acme-shop".into(),
                reason: "snapshot capture failed",
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ReconcileError::Platform {
                step: "launch compute unit",
                source: PlatformError::Api("boom".into()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ReconcileError::Registry(RegistryError::Busy("acme-shop".into()))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn missing_password_is_a_validation_error() {
        assert_eq!(status(CaptureError::MissingPassword), StatusCode::BAD_REQUEST);
    }
}
