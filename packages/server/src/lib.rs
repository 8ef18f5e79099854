pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod orchestrator;
pub mod platform;
pub mod registry;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsConfig;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "devdb API",
        version = "1.0.0",
        description = "Provisioning of per-tenant development database instances, seeded from snapshots or backups"
    ),
    tags(
        (name = "Projects", description = "Project registration and lookup"),
        (name = "Databases", description = "Database instance lifecycle"),
        (name = "Snapshots", description = "Volume snapshots captured from project instances"),
        (name = "Backups", description = "Capturing live databases into object storage"),
        (name = "Health", description = "Service liveness"),
    ),
)]
struct ApiDoc;

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(config.max_age))
}

const RELEASE_HEADER: HeaderName = HeaderName::from_static("x-release");

fn release_header(release: &str) -> HeaderValue {
    HeaderValue::from_str(release).unwrap_or_else(|_| {
        tracing::warn!(release = %release, "Release is not a valid header value");
        HeaderValue::from_static("unknown")
    })
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let cors = cors_layer(&state.config.server.cors);
    let release = SetResponseHeaderLayer::overriding(
        RELEASE_HEADER,
        release_header(&state.config.server.release),
    );
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(routes::api_routes())
        .split_for_parts();

    router
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
        .layer(release)
        .layer(cors)
}
