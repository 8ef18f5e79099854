use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{backup, database, health, project, snapshot};
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(project::create_project, project::list_projects))
        .routes(routes!(project::get_project))
        .routes(routes!(database::list_databases, database::create_database))
        .routes(routes!(database::delete_database))
        .routes(routes!(snapshot::list_snapshots))
        .routes(routes!(snapshot::initialize_snapshot))
        .routes(routes!(backup::create_backup))
        .routes(routes!(health::health))
}
