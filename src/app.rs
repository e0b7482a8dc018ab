use crate::state;

use axum::Router;
use axum::routing::get;

mod debug;
mod schedule;

pub fn app(state: state::AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/schedule/{region}/{queue}",
            get(schedule::schedule_view),
        )
        .route("/api/regions", get(schedule::active_regions))
        .route("/api/debug/changes", get(debug::pending_changes))
        .route("/api/debug/snapshot", get(debug::snapshot_info))
        .route("/api/debug/tasks", get(debug::scheduled_tasks))
        .with_state(state)
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
