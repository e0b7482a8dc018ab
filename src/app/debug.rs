use crate::state;

use std::collections::BTreeSet;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use time::OffsetDateTime;

/// Regions flagged as changed and not yet picked up by a notification cycle.
pub(crate) async fn pending_changes(State(state): State<state::AppState>) -> Json<BTreeSet<String>> {
    Json(state.schedule.pending_changes())
}

#[derive(Serialize)]
pub(crate) struct SnapshotDebugResponse {
    pub(crate) date_today: Option<String>,
    pub(crate) date_tomorrow: Option<String>,
    pub(crate) region_count: usize,
    pub(crate) refreshed_at: Option<OffsetDateTime>,
    pub(crate) attempted_at: Option<OffsetDateTime>,
    pub(crate) has_validator: bool,
    pub(crate) has_previous: bool,
}

pub(crate) async fn snapshot_info(
    State(state): State<state::AppState>,
) -> Json<SnapshotDebugResponse> {
    let info = state.schedule.snapshot_info();
    Json(SnapshotDebugResponse {
        date_today: info.date_today.map(|date| date.to_string()),
        date_tomorrow: info.date_tomorrow.map(|date| date.to_string()),
        region_count: info.region_count,
        refreshed_at: info.refreshed_at,
        attempted_at: info.attempted_at,
        has_validator: info.has_validator,
        has_previous: info.has_previous,
    })
}

#[derive(Serialize)]
pub(crate) struct TasksDebugResponse {
    pub(crate) server_time: OffsetDateTime,
    pub(crate) tasks: Vec<TaskEntry>,
}

#[derive(Serialize)]
pub(crate) struct TaskEntry {
    pub(crate) name: &'static str,
    pub(crate) interval_secs: u64,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) runs: u64,
    pub(crate) finished: bool,
}

pub(crate) async fn scheduled_tasks(
    State(state): State<state::AppState>,
) -> Json<TasksDebugResponse> {
    let server_time = state.schedule.now();
    let tasks = {
        let handles = state.tasks.lock().expect("scheduled tasks lock");
        handles
            .iter()
            .map(|handle| TaskEntry {
                name: handle.name,
                interval_secs: handle.interval.as_secs(),
                started_at: handle.started_at,
                runs: handle.runs(),
                finished: handle.is_finished(),
            })
            .collect()
    };
    Json(TasksDebugResponse { server_time, tasks })
}
