use crate::state;
use crate::types::schedule::DayGrid;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct ScheduleResponse {
    pub(crate) region_id: String,
    pub(crate) queue_id: String,
    pub(crate) date_today: String,
    pub(crate) date_tomorrow: String,
    pub(crate) emergency: bool,
    pub(crate) today: Vec<u8>,
    pub(crate) tomorrow: Vec<u8>,
    pub(crate) current_status: &'static str,
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

fn codes(grid: DayGrid) -> Vec<u8> {
    grid.slots().iter().map(|status| status.code()).collect()
}

pub(crate) async fn schedule_view(
    State(state): State<state::AppState>,
    Path((region_id, queue_id)): Path<(String, String)>,
) -> Result<Json<ScheduleResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(result) = state.schedule.schedule(&region_id, &queue_id).await else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no schedule for region/queue",
            }),
        ));
    };
    let current_status = result.status_at(state.schedule.now()).label();
    Ok(Json(ScheduleResponse {
        date_today: result.date_today.to_string(),
        date_tomorrow: result.date_tomorrow.to_string(),
        emergency: result.emergency,
        today: codes(result.today()),
        tomorrow: codes(result.tomorrow()),
        current_status,
        region_id: result.region_id,
        queue_id: result.queue_id,
    }))
}

pub(crate) async fn active_regions(State(state): State<state::AppState>) -> Json<Vec<String>> {
    Json(state.schedule.active_regions())
}
