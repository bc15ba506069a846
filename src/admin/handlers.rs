use axum::{extract::State, Json};

use crate::admin::AdminState;
use crate::watcher::StatusInfo;

pub async fn get_status(State(state): State<AdminState>) -> Json<StatusInfo> {
    Json(state.watcher.status_info())
}
