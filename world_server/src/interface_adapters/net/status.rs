use crate::interface_adapters::http::error_response;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Latest serialized snapshot, or 503 until the first tick has been published.
pub async fn state_handler(State(state): State<Arc<AppState>>) -> Response {
    let latest = state.snapshot_latest_tx.borrow().clone();
    if latest.is_empty() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no snapshot yet");
    }
    (
        [(header::CONTENT_TYPE, "application/json")],
        latest.as_str().to_owned(),
    )
        .into_response()
}
