use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use shared::models::OkResponse;
use tracing::warn;

use super::AppState;
use super::errors::store_unavailable_response;

pub(super) async fn healthz() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// Ready once the conversation store answers a ping.
pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    if let Err(err) = state.repository.ping().await {
        warn!(error = %err, "conversation store ping failed");
        return store_unavailable_response();
    }

    healthz().await.into_response()
}
