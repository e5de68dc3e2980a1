use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::{
    dto::presence::{HeartbeatRequest, HeartbeatResponse},
    error::AppError,
    services::presence_service,
    state::SharedState,
};

/// Routes handling participant liveness.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{code}/heartbeat", post(heartbeat))
}

/// Record a participant heartbeat.
///
/// `recorded: false` means the participant was already swept for staleness
/// or the session has ended; the client should stop beating and rejoin.
#[utoipa::path(
    post,
    path = "/rooms/{code}/heartbeat",
    tag = "presence",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = HeartbeatRequest,
    responses(
        (status = 200, description = "Heartbeat outcome", body = HeartbeatResponse),
        (status = 404, description = "Room not found")
    )
)]
pub async fn heartbeat(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, AppError> {
    let response = presence_service::heartbeat(&state, &code, payload).await?;
    Ok(Json(response))
}
