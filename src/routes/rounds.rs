use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};

use crate::{
    dto::round::{
        AdvanceResponse, LifecycleRequest, MarkDoneRequest, StartRoundRequest,
        SubmitEstimateRequest,
    },
    error::AppError,
    services::round_service,
    state::SharedState,
};

/// Routes handling the round lifecycle within a room.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/{code}/round", post(start_round))
        .route("/rooms/{code}/round/estimate", post(submit_estimate))
        .route("/rooms/{code}/round/done", post(mark_done))
        .route("/rooms/{code}/round/end", post(end_round))
        .route("/rooms/{code}/advance", post(advance))
}

/// Start (or restart) a round; organizer-only.
#[utoipa::path(
    post,
    path = "/rooms/{code}/round",
    tag = "rounds",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = StartRoundRequest,
    responses(
        (status = 204, description = "Round started"),
        (status = 401, description = "Caller is not the organizer"),
        (status = 409, description = "Room is not in a startable status")
    )
)]
pub async fn start_round(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<StartRoundRequest>,
) -> Result<StatusCode, AppError> {
    round_service::start_round(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit or overwrite the caller's estimate for one workstream.
#[utoipa::path(
    post,
    path = "/rooms/{code}/round/estimate",
    tag = "rounds",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = SubmitEstimateRequest,
    responses(
        (status = 204, description = "Estimate recorded"),
        (status = 409, description = "No round is active")
    )
)]
pub async fn submit_estimate(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<SubmitEstimateRequest>,
) -> Result<StatusCode, AppError> {
    round_service::submit_estimate(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set or clear the caller's done flag on the current round.
#[utoipa::path(
    post,
    path = "/rooms/{code}/round/done",
    tag = "rounds",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = MarkDoneRequest,
    responses(
        (status = 204, description = "Flag recorded"),
        (status = 409, description = "No round is active")
    )
)]
pub async fn mark_done(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<MarkDoneRequest>,
) -> Result<StatusCode, AppError> {
    round_service::mark_done(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Close the current round and show results; organizer-only.
#[utoipa::path(
    post,
    path = "/rooms/{code}/round/end",
    tag = "rounds",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = LifecycleRequest,
    responses(
        (status = 204, description = "Round closed"),
        (status = 401, description = "Caller is not the organizer"),
        (status = 409, description = "No round to close, or it closed concurrently")
    )
)]
pub async fn end_round(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<StatusCode, AppError> {
    round_service::end_round(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Advance to the next task or end the session; organizer-only.
#[utoipa::path(
    post,
    path = "/rooms/{code}/advance",
    tag = "rounds",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = LifecycleRequest,
    responses(
        (status = 200, description = "Advance outcome", body = AdvanceResponse),
        (status = 401, description = "Caller is not the organizer")
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let response = round_service::advance_to_next_task(&state, &code, payload).await?;
    Ok(Json(response))
}
