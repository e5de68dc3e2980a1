use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use validator::Validate;

use crate::{
    dto::room::{CreateRoomRequest, JoinRoomRequest, RoomSnapshot, SetOrganizerRequest},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes handling room lifecycle and membership.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/join", post(join_room))
        .route("/rooms/{code}/participants/{peer_id}", delete(leave_room))
        .route("/rooms/{code}/organizer", put(set_organizer))
}

/// Create a room with its workstreams and tasks; the caller becomes organizer.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomSnapshot),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<RoomSnapshot>, AppError> {
    payload.validate()?;
    let snapshot = room_service::create_room(&state, payload).await?;
    Ok(Json(snapshot))
}

/// Read the full denormalized view of a room.
#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "8-character room code")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 404, description = "Room not found")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::room_snapshot(&state, &code).await?;
    Ok(Json(snapshot))
}

/// Join a room as a participant.
#[utoipa::path(
    post,
    path = "/rooms/{code}/join",
    tag = "rooms",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined; full room snapshot", body = RoomSnapshot),
        (status = 404, description = "Room not found"),
        (status = 409, description = "Session has ended")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<RoomSnapshot>, AppError> {
    payload.validate()?;
    let snapshot = room_service::join_room(&state, &code, payload).await?;
    Ok(Json(snapshot))
}

/// Leave a room intentionally.
#[utoipa::path(
    delete,
    path = "/rooms/{code}/participants/{peer_id}",
    tag = "rooms",
    params(
        ("code" = String, Path, description = "8-character room code"),
        ("peer_id" = String, Path, description = "Departing participant")
    ),
    responses((status = 204, description = "Participant removed"))
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path((code, peer_id)): Path<(String, String)>,
) -> Result<axum::http::StatusCode, AppError> {
    room_service::leave_room(&state, &code, &peer_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Hand the organizer role to another participant.
#[utoipa::path(
    put,
    path = "/rooms/{code}/organizer",
    tag = "rooms",
    params(("code" = String, Path, description = "8-character room code")),
    request_body = SetOrganizerRequest,
    responses(
        (status = 204, description = "Organizer reassigned"),
        (status = 401, description = "Caller is not the organizer"),
        (status = 409, description = "Organizer changed concurrently")
    )
)]
pub async fn set_organizer(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<SetOrganizerRequest>,
) -> Result<axum::http::StatusCode, AppError> {
    room_service::set_organizer(&state, &code, payload).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
