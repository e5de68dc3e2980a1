use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::AppError,
    services::{
        room_service,
        sse_service::{self, StreamKind},
    },
    state::SharedState,
};

/// Optional identity attached to an event stream subscription.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// When set, the stream belongs to this participant and its teardown
    /// counts as an abrupt disconnect.
    pub participant_id: Option<String>,
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{code}/events", get(room_stream))
}

/// Stream realtime room events to a connected client.
///
/// The stream opens with a handshake and a full snapshot of every room path,
/// then forwards change events as they happen.
#[utoipa::path(
    get,
    path = "/rooms/{code}/events",
    tag = "sse",
    params(
        ("code" = String, Path, description = "8-character room code"),
        ("participant_id" = Option<String>, Query, description = "Bind the stream to a participant for disconnect tracking")
    ),
    responses(
        (status = 200, description = "Room SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Room not found")
    )
)]
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let (receiver, initial) = sse_service::subscribe_room(&state, &code).await?;
    let code = room_service::normalize_code(&code)?;

    let kind = match query.participant_id {
        Some(peer_id) => {
            let hook = state.arm_disconnect_hook(&code, &peer_id);
            info!(room = %code, peer = %peer_id, "new participant SSE connection");
            StreamKind::Participant {
                state: state.clone(),
                code,
                peer_id,
                hook,
            }
        }
        None => {
            info!(room = %code, "new observer SSE connection");
            StreamKind::Observer
        }
    };

    Ok(sse_service::to_sse_stream(receiver, initial, kind))
}
