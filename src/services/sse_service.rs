use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::{presence_service, room_service, subscriptions},
    state::SharedState,
};

/// Subscribe to a room's event stream.
///
/// The first subscription to a room creates its hub and spawns the translator
/// that feeds it from the store's change feed; every later subscription just
/// attaches a receiver.
pub async fn subscribe_room(
    state: &SharedState,
    code: &str,
) -> Result<(broadcast::Receiver<ServerEvent>, Vec<ServerEvent>), ServiceError> {
    let code = room_service::normalize_code(code)?;
    room_service::require_room(state, &code).await?;

    let (hub, created) = state.sse().room_hub(&code);
    if created {
        subscriptions::spawn_room_feed(state.clone(), code.clone(), hub.clone()).await?;
    }

    let receiver = hub.subscribe();
    let mut initial = vec![handshake_event(state, &code)];
    initial.extend(subscriptions::initial_snapshot_events(state, &code).await?);
    Ok((receiver, initial))
}

/// Identifies what the stream represents so teardown can do the right
/// bookkeeping when the connection drops.
#[derive(Clone)]
pub enum StreamKind {
    /// A read-only view; nothing to clean up.
    Observer,
    /// A participant's own stream: tearing it down without an explicit leave
    /// counts as an abrupt disconnect. Cloning `SharedState` is cheap, it is
    /// just bumping the inner `Arc`.
    Participant {
        /// Shared state handle owned by the teardown task.
        state: SharedState,
        /// Room the stream was scoped to.
        code: String,
        /// The participant the stream belonged to.
        peer_id: String,
        /// Hook token this stream armed; teardown only acts while it is
        /// still the latest one for the participant.
        hook: u64,
    },
}

/// Convert a broadcast receiver into an SSE response, replaying the snapshot
/// first, then forwarding live events until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: Vec<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: replays the snapshot, then reads from broadcast
    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                teardown(kind).await;
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive;
                            // every event carries the full view anyway.
                            continue;
                        }
                    }
                }
            }
        }

        teardown(kind).await;
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

async fn teardown(kind: StreamKind) {
    match kind {
        StreamKind::Observer => tracing::debug!("observer SSE stream disconnected"),
        StreamKind::Participant {
            state,
            code,
            peer_id,
            hook,
        } => {
            // Own the necessary state inside the spawned task so cleanup runs
            // even after the request context has dropped.
            presence_service::on_stream_closed(&state, &code, &peer_id, hook).await;
            tracing::info!(room = %code, peer = %peer_id, "participant SSE stream disconnected");
        }
    }
}

fn handshake_event(state: &SharedState, code: &str) -> ServerEvent {
    ServerEvent::json(
        Some("subscribed".to_string()),
        &Handshake {
            room: code.to_string(),
            heartbeat_interval_ms: state.config().heartbeat_interval().as_millis() as u64,
            message: format!("subscribed to room {code}"),
        },
    )
    .unwrap_or_else(|_| ServerEvent::new(Some("subscribed".to_string()), code.to_string()))
}
