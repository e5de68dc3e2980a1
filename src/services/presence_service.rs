//! Liveness tracking: heartbeat writes, the stale sweeper, and the
//! organizer-departure handoff that keeps every live room steerable.

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::{
    dao::models::{ConnectionStatusEntity, ParticipantEntity},
    dto::presence::{HeartbeatRequest, HeartbeatResponse},
    error::ServiceError,
    services::{room_service, round_service},
    state::{SharedState, state_machine::RoomStatus},
};

/// Record a participant's periodic liveness write.
///
/// A heartbeat for a participant who was already swept is skipped rather than
/// resurrecting them; the response tells the client to rejoin. Once the
/// session has ended the write is skipped too, so a lingering client cannot
/// keep a ghost participant alive in a closed room.
pub async fn heartbeat(
    state: &SharedState,
    code: &str,
    request: HeartbeatRequest,
) -> Result<HeartbeatResponse, ServiceError> {
    let code = room_service::normalize_code(code)?;
    let metadata = room_service::require_room(state, &code).await?;
    if RoomStatus::from(metadata.status) == RoomStatus::Ended {
        return Ok(HeartbeatResponse { recorded: false });
    }

    let status = request
        .connection_status
        .map(Into::into)
        .unwrap_or(ConnectionStatusEntity::Online);

    let recorded = state
        .store()
        .record_heartbeat(&code, &request.peer_id, SystemTime::now(), status)
        .await?;
    if recorded {
        // Keeps last_activity fresh without waking any subscriber.
        state.store().touch_activity(&code).await?;
    }

    Ok(HeartbeatResponse { recorded })
}

/// Peer ids whose last heartbeat is older than `threshold` as of `now`.
///
/// A heartbeat from the future (clock skew between writer and sweeper) counts
/// as fresh.
pub fn detect_stale_participants(
    participants: &[ParticipantEntity],
    now: SystemTime,
    threshold: Duration,
) -> Vec<String> {
    participants
        .iter()
        .filter(|participant| {
            now.duration_since(participant.last_heartbeat)
                .is_ok_and(|age| age > threshold)
        })
        .map(|participant| participant.peer_id.clone())
        .collect()
}

/// Remove every stale participant from a room, then repair the organizer
/// role if the sweep took it.
pub async fn cleanup_stale_participants(
    state: &SharedState,
    code: &str,
) -> Result<usize, ServiceError> {
    let store = state.store();
    let participants = store.participants(code).await?;
    let stale = detect_stale_participants(
        &participants,
        SystemTime::now(),
        state.config().stale_threshold(),
    );

    for peer_id in &stale {
        state.disarm_disconnect_hook(code, peer_id);
        store.remove_participant(code, peer_id).await?;
        info!(room = %code, peer = %peer_id, "removed stale participant");
    }

    if !stale.is_empty() {
        maybe_handoff_organizer(state, code).await?;
        // The sweep may have removed the last undecided sheet.
        round_service::maybe_schedule_auto_close(state, code).await?;
    }

    Ok(stale.len())
}

/// Hand the organizer role to the longest-joined survivor when the current
/// organizer is no longer a participant.
///
/// The write is conditional on the departed organizer still being on record,
/// so two sweepers (or a sweeper racing an explicit handoff) produce exactly
/// one reassignment.
pub async fn maybe_handoff_organizer(
    state: &SharedState,
    code: &str,
) -> Result<(), ServiceError> {
    let store = state.store();
    let Some(metadata) = store.find_room(code).await? else {
        return Ok(());
    };

    let participants = store.participants(code).await?;
    if participants
        .iter()
        .any(|participant| participant.peer_id == metadata.organizer_id)
    {
        return Ok(());
    }

    let Some(successor) = participants
        .iter()
        .min_by_key(|participant| participant.joined_at)
    else {
        // Everyone left; the room idles until the auto-close or a rejoin.
        return Ok(());
    };

    let reassigned = store
        .set_organizer(code, Some(&metadata.organizer_id), &successor.peer_id, true)
        .await?;
    if reassigned {
        info!(
            room = %code,
            from = %metadata.organizer_id,
            to = %successor.peer_id,
            "organizer role handed off"
        );
    } else {
        warn!(room = %code, "organizer handoff lost a race; leaving the winner's write in place");
    }

    Ok(())
}

/// Presence sweeper: periodically scans every live room for stale
/// participants. Runs for the lifetime of the process.
pub async fn run(state: SharedState) {
    let interval = state.config().sweep_interval();
    info!(interval_ms = interval.as_millis() as u64, "presence sweeper started");

    loop {
        tokio::time::sleep(interval).await;

        let codes = match state.store().room_codes().await {
            Ok(codes) => codes,
            Err(err) => {
                warn!(error = %err, "presence sweep skipped; store unavailable");
                continue;
            }
        };

        for code in codes {
            if let Err(err) = sweep_room(&state, &code).await {
                warn!(room = %code, error = %err, "presence sweep failed for room");
            }
        }
    }
}

/// Abrupt-disconnect cleanup fired when a participant's event stream tears
/// down without an explicit leave.
///
/// `hook` is the token the stream armed when it connected. A stale token
/// means the participant reconnected and a newer stream owns the hook now,
/// so this teardown must not remove them.
pub async fn on_stream_closed(state: &SharedState, code: &str, peer_id: &str, hook: u64) {
    if !state.disarm_disconnect_hook_token(code, peer_id, hook) {
        // Superseded by a reconnect, or already handled by leave_room or
        // the sweeper.
        return;
    }

    debug!(room = %code, peer = %peer_id, "event stream closed; removing participant");
    let result = async {
        state.store().remove_participant(code, peer_id).await?;
        maybe_handoff_organizer(state, code).await?;
        round_service::maybe_schedule_auto_close(state, code).await
    }
    .await;

    if let Err(err) = result {
        warn!(room = %code, peer = %peer_id, error = %err, "disconnect cleanup failed");
    }
}

async fn sweep_room(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let Some(metadata) = state.store().find_room(code).await? else {
        return Ok(());
    };
    // Ended rooms keep their history but no longer track presence.
    if RoomStatus::from(metadata.status) == RoomStatus::Ended {
        return Ok(());
    }

    cleanup_stale_participants(state, code).await?;
    Ok(())
}
