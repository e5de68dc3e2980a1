use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::{
        ConnectionStatusEntity, ParticipantEntity, RoomMetadataEntity, RoomStatusEntity,
        TaskEntity, WorkstreamEntity,
    },
    dto::room::{CreateRoomRequest, JoinRoomRequest, RoomSnapshot, SetOrganizerRequest},
    error::ServiceError,
    services::{presence_service, room_code, round_service, subscriptions},
    state::{SharedState, room::participant_color, state_machine::RoomStatus},
};

/// Normalize and validate a user-supplied room code before any store access.
pub(crate) fn normalize_code(input: &str) -> Result<String, ServiceError> {
    let code = room_code::parse_room_code(input);
    if !room_code::is_valid_room_code(&code) {
        return Err(ServiceError::InvalidInput(format!(
            "`{input}` is not a valid room code"
        )));
    }
    Ok(code)
}

/// Read the room metadata, failing when the room does not exist.
pub(crate) async fn require_room(
    state: &SharedState,
    code: &str,
) -> Result<RoomMetadataEntity, ServiceError> {
    state
        .store()
        .find_room(code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))
}

/// Read the room metadata and verify the caller holds the organizer role.
///
/// Every round-lifecycle mutation goes through this guard; organizer-only is
/// a capability check evaluated against the caller's identity, not a UI
/// affordance.
pub(crate) async fn require_organizer(
    state: &SharedState,
    code: &str,
    caller_id: &str,
) -> Result<RoomMetadataEntity, ServiceError> {
    let metadata = require_room(state, code).await?;
    if metadata.organizer_id != caller_id {
        return Err(ServiceError::Unauthorized(format!(
            "`{caller_id}` is not the organizer of room `{code}`"
        )));
    }
    Ok(metadata)
}

/// Create a fresh room with its workstreams and tasks in one batch.
///
/// The caller becomes both creator and organizer; the room starts in the
/// lobby with the task pointer at zero. Orders are assigned densely from the
/// input positions, so gaps or duplicates cannot occur.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomSnapshot, ServiceError> {
    let CreateRoomRequest {
        peer_id,
        workstreams,
        tasks,
    } = request;

    if workstreams.is_empty() {
        return Err(ServiceError::InvalidInput(
            "a room requires at least one workstream".into(),
        ));
    }
    if tasks.is_empty() {
        return Err(ServiceError::InvalidInput(
            "a room requires at least one task".into(),
        ));
    }

    let workstreams = workstreams
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            if input.name.trim().is_empty() {
                return Err(ServiceError::InvalidInput(
                    "workstream name must not be empty".into(),
                ));
            }
            Ok(WorkstreamEntity {
                id: Uuid::new_v4(),
                name: input.name,
                order: index as u32,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tasks = tasks
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            if input.title.trim().is_empty() {
                return Err(ServiceError::InvalidInput(
                    "task title must not be empty".into(),
                ));
            }
            Ok(TaskEntity {
                id: Uuid::new_v4(),
                title: input.title,
                link: input.link,
                order: index as u32,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let now = SystemTime::now();
    let code = room_code::create_room_code();
    let metadata = RoomMetadataEntity {
        code: code.clone(),
        created_at: now,
        created_by: peer_id.clone(),
        organizer_id: peer_id,
        previous_organizer_id: None,
        status: RoomStatusEntity::Lobby,
        current_task_index: 0,
        last_activity: now,
    };

    let created = state
        .store()
        .create_room(metadata, workstreams, tasks)
        .await?;
    if !created {
        // 34^8 codes make this a freak occurrence rather than a flow.
        return Err(ServiceError::Conflict(format!(
            "room code `{code}` is already taken"
        )));
    }

    room_snapshot(state, &code).await
}

/// Join a room as a participant.
///
/// Rejected when the room is missing or its session has ended. Joining twice
/// with the same peer id is an upsert, not an error.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    request: JoinRoomRequest,
) -> Result<RoomSnapshot, ServiceError> {
    let code = normalize_code(code)?;
    let metadata = require_room(state, &code).await?;

    if RoomStatus::from(metadata.status) == RoomStatus::Ended {
        return Err(ServiceError::InvalidState(format!(
            "room `{code}` has ended and no longer accepts participants"
        )));
    }

    let now = SystemTime::now();
    let participant = ParticipantEntity {
        peer_id: request.peer_id.clone(),
        name: request.name,
        is_organizer: metadata.organizer_id == request.peer_id,
        color: participant_color(state.config().colors(), &request.peer_id).into(),
        joined_at: now,
        last_heartbeat: now,
        connection_status: ConnectionStatusEntity::Online,
    };

    state.store().upsert_participant(&code, participant).await?;

    room_snapshot(state, &code).await
}

/// Leave a room intentionally: the disconnect hook is disarmed first so the
/// stream teardown does not race the explicit removal.
///
/// A departure can complete the round: if everyone left behind is done, the
/// auto-close is armed just as if the last mark-done had landed.
pub async fn leave_room(
    state: &SharedState,
    code: &str,
    peer_id: &str,
) -> Result<(), ServiceError> {
    let code = normalize_code(code)?;
    state.disarm_disconnect_hook(&code, peer_id);
    state.store().remove_participant(&code, peer_id).await?;
    presence_service::maybe_handoff_organizer(state, &code).await?;
    round_service::maybe_schedule_auto_close(state, &code).await?;
    Ok(())
}

/// Voluntary organizer handoff, conditional on the caller still holding the
/// role when the write lands.
pub async fn set_organizer(
    state: &SharedState,
    code: &str,
    request: SetOrganizerRequest,
) -> Result<(), ServiceError> {
    let code = normalize_code(code)?;
    require_organizer(state, &code, &request.caller_id).await?;

    let participants = state.store().participants(&code).await?;
    if !participants
        .iter()
        .any(|participant| participant.peer_id == request.new_organizer_id)
    {
        return Err(ServiceError::NotFound(format!(
            "participant `{}` is not in room `{code}`",
            request.new_organizer_id
        )));
    }

    let reassigned = state
        .store()
        .set_organizer(
            &code,
            Some(&request.caller_id),
            &request.new_organizer_id,
            request.store_previous,
        )
        .await?;
    if !reassigned {
        return Err(ServiceError::Conflict(
            "organizer changed concurrently; handoff not applied".into(),
        ));
    }

    Ok(())
}

/// Assemble the full denormalized view of a room.
pub async fn room_snapshot(
    state: &SharedState,
    code: &str,
) -> Result<RoomSnapshot, ServiceError> {
    let code = normalize_code(code)?;
    let metadata = require_room(state, &code).await?;
    let store = state.store();

    let workstreams = subscriptions::sorted_workstreams(store.workstreams(&code).await?);
    let tasks = subscriptions::sorted_tasks(store.tasks(&code).await?);
    let participants = store.participants(&code).await?;
    let current_round = store.current_round(&code).await?;
    let completed_rounds =
        subscriptions::sorted_completed_rounds(store.completed_rounds(&code).await?);

    Ok(RoomSnapshot {
        room: metadata.into(),
        workstreams: workstreams.into_iter().map(Into::into).collect(),
        tasks: tasks.into_iter().map(Into::into).collect(),
        participants: participants.into_iter().map(Into::into).collect(),
        current_round: current_round.map(Into::into),
        completed_rounds: completed_rounds.into_iter().map(Into::into).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        dto::room::{RoomStatusDto, TaskInput, WorkstreamInput},
    };

    async fn fresh_room(state: &SharedState, creator: &str) -> String {
        let snapshot = create_room(
            state,
            CreateRoomRequest {
                peer_id: creator.into(),
                workstreams: vec![WorkstreamInput {
                    name: "Backend".into(),
                }],
                tasks: vec![TaskInput {
                    title: "Task A".into(),
                    link: None,
                }],
            },
        )
        .await
        .unwrap();
        snapshot.room.code
    }

    async fn join(state: &SharedState, code: &str, peer_id: &str) {
        join_room(
            state,
            code,
            JoinRoomRequest {
                peer_id: peer_id.into(),
                name: peer_id.into(),
            },
        )
        .await
        .unwrap();
    }

    fn state() -> SharedState {
        crate::state::AppState::new(AppConfig::default(), Arc::new(MemoryRoomStore::default()))
    }

    #[tokio::test]
    async fn creator_becomes_organizer_and_room_starts_in_the_lobby() {
        let state = state();
        let code = fresh_room(&state, "alice").await;

        let snapshot = room_snapshot(&state, &code).await.unwrap();
        assert_eq!(snapshot.room.status, RoomStatusDto::Lobby);
        assert_eq!(snapshot.room.organizer_id, "alice");
        assert_eq!(snapshot.room.current_task_index, 0);
        assert_eq!(snapshot.workstreams[0].order, 0);
    }

    #[tokio::test]
    async fn joining_twice_with_the_same_peer_id_is_an_upsert() {
        let state = state();
        let code = fresh_room(&state, "alice").await;

        join(&state, &code, "bob").await;
        join_room(
            &state,
            &code,
            JoinRoomRequest {
                peer_id: "bob".into(),
                name: "Robert".into(),
            },
        )
        .await
        .unwrap();

        let snapshot = room_snapshot(&state, &code).await.unwrap();
        let bobs: Vec<_> = snapshot
            .participants
            .iter()
            .filter(|p| p.peer_id == "bob")
            .collect();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].name, "Robert");
    }

    #[tokio::test]
    async fn organizer_leaving_hands_the_role_to_the_longest_joined_survivor() {
        let state = state();
        let code = fresh_room(&state, "alice").await;

        join(&state, &code, "alice").await;
        join(&state, &code, "bob").await;
        join(&state, &code, "carol").await;

        leave_room(&state, &code, "alice").await.unwrap();

        let snapshot = room_snapshot(&state, &code).await.unwrap();
        assert_eq!(snapshot.room.organizer_id, "bob");
        assert_eq!(snapshot.room.previous_organizer_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn handoff_requires_the_target_to_be_a_participant() {
        let state = state();
        let code = fresh_room(&state, "alice").await;
        join(&state, &code, "alice").await;

        let err = set_organizer(
            &state,
            &code,
            SetOrganizerRequest {
                caller_id: "alice".into(),
                new_organizer_id: "nobody".into(),
                store_previous: true,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn sloppy_codes_are_normalized_before_lookup() {
        let state = state();
        let code = fresh_room(&state, "alice").await;

        let sloppy = format!("  {}  ", code.to_lowercase());
        let snapshot = room_snapshot(&state, &sloppy).await.unwrap();
        assert_eq!(snapshot.room.code, code);

        let err = room_snapshot(&state, "not a code").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
