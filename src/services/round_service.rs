use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        CompletedEstimateEntity, CompletedParticipantEntity, CompletedRoundEntity,
        EstimateEntity, ParticipantEntity, RoomMetadataEntity, RoundEntity, TaskEntity,
    },
    dto::round::{
        AdvanceOutcome, AdvanceResponse, LifecycleRequest, MarkDoneRequest, StartRoundRequest,
        SubmitEstimateRequest,
    },
    error::ServiceError,
    services::{room_service, subscriptions},
    state::{
        SharedState,
        state_machine::{RoomLifecycleEvent, RoomStatus, compute_transition},
    },
};

/// Start a round for a task, organizer-only.
///
/// With no explicit task the room's current task is used. Restarting while a
/// round is already live overwrites the unfinished round; otherwise the
/// status moves through the transition table with a compare-and-set, so a
/// racing lifecycle write surfaces as a conflict instead of being silently
/// overwritten.
pub async fn start_round(
    state: &SharedState,
    code: &str,
    request: StartRoundRequest,
) -> Result<(), ServiceError> {
    let code = room_service::normalize_code(code)?;
    let metadata = room_service::require_organizer(state, &code, &request.caller_id).await?;

    let tasks = subscriptions::sorted_tasks(state.store().tasks(&code).await?);
    let task = resolve_task(&tasks, &metadata, request.task_id)?;

    if (task.order as usize) < metadata.current_task_index {
        return Err(ServiceError::InvalidInput(format!(
            "task `{}` was already estimated; the pointer only moves forward",
            task.title
        )));
    }

    let status = RoomStatus::from(metadata.status);
    if status != RoomStatus::Active {
        let next = compute_transition(status, RoomLifecycleEvent::StartRound)?;
        let moved = state
            .store()
            .update_status(&code, metadata.status, next.into())
            .await?;
        if !moved {
            return Err(ServiceError::Conflict(
                "room status changed concurrently; round not started".into(),
            ));
        }
    }

    state
        .store()
        .set_current_task_index(&code, task.order as usize)
        .await?;
    state
        .store()
        .put_current_round(
            &code,
            RoundEntity {
                task_id: task.id,
                started_at: SystemTime::now(),
                estimates: IndexMap::new(),
            },
        )
        .await?;

    Ok(())
}

/// Upsert the caller's estimate for one workstream on the live round.
///
/// Resubmission overwrites: the operation is idempotent per workstream apart
/// from the refreshed submission timestamp. Only the participant may write
/// their own sheet.
pub async fn submit_estimate(
    state: &SharedState,
    code: &str,
    request: SubmitEstimateRequest,
) -> Result<(), ServiceError> {
    let code = room_service::normalize_code(code)?;
    let metadata = room_service::require_room(state, &code).await?;

    if RoomStatus::from(metadata.status) != RoomStatus::Active {
        return Err(ServiceError::InvalidState(
            "estimates can only be submitted while a round is active".into(),
        ));
    }

    require_participant(state, &code, &request.peer_id).await?;

    let workstreams = state.store().workstreams(&code).await?;
    if !workstreams
        .iter()
        .any(|workstream| workstream.id == request.workstream_id)
    {
        return Err(ServiceError::NotFound(format!(
            "workstream `{}` is not part of room `{code}`",
            request.workstream_id
        )));
    }

    let submitted = state
        .store()
        .submit_estimate(
            &code,
            &request.peer_id,
            request.workstream_id,
            EstimateEntity {
                value: request.value,
                submitted_at: SystemTime::now(),
            },
        )
        .await?;
    if !submitted {
        return Err(ServiceError::InvalidState("no round is active".into()));
    }

    Ok(())
}

/// Set or clear the caller's done flag.
///
/// When the flag completes the round (every participant done) the auto-close
/// is scheduled: after a short debounce the round is re-checked and closed
/// if it is still the same round and still unanimously done.
pub async fn mark_done(
    state: &SharedState,
    code: &str,
    request: MarkDoneRequest,
) -> Result<(), ServiceError> {
    let code = room_service::normalize_code(code)?;
    require_participant(state, &code, &request.peer_id).await?;

    let marked = state
        .store()
        .set_done(&code, &request.peer_id, request.is_done, SystemTime::now())
        .await?;
    if !marked {
        return Err(ServiceError::InvalidState("no round is active".into()));
    }

    if request.is_done {
        maybe_schedule_auto_close(state, &code).await?;
    }

    Ok(())
}

/// Close the current round explicitly, organizer-only.
pub async fn end_round(
    state: &SharedState,
    code: &str,
    request: LifecycleRequest,
) -> Result<(), ServiceError> {
    let code = room_service::normalize_code(code)?;
    let metadata = room_service::require_organizer(state, &code, &request.caller_id).await?;
    close_current_round(state, &code, &metadata).await
}

/// Move the session to the next task, organizer-only.
///
/// Past the last task the session ends; otherwise the pointer advances and a
/// fresh round starts for the next task in `order`.
pub async fn advance_to_next_task(
    state: &SharedState,
    code: &str,
    request: LifecycleRequest,
) -> Result<AdvanceResponse, ServiceError> {
    let code = room_service::normalize_code(code)?;
    let metadata = room_service::require_organizer(state, &code, &request.caller_id).await?;
    let status = RoomStatus::from(metadata.status);

    let tasks = subscriptions::sorted_tasks(state.store().tasks(&code).await?);
    let next_index = metadata.current_task_index + 1;

    let Some(next_task) = tasks.get(next_index) else {
        let next = compute_transition(status, RoomLifecycleEvent::EndSession)?;
        let moved = state
            .store()
            .update_status(&code, metadata.status, next.into())
            .await?;
        if !moved {
            return Err(ServiceError::Conflict(
                "room status changed concurrently; session not ended".into(),
            ));
        }
        return Ok(AdvanceResponse {
            outcome: AdvanceOutcome::NoNextTask,
            current_task_index: metadata.current_task_index,
        });
    };

    let next = compute_transition(status, RoomLifecycleEvent::StartRound)?;
    let moved = state
        .store()
        .update_status(&code, metadata.status, next.into())
        .await?;
    if !moved {
        return Err(ServiceError::Conflict(
            "room status changed concurrently; task not advanced".into(),
        ));
    }

    state
        .store()
        .set_current_task_index(&code, next_index)
        .await?;
    state
        .store()
        .put_current_round(
            &code,
            RoundEntity {
                task_id: next_task.id,
                started_at: SystemTime::now(),
                estimates: IndexMap::new(),
            },
        )
        .await?;

    Ok(AdvanceResponse {
        outcome: AdvanceOutcome::Advanced,
        current_task_index: next_index,
    })
}

/// True when every current participant has declared their sheet final.
///
/// An empty room never auto-closes: without participants there is nobody
/// whose done flag could mean anything.
pub fn everyone_done(round: &RoundEntity, participants: &[ParticipantEntity]) -> bool {
    !participants.is_empty()
        && participants.iter().all(|participant| {
            round
                .estimates
                .get(&participant.peer_id)
                .is_some_and(|sheet| sheet.is_done)
        })
}

/// Denormalize and archive the current round, then show results.
///
/// The store applies the append + delete + status move as one conditional
/// operation keyed on the round's task, so two racing closers produce one
/// completed record: the loser observes a conflict.
pub(crate) async fn close_current_round(
    state: &SharedState,
    code: &str,
    metadata: &RoomMetadataEntity,
) -> Result<(), ServiceError> {
    compute_transition(metadata.status.into(), RoomLifecycleEvent::CloseRound)?;

    let store = state.store();
    let Some(round) = store.current_round(code).await? else {
        return Err(ServiceError::InvalidState(format!(
            "room `{code}` has no round to end"
        )));
    };

    let participants = store.participants(code).await?;
    let workstreams = store.workstreams(code).await?;
    let tasks = store.tasks(code).await?;
    let completed = denormalize_round(&round, &participants, &workstreams, &tasks);

    let finished = store.finish_round(code, round.task_id, completed).await?;
    if !finished {
        return Err(ServiceError::Conflict(
            "round was closed concurrently".into(),
        ));
    }

    Ok(())
}

/// Freeze participant and workstream names into an immutable history record.
fn denormalize_round(
    round: &RoundEntity,
    participants: &[ParticipantEntity],
    workstreams: &[crate::dao::models::WorkstreamEntity],
    tasks: &[TaskEntity],
) -> CompletedRoundEntity {
    let task_title = tasks
        .iter()
        .find(|task| task.id == round.task_id)
        .map(|task| task.title.clone())
        .unwrap_or_else(|| round.task_id.to_string());

    let participant_name = |peer_id: &str| {
        participants
            .iter()
            .find(|participant| participant.peer_id == peer_id)
            .map(|participant| participant.name.clone())
            // Departed participants keep their sheet under the raw peer id.
            .unwrap_or_else(|| peer_id.to_string())
    };
    let workstream_name = |id: Uuid| {
        workstreams
            .iter()
            .find(|workstream| workstream.id == id)
            .map(|workstream| workstream.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    CompletedRoundEntity {
        id: Uuid::new_v4(),
        task_id: round.task_id,
        task_title,
        started_at: round.started_at,
        completed_at: SystemTime::now(),
        participants: round
            .estimates
            .iter()
            .map(|(peer_id, sheet)| CompletedParticipantEntity {
                peer_id: peer_id.clone(),
                participant_name: participant_name(peer_id),
                estimates: sheet
                    .workstreams
                    .iter()
                    .map(|(workstream_id, estimate)| CompletedEstimateEntity {
                        workstream_id: *workstream_id,
                        workstream_name: workstream_name(*workstream_id),
                        value: estimate.value,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Arm the debounced auto-close when every remaining participant is done.
///
/// Unanimity can be reached two ways: the last undecided participant marks
/// done, or they leave (explicitly, by staleness, or by dropping their
/// stream). Every one of those paths funnels through here, so the round
/// cannot get stuck open with only done sheets left. A no-op when no round
/// is live or someone is still undecided.
pub(crate) async fn maybe_schedule_auto_close(
    state: &SharedState,
    code: &str,
) -> Result<(), ServiceError> {
    let store = state.store();
    let Some(round) = store.current_round(code).await? else {
        return Ok(());
    };
    let participants = store.participants(code).await?;
    if !everyone_done(&round, &participants) {
        return Ok(());
    }

    let state = state.clone();
    let code = code.to_string();
    let armed_for = (round.task_id, round.started_at);
    let debounce = state.config().auto_close_debounce();

    tokio::spawn(async move {
        tokio::time::sleep(debounce).await;

        // Re-validate: the round may have been replaced, closed, or reopened
        // by an un-mark while we slept.
        let result = async {
            let metadata = room_service::require_room(&state, &code).await?;
            let store = state.store();
            let Some(round) = store.current_round(&code).await? else {
                return Ok(false);
            };
            if (round.task_id, round.started_at) != armed_for {
                return Ok(false);
            }
            let participants = store.participants(&code).await?;
            if !everyone_done(&round, &participants) {
                return Ok(false);
            }
            close_current_round(&state, &code, &metadata).await?;
            Ok::<bool, ServiceError>(true)
        }
        .await;

        match result {
            Ok(true) => debug!(room = %code, "round auto-closed"),
            Ok(false) => debug!(room = %code, "auto-close disarmed during debounce"),
            Err(err) => warn!(room = %code, error = %err, "auto-close attempt failed"),
        }
    });

    Ok(())
}

/// Resolve the task a round should target.
fn resolve_task<'a>(
    tasks: &'a [TaskEntity],
    metadata: &RoomMetadataEntity,
    requested: Option<Uuid>,
) -> Result<&'a TaskEntity, ServiceError> {
    match requested {
        Some(task_id) => tasks
            .iter()
            .find(|task| task.id == task_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "task `{task_id}` is not part of room `{}`",
                    metadata.code
                ))
            }),
        None => tasks
            .get(metadata.current_task_index)
            .ok_or_else(|| ServiceError::InvalidState("no task left to estimate".into())),
    }
}

/// Ensure the caller is a participant of the room.
async fn require_participant(
    state: &SharedState,
    code: &str,
    peer_id: &str,
) -> Result<(), ServiceError> {
    let participants = state.store().participants(code).await?;
    if !participants
        .iter()
        .any(|participant| participant.peer_id == peer_id)
    {
        return Err(ServiceError::Unauthorized(format!(
            "`{peer_id}` is not a participant of room `{code}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{ConnectionStatusEntity, ParticipantColorEntity,
        ParticipantEstimatesEntity};

    fn participant(peer_id: &str) -> ParticipantEntity {
        let now = SystemTime::now();
        ParticipantEntity {
            peer_id: peer_id.into(),
            name: peer_id.into(),
            is_organizer: false,
            color: ParticipantColorEntity {
                h: 0.0,
                s: 0.0,
                v: 1.0,
            },
            joined_at: now,
            last_heartbeat: now,
            connection_status: ConnectionStatusEntity::Online,
        }
    }

    fn round_with_done(done: &[(&str, bool)]) -> RoundEntity {
        let mut estimates = IndexMap::new();
        for (peer, is_done) in done {
            estimates.insert(
                peer.to_string(),
                ParticipantEstimatesEntity {
                    workstreams: IndexMap::new(),
                    is_done: *is_done,
                    done_at: is_done.then(SystemTime::now),
                },
            );
        }
        RoundEntity {
            task_id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            estimates,
        }
    }

    #[test]
    fn everyone_done_requires_all_participants() {
        let participants = vec![participant("a"), participant("b")];

        let round = round_with_done(&[("a", true), ("b", true)]);
        assert!(everyone_done(&round, &participants));

        let round = round_with_done(&[("a", true), ("b", false)]);
        assert!(!everyone_done(&round, &participants));

        // A participant without a sheet has not voted, let alone finished.
        let round = round_with_done(&[("a", true)]);
        assert!(!everyone_done(&round, &participants));
    }

    #[test]
    fn everyone_done_is_false_for_an_empty_room() {
        let round = round_with_done(&[]);
        assert!(!everyone_done(&round, &[]));
    }

    #[test]
    fn denormalization_freezes_names_and_falls_back_to_ids() {
        let workstream_id = Uuid::new_v4();
        let workstreams = vec![crate::dao::models::WorkstreamEntity {
            id: workstream_id,
            name: "Backend".into(),
            order: 0,
        }];
        let task = TaskEntity {
            id: Uuid::new_v4(),
            title: "Task A".into(),
            link: None,
            order: 0,
        };

        let mut round = round_with_done(&[("alice", true), ("ghost", true)]);
        round.task_id = task.id;
        for sheet in round.estimates.values_mut() {
            sheet.workstreams.insert(
                workstream_id,
                EstimateEntity {
                    value: crate::dao::models::EstimateValue::Points(5),
                    submitted_at: SystemTime::now(),
                },
            );
        }

        let mut alice = participant("alice");
        alice.name = "Alice".into();

        let completed = denormalize_round(&round, &[alice], &workstreams, &[task]);
        assert_eq!(completed.task_title, "Task A");

        let names: Vec<_> = completed
            .participants
            .iter()
            .map(|p| p.participant_name.as_str())
            .collect();
        assert!(names.contains(&"Alice"));
        // "ghost" left before the close; their sheet survives under the id.
        assert!(names.contains(&"ghost"));
        assert_eq!(
            completed.participants[0].estimates[0].workstream_name,
            "Backend"
        );
    }

    mod session_flow {
        use std::sync::Arc;
        use std::time::Duration;

        use super::*;
        use crate::{
            config::AppConfig,
            dao::{models::EstimateValue, room_store::memory::MemoryRoomStore},
            dto::room::{CreateRoomRequest, JoinRoomRequest, TaskInput, WorkstreamInput},
            dto::round::AdvanceOutcome,
            error::ServiceError,
            services::{room_service, round_service},
            state::{AppState, SharedState},
        };

        async fn room_with_two_participants() -> (SharedState, String, Uuid) {
            let state = AppState::new(
                AppConfig::default(),
                Arc::new(MemoryRoomStore::default()),
            );

            let snapshot = room_service::create_room(
                &state,
                CreateRoomRequest {
                    peer_id: "alice".into(),
                    workstreams: vec![WorkstreamInput {
                        name: "Backend".into(),
                    }],
                    tasks: vec![
                        TaskInput {
                            title: "Task A".into(),
                            link: None,
                        },
                        TaskInput {
                            title: "Task B".into(),
                            link: None,
                        },
                    ],
                },
            )
            .await
            .unwrap();

            let code = snapshot.room.code.clone();
            let workstream_id = snapshot.workstreams[0].id;

            for (peer_id, name) in [("alice", "Alice"), ("bob", "Bob")] {
                room_service::join_room(
                    &state,
                    &code,
                    JoinRoomRequest {
                        peer_id: peer_id.into(),
                        name: name.into(),
                    },
                )
                .await
                .unwrap();
            }

            (state, code, workstream_id)
        }

        async fn submit(
            state: &SharedState,
            code: &str,
            peer_id: &str,
            workstream_id: Uuid,
            points: u8,
        ) {
            round_service::submit_estimate(
                state,
                code,
                SubmitEstimateRequest {
                    peer_id: peer_id.into(),
                    workstream_id,
                    value: EstimateValue::Points(points),
                },
            )
            .await
            .unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn two_participants_estimate_two_tasks_to_the_end() {
            let (state, code, workstream_id) = room_with_two_participants().await;

            round_service::start_round(
                &state,
                &code,
                StartRoundRequest {
                    caller_id: "alice".into(),
                    task_id: None,
                },
            )
            .await
            .unwrap();

            submit(&state, &code, "alice", workstream_id, 5).await;
            submit(&state, &code, "bob", workstream_id, 8).await;

            for peer_id in ["alice", "bob"] {
                round_service::mark_done(
                    &state,
                    &code,
                    MarkDoneRequest {
                        peer_id: peer_id.into(),
                        is_done: true,
                    },
                )
                .await
                .unwrap();
            }

            // Let the debounced auto-close fire (paused clock advances
            // instantly once all tasks are idle).
            tokio::time::sleep(Duration::from_secs(3)).await;

            let snapshot = room_service::room_snapshot(&state, &code).await.unwrap();
            assert_eq!(snapshot.room.status, crate::dto::room::RoomStatusDto::Results);
            assert!(snapshot.current_round.is_none());
            assert_eq!(snapshot.completed_rounds.len(), 1);
            assert_eq!(snapshot.completed_rounds[0].task_title, "Task A");

            let advance = round_service::advance_to_next_task(
                &state,
                &code,
                LifecycleRequest {
                    caller_id: "alice".into(),
                },
            )
            .await
            .unwrap();
            assert_eq!(advance.outcome, AdvanceOutcome::Advanced);
            assert_eq!(advance.current_task_index, 1);

            submit(&state, &code, "alice", workstream_id, 13).await;
            round_service::end_round(
                &state,
                &code,
                LifecycleRequest {
                    caller_id: "alice".into(),
                },
            )
            .await
            .unwrap();

            let advance = round_service::advance_to_next_task(
                &state,
                &code,
                LifecycleRequest {
                    caller_id: "alice".into(),
                },
            )
            .await
            .unwrap();
            assert_eq!(advance.outcome, AdvanceOutcome::NoNextTask);

            let snapshot = room_service::room_snapshot(&state, &code).await.unwrap();
            assert_eq!(snapshot.room.status, crate::dto::room::RoomStatusDto::Ended);
            assert_eq!(snapshot.completed_rounds.len(), 2);
            // Most recent first.
            assert_eq!(snapshot.completed_rounds[0].task_title, "Task B");
        }

        #[tokio::test(start_paused = true)]
        async fn departure_of_the_last_undecided_participant_closes_the_round() {
            let (state, code, workstream_id) = room_with_two_participants().await;

            round_service::start_round(
                &state,
                &code,
                StartRoundRequest {
                    caller_id: "alice".into(),
                    task_id: None,
                },
            )
            .await
            .unwrap();

            submit(&state, &code, "alice", workstream_id, 5).await;
            round_service::mark_done(
                &state,
                &code,
                MarkDoneRequest {
                    peer_id: "alice".into(),
                    is_done: true,
                },
            )
            .await
            .unwrap();

            // Bob never votes; his departure makes the room unanimous.
            room_service::leave_room(&state, &code, "bob").await.unwrap();

            tokio::time::sleep(Duration::from_secs(3)).await;

            let snapshot = room_service::room_snapshot(&state, &code).await.unwrap();
            assert_eq!(snapshot.room.status, crate::dto::room::RoomStatusDto::Results);
            assert!(snapshot.current_round.is_none());
            assert_eq!(snapshot.completed_rounds.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn unmarking_done_during_the_debounce_disarms_the_auto_close() {
            let (state, code, workstream_id) = room_with_two_participants().await;

            round_service::start_round(
                &state,
                &code,
                StartRoundRequest {
                    caller_id: "alice".into(),
                    task_id: None,
                },
            )
            .await
            .unwrap();
            submit(&state, &code, "alice", workstream_id, 5).await;

            for peer_id in ["alice", "bob"] {
                round_service::mark_done(
                    &state,
                    &code,
                    MarkDoneRequest {
                        peer_id: peer_id.into(),
                        is_done: true,
                    },
                )
                .await
                .unwrap();
            }
            round_service::mark_done(
                &state,
                &code,
                MarkDoneRequest {
                    peer_id: "bob".into(),
                    is_done: false,
                },
            )
            .await
            .unwrap();

            tokio::time::sleep(Duration::from_secs(3)).await;

            let snapshot = room_service::room_snapshot(&state, &code).await.unwrap();
            assert!(snapshot.current_round.is_some());
            assert!(snapshot.completed_rounds.is_empty());
        }

        #[tokio::test]
        async fn only_the_organizer_steers_the_round_lifecycle() {
            let (state, code, _) = room_with_two_participants().await;

            let err = round_service::start_round(
                &state,
                &code,
                StartRoundRequest {
                    caller_id: "bob".into(),
                    task_id: None,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::Unauthorized(_)));
        }

        #[tokio::test]
        async fn estimates_are_rejected_outside_an_active_round() {
            let (state, code, workstream_id) = room_with_two_participants().await;

            let err = round_service::submit_estimate(
                &state,
                &code,
                SubmitEstimateRequest {
                    peer_id: "alice".into(),
                    workstream_id,
                    value: EstimateValue::Points(5),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidState(_)));
        }
    }
}
