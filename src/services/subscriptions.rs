//! Bridges the store's per-room change feed onto the typed SSE events
//! clients consume.
//!
//! Store events only name the path that changed; this module re-reads the
//! path, rebuilds the full view, and broadcasts it. Clients therefore never
//! apply deltas and a dropped feed event costs one redundant refresh at most.

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{CompletedRoundEntity, TaskEntity, WorkstreamEntity},
        room_store::RoomEvent,
    },
    dto::sse::{
        CompletedRoundsChangedEvent, CurrentRoundChangedEvent, ParticipantsChangedEvent,
        RoomChangedEvent, ServerEvent, TasksChangedEvent, WorkstreamsChangedEvent,
    },
    error::ServiceError,
    state::{SharedState, SseHub},
};

/// Event name for room metadata updates.
pub const ROOM_CHANGED: &str = "room.changed";
/// Event name for workstream list updates.
pub const WORKSTREAMS_CHANGED: &str = "workstreams.changed";
/// Event name for task list updates.
pub const TASKS_CHANGED: &str = "tasks.changed";
/// Event name for participant list updates.
pub const PARTICIPANTS_CHANGED: &str = "participants.changed";
/// Event name for live-round updates.
pub const ROUND_CHANGED: &str = "round.changed";
/// Event name for completed-round history updates.
pub const HISTORY_CHANGED: &str = "history.changed";

/// Workstreams in display order (ascending `order`).
pub fn sorted_workstreams(mut workstreams: Vec<WorkstreamEntity>) -> Vec<WorkstreamEntity> {
    workstreams.sort_by_key(|workstream| workstream.order);
    workstreams
}

/// Tasks in session order (ascending `order`).
pub fn sorted_tasks(mut tasks: Vec<TaskEntity>) -> Vec<TaskEntity> {
    tasks.sort_by_key(|task| task.order);
    tasks
}

/// Completed rounds most recent first.
pub fn sorted_completed_rounds(
    mut rounds: Vec<CompletedRoundEntity>,
) -> Vec<CompletedRoundEntity> {
    rounds.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    rounds
}

/// Full set of events a freshly connected client needs to render the room.
pub async fn initial_snapshot_events(
    state: &SharedState,
    code: &str,
) -> Result<Vec<ServerEvent>, ServiceError> {
    let events = vec![
        build_event(state, code, RoomEvent::Metadata).await?,
        build_event(state, code, RoomEvent::Workstreams).await?,
        build_event(state, code, RoomEvent::Tasks).await?,
        build_event(state, code, RoomEvent::Participants).await?,
        build_event(state, code, RoomEvent::CurrentRound).await?,
        build_event(state, code, RoomEvent::CompletedRounds).await?,
    ];
    Ok(events)
}

/// Spawn the translator task feeding a room's SSE hub from the store's
/// change feed.
///
/// Spawned once per room, by whichever subscriber creates the hub. The task
/// runs until the store drops the feed; on lag it skips ahead, since every
/// event it produces is a full rebuild anyway.
pub async fn spawn_room_feed(
    state: SharedState,
    code: String,
    hub: std::sync::Arc<SseHub>,
) -> Result<(), ServiceError> {
    let mut feed = state.store().subscribe(&code).await?;

    tokio::spawn(async move {
        loop {
            let event = match feed.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(room = %code, skipped, "change feed lagged; views self-heal on the next event");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match build_event(&state, &code, event).await {
                Ok(server_event) => hub.broadcast(server_event),
                Err(err) => {
                    warn!(room = %code, error = %err, "failed to rebuild view for change event");
                }
            }
        }
        debug!(room = %code, "change feed closed; translator exiting");
    });

    Ok(())
}

/// Re-read the changed path and wrap it into its typed SSE event.
async fn build_event(
    state: &SharedState,
    code: &str,
    event: RoomEvent,
) -> Result<ServerEvent, ServiceError> {
    let store = state.store();
    let server_event = match event {
        RoomEvent::Metadata => {
            let room = store.find_room(code).await?.map(Into::into);
            json_event(ROOM_CHANGED, &RoomChangedEvent { room })?
        }
        RoomEvent::Workstreams => {
            let workstreams = sorted_workstreams(store.workstreams(code).await?)
                .into_iter()
                .map(Into::into)
                .collect();
            json_event(WORKSTREAMS_CHANGED, &WorkstreamsChangedEvent { workstreams })?
        }
        RoomEvent::Tasks => {
            let tasks = sorted_tasks(store.tasks(code).await?)
                .into_iter()
                .map(Into::into)
                .collect();
            json_event(TASKS_CHANGED, &TasksChangedEvent { tasks })?
        }
        RoomEvent::Participants => {
            let participants = store
                .participants(code)
                .await?
                .into_iter()
                .map(Into::into)
                .collect();
            json_event(PARTICIPANTS_CHANGED, &ParticipantsChangedEvent { participants })?
        }
        RoomEvent::CurrentRound => {
            let round = store.current_round(code).await?.map(Into::into);
            json_event(ROUND_CHANGED, &CurrentRoundChangedEvent { round })?
        }
        RoomEvent::CompletedRounds => {
            let rounds = sorted_completed_rounds(store.completed_rounds(code).await?)
                .into_iter()
                .map(Into::into)
                .collect();
            json_event(HISTORY_CHANGED, &CompletedRoundsChangedEvent { rounds })?
        }
    };
    Ok(server_event)
}

fn json_event<T: serde::Serialize>(name: &str, payload: &T) -> Result<ServerEvent, ServiceError> {
    ServerEvent::json(name.to_string(), payload)
        .map_err(|err| ServiceError::InvalidState(format!("event serialization failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;

    #[test]
    fn workstreams_and_tasks_sort_by_order() {
        let workstreams = vec![
            WorkstreamEntity {
                id: Uuid::new_v4(),
                name: "Frontend".into(),
                order: 1,
            },
            WorkstreamEntity {
                id: Uuid::new_v4(),
                name: "Backend".into(),
                order: 0,
            },
        ];
        let sorted = sorted_workstreams(workstreams);
        assert_eq!(sorted[0].name, "Backend");
        assert_eq!(sorted[1].name, "Frontend");

        let tasks = vec![
            TaskEntity {
                id: Uuid::new_v4(),
                title: "B".into(),
                link: None,
                order: 2,
            },
            TaskEntity {
                id: Uuid::new_v4(),
                title: "A".into(),
                link: None,
                order: 0,
            },
        ];
        let sorted = sorted_tasks(tasks);
        assert_eq!(sorted[0].title, "A");
        assert_eq!(sorted[1].title, "B");
    }

    #[test]
    fn history_sorts_most_recent_first() {
        let base = SystemTime::now();
        let record = |title: &str, offset| CompletedRoundEntity {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            task_title: title.into(),
            started_at: base,
            completed_at: base + Duration::from_secs(offset),
            participants: Vec::new(),
        };

        let sorted = sorted_completed_rounds(vec![
            record("older", 1),
            record("newest", 30),
            record("oldest", 0),
        ]);
        let titles: Vec<_> = sorted.iter().map(|r| r.task_title.as_str()).collect();
        assert_eq!(titles, ["newest", "older", "oldest"]);
    }
}
