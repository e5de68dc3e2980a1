//! In-memory room store backend.
//!
//! Holds every room subtree in process memory and fans change notifications
//! out through per-room broadcast channels. Mutations take the room's map
//! entry guard, so each conditional write (status CAS, organizer handoff,
//! round close) is atomic with respect to other writers of the same room.

use std::time::SystemTime;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{
    CompletedRoundEntity, ConnectionStatusEntity, EstimateEntity, ParticipantEntity,
    ParticipantEstimatesEntity, RoomMetadataEntity, RoomStatusEntity, RoundEntity, TaskEntity,
    WorkstreamEntity,
};
use crate::dao::room_store::{RoomEvent, RoomStore};
use crate::dao::storage::StorageResult;

const DEFAULT_FEED_CAPACITY: usize = 64;

/// One room subtree as held in memory.
#[derive(Debug)]
struct RoomRecord {
    metadata: RoomMetadataEntity,
    workstreams: Vec<WorkstreamEntity>,
    tasks: Vec<TaskEntity>,
    participants: IndexMap<String, ParticipantEntity>,
    current_round: Option<RoundEntity>,
    completed_rounds: Vec<CompletedRoundEntity>,
}

/// Room store keeping all state in process memory.
pub struct MemoryRoomStore {
    rooms: DashMap<String, RoomRecord>,
    feeds: DashMap<String, broadcast::Sender<RoomEvent>>,
    feed_capacity: usize,
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl MemoryRoomStore {
    /// Create a store whose per-room change feeds buffer `feed_capacity`
    /// events for slow subscribers.
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            feeds: DashMap::new(),
            feed_capacity,
        }
    }

    /// Obtain (creating on demand) the change feed sender for a room.
    fn feed(&self, code: &str) -> broadcast::Sender<RoomEvent> {
        self.feeds
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(self.feed_capacity).0)
            .clone()
    }

    /// Notify subscribers that a path changed. Delivery errors only mean
    /// nobody is listening.
    fn emit(&self, code: &str, events: &[RoomEvent]) {
        if let Some(sender) = self.feeds.get(code) {
            for event in events {
                let _ = sender.send(*event);
            }
        }
    }

    /// Run a closure against a room's record under its entry guard,
    /// emitting the returned events afterwards.
    fn with_room<T>(
        &self,
        code: &str,
        apply: impl FnOnce(&mut RoomRecord) -> (T, Vec<RoomEvent>),
    ) -> Option<T> {
        let (value, events) = {
            let mut entry = self.rooms.get_mut(code)?;
            apply(entry.value_mut())
        };
        self.emit(code, &events);
        Some(value)
    }
}

impl RoomStore for MemoryRoomStore {
    fn create_room(
        &self,
        metadata: RoomMetadataEntity,
        workstreams: Vec<WorkstreamEntity>,
        tasks: Vec<TaskEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let code = metadata.code.clone();
        let created = match self.rooms.entry(code.clone()) {
            dashmap::Entry::Occupied(_) => false,
            dashmap::Entry::Vacant(slot) => {
                slot.insert(RoomRecord {
                    metadata,
                    workstreams,
                    tasks,
                    participants: IndexMap::new(),
                    current_round: None,
                    completed_rounds: Vec::new(),
                });
                true
            }
        };
        if created {
            self.emit(
                &code,
                &[RoomEvent::Metadata, RoomEvent::Workstreams, RoomEvent::Tasks],
            );
        }
        futures::future::ready(Ok(created)).boxed()
    }

    fn find_room(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<RoomMetadataEntity>>> {
        let found = self.rooms.get(code).map(|room| room.metadata.clone());
        futures::future::ready(Ok(found)).boxed()
    }

    fn room_codes(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let codes = self.rooms.iter().map(|room| room.key().clone()).collect();
        futures::future::ready(Ok(codes)).boxed()
    }

    fn update_status(
        &self,
        code: &str,
        expected: RoomStatusEntity,
        next: RoomStatusEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = self
            .with_room(code, |room| {
                if room.metadata.status != expected {
                    return (false, Vec::new());
                }
                room.metadata.status = next;
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::Metadata])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(updated)).boxed()
    }

    fn set_current_task_index(
        &self,
        code: &str,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = self
            .with_room(code, |room| {
                room.metadata.current_task_index = index;
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::Metadata])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(updated)).boxed()
    }

    fn touch_activity(&self, code: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.with_room(code, |room| {
            room.metadata.last_activity = SystemTime::now();
            ((), Vec::new())
        });
        futures::future::ready(Ok(())).boxed()
    }

    fn workstreams(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<WorkstreamEntity>>> {
        let workstreams = self
            .rooms
            .get(code)
            .map(|room| room.workstreams.clone())
            .unwrap_or_default();
        futures::future::ready(Ok(workstreams)).boxed()
    }

    fn tasks(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<TaskEntity>>> {
        let tasks = self
            .rooms
            .get(code)
            .map(|room| room.tasks.clone())
            .unwrap_or_default();
        futures::future::ready(Ok(tasks)).boxed()
    }

    fn upsert_participant(
        &self,
        code: &str,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let upserted = self
            .with_room(code, |room| {
                room.participants
                    .insert(participant.peer_id.clone(), participant);
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::Participants])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(upserted)).boxed()
    }

    fn participants(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let participants = self
            .rooms
            .get(code)
            .map(|room| room.participants.values().cloned().collect())
            .unwrap_or_default();
        futures::future::ready(Ok(participants)).boxed()
    }

    fn remove_participant(
        &self,
        code: &str,
        peer_id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self
            .with_room(code, |room| {
                match room.participants.shift_remove(peer_id).is_some() {
                    true => (true, vec![RoomEvent::Participants]),
                    false => (false, Vec::new()),
                }
            })
            .unwrap_or(false);
        futures::future::ready(Ok(removed)).boxed()
    }

    fn record_heartbeat(
        &self,
        code: &str,
        peer_id: &str,
        at: SystemTime,
        status: ConnectionStatusEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let recorded = self
            .with_room(code, |room| {
                let Some(participant) = room.participants.get_mut(peer_id) else {
                    return (false, Vec::new());
                };
                participant.last_heartbeat = at;
                let status_changed = participant.connection_status != status;
                participant.connection_status = status;
                // Heartbeats land every couple of seconds; only a status flip
                // is worth waking subscribers for.
                let events = if status_changed {
                    vec![RoomEvent::Participants]
                } else {
                    Vec::new()
                };
                (true, events)
            })
            .unwrap_or(false);
        futures::future::ready(Ok(recorded)).boxed()
    }

    fn set_organizer(
        &self,
        code: &str,
        expected: Option<&str>,
        new_organizer: &str,
        store_previous: bool,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let reassigned = self
            .with_room(code, |room| {
                if let Some(expected) = expected
                    && room.metadata.organizer_id != expected
                {
                    return (false, Vec::new());
                }
                let previous = room.metadata.organizer_id.clone();
                if store_previous {
                    room.metadata.previous_organizer_id = Some(previous.clone());
                }
                room.metadata.organizer_id = new_organizer.to_string();
                room.metadata.last_activity = SystemTime::now();
                for (peer_id, participant) in room.participants.iter_mut() {
                    participant.is_organizer = peer_id == new_organizer;
                }
                (true, vec![RoomEvent::Metadata, RoomEvent::Participants])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(reassigned)).boxed()
    }

    fn put_current_round(
        &self,
        code: &str,
        round: RoundEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let installed = self
            .with_room(code, |room| {
                room.current_round = Some(round);
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::CurrentRound])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(installed)).boxed()
    }

    fn current_round(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let round = self
            .rooms
            .get(code)
            .and_then(|room| room.current_round.clone());
        futures::future::ready(Ok(round)).boxed()
    }

    fn submit_estimate(
        &self,
        code: &str,
        peer_id: &str,
        workstream_id: Uuid,
        estimate: EstimateEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let submitted = self
            .with_room(code, |room| {
                let Some(round) = room.current_round.as_mut() else {
                    return (false, Vec::new());
                };
                let sheet = round
                    .estimates
                    .entry(peer_id.to_string())
                    .or_insert_with(ParticipantEstimatesEntity::default);
                sheet.workstreams.insert(workstream_id, estimate);
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::CurrentRound])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(submitted)).boxed()
    }

    fn set_done(
        &self,
        code: &str,
        peer_id: &str,
        done: bool,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let marked = self
            .with_room(code, |room| {
                let Some(round) = room.current_round.as_mut() else {
                    return (false, Vec::new());
                };
                let sheet = round
                    .estimates
                    .entry(peer_id.to_string())
                    .or_insert_with(ParticipantEstimatesEntity::default);
                sheet.is_done = done;
                sheet.done_at = done.then_some(at);
                room.metadata.last_activity = SystemTime::now();
                (true, vec![RoomEvent::CurrentRound])
            })
            .unwrap_or(false);
        futures::future::ready(Ok(marked)).boxed()
    }

    fn finish_round(
        &self,
        code: &str,
        expected_task_id: Uuid,
        completed: CompletedRoundEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let finished = self
            .with_room(code, |room| {
                let still_live = room
                    .current_round
                    .as_ref()
                    .is_some_and(|round| round.task_id == expected_task_id);
                if !still_live {
                    return (false, Vec::new());
                }
                room.current_round = None;
                room.completed_rounds.push(completed);
                room.metadata.status = RoomStatusEntity::Results;
                room.metadata.last_activity = SystemTime::now();
                (
                    true,
                    vec![
                        RoomEvent::CurrentRound,
                        RoomEvent::CompletedRounds,
                        RoomEvent::Metadata,
                    ],
                )
            })
            .unwrap_or(false);
        futures::future::ready(Ok(finished)).boxed()
    }

    fn completed_rounds(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<CompletedRoundEntity>>> {
        let rounds = self
            .rooms
            .get(code)
            .map(|room| room.completed_rounds.clone())
            .unwrap_or_default();
        futures::future::ready(Ok(rounds)).boxed()
    }

    fn subscribe(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<broadcast::Receiver<RoomEvent>>> {
        let receiver = self.feed(code).subscribe();
        futures::future::ready(Ok(receiver)).boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(code: &str) -> RoomMetadataEntity {
        let now = SystemTime::now();
        RoomMetadataEntity {
            code: code.to_string(),
            created_at: now,
            created_by: "peer-a".into(),
            organizer_id: "peer-a".into(),
            previous_organizer_id: None,
            status: RoomStatusEntity::Lobby,
            current_task_index: 0,
            last_activity: now,
        }
    }

    #[tokio::test]
    async fn create_room_rejects_duplicate_codes() {
        let store = MemoryRoomStore::default();
        assert!(
            store
                .create_room(metadata("ABCD2345"), vec![], vec![])
                .await
                .unwrap()
        );
        assert!(
            !store
                .create_room(metadata("ABCD2345"), vec![], vec![])
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn status_cas_only_applies_from_expected_status() {
        let store = MemoryRoomStore::default();
        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();

        assert!(
            store
                .update_status("ROOMCODE", RoomStatusEntity::Lobby, RoomStatusEntity::Active)
                .await
                .unwrap()
        );
        // A second writer expecting lobby loses the race.
        assert!(
            !store
                .update_status("ROOMCODE", RoomStatusEntity::Lobby, RoomStatusEntity::Active)
                .await
                .unwrap()
        );
        let room = store.find_room("ROOMCODE").await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatusEntity::Active);
    }

    #[tokio::test]
    async fn organizer_cas_detects_lost_handoff_race() {
        let store = MemoryRoomStore::default();
        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();

        assert!(
            store
                .set_organizer("ROOMCODE", Some("peer-a"), "peer-b", true)
                .await
                .unwrap()
        );
        // The second client still believes peer-a is organizer; its write
        // must not land.
        assert!(
            !store
                .set_organizer("ROOMCODE", Some("peer-a"), "peer-c", true)
                .await
                .unwrap()
        );
        let room = store.find_room("ROOMCODE").await.unwrap().unwrap();
        assert_eq!(room.organizer_id, "peer-b");
        assert_eq!(room.previous_organizer_id.as_deref(), Some("peer-a"));
    }

    #[tokio::test]
    async fn finish_round_is_idempotent_per_task() {
        let store = MemoryRoomStore::default();
        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();

        let task_id = Uuid::new_v4();
        let now = SystemTime::now();
        store
            .put_current_round(
                "ROOMCODE",
                RoundEntity {
                    task_id,
                    started_at: now,
                    estimates: IndexMap::new(),
                },
            )
            .await
            .unwrap();

        let completed = CompletedRoundEntity {
            id: Uuid::new_v4(),
            task_id,
            task_title: "Task".into(),
            started_at: now,
            completed_at: now,
            participants: vec![],
        };

        assert!(
            store
                .finish_round("ROOMCODE", task_id, completed.clone())
                .await
                .unwrap()
        );
        // The round is gone; a racing second close is a no-op.
        assert!(!store.finish_round("ROOMCODE", task_id, completed).await.unwrap());
        assert_eq!(store.completed_rounds("ROOMCODE").await.unwrap().len(), 1);
        assert!(store.current_round("ROOMCODE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_path_change_events() {
        let store = MemoryRoomStore::default();
        let mut feed = store.subscribe("ROOMCODE").await.unwrap();

        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();

        assert_eq!(feed.recv().await.unwrap(), RoomEvent::Metadata);
        assert_eq!(feed.recv().await.unwrap(), RoomEvent::Workstreams);
        assert_eq!(feed.recv().await.unwrap(), RoomEvent::Tasks);
    }

    #[tokio::test]
    async fn marking_done_twice_keeps_one_timestamp() {
        let store = MemoryRoomStore::default();
        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();
        store
            .put_current_round(
                "ROOMCODE",
                RoundEntity {
                    task_id: Uuid::new_v4(),
                    started_at: SystemTime::now(),
                    estimates: IndexMap::new(),
                },
            )
            .await
            .unwrap();

        let first = SystemTime::now();
        let second = first + std::time::Duration::from_secs(1);
        store.set_done("ROOMCODE", "peer-a", true, first).await.unwrap();
        store.set_done("ROOMCODE", "peer-a", true, second).await.unwrap();

        let round = store.current_round("ROOMCODE").await.unwrap().unwrap();
        let sheet = &round.estimates["peer-a"];
        assert!(sheet.is_done);
        // The later write's timestamp overwrites, same as server timestamps.
        assert_eq!(sheet.done_at, Some(second));

        store.set_done("ROOMCODE", "peer-a", false, second).await.unwrap();
        let round = store.current_round("ROOMCODE").await.unwrap().unwrap();
        assert!(round.estimates["peer-a"].done_at.is_none());
    }

    #[tokio::test]
    async fn heartbeat_on_removed_participant_is_skipped() {
        let store = MemoryRoomStore::default();
        store
            .create_room(metadata("ROOMCODE"), vec![], vec![])
            .await
            .unwrap();

        let recorded = store
            .record_heartbeat(
                "ROOMCODE",
                "ghost",
                SystemTime::now(),
                ConnectionStatusEntity::Online,
            )
            .await
            .unwrap();
        assert!(!recorded);
    }
}
