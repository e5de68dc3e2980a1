pub mod memory;

use std::time::SystemTime;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{
    CompletedRoundEntity, ConnectionStatusEntity, EstimateEntity, ParticipantEntity,
    RoomMetadataEntity, RoomStatusEntity, RoundEntity, TaskEntity, WorkstreamEntity,
};
use crate::dao::storage::StorageResult;

/// Change notification emitted by the store whenever a room path mutates.
///
/// Events carry only the path that changed; subscribers re-read the path and
/// rebuild their view, so a lost or repeated event is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// `rooms/{code}/metadata` changed (status, organizer, task pointer).
    Metadata,
    /// `rooms/{code}/workstreams` changed (only at creation time).
    Workstreams,
    /// `rooms/{code}/tasks` changed (only at creation time).
    Tasks,
    /// `rooms/{code}/participants` changed (join, leave, sweep, status).
    Participants,
    /// `rooms/{code}/current_round` changed (start, estimate, done, clear).
    CurrentRound,
    /// `rooms/{code}/completed_rounds` grew by one record.
    CompletedRounds,
}

/// Abstraction over the shared room state store.
///
/// The trait exposes exactly the primitives the session controller needs:
/// point reads, path writes and deletes with server-assigned timestamps, a
/// per-room change feed, and conditional writes for the sequences that would
/// otherwise be racy read-then-write pairs (status moves, organizer handoff,
/// closing a round). Conditional methods return `Ok(false)` when the guard
/// did not hold, never an error.
pub trait RoomStore: Send + Sync {
    /// Create the whole room subtree in one batch. `Ok(false)` if the code
    /// is already taken.
    fn create_room(
        &self,
        metadata: RoomMetadataEntity,
        workstreams: Vec<WorkstreamEntity>,
        tasks: Vec<TaskEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Point-read the room metadata.
    fn find_room(&self, code: &str)
    -> BoxFuture<'static, StorageResult<Option<RoomMetadataEntity>>>;

    /// Codes of every room currently held by the store.
    fn room_codes(&self) -> BoxFuture<'static, StorageResult<Vec<String>>>;

    /// Compare-and-set the room status. The write only lands when the stored
    /// status equals `expected`.
    fn update_status(
        &self,
        code: &str,
        expected: RoomStatusEntity,
        next: RoomStatusEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Move the task pointer. `Ok(false)` when the room does not exist.
    fn set_current_task_index(
        &self,
        code: &str,
        index: usize,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Bump `last_activity` to the current server time.
    fn touch_activity(&self, code: &str) -> BoxFuture<'static, StorageResult<()>>;

    /// All workstreams of the room, in storage order.
    fn workstreams(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<WorkstreamEntity>>>;

    /// All tasks of the room, in storage order.
    fn tasks(&self, code: &str) -> BoxFuture<'static, StorageResult<Vec<TaskEntity>>>;

    /// Insert or replace a participant record. `Ok(false)` when the room
    /// does not exist.
    fn upsert_participant(
        &self,
        code: &str,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// All participants of the room, in join order.
    fn participants(&self, code: &str)
    -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;

    /// Delete a participant. Deleting an absent record is a no-op returning
    /// `Ok(false)`.
    fn remove_participant(
        &self,
        code: &str,
        peer_id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Stamp a participant's `last_heartbeat` and connection status. Skipped
    /// (`Ok(false)`) when the participant no longer exists.
    fn record_heartbeat(
        &self,
        code: &str,
        peer_id: &str,
        at: SystemTime,
        status: ConnectionStatusEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Conditionally reassign the organizer. When `expected` is set, the
    /// write only lands if the stored organizer id still matches, which makes
    /// racing handoffs detectable instead of silently last-write-wins.
    fn set_organizer(
        &self,
        code: &str,
        expected: Option<&str>,
        new_organizer: &str,
        store_previous: bool,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Install the current round, overwriting any unfinished one.
    fn put_current_round(
        &self,
        code: &str,
        round: RoundEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Point-read the current round, if one is live.
    fn current_round(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;

    /// Upsert one workstream estimate on the caller's sheet. `Ok(false)`
    /// when no round is live.
    fn submit_estimate(
        &self,
        code: &str,
        peer_id: &str,
        workstream_id: Uuid,
        estimate: EstimateEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Set or clear the caller's done flag on the current round.
    fn set_done(
        &self,
        code: &str,
        peer_id: &str,
        done: bool,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Atomically close the current round: verify it still concerns
    /// `expected_task_id`, append the completed record, delete the current
    /// round, and set the status to results. `Ok(false)` when the round is
    /// gone or concerns another task (a concurrent close won the race).
    fn finish_round(
        &self,
        code: &str,
        expected_task_id: Uuid,
        completed: CompletedRoundEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Every completed round of the room, in append order.
    fn completed_rounds(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<CompletedRoundEntity>>>;

    /// Subscribe to the room's change feed. Listening on a room that does
    /// not exist yet is allowed; events start flowing once it is created.
    fn subscribe(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<broadcast::Receiver<RoomEvent>>>;

    /// Cheap liveness probe used by the healthcheck.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
