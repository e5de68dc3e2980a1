use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::{
    room::{ParticipantSummary, RoomSummary, TaskSummary, WorkstreamSummary},
    round::{CompletedRoundSummary, RoundSummary},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Serialized JSON data field.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Build an event carrying a preformatted data string.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Room code the stream is scoped to.
    pub room: String,
    /// Period on which participants are expected to POST heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Human-readable message confirming the subscription.
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the room metadata changes (status, organizer, task pointer).
pub struct RoomChangedEvent {
    /// Current metadata; absent when the room was deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast with the full workstream list, sorted by ascending order.
pub struct WorkstreamsChangedEvent {
    /// All workstreams of the room.
    pub workstreams: Vec<WorkstreamSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast with the full task list, sorted by ascending order.
pub struct TasksChangedEvent {
    /// All tasks of the room.
    pub tasks: Vec<TaskSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast with the full participant list, in join order.
pub struct ParticipantsChangedEvent {
    /// All participants of the room.
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the live round changes; `round` is null once it is
/// closed or deleted.
pub struct CurrentRoundChangedEvent {
    /// The live round, if any.
    pub round: Option<RoundSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast with all completed rounds, most recent first.
pub struct CompletedRoundsChangedEvent {
    /// Historical records, sorted by `completed_at` descending.
    pub rounds: Vec<CompletedRoundSummary>,
}
