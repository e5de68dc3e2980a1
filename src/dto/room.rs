use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        ConnectionStatusEntity, ParticipantEntity, RoomMetadataEntity, RoomStatusEntity,
        TaskEntity, WorkstreamEntity,
    },
    dto::{format_system_time, validation::validate_display_name},
};

/// Payload used to create a brand-new room.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Opaque identity of the creating participant; becomes the organizer.
    pub peer_id: String,
    /// Workstreams to estimate against, in display order.
    pub workstreams: Vec<WorkstreamInput>,
    /// Tasks to estimate, in estimation order.
    pub tasks: Vec<TaskInput>,
}

impl Validate for CreateRoomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.peer_id.trim().is_empty() {
            errors.add("peer_id", validator::ValidationError::new("peer_id_blank"));
        }
        if self.workstreams.is_empty() {
            errors.add(
                "workstreams",
                validator::ValidationError::new("workstreams_empty"),
            );
        }
        if self.tasks.is_empty() {
            errors.add("tasks", validator::ValidationError::new("tasks_empty"));
        }
        for workstream in &self.workstreams {
            if let Err(e) = validate_display_name(&workstream.name) {
                errors.add("workstreams", e);
            }
        }
        for task in &self.tasks {
            if task.title.trim().is_empty() {
                errors.add("tasks", validator::ValidationError::new("task_title_blank"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Incoming workstream definition; its position assigns the dense order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkstreamInput {
    /// Display name (e.g. "Backend").
    pub name: String,
}

/// Incoming task definition; its position assigns the dense order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskInput {
    /// Display title of the task.
    pub title: String,
    /// Optional link to a ticket or document.
    #[serde(default)]
    pub link: Option<String>,
}

/// Payload to join an existing room.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRoomRequest {
    /// Opaque, session-stable identity of the joining participant.
    pub peer_id: String,
    /// Display name to show to the other participants.
    pub name: String,
}

impl Validate for JoinRoomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.peer_id.trim().is_empty() {
            errors.add("peer_id", validator::ValidationError::new("peer_id_blank"));
        }
        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Payload for a voluntary organizer handoff.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetOrganizerRequest {
    /// The caller; must be the current organizer.
    pub caller_id: String,
    /// Participant receiving the organizer role.
    pub new_organizer_id: String,
    /// Whether to snapshot the outgoing organizer for display.
    #[serde(default = "default_store_previous")]
    pub store_previous: bool,
}

fn default_store_previous() -> bool {
    true
}

/// Lifecycle status as exposed over the API.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatusDto {
    /// Waiting for participants.
    Lobby,
    /// A round is live.
    Active,
    /// Round results are on display.
    Results,
    /// Session is over.
    Ended,
}

impl From<RoomStatusEntity> for RoomStatusDto {
    fn from(value: RoomStatusEntity) -> Self {
        match value {
            RoomStatusEntity::Lobby => RoomStatusDto::Lobby,
            RoomStatusEntity::Active => RoomStatusDto::Active,
            RoomStatusEntity::Results => RoomStatusDto::Results,
            RoomStatusEntity::Ended => RoomStatusDto::Ended,
        }
    }
}

/// Public projection of the room metadata.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSummary {
    /// The 8-character room code.
    pub code: String,
    /// Current lifecycle status.
    pub status: RoomStatusDto,
    /// Peer id of the creating participant.
    pub created_by: String,
    /// Peer id of the current organizer.
    pub organizer_id: String,
    /// Previous organizer after a handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_organizer_id: Option<String>,
    /// Zero-based pointer into the task sequence.
    pub current_task_index: usize,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last activity.
    pub last_activity: String,
}

impl From<RoomMetadataEntity> for RoomSummary {
    fn from(value: RoomMetadataEntity) -> Self {
        Self {
            code: value.code,
            status: value.status.into(),
            created_by: value.created_by,
            organizer_id: value.organizer_id,
            previous_organizer_id: value.previous_organizer_id,
            current_task_index: value.current_task_index,
            created_at: format_system_time(value.created_at),
            last_activity: format_system_time(value.last_activity),
        }
    }
}

/// Public projection of a workstream.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkstreamSummary {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Dense zero-based position.
    pub order: u32,
}

impl From<WorkstreamEntity> for WorkstreamSummary {
    fn from(value: WorkstreamEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            order: value.order,
        }
    }
}

/// Public projection of a task.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskSummary {
    /// Stable identifier.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional ticket/document link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Dense zero-based position in the estimation sequence.
    pub order: u32,
}

impl From<TaskEntity> for TaskSummary {
    fn from(value: TaskEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            link: value.link,
            order: value.order,
        }
    }
}

/// HSV color as exposed over the API.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ColorDto {
    /// Hue in degrees.
    pub h: f32,
    /// Saturation in `[0, 1]`.
    pub s: f32,
    /// Value in `[0, 1]`.
    pub v: f32,
}

/// Public projection of a participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Stable per-session identifier.
    pub peer_id: String,
    /// Display name.
    pub name: String,
    /// Whether this participant holds organizer privileges.
    pub is_organizer: bool,
    /// Color derived from the peer id.
    pub color: ColorDto,
    /// RFC3339 join timestamp.
    pub joined_at: String,
    /// RFC3339 timestamp of the last heartbeat.
    pub last_heartbeat: String,
    /// `online` or `offline`.
    pub connection_status: String,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            peer_id: value.peer_id,
            name: value.name,
            is_organizer: value.is_organizer,
            color: ColorDto {
                h: value.color.h,
                s: value.color.s,
                v: value.color.v,
            },
            joined_at: format_system_time(value.joined_at),
            last_heartbeat: format_system_time(value.last_heartbeat),
            connection_status: match value.connection_status {
                ConnectionStatusEntity::Online => "online".into(),
                ConnectionStatusEntity::Offline => "offline".into(),
            },
        }
    }
}

/// Full denormalized view of a room, returned on reads and join.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSnapshot {
    /// Room metadata.
    pub room: RoomSummary,
    /// Workstreams sorted by ascending order.
    pub workstreams: Vec<WorkstreamSummary>,
    /// Tasks sorted by ascending order.
    pub tasks: Vec<TaskSummary>,
    /// Participants in join order.
    pub participants: Vec<ParticipantSummary>,
    /// The live round, when one is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round: Option<crate::dto::round::RoundSummary>,
    /// Completed rounds, most recent first.
    pub completed_rounds: Vec<crate::dto::round::CompletedRoundSummary>,
}
