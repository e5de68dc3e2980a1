use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        CompletedRoundEntity, EstimateValue, ParticipantEstimatesEntity, RoundEntity,
    },
    dto::format_system_time,
};

/// Payload for the organizer starting a round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRoundRequest {
    /// The caller; must be the current organizer.
    pub caller_id: String,
    /// Task to estimate; defaults to the room's current task when omitted.
    #[serde(default)]
    pub task_id: Option<Uuid>,
}

/// Payload for submitting one workstream estimate.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitEstimateRequest {
    /// The estimating participant; only they may write their sheet.
    pub peer_id: String,
    /// Workstream the value applies to.
    pub workstream_id: Uuid,
    /// One of 1, 2, 3, 5, 8, 13, 21 or "?".
    #[schema(value_type = String, example = "5")]
    pub value: EstimateValue,
}

/// Payload for toggling the caller's done flag.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkDoneRequest {
    /// The participant marking their sheet.
    pub peer_id: String,
    /// True to declare the sheet final, false to reopen it.
    pub is_done: bool,
}

/// Payload for organizer-only round lifecycle operations.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LifecycleRequest {
    /// The caller; must be the current organizer.
    pub caller_id: String,
}

/// Outcome of asking for the next task.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// A round for the next task was started.
    Advanced,
    /// There was no next task; the session is ended.
    NoNextTask,
}

/// Response to an advance request.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    /// What happened.
    pub outcome: AdvanceOutcome,
    /// The task pointer after the operation.
    pub current_task_index: usize,
}

/// One submitted estimate as exposed over the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EstimateSummary {
    /// Workstream the value applies to.
    pub workstream_id: Uuid,
    /// The chosen card.
    #[schema(value_type = String, example = "5")]
    pub value: EstimateValue,
    /// RFC3339 submission timestamp.
    pub submitted_at: String,
}

/// One participant's estimate sheet inside the live round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantEstimatesSummary {
    /// The estimating participant.
    pub peer_id: String,
    /// Their per-workstream estimates.
    pub estimates: Vec<EstimateSummary>,
    /// Whether they declared the sheet final.
    pub is_done: bool,
    /// RFC3339 timestamp of the done declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
}

impl ParticipantEstimatesSummary {
    fn from_entity(peer_id: String, sheet: ParticipantEstimatesEntity) -> Self {
        Self {
            peer_id,
            estimates: sheet
                .workstreams
                .into_iter()
                .map(|(workstream_id, estimate)| EstimateSummary {
                    workstream_id,
                    value: estimate.value,
                    submitted_at: format_system_time(estimate.submitted_at),
                })
                .collect(),
            is_done: sheet.is_done,
            done_at: sheet.done_at.map(format_system_time),
        }
    }
}

/// Public projection of the live round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundSummary {
    /// Task being estimated.
    pub task_id: Uuid,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// Estimate sheets, one per participant that wrote anything.
    pub estimates: Vec<ParticipantEstimatesSummary>,
}

impl From<RoundEntity> for RoundSummary {
    fn from(value: RoundEntity) -> Self {
        Self {
            task_id: value.task_id,
            started_at: format_system_time(value.started_at),
            estimates: value
                .estimates
                .into_iter()
                .map(|(peer_id, sheet)| ParticipantEstimatesSummary::from_entity(peer_id, sheet))
                .collect(),
        }
    }
}

/// A denormalized estimate inside a completed round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedEstimateSummary {
    /// Workstream the value applied to.
    pub workstream_id: Uuid,
    /// Workstream name frozen at completion time.
    pub workstream_name: String,
    /// The submitted card.
    #[schema(value_type = String, example = "8")]
    pub value: EstimateValue,
}

/// A participant's slice of a completed round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedParticipantSummary {
    /// Peer id of the estimating participant.
    pub peer_id: String,
    /// Name frozen at completion time.
    pub participant_name: String,
    /// Their estimates.
    pub estimates: Vec<CompletedEstimateSummary>,
}

/// Public projection of a completed round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletedRoundSummary {
    /// Identifier of the historical record.
    pub id: Uuid,
    /// Task that was estimated.
    pub task_id: Uuid,
    /// Task title frozen at completion time.
    pub task_title: String,
    /// RFC3339 round start timestamp.
    pub started_at: String,
    /// RFC3339 completion timestamp.
    pub completed_at: String,
    /// Denormalized estimate sheets.
    pub participants: Vec<CompletedParticipantSummary>,
}

impl From<CompletedRoundEntity> for CompletedRoundSummary {
    fn from(value: CompletedRoundEntity) -> Self {
        Self {
            id: value.id,
            task_id: value.task_id,
            task_title: value.task_title,
            started_at: format_system_time(value.started_at),
            completed_at: format_system_time(value.completed_at),
            participants: value
                .participants
                .into_iter()
                .map(|participant| CompletedParticipantSummary {
                    peer_id: participant.peer_id,
                    participant_name: participant.participant_name,
                    estimates: participant
                        .estimates
                        .into_iter()
                        .map(|estimate| CompletedEstimateSummary {
                            workstream_id: estimate.workstream_id,
                            workstream_name: estimate.workstream_name,
                            value: estimate.value,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
