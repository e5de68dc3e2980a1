use std::{fmt, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

/// Lifecycle status of a room as persisted by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatusEntity {
    /// Participants are gathering; no round has started yet.
    Lobby,
    /// A round is live and estimates are being collected.
    Active,
    /// The last round is finished and its results are on display.
    Results,
    /// The session is over; the room no longer accepts joins.
    Ended,
}

/// Room metadata document stored under the room code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMetadataEntity {
    /// 8-character room code acting as the primary key.
    pub code: String,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Peer id of the participant who created the room.
    pub created_by: String,
    /// Peer id of the current organizer.
    pub organizer_id: String,
    /// Previous organizer, kept for informational display after a handoff.
    pub previous_organizer_id: Option<String>,
    /// Current lifecycle status.
    pub status: RoomStatusEntity,
    /// Zero-based pointer into the task sequence.
    pub current_task_index: usize,
    /// Last time any activity-generating operation touched the room.
    pub last_activity: SystemTime,
}

/// Workstream definition, immutable after room creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkstreamEntity {
    /// Stable identifier for the workstream.
    pub id: Uuid,
    /// Display name (e.g. "Backend").
    pub name: String,
    /// Dense zero-based position within the room.
    pub order: u32,
}

/// Task definition, immutable after room creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEntity {
    /// Stable identifier for the task.
    pub id: Uuid,
    /// Display title of the task.
    pub title: String,
    /// Optional link to a ticket or document.
    pub link: Option<String>,
    /// Dense zero-based position defining the estimation sequence.
    pub order: u32,
}

/// Connection state reported for a participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatusEntity {
    /// The participant is actively heartbeating.
    Online,
    /// The participant stopped heartbeating but has not been swept yet.
    Offline,
}

/// HSV color assigned to a participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParticipantColorEntity {
    /// Hue in degrees.
    pub h: f32,
    /// Saturation in `[0, 1]`.
    pub s: f32,
    /// Value in `[0, 1]`.
    pub v: f32,
}

impl PartialEq for ParticipantColorEntity {
    fn eq(&self, other: &Self) -> bool {
        self.h.to_bits() == other.h.to_bits()
            && self.s.to_bits() == other.s.to_bits()
            && self.v.to_bits() == other.v.to_bits()
    }
}

impl Eq for ParticipantColorEntity {}

/// Participant record stored under the room's participants path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Stable per-session identifier supplied by the identity layer.
    pub peer_id: String,
    /// Display name chosen when joining.
    pub name: String,
    /// Whether this participant currently holds organizer privileges.
    pub is_organizer: bool,
    /// Color derived deterministically from the peer id.
    pub color: ParticipantColorEntity,
    /// When the participant joined the room.
    pub joined_at: SystemTime,
    /// Last heartbeat write from this participant.
    pub last_heartbeat: SystemTime,
    /// Reported connection state.
    pub connection_status: ConnectionStatusEntity,
}

/// One Fibonacci-scale estimate value, or `?` when the participant abstains.
///
/// This is the single canonical representation of an estimate in the system:
/// values are coerced and validated here, at the serde boundary, and nowhere
/// else. Numeric values serialize as JSON numbers, the unknown value as the
/// string `"?"`; deserialization additionally accepts numeric strings so
/// clients that stringify card labels still round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimateValue {
    /// A points value from the Fibonacci scale {1, 2, 3, 5, 8, 13, 21}.
    Points(u8),
    /// The "?" card.
    Unknown,
}

impl EstimateValue {
    /// Allowed numeric card values, in ascending order.
    pub const SCALE: [u8; 7] = [1, 2, 3, 5, 8, 13, 21];

    /// Build a points value, rejecting numbers outside the scale.
    pub fn from_points(points: u8) -> Option<Self> {
        Self::SCALE
            .contains(&points)
            .then_some(EstimateValue::Points(points))
    }
}

impl fmt::Display for EstimateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateValue::Points(points) => write!(f, "{points}"),
            EstimateValue::Unknown => write!(f, "?"),
        }
    }
}

impl Serialize for EstimateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EstimateValue::Points(points) => serializer.serialize_u8(*points),
            EstimateValue::Unknown => serializer.serialize_str("?"),
        }
    }
}

impl<'de> Deserialize<'de> for EstimateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl de::Visitor<'_> for ValueVisitor {
            type Value = EstimateValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "one of 1, 2, 3, 5, 8, 13, 21 or \"?\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                u8::try_from(value)
                    .ok()
                    .and_then(EstimateValue::from_points)
                    .ok_or_else(|| E::custom(format!("{value} is not on the estimation scale")))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map_err(|_| E::custom(format!("{value} is not on the estimation scale")))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value == "?" {
                    return Ok(EstimateValue::Unknown);
                }
                value
                    .parse::<u8>()
                    .ok()
                    .and_then(EstimateValue::from_points)
                    .ok_or_else(|| E::custom(format!("`{value}` is not on the estimation scale")))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// A single submitted estimate for one workstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EstimateEntity {
    /// The chosen card.
    pub value: EstimateValue,
    /// Server-assigned submission timestamp; resubmission overwrites it.
    pub submitted_at: SystemTime,
}

/// Per-participant estimate sheet inside the current round.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEstimatesEntity {
    /// Estimates keyed by workstream id.
    pub workstreams: IndexMap<Uuid, EstimateEntity>,
    /// Whether the participant declared their sheet final.
    pub is_done: bool,
    /// When the participant marked themselves done; cleared on un-mark.
    pub done_at: Option<SystemTime>,
}

/// The single live round of a room, or absent when no round is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Task being estimated.
    pub task_id: Uuid,
    /// When the organizer started the round.
    pub started_at: SystemTime,
    /// Estimate sheets keyed by participant peer id.
    pub estimates: IndexMap<String, ParticipantEstimatesEntity>,
}

/// A frozen estimate inside a completed round, denormalized with names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedEstimateEntity {
    /// Workstream the value applies to.
    pub workstream_id: Uuid,
    /// Workstream name at completion time.
    pub workstream_name: String,
    /// The submitted card.
    pub value: EstimateValue,
}

/// Per-participant slice of a completed round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedParticipantEntity {
    /// Peer id of the estimating participant.
    pub peer_id: String,
    /// Participant name at completion time.
    pub participant_name: String,
    /// All estimates the participant submitted during the round.
    pub estimates: Vec<CompletedEstimateEntity>,
}

/// Append-only historical record of a finished round; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedRoundEntity {
    /// Unique identifier of the record.
    pub id: Uuid,
    /// Task that was estimated.
    pub task_id: Uuid,
    /// Task title at completion time.
    pub task_title: String,
    /// When the round started.
    pub started_at: SystemTime,
    /// When the round was closed.
    pub completed_at: SystemTime,
    /// Denormalized estimate sheets.
    pub participants: Vec<CompletedParticipantEntity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_value_serializes_numbers_and_question_mark() {
        assert_eq!(
            serde_json::to_string(&EstimateValue::Points(13)).unwrap(),
            "13"
        );
        assert_eq!(
            serde_json::to_string(&EstimateValue::Unknown).unwrap(),
            "\"?\""
        );
    }

    #[test]
    fn estimate_value_accepts_numbers_and_strings() {
        assert_eq!(
            serde_json::from_str::<EstimateValue>("5").unwrap(),
            EstimateValue::Points(5)
        );
        assert_eq!(
            serde_json::from_str::<EstimateValue>("\"8\"").unwrap(),
            EstimateValue::Points(8)
        );
        assert_eq!(
            serde_json::from_str::<EstimateValue>("\"?\"").unwrap(),
            EstimateValue::Unknown
        );
    }

    #[test]
    fn estimate_value_rejects_off_scale_numbers() {
        assert!(serde_json::from_str::<EstimateValue>("4").is_err());
        assert!(serde_json::from_str::<EstimateValue>("0").is_err());
        assert!(serde_json::from_str::<EstimateValue>("\"34\"").is_err());
        assert!(serde_json::from_str::<EstimateValue>("-1").is_err());
    }

    #[test]
    fn from_points_only_allows_the_scale() {
        for points in EstimateValue::SCALE {
            assert_eq!(
                EstimateValue::from_points(points),
                Some(EstimateValue::Points(points))
            );
        }
        assert_eq!(EstimateValue::from_points(4), None);
        assert_eq!(EstimateValue::from_points(22), None);
    }
}
