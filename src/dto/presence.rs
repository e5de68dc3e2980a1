use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::ConnectionStatusEntity;

/// Periodic liveness write from a participant.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    /// The heartbeating participant.
    pub peer_id: String,
    /// Connection state to report; defaults to `online`.
    #[serde(default)]
    pub connection_status: Option<ConnectionStatusDto>,
}

/// Connection state as exposed over the API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatusDto {
    /// The participant's tab is active.
    Online,
    /// The participant reported themselves away (e.g. hidden tab).
    Offline,
}

impl From<ConnectionStatusDto> for ConnectionStatusEntity {
    fn from(value: ConnectionStatusDto) -> Self {
        match value {
            ConnectionStatusDto::Online => ConnectionStatusEntity::Online,
            ConnectionStatusDto::Offline => ConnectionStatusEntity::Offline,
        }
    }
}

/// Acknowledgement of a heartbeat write.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeartbeatResponse {
    /// False when the write was skipped: the participant no longer exists,
    /// or the session has ended.
    pub recorded: bool,
}
