use thiserror::Error;

use crate::dao::models::RoomStatusEntity;

/// Lifecycle status of a room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Participants are gathering; estimation has not started.
    Lobby,
    /// A round is live and estimates are being collected.
    Active,
    /// The last round is closed and its results are on display.
    Results,
    /// The session is over; the room is read-only history.
    Ended,
}

/// Events that drive the room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLifecycleEvent {
    /// The organizer starts a round (first round, or the next task's round).
    StartRound,
    /// The live round is closed and archived.
    CloseRound,
    /// The session is terminated, either past the last task or by the
    /// organizer shutting the room down.
    EndSession,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Status the room was in when the invalid event arrived.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomLifecycleEvent,
}

/// Compute the status an event moves the room to, if the move is legal.
///
/// The table admits exactly `lobby → active → results → (active | ended)`,
/// plus ending the session from any live status. Nothing leaves `ended`.
pub fn compute_transition(
    from: RoomStatus,
    event: RoomLifecycleEvent,
) -> Result<RoomStatus, InvalidTransition> {
    let next = match (from, event) {
        (RoomStatus::Lobby, RoomLifecycleEvent::StartRound) => RoomStatus::Active,
        (RoomStatus::Active, RoomLifecycleEvent::CloseRound) => RoomStatus::Results,
        (RoomStatus::Results, RoomLifecycleEvent::StartRound) => RoomStatus::Active,
        (RoomStatus::Lobby, RoomLifecycleEvent::EndSession)
        | (RoomStatus::Active, RoomLifecycleEvent::EndSession)
        | (RoomStatus::Results, RoomLifecycleEvent::EndSession) => RoomStatus::Ended,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

impl From<RoomStatusEntity> for RoomStatus {
    fn from(value: RoomStatusEntity) -> Self {
        match value {
            RoomStatusEntity::Lobby => RoomStatus::Lobby,
            RoomStatusEntity::Active => RoomStatus::Active,
            RoomStatusEntity::Results => RoomStatus::Results,
            RoomStatusEntity::Ended => RoomStatus::Ended,
        }
    }
}

impl From<RoomStatus> for RoomStatusEntity {
    fn from(value: RoomStatus) -> Self {
        match value {
            RoomStatus::Lobby => RoomStatusEntity::Lobby,
            RoomStatus::Active => RoomStatusEntity::Active,
            RoomStatus::Results => RoomStatusEntity::Results,
            RoomStatus::Ended => RoomStatusEntity::Ended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_a_session() {
        let status = compute_transition(RoomStatus::Lobby, RoomLifecycleEvent::StartRound).unwrap();
        assert_eq!(status, RoomStatus::Active);

        let status = compute_transition(status, RoomLifecycleEvent::CloseRound).unwrap();
        assert_eq!(status, RoomStatus::Results);

        // Next task: results loops back into a new active round.
        let status = compute_transition(status, RoomLifecycleEvent::StartRound).unwrap();
        assert_eq!(status, RoomStatus::Active);

        let status = compute_transition(status, RoomLifecycleEvent::CloseRound).unwrap();
        let status = compute_transition(status, RoomLifecycleEvent::EndSession).unwrap();
        assert_eq!(status, RoomStatus::Ended);
    }

    #[test]
    fn session_can_end_from_any_live_status() {
        for from in [RoomStatus::Lobby, RoomStatus::Active, RoomStatus::Results] {
            assert_eq!(
                compute_transition(from, RoomLifecycleEvent::EndSession).unwrap(),
                RoomStatus::Ended
            );
        }
    }

    #[test]
    fn nothing_leaves_ended() {
        for event in [
            RoomLifecycleEvent::StartRound,
            RoomLifecycleEvent::CloseRound,
            RoomLifecycleEvent::EndSession,
        ] {
            let err = compute_transition(RoomStatus::Ended, event).unwrap_err();
            assert_eq!(err.from, RoomStatus::Ended);
            assert_eq!(err.event, event);
        }
    }

    #[test]
    fn closing_a_round_requires_an_active_one() {
        let err = compute_transition(RoomStatus::Lobby, RoomLifecycleEvent::CloseRound).unwrap_err();
        assert_eq!(err.from, RoomStatus::Lobby);

        let err =
            compute_transition(RoomStatus::Results, RoomLifecycleEvent::CloseRound).unwrap_err();
        assert_eq!(err.from, RoomStatus::Results);
    }

    #[test]
    fn round_trip_with_the_persisted_representation() {
        for status in [
            RoomStatus::Lobby,
            RoomStatus::Active,
            RoomStatus::Results,
            RoomStatus::Ended,
        ] {
            let entity: RoomStatusEntity = status.into();
            assert_eq!(RoomStatus::from(entity), status);
        }
    }
}
