use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Poker Room Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::set_organizer,
        crate::routes::rounds::start_round,
        crate::routes::rounds::submit_estimate,
        crate::routes::rounds::mark_done,
        crate::routes::rounds::end_round,
        crate::routes::rounds::advance,
        crate::routes::presence::heartbeat,
        crate::routes::sse::room_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::WorkstreamInput,
            crate::dto::room::TaskInput,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::SetOrganizerRequest,
            crate::dto::room::RoomStatusDto,
            crate::dto::room::RoomSummary,
            crate::dto::room::WorkstreamSummary,
            crate::dto::room::TaskSummary,
            crate::dto::room::ColorDto,
            crate::dto::room::ParticipantSummary,
            crate::dto::room::RoomSnapshot,
            crate::dto::round::StartRoundRequest,
            crate::dto::round::SubmitEstimateRequest,
            crate::dto::round::MarkDoneRequest,
            crate::dto::round::LifecycleRequest,
            crate::dto::round::AdvanceOutcome,
            crate::dto::round::AdvanceResponse,
            crate::dto::round::EstimateSummary,
            crate::dto::round::ParticipantEstimatesSummary,
            crate::dto::round::RoundSummary,
            crate::dto::round::CompletedEstimateSummary,
            crate::dto::round::CompletedParticipantSummary,
            crate::dto::round::CompletedRoundSummary,
            crate::dto::presence::HeartbeatRequest,
            crate::dto::presence::ConnectionStatusDto,
            crate::dto::presence::HeartbeatResponse,
            crate::dto::sse::Handshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room lifecycle and membership"),
        (name = "rounds", description = "Estimation round lifecycle"),
        (name = "presence", description = "Participant liveness tracking"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
