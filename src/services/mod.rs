/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Heartbeats, the stale sweeper, and organizer handoff.
pub mod presence_service;
/// Room code generation and validation.
pub mod room_code;
/// Room lifecycle: create, join, leave, organizer handoff, snapshots.
pub mod room_service;
/// Round lifecycle: start, estimate, done flags, close, advance.
pub mod round_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Store change feed to typed SSE event translation.
pub mod subscriptions;
