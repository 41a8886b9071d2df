/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Join-code generation and resolution.
pub mod join_code;
/// Leaderboard aggregation and game-result snapshots.
pub mod leaderboard;
/// Inbound protocol message dispatch.
pub mod message_router;
/// Player admission and name deduplication.
pub mod roster_service;
/// Answer validation, ranking, and scoring.
pub mod scoring_service;
/// Session lifecycle orchestration.
pub mod session_service;
/// WebSocket connection lifecycle handling.
pub mod websocket_service;
