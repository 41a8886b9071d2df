use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Hotseat Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::get_session,
        crate::routes::session::get_session_result,
        crate::routes::session::list_results,
        crate::routes::session::list_quizzes,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateSessionRequest,
            crate::dto::game::SessionSummary,
            crate::dto::game::QuizBrief,
            crate::dto::game::PlayerSummary,
            crate::dto::game::GameResultSummary,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::ErrorPayload,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Session bootstrap and result lookups"),
        (name = "play", description = "WebSocket operations for live gameplay"),
    )
)]
pub struct ApiDoc;
