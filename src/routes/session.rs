use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    dto::game::{CreateSessionRequest, GameResultSummary, QuizBrief, SessionSummary},
    error::AppError,
    services::session_service,
    state::SharedState,
};

const DEFAULT_LISTING_LIMIT: usize = 20;

/// Routes handling session bootstrap and result lookups.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/result", get(get_session_result))
        .route("/results", get(list_results))
        .route("/quizzes", get(list_quizzes))
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionSummary),
        (status = 404, description = "Quiz not found")
    )
)]
/// Create a session for a quiz and reserve its join code.
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let session =
        session_service::create_session(&state, payload.host_id, payload.quiz_id).await?;
    Ok(Json(SessionSummary::from((session, Vec::new()))))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = Uuid, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Session found", body = SessionSummary),
        (status = 404, description = "Session not found")
    )
)]
/// Fetch a session together with its current roster.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::load_session(&state, id).await?;
    let players = state
        .store()
        .get_session_players(id)
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(Json(SessionSummary::from((session, players))))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/result",
    tag = "session",
    params(("id" = Uuid, Path, description = "Identifier of the session")),
    responses(
        (status = 200, description = "Result found", body = GameResultSummary),
        (status = 404, description = "No result for this session")
    )
)]
/// Fetch the immutable post-game snapshot of a finished session.
pub async fn get_session_result(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameResultSummary>, AppError> {
    let result = state
        .store()
        .get_game_result(id)
        .await
        .map_err(crate::error::ServiceError::from)?
        .ok_or_else(|| AppError::NotFound(format!("no result for session `{id}`")))?;
    Ok(Json(GameResultSummary::from(result)))
}

/// Query string accepted by the results listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    /// `recent` (default) or `public`.
    scope: Option<String>,
    /// Restrict to one quiz.
    quiz_id: Option<Uuid>,
    /// Maximum number of entries to return.
    limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/results",
    tag = "session",
    responses((status = 200, description = "Result listing", body = [GameResultSummary]))
)]
/// List game results by recency, visibility, or quiz.
pub async fn list_results(
    State(state): State<SharedState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<GameResultSummary>>, AppError> {
    let store = state.store();
    let limit = query.limit.unwrap_or(DEFAULT_LISTING_LIMIT);

    let results = if let Some(quiz_id) = query.quiz_id {
        store.list_results_by_quiz(quiz_id, limit).await
    } else if query.scope.as_deref() == Some("public") {
        store.list_public_results(limit).await
    } else {
        store.list_recent_results(limit).await
    }
    .map_err(crate::error::ServiceError::from)?;

    Ok(Json(
        results.into_iter().map(GameResultSummary::from).collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/quizzes",
    tag = "session",
    responses((status = 200, description = "Quiz catalog", body = [QuizBrief]))
)]
/// List the quiz catalog available for new sessions.
pub async fn list_quizzes(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QuizBrief>>, AppError> {
    let quizzes = state
        .store()
        .list_quizzes()
        .await
        .map_err(crate::error::ServiceError::from)?;
    Ok(Json(quizzes.iter().map(QuizBrief::from).collect()))
}
