use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::store::SessionPatch,
    dto::now_millis,
    error::ServiceError,
    services::{join_code, leaderboard},
    state::{
        SharedState,
        game::{GameResult, GameSession, Question, SessionEvent, SessionStatus},
    },
};

/// Outcome of a `next_question` request.
#[derive(Debug, Clone)]
pub enum Advance {
    /// A question was served; the stored index now points past it.
    Question {
        /// The question to put in play.
        question: Question,
        /// 0-based position of the served question.
        index: usize,
        /// Total number of questions in the quiz.
        count: usize,
    },
    /// The quiz ran out of questions and the session finished.
    Finished(GameResult),
}

/// Create a session for a quiz in the lobby state and reserve a join code.
pub async fn create_session(
    state: &SharedState,
    host_id: Uuid,
    quiz_id: Uuid,
) -> Result<GameSession, ServiceError> {
    let store = state.store();
    let Some(quiz) = store.get_quiz(quiz_id).await? else {
        return Err(ServiceError::NotFound(format!("quiz `{quiz_id}` not found")));
    };

    let mut session = GameSession::new(host_id, quiz, now_millis());
    session.join_code = join_code::allocate(&store, session.id).await?;
    store.save_session(session.clone()).await?;

    info!(session_id = %session.id, join_code = %session.join_code, "session created");
    Ok(session)
}

/// Start a waiting session; host-only, requires a non-empty roster.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<GameSession, ServiceError> {
    let store = state.store();
    let mut session = load_session(state, session_id).await?;
    ensure_host(&session, host_id)?;

    let next = session.status.transition(SessionEvent::Start)?;
    let roster = store.get_session_players(session_id).await?;
    if roster.is_empty() {
        return Err(ServiceError::NoPlayers);
    }

    let started_at = now_millis();
    store
        .update_session(
            session_id,
            SessionPatch {
                status: Some(next),
                started_at: Some(started_at),
                ..Default::default()
            },
        )
        .await?;

    session.status = next;
    session.started_at = Some(started_at);
    info!(session_id = %session_id, players = roster.len(), "session started");
    Ok(session)
}

/// Serve the next question of an active session, or finish it when the quiz
/// is exhausted; host-only.
pub async fn advance_question(
    state: &SharedState,
    session_id: Uuid,
    host_id: Uuid,
) -> Result<Advance, ServiceError> {
    let store = state.store();
    let session = load_session(state, session_id).await?;
    ensure_host(&session, host_id)?;

    if session.status != SessionStatus::Active {
        return Err(ServiceError::InvalidState(
            "questions can only be advanced while the session is active".into(),
        ));
    }

    let index = session.current_question_index;
    match session.quiz.questions.get(index) {
        Some(question) => {
            store
                .update_session(
                    session_id,
                    SessionPatch {
                        current_question_index: Some(index + 1),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(Advance::Question {
                question: question.clone(),
                index,
                count: session.question_count(),
            })
        }
        None => {
            let result = finish_session(state, session_id).await?;
            Ok(Advance::Finished(result))
        }
    }
}

/// Finish a session and build its result snapshot, idempotently.
///
/// The natural end-of-quiz path and the explicit `end_game` path can race;
/// the status compare-and-set decides which caller builds the snapshot. A
/// loser reads the winner's snapshot, and a `finished` session whose snapshot
/// is missing (the earlier finalizer failed between the two writes) gets it
/// rebuilt here.
pub async fn finish_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<GameResult, ServiceError> {
    let store = state.store();
    let session = load_session(state, session_id).await?;

    match session.status {
        SessionStatus::Waiting => Err(crate::state::game::InvalidTransition {
            from: session.status,
            event: SessionEvent::Finish,
        }
        .into()),
        SessionStatus::Finished => match store.get_game_result(session_id).await? {
            Some(result) => Ok(result),
            None => {
                warn!(session_id = %session_id, "finished session had no result snapshot; rebuilding");
                finalize(state, session).await
            }
        },
        SessionStatus::Active => {
            let won = store
                .transition_session(session_id, SessionStatus::Active, SessionStatus::Finished)
                .await?;
            if !won {
                if let Some(result) = store.get_game_result(session_id).await? {
                    return Ok(result);
                }
                warn!(session_id = %session_id, "lost finish race but found no snapshot; rebuilding");
            }
            finalize(state, session).await
        }
    }
}

/// Write the finish timestamp, build the snapshot, and release the join code.
async fn finalize(state: &SharedState, session: GameSession) -> Result<GameResult, ServiceError> {
    let store = state.store();
    let completed_at = session.finished_at.unwrap_or_else(now_millis);

    store
        .update_session(
            session.id,
            SessionPatch {
                finished_at: Some(completed_at),
                ..Default::default()
            },
        )
        .await?;

    let players = store.get_session_players(session.id).await?;
    let result = leaderboard::build_game_result(&session, &players, completed_at);
    store.save_game_result(result.clone()).await?;
    store.release_join_code(&session.join_code).await?;

    info!(
        session_id = %session.id,
        players = result.player_count,
        average = result.average_score,
        "session finished"
    );
    Ok(result)
}

/// Load a session or fail with `NotFound`.
pub async fn load_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<GameSession, ServiceError> {
    state
        .store()
        .get_session(session_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}

/// Verify the caller is the session's recorded host.
pub fn ensure_host(session: &GameSession, host_id: Uuid) -> Result<(), ServiceError> {
    if session.host_id != host_id {
        return Err(ServiceError::Unauthorized(
            "host id does not match the session host".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dao::memory::MemoryStore;
    use crate::services::roster_service;
    use crate::state::AppState;
    use crate::state::game::{Player, Question, Quiz};
    use std::sync::Arc;

    fn quiz(question_count: usize) -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            title: "Flags of the world".into(),
            questions: (0..question_count)
                .map(|i| Question {
                    id: Uuid::new_v4(),
                    prompt: format!("Flag {i}?"),
                    choices: vec!["red".into(), "blue".into(), "green".into()],
                    correct_answer: 1,
                    time_limit_ms: 15_000,
                    base_points: 100,
                })
                .collect(),
        }
    }

    async fn state_with_quiz(question_count: usize) -> (SharedState, Uuid) {
        let store = Arc::new(MemoryStore::new(None));
        let state = AppState::new(AppConfig::default(), store);
        let quiz = quiz(question_count);
        let quiz_id = quiz.id;
        state.store().put_quiz(quiz).await.unwrap();
        (state, quiz_id)
    }

    async fn admit(state: &SharedState, session: &GameSession, name: &str) -> Player {
        roster_service::join_session(state, &session.join_code, name)
            .await
            .unwrap()
            .player
    }

    #[tokio::test]
    async fn create_rejects_unknown_quiz() {
        let (state, _) = state_with_quiz(1).await;
        let err = create_session(&state, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_reserves_a_resolvable_code() {
        let (state, quiz_id) = state_with_quiz(1).await;
        let session = create_session(&state, Uuid::new_v4(), quiz_id).await.unwrap();
        assert_eq!(session.join_code.len(), 6);

        let resolved = join_code::resolve(&state.store(), &session.join_code)
            .await
            .unwrap();
        assert_eq!(resolved, session.id);
    }

    #[tokio::test]
    async fn start_requires_players_and_the_host() {
        let (state, quiz_id) = state_with_quiz(1).await;
        let host_id = Uuid::new_v4();
        let session = create_session(&state, host_id, quiz_id).await.unwrap();

        let err = start_session(&state, session.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = start_session(&state, session.id, host_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoPlayers));

        admit(&state, &session, "Ann").await;
        let started = start_session(&state, session.id, host_id).await.unwrap();
        assert_eq!(started.status, SessionStatus::Active);
        assert!(started.started_at.is_some());

        let err = start_session(&state, session.id, host_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn advance_walks_questions_then_finishes() {
        let (state, quiz_id) = state_with_quiz(2).await;
        let host_id = Uuid::new_v4();
        let session = create_session(&state, host_id, quiz_id).await.unwrap();
        admit(&state, &session, "Ann").await;
        start_session(&state, session.id, host_id).await.unwrap();

        let mut served_indexes = Vec::new();
        for _ in 0..2 {
            match advance_question(&state, session.id, host_id).await.unwrap() {
                Advance::Question { index, count, .. } => {
                    served_indexes.push(index);
                    assert_eq!(count, 2);
                }
                Advance::Finished(_) => panic!("finished too early"),
            }
        }
        assert_eq!(served_indexes, vec![0, 1]);

        match advance_question(&state, session.id, host_id).await.unwrap() {
            Advance::Finished(result) => {
                assert_eq!(result.question_count, 2);
                assert_eq!(result.player_count, 1);
            }
            Advance::Question { .. } => panic!("expected the quiz to be exhausted"),
        }

        let reloaded = load_session(&state, session.id).await.unwrap();
        assert_eq!(reloaded.status, SessionStatus::Finished);
        // The index stops at the question count and never runs past it.
        assert_eq!(reloaded.current_question_index, 2);
    }

    #[tokio::test]
    async fn advance_requires_an_active_session() {
        let (state, quiz_id) = state_with_quiz(1).await;
        let host_id = Uuid::new_v4();
        let session = create_session(&state, host_id, quiz_id).await.unwrap();

        let err = advance_question(&state, session.id, host_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn finish_is_idempotent_and_releases_the_code() {
        let (state, quiz_id) = state_with_quiz(1).await;
        let host_id = Uuid::new_v4();
        let session = create_session(&state, host_id, quiz_id).await.unwrap();
        admit(&state, &session, "Ann").await;
        start_session(&state, session.id, host_id).await.unwrap();

        let first = finish_session(&state, session.id).await.unwrap();
        let second = finish_session(&state, session.id).await.unwrap();
        assert_eq!(first, second);

        let err = join_code::resolve(&state.store(), &session.join_code)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJoinCode(_)));
    }

    #[tokio::test]
    async fn finish_from_the_lobby_is_invalid() {
        let (state, quiz_id) = state_with_quiz(1).await;
        let session = create_session(&state, Uuid::new_v4(), quiz_id).await.unwrap();
        let err = finish_session(&state, session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
