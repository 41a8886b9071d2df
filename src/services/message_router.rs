use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        game::{GameResultSummary, PlayerSummary, QuestionPublic},
        ws::{
            AnswerAckPayload, AnswerReceivedPayload, AnswerRevealedPayload, AnswerSubmission,
            ClientEnvelope, ClientMessage, ErrorPayload, GameEndedPayload, GameStartedPayload,
            HostAction, LeaderboardPayload, PlayerJoinRequest, PlayerJoinedPayload,
            QuestionStartedPayload, ServerEnvelope, ServerMessage,
        },
    },
    error::ServiceError,
    services::{
        leaderboard, roster_service, scoring_service,
        session_service::{self, Advance},
    },
    state::{
        SharedState,
        connections::{ConnectionBinding, ConnectionHandle, ConnectionId, Role},
        game::SessionStatus,
    },
};

/// Dispatch one inbound envelope to its handler.
///
/// Every failure is recovered here into an `error` message to the sender;
/// nothing propagates to the connection loop.
pub async fn dispatch(state: &SharedState, connection: &ConnectionHandle, envelope: ClientEnvelope) {
    let result = match &envelope.message {
        ClientMessage::HostJoin(action) => {
            handle_host_join(state, connection, &envelope, action).await
        }
        ClientMessage::StartGame(action) => {
            handle_start_game(state, connection, &envelope, action).await
        }
        ClientMessage::NextQuestion(action) => {
            handle_next_question(state, connection, &envelope, action).await
        }
        ClientMessage::RevealAnswer(action) => {
            handle_reveal_answer(state, connection, &envelope, action).await
        }
        ClientMessage::EndGame(action) => handle_end_game(state, connection, &envelope, action).await,
        ClientMessage::PlayerJoin(request) => handle_player_join(state, connection, request).await,
        ClientMessage::SubmitAnswer(submission) => {
            handle_submit_answer(state, connection, &envelope, submission).await
        }
        ClientMessage::Unknown => Err(ServiceError::UnknownMessageType),
    };

    if let Err(err) = result {
        warn!(
            connection_id = %connection.id,
            code = err.code(),
            error = %err,
            "message handling failed"
        );
        send_error(state, connection.id, &err);
    }
}

/// Reply to the offending connection only.
fn send_error(state: &SharedState, connection_id: ConnectionId, err: &ServiceError) {
    let envelope = ServerEnvelope::new(None, ServerMessage::Error(ErrorPayload::from(err)));
    state.connections().send_to(connection_id, &envelope);
}

/// Session the connection speaks for: its binding, or the envelope's
/// `sessionId` for messages sent before any join.
fn resolve_session_id(
    state: &SharedState,
    connection_id: ConnectionId,
    envelope: &ClientEnvelope,
) -> Result<Uuid, ServiceError> {
    state
        .connections()
        .binding(connection_id)
        .map(|binding| binding.session_id)
        .or(envelope.session_id)
        .ok_or_else(|| {
            ServiceError::InvalidState("connection has not joined a session".into())
        })
}

async fn handle_host_join(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    action: &HostAction,
) -> Result<(), ServiceError> {
    let Some(session_id) = envelope.session_id else {
        return Err(ServiceError::InvalidInput(
            "host_join requires a sessionId".into(),
        ));
    };

    let session = session_service::load_session(state, session_id).await?;
    session_service::ensure_host(&session, action.host_id)?;

    state.connections().bind(
        connection.id,
        ConnectionBinding {
            session_id,
            player_id: None,
            role: Role::Host,
        },
    );
    state
        .store()
        .set_host_socket(session_id, connection.id)
        .await?;

    // Prime the host screen with the current standings.
    let entries = leaderboard::current_leaderboard(state, session_id).await?;
    let reply = ServerEnvelope::new(
        session_id,
        ServerMessage::LeaderboardUpdate(LeaderboardPayload { entries }),
    );
    state.connections().send_to(connection.id, &reply);
    Ok(())
}

async fn handle_player_join(
    state: &SharedState,
    connection: &ConnectionHandle,
    request: &PlayerJoinRequest,
) -> Result<(), ServiceError> {
    let outcome = roster_service::join_session(state, &request.join_code, &request.name).await?;
    let session_id = outcome.session.id;

    state.connections().bind(
        connection.id,
        ConnectionBinding {
            session_id,
            player_id: Some(outcome.player.id),
            role: Role::Player,
        },
    );
    state
        .store()
        .set_player_socket(session_id, outcome.player.id, connection.id)
        .await?;

    let payload = PlayerJoinedPayload {
        player: PlayerSummary::from(&outcome.player),
        quiz_title: outcome.session.quiz.title.clone(),
        player_count: outcome.player_count,
        name_changed: outcome.name_changed,
    };
    let broadcast = ServerEnvelope::new(session_id, ServerMessage::PlayerJoined(payload));
    state.connections().broadcast(session_id, &broadcast, None);
    Ok(())
}

async fn handle_start_game(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    action: &HostAction,
) -> Result<(), ServiceError> {
    let session_id = resolve_session_id(state, connection.id, envelope)?;
    let session = session_service::start_session(state, session_id, action.host_id).await?;

    let payload = GameStartedPayload {
        question_count: session.question_count(),
        started_at: session.started_at.unwrap_or_default(),
    };
    let broadcast = ServerEnvelope::new(session_id, ServerMessage::GameStarted(payload));
    state.connections().broadcast(session_id, &broadcast, None);
    Ok(())
}

async fn handle_next_question(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    action: &HostAction,
) -> Result<(), ServiceError> {
    let session_id = resolve_session_id(state, connection.id, envelope)?;

    match session_service::advance_question(state, session_id, action.host_id).await? {
        Advance::Question {
            question,
            index,
            count,
        } => {
            let payload = QuestionStartedPayload {
                question_index: index,
                question_count: count,
                question: QuestionPublic::from(&question),
            };
            let broadcast = ServerEnvelope::new(session_id, ServerMessage::QuestionStarted(payload));
            state.connections().broadcast(session_id, &broadcast, None);
        }
        Advance::Finished(result) => {
            let payload = GameEndedPayload {
                result: GameResultSummary::from(result),
            };
            let broadcast = ServerEnvelope::new(session_id, ServerMessage::GameEnded(payload));
            state.connections().broadcast(session_id, &broadcast, None);
        }
    }
    Ok(())
}

async fn handle_reveal_answer(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    action: &HostAction,
) -> Result<(), ServiceError> {
    let session_id = resolve_session_id(state, connection.id, envelope)?;
    let session = session_service::load_session(state, session_id).await?;
    session_service::ensure_host(&session, action.host_id)?;

    if session.status != SessionStatus::Active {
        return Err(ServiceError::InvalidState(
            "answers can only be revealed while the session is active".into(),
        ));
    }
    let Some(question) = session.question_in_play() else {
        return Err(ServiceError::InvalidState(
            "no question has been served yet".into(),
        ));
    };

    let players = state.store().get_session_players(session_id).await?;
    let mut correct_count = 0;
    let mut total_answers = 0;
    for answer in players.iter().flat_map(|p| p.answers.iter()) {
        if answer.question_id != question.id {
            continue;
        }
        total_answers += 1;
        if answer.correct {
            correct_count += 1;
        }
    }

    let reveal = ServerEnvelope::new(
        session_id,
        ServerMessage::AnswerRevealed(AnswerRevealedPayload {
            question_id: question.id,
            correct_answer: question.correct_answer,
            correct_count,
            total_answers,
        }),
    );
    state.connections().broadcast(session_id, &reveal, None);

    let standings = ServerEnvelope::new(
        session_id,
        ServerMessage::LeaderboardUpdate(LeaderboardPayload {
            entries: leaderboard::rank_players(&players),
        }),
    );
    state.connections().broadcast(session_id, &standings, None);
    Ok(())
}

async fn handle_end_game(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    action: &HostAction,
) -> Result<(), ServiceError> {
    let session_id = resolve_session_id(state, connection.id, envelope)?;
    let session = session_service::load_session(state, session_id).await?;
    session_service::ensure_host(&session, action.host_id)?;

    let result = session_service::finish_session(state, session_id).await?;
    let payload = GameEndedPayload {
        result: GameResultSummary::from(result),
    };
    let broadcast = ServerEnvelope::new(session_id, ServerMessage::GameEnded(payload));
    state.connections().broadcast(session_id, &broadcast, None);
    Ok(())
}

async fn handle_submit_answer(
    state: &SharedState,
    connection: &ConnectionHandle,
    envelope: &ClientEnvelope,
    submission: &AnswerSubmission,
) -> Result<(), ServiceError> {
    let binding = state.connections().binding(connection.id);
    let session_id = binding
        .map(|b| b.session_id)
        .or(envelope.session_id)
        .ok_or_else(|| {
            ServiceError::InvalidState("connection has not joined a session".into())
        })?;
    let player_id = binding
        .and_then(|b| b.player_id)
        .or(envelope.player_id)
        .ok_or_else(|| {
            ServiceError::InvalidState("connection is not bound to a player".into())
        })?;

    let outcome = scoring_service::submit_answer(state, session_id, player_id, submission).await?;

    let ack = ServerEnvelope::new(
        session_id,
        ServerMessage::AnswerAck(AnswerAckPayload {
            question_id: outcome.question_id,
            correct: outcome.correct,
            points: outcome.points,
            rank: outcome.rank,
            total_correct: outcome.total_correct,
        }),
    );
    state.connections().send_to(connection.id, &ack);

    let progress = ServerEnvelope::new(
        session_id,
        ServerMessage::AnswerReceived(AnswerReceivedPayload {
            player_id: outcome.player_id,
            player_name: outcome.player_name.clone(),
            question_id: outcome.question_id,
            answered_count: outcome.answered_count,
            player_count: outcome.player_count,
        }),
    );
    state.connections().send_to_host(session_id, &progress);
    Ok(())
}
