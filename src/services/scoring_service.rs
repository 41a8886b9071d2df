use uuid::Uuid;

use crate::{
    dao::store::PlayerPatch,
    dto::{now_millis, ws::AnswerSubmission},
    error::ServiceError,
    services::session_service,
    state::{
        SharedState,
        game::{PlayerAnswer, SessionStatus},
    },
};

/// Share of the base points eaten by falling to the back of the rank order.
const LATE_PENALTY_SPAN: f64 = 0.5;
/// Minimum-credit guarantee for any correct answer.
const MIN_CREDIT: f64 = 0.3;

/// Result of an accepted submission, for client feedback and host progress.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// The answering player.
    pub player_id: Uuid,
    /// Display name of the answering player.
    pub player_name: String,
    /// The question that was answered.
    pub question_id: Uuid,
    /// Whether the selected choice was the correct one.
    pub correct: bool,
    /// Points credited to the player.
    pub points: u32,
    /// 1-based position among correct answers; `None` for wrong answers.
    pub rank: Option<usize>,
    /// Size of the correct-answer set at scoring time.
    pub total_correct: Option<usize>,
    /// Players that have answered this question, including this one.
    pub answered_count: usize,
    /// Roster size at scoring time.
    pub player_count: usize,
}

/// Validate and score a submission, then persist the answer record.
///
/// Rank is derived from the roster snapshot read here; two near-simultaneous
/// submissions may each rank against a snapshot missing the other. There is
/// no cross-request lock, so the ordering is best-effort.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    player_id: Uuid,
    submission: &AnswerSubmission,
) -> Result<AnswerOutcome, ServiceError> {
    let store = state.store();
    let session = session_service::load_session(state, session_id).await?;

    if session.status != SessionStatus::Active {
        return Err(ServiceError::InvalidState(
            "answers are only accepted while the session is active".into(),
        ));
    }

    let Some(question) = session.question_by_id(submission.question_id) else {
        return Err(ServiceError::NotFound(format!(
            "question `{}` not found in session",
            submission.question_id
        )));
    };

    let roster = store.get_session_players(session_id).await?;
    let Some(player) = roster.iter().find(|p| p.id == player_id) else {
        return Err(ServiceError::NotFound(format!(
            "player `{player_id}` not found in session"
        )));
    };

    if player.has_answered(question.id) {
        return Err(ServiceError::DuplicateAnswer {
            question_id: question.id,
        });
    }

    if submission.selected_choice >= question.choices.len() {
        return Err(ServiceError::InvalidChoice {
            selected: submission.selected_choice,
            available: question.choices.len(),
        });
    }

    let correct = submission.selected_choice == question.correct_answer;
    let submitted_at = now_millis();

    let (points, rank, total_correct) = if correct {
        let mut earlier: Vec<u64> = roster
            .iter()
            .flat_map(|p| p.answers.iter())
            .filter(|a| a.question_id == question.id && a.correct)
            .map(|a| a.submitted_at)
            .collect();
        earlier.sort_unstable();

        // Recorded answers with the same timestamp keep their precedence.
        let rank = earlier.iter().take_while(|&&at| at <= submitted_at).count() + 1;
        let total = earlier.len() + 1;
        (
            score_for_rank(question.base_points, rank, total),
            Some(rank),
            Some(total),
        )
    } else {
        (0, None, None)
    };

    let answer = PlayerAnswer {
        question_id: question.id,
        selected_choice: submission.selected_choice,
        time_to_answer_ms: submission.time_to_answer_ms,
        correct,
        points,
        submitted_at,
    };

    let mut answers = player.answers.clone();
    answers.push(answer);
    let score = player.score + points;
    store
        .update_player(
            session_id,
            player_id,
            PlayerPatch {
                score: Some(score),
                answers: Some(answers),
                connected: None,
            },
        )
        .await?;

    let answered_count = roster
        .iter()
        .filter(|p| p.id != player_id && p.has_answered(question.id))
        .count()
        + 1;

    Ok(AnswerOutcome {
        player_id,
        player_name: player.name.clone(),
        question_id: question.id,
        correct,
        points,
        rank,
        total_correct,
        answered_count,
        player_count: roster.len(),
    })
}

/// Points for a correct answer at `rank` among `total_correct` answers.
///
/// A lone correct answer earns full credit. Otherwise credit decays linearly
/// with rank down to half the base, and never below the 30% floor.
fn score_for_rank(base_points: u32, rank: usize, total_correct: usize) -> u32 {
    if total_correct <= 1 {
        return base_points;
    }

    let base = f64::from(base_points);
    let percentage = 1.0 - ((rank - 1) as f64 / total_correct as f64) * LATE_PENALTY_SPAN;
    let floor = (base * MIN_CREDIT).round();
    (base * percentage).round().max(floor) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dao::memory::MemoryStore;
    use crate::services::{roster_service, session_service};
    use crate::state::AppState;
    use crate::state::game::{GameSession, Player, Question, Quiz};
    use std::sync::Arc;

    #[test]
    fn lone_correct_answer_gets_full_credit() {
        assert_eq!(score_for_rank(100, 1, 1), 100);
    }

    #[test]
    fn rank_credit_decays_linearly() {
        assert_eq!(score_for_rank(100, 1, 4), 100);
        assert_eq!(score_for_rank(100, 2, 4), 88);
        assert_eq!(score_for_rank(100, 3, 4), 75);
        assert_eq!(score_for_rank(100, 4, 4), 63);
        assert_eq!(score_for_rank(100, 2, 2), 75);
    }

    #[test]
    fn minimum_credit_floor_holds_for_any_field_size() {
        for total in 2..500 {
            let worst = score_for_rank(100, total, total);
            assert!(worst >= 30, "rank {total}/{total} scored {worst}");
            // The linear decay itself never drops below half the base.
            assert!(worst >= 50);
        }
    }

    fn question(base_points: u32) -> Question {
        Question {
            id: Uuid::new_v4(),
            prompt: "Which year did the Berlin Wall fall?".into(),
            choices: vec!["1987".into(), "1989".into(), "1991".into()],
            correct_answer: 1,
            time_limit_ms: 20_000,
            base_points,
        }
    }

    async fn active_session(player_names: &[&str]) -> (SharedState, GameSession, Vec<Player>) {
        let store = Arc::new(MemoryStore::new(None));
        let state = AppState::new(AppConfig::default(), store);
        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: "History".into(),
            questions: vec![question(100)],
        };
        let quiz_id = quiz.id;
        state.store().put_quiz(quiz).await.unwrap();

        let host_id = Uuid::new_v4();
        let session = session_service::create_session(&state, host_id, quiz_id)
            .await
            .unwrap();
        let mut players = Vec::new();
        for name in player_names {
            players.push(
                roster_service::join_session(&state, &session.join_code, name)
                    .await
                    .unwrap()
                    .player,
            );
        }
        let session = session_service::start_session(&state, session.id, host_id)
            .await
            .unwrap();
        (state, session, players)
    }

    fn submission(question_id: Uuid, selected_choice: usize) -> AnswerSubmission {
        AnswerSubmission {
            question_id,
            selected_choice,
            time_to_answer_ms: 1_200,
        }
    }

    #[tokio::test]
    async fn first_and_second_correct_answers_rank_in_order() {
        let (state, session, players) = active_session(&["Ann", "Bea"]).await;
        let question_id = session.quiz.questions[0].id;

        let first = submit_answer(&state, session.id, players[0].id, &submission(question_id, 1))
            .await
            .unwrap();
        assert!(first.correct);
        assert_eq!(first.points, 100);
        assert_eq!(first.rank, Some(1));
        assert_eq!(first.total_correct, Some(1));
        assert_eq!(first.answered_count, 1);

        let second = submit_answer(&state, session.id, players[1].id, &submission(question_id, 1))
            .await
            .unwrap();
        assert_eq!(second.points, 75);
        assert_eq!(second.rank, Some(2));
        assert_eq!(second.total_correct, Some(2));
        assert_eq!(second.answered_count, 2);
    }

    #[tokio::test]
    async fn wrong_answer_scores_zero_but_is_recorded() {
        let (state, session, players) = active_session(&["Ann"]).await;
        let question_id = session.quiz.questions[0].id;

        let outcome = submit_answer(&state, session.id, players[0].id, &submission(question_id, 0))
            .await
            .unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.points, 0);
        assert_eq!(outcome.rank, None);

        let roster = state
            .store()
            .get_session_players(session.id)
            .await
            .unwrap();
        assert_eq!(roster[0].score, 0);
        assert_eq!(roster[0].answers.len(), 1);
        assert!(!roster[0].answers[0].correct);
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected_and_score_unchanged() {
        let (state, session, players) = active_session(&["Ann"]).await;
        let question_id = session.quiz.questions[0].id;

        submit_answer(&state, session.id, players[0].id, &submission(question_id, 1))
            .await
            .unwrap();
        let err = submit_answer(&state, session.id, players[0].id, &submission(question_id, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateAnswer { .. }));

        let roster = state
            .store()
            .get_session_players(session.id)
            .await
            .unwrap();
        assert_eq!(roster[0].score, 100);
        assert_eq!(roster[0].answers.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_choice_is_rejected() {
        let (state, session, players) = active_session(&["Ann"]).await;
        let question_id = session.quiz.questions[0].id;

        let err = submit_answer(&state, session.id, players[0].id, &submission(question_id, 3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidChoice {
                selected: 3,
                available: 3
            }
        ));
    }

    #[tokio::test]
    async fn unknown_question_and_player_are_not_found() {
        let (state, session, players) = active_session(&["Ann"]).await;

        let err = submit_answer(
            &state,
            session.id,
            players[0].id,
            &submission(Uuid::new_v4(), 1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let question_id = session.quiz.questions[0].id;
        let err = submit_answer(&state, session.id, Uuid::new_v4(), &submission(question_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn submissions_require_an_active_session() {
        let store = Arc::new(MemoryStore::new(None));
        let state = AppState::new(AppConfig::default(), store);
        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: "History".into(),
            questions: vec![question(100)],
        };
        let quiz_id = quiz.id;
        let question_id = quiz.questions[0].id;
        state.store().put_quiz(quiz).await.unwrap();

        let session = session_service::create_session(&state, Uuid::new_v4(), quiz_id)
            .await
            .unwrap();
        let player = roster_service::join_session(&state, &session.join_code, "Ann")
            .await
            .unwrap()
            .player;

        let err = submit_answer(&state, session.id, player.id, &submission(question_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    // Ranking reads whatever roster snapshot the store returns at submission
    // time; answers recorded with an identical timestamp keep precedence over
    // the incoming one. Interleaved submissions may therefore tie on rank,
    // which the design accepts instead of serializing submissions.
    #[tokio::test]
    async fn recorded_answers_with_equal_timestamps_keep_precedence() {
        let (state, session, players) = active_session(&["Ann", "Bea"]).await;
        let question_id = session.quiz.questions[0].id;

        let first = submit_answer(&state, session.id, players[0].id, &submission(question_id, 1))
            .await
            .unwrap();
        // Same-millisecond follow-up still ranks strictly after the record.
        let second = submit_answer(&state, session.id, players[1].id, &submission(question_id, 1))
            .await
            .unwrap();
        assert_eq!(first.rank, Some(1));
        assert_eq!(second.rank, Some(2));
    }
}
