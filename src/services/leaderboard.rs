use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::{
        SharedState,
        game::{GameResult, GameSession, LeaderboardEntry, Player, QuestionStat},
    },
};

/// Rank players by score descending with dense 1-based positions.
///
/// The sort is stable, so equal scores keep the order the store returned
/// (join order for live rosters).
pub fn rank_players(players: &[Player]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&Player> = players.iter().collect();
    ordered.sort_by(|a, b| b.score.cmp(&a.score));

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, player)| LeaderboardEntry {
            player_id: player.id,
            player_name: player.name.clone(),
            score: player.score,
            rank: position + 1,
        })
        .collect()
}

/// Load a session's roster and rank it for a live standings broadcast.
pub async fn current_leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let players = state.store().get_session_players(session_id).await?;
    Ok(rank_players(&players))
}

/// Build the immutable post-game snapshot for a finishing session.
pub fn build_game_result(
    session: &GameSession,
    players: &[Player],
    completed_at: u64,
) -> GameResult {
    let leaderboard = rank_players(players);

    let average_score = if players.is_empty() {
        0
    } else {
        let total: u64 = players.iter().map(|p| u64::from(p.score)).sum();
        (total as f64 / players.len() as f64).round() as u32
    };

    let question_stats = session
        .quiz
        .questions
        .iter()
        .map(|question| {
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
            QuestionStat {
                question_id: question.id,
                correct_count,
                total_answers,
            }
        })
        .collect();

    GameResult {
        session_id: session.id,
        quiz_id: session.quiz_id,
        quiz_title: session.quiz.title.clone(),
        host_id: session.host_id,
        completed_at,
        player_count: players.len(),
        question_count: session.question_count(),
        average_score,
        leaderboard,
        question_stats,
        duration_ms: session.started_at.map(|started| completed_at.saturating_sub(started)),
        visible: true,
    }
}
