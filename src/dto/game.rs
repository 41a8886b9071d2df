use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_millis,
    state::game::{
        GameResult, GameSession, LeaderboardEntry, Player, Question, QuestionStat, Quiz,
        SessionStatus,
    },
};

/// Payload used to bootstrap a brand-new session over REST.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Quiz the session will play.
    pub quiz_id: Uuid,
    /// Caller-supplied host identity; the session's only privileged role.
    pub host_id: Uuid,
}

/// Compact quiz projection used in catalogs and session summaries.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizBrief {
    pub id: Uuid,
    pub title: String,
    pub question_count: usize,
}

impl From<&Quiz> for QuizBrief {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            question_count: quiz.questions.len(),
        }
    }
}

/// Public projection of a player exposed to REST and WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
    pub connected: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            score: player.score,
            connected: player.connected,
        }
    }
}

/// Question projection broadcast when a question opens.
///
/// The correct answer index stays server-side until the reveal.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPublic {
    pub id: Uuid,
    pub prompt: String,
    pub choices: Vec<String>,
    pub time_limit_ms: u64,
    pub base_points: u32,
}

impl From<&Question> for QuestionPublic {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            choices: question.choices.clone(),
            time_limit_ms: question.time_limit_ms,
            base_points: question.base_points,
        }
    }
}

/// Summary returned once a session has been created or looked up.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub join_code: String,
    pub host_id: Uuid,
    pub status: SessionStatus,
    pub quiz: QuizBrief,
    pub current_question_index: usize,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub players: Vec<PlayerSummary>,
}

impl From<(GameSession, Vec<Player>)> for SessionSummary {
    fn from((session, players): (GameSession, Vec<Player>)) -> Self {
        Self {
            id: session.id,
            join_code: session.join_code.clone(),
            host_id: session.host_id,
            status: session.status,
            quiz: QuizBrief::from(&session.quiz),
            current_question_index: session.current_question_index,
            created_at: format_millis(session.created_at),
            started_at: session.started_at.map(format_millis),
            finished_at: session.finished_at.map(format_millis),
            players: players.iter().map(PlayerSummary::from).collect(),
        }
    }
}

/// Post-game snapshot projection served over REST and in `game_ended`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameResultSummary {
    pub session_id: Uuid,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub host_id: Uuid,
    pub completed_at: String,
    pub player_count: usize,
    pub question_count: usize,
    pub average_score: u32,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub question_stats: Vec<QuestionStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub visible: bool,
}

impl From<GameResult> for GameResultSummary {
    fn from(result: GameResult) -> Self {
        Self {
            session_id: result.session_id,
            quiz_id: result.quiz_id,
            quiz_title: result.quiz_title,
            host_id: result.host_id,
            completed_at: format_millis(result.completed_at),
            player_count: result.player_count,
            question_count: result.question_count,
            average_score: result.average_score,
            leaderboard: result.leaderboard,
            question_stats: result.question_stats,
            duration_ms: result.duration_ms,
            visible: result.visible,
        }
    }
}
