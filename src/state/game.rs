use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Immutable quiz content as authored by the content system.
///
/// The core never edits quizzes; it copies one into a [`GameSession`] at
/// creation time so later edits cannot affect a running session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quiz {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Human readable quiz title.
    pub title: String,
    /// Ordered sequence of questions played front to back.
    pub questions: Vec<Question>,
}

/// A single multiple-choice question inside a [`Quiz`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Prompt text shown to all participants.
    pub prompt: String,
    /// Choice strings; the index of a choice is its id on the wire.
    pub choices: Vec<String>,
    /// Index into `choices` of the correct answer.
    pub correct_answer: usize,
    /// Time window (milliseconds) the presentation layer gives for answers.
    pub time_limit_ms: u64,
    /// Maximum points awarded for a first-ranked correct answer.
    pub base_points: u32,
}

/// Lifecycle status of a [`GameSession`].
///
/// Transitions are monotonic: `Waiting -> Active -> Finished`, never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Lobby is open; players can join via the join code.
    Waiting,
    /// The host has started the quiz; answers are accepted.
    Active,
    /// Terminal state; a game result snapshot exists (or is being built).
    Finished,
}

/// Events that drive the session status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The host starts the quiz from the lobby.
    Start,
    /// The session ends, either naturally or by explicit host action.
    Finish,
}

/// Error returned when an event cannot be applied to the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the session was in when the invalid event arrived.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

impl SessionStatus {
    /// Compute the status an event leads to, validating monotonicity.
    pub fn transition(self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        match (self, event) {
            (SessionStatus::Waiting, SessionEvent::Start) => Ok(SessionStatus::Active),
            (SessionStatus::Active, SessionEvent::Finish) => Ok(SessionStatus::Finished),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Whether this status is terminal.
    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Finished)
    }
}

/// One run of a quiz from creation to finish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSession {
    /// Primary key of the session.
    pub id: Uuid,
    /// Identifier of the quiz this session plays.
    pub quiz_id: Uuid,
    /// The single privileged participant controlling progression.
    pub host_id: Uuid,
    /// Short public token players use to find this session.
    pub join_code: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Index of the next question `advance` will serve; never decreases.
    pub current_question_index: usize,
    /// Creation timestamp (milliseconds since the Unix epoch).
    pub created_at: u64,
    /// Set when the host starts the session.
    pub started_at: Option<u64>,
    /// Set when the session finishes.
    pub finished_at: Option<u64>,
    /// Snapshot of the quiz taken at creation time.
    pub quiz: Quiz,
}

impl GameSession {
    /// Build a fresh session in the lobby state.
    ///
    /// The join code starts empty; the resolver assigns one before the
    /// record is first persisted.
    pub fn new(host_id: Uuid, quiz: Quiz, created_at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id: quiz.id,
            host_id,
            join_code: String::new(),
            status: SessionStatus::Waiting,
            current_question_index: 0,
            created_at,
            started_at: None,
            finished_at: None,
            quiz,
        }
    }

    /// Number of questions in the embedded quiz snapshot.
    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    /// Look up a question of this session by its identifier.
    pub fn question_by_id(&self, question_id: Uuid) -> Option<&Question> {
        self.quiz.questions.iter().find(|q| q.id == question_id)
    }

    /// The question most recently served by `advance`, if any.
    ///
    /// `current_question_index` points at the next question to serve, so the
    /// one in play is the entry just before it.
    pub fn question_in_play(&self) -> Option<&Question> {
        let served = self.current_question_index.checked_sub(1)?;
        self.quiz.questions.get(served)
    }
}

/// A participant admitted into a session's roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    /// Primary key of the player.
    pub id: Uuid,
    /// Session this player belongs to.
    pub session_id: Uuid,
    /// Display name, unique within the session.
    pub name: String,
    /// Cumulative score; always the sum of `answers[..].points`.
    pub score: u32,
    /// One entry per answered question, append-only.
    pub answers: Vec<PlayerAnswer>,
    /// Whether a live connection is currently bound to this player.
    pub connected: bool,
    /// Join timestamp (milliseconds since the Unix epoch).
    pub joined_at: u64,
}

impl Player {
    /// Admit a new player with a zeroed score and empty answer log.
    pub fn new(session_id: Uuid, name: String, joined_at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            name,
            score: 0,
            answers: Vec::new(),
            connected: true,
            joined_at,
        }
    }

    /// Whether this player already answered the given question.
    pub fn has_answered(&self, question_id: Uuid) -> bool {
        self.answers.iter().any(|a| a.question_id == question_id)
    }
}

/// Immutable record of one answer submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerAnswer {
    /// Question this answer targets.
    pub question_id: Uuid,
    /// Index of the selected choice.
    pub selected_choice: usize,
    /// Client-reported time to answer (milliseconds).
    pub time_to_answer_ms: u64,
    /// Whether the selected choice matched the correct one.
    pub correct: bool,
    /// Points awarded for this answer.
    pub points: u32,
    /// Server receive timestamp used for rank ordering.
    pub submitted_at: u64,
}

/// One row of a ranked leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Player this row describes.
    pub player_id: Uuid,
    /// Display name at the time the board was built.
    pub player_name: String,
    /// Score the rank was derived from.
    pub score: u32,
    /// 1-based position; ties keep their encounter order.
    pub rank: usize,
}

/// Per-question correctness statistics inside a [`GameResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStat {
    /// Question the counts refer to.
    pub question_id: Uuid,
    /// How many recorded answers were correct.
    pub correct_count: usize,
    /// How many answers were recorded in total.
    pub total_answers: usize,
}

/// Immutable post-game snapshot, built exactly once when a session finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResult {
    /// Session this result summarizes.
    pub session_id: Uuid,
    /// Quiz that was played.
    pub quiz_id: Uuid,
    /// Quiz title at play time.
    pub quiz_title: String,
    /// Host that ran the session.
    pub host_id: Uuid,
    /// Completion timestamp (milliseconds since the Unix epoch).
    pub completed_at: u64,
    /// Number of participants on the final leaderboard.
    pub player_count: usize,
    /// Number of questions in the quiz snapshot.
    pub question_count: usize,
    /// Mean participant score, rounded half away from zero.
    pub average_score: u32,
    /// Final standings.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Correctness counts for every question of the quiz.
    pub question_stats: Vec<QuestionStat>,
    /// Wall-clock duration from start to finish, when the start was recorded.
    pub duration_ms: Option<u64>,
    /// Whether this result shows up in public listings.
    pub visible: bool,
}
