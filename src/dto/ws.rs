use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        game::{GameResultSummary, PlayerSummary, QuestionPublic},
        now_millis,
    },
    error::ServiceError,
    state::game::LeaderboardEntry,
};

/// Failure to turn a raw WebSocket text frame into a usable envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame was not valid JSON for the envelope shape.
    #[error("malformed message: {0}")]
    Parse(#[from] serde_json::Error),
    /// The payload parsed but failed validation.
    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Envelope wrapping every message a client sends.
///
/// `session_id` and `player_id` are advisory; once a connection is bound the
/// registry's binding is authoritative for routing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    /// Typed payload, tagged by the `type` field.
    #[serde(flatten)]
    pub message: ClientMessage,
    /// Session the client believes it is talking about.
    pub session_id: Option<Uuid>,
    /// Player identity the client claims.
    pub player_id: Option<Uuid>,
    /// Client-side send time (milliseconds since the Unix epoch).
    pub timestamp: Option<u64>,
}

impl ClientEnvelope {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: ClientEnvelope = serde_json::from_str(raw)?;
        envelope.message.validate_payload()?;
        Ok(envelope)
    }
}

/// Messages accepted from connected clients.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Host binds its connection to a session it created.
    HostJoin(HostAction),
    /// Host opens the quiz; no more joins afterwards.
    StartGame(HostAction),
    /// Host serves the next question (or ends the game past the last one).
    NextQuestion(HostAction),
    /// Host reveals the answer of the question in play.
    RevealAnswer(HostAction),
    /// Host ends the game early.
    EndGame(HostAction),
    /// Player enters a lobby via join code.
    PlayerJoin(PlayerJoinRequest),
    /// Player submits an answer for a question.
    SubmitAnswer(AnswerSubmission),
    /// Anything with an unrecognized type tag.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    fn validate_payload(&self) -> Result<(), ValidationErrors> {
        match self {
            ClientMessage::PlayerJoin(request) => request.validate(),
            _ => Ok(()),
        }
    }
}

/// Host-initiated action carrying the caller's claimed host identity.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostAction {
    /// Must match the session's recorded host id.
    pub host_id: Uuid,
}

/// Payload of `player_join`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinRequest {
    /// Join code shown by the host screen.
    #[validate(length(equal = 6))]
    pub join_code: String,
    /// Requested display name; deduplicated server-side.
    #[validate(length(min = 1, max = 24))]
    pub name: String,
}

/// Payload of `submit_answer`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    /// Question being answered.
    pub question_id: Uuid,
    /// Index of the selected choice.
    pub selected_choice: usize,
    /// Client-measured answer latency in milliseconds.
    #[serde(rename = "timeToAnswer")]
    pub time_to_answer_ms: u64,
}

/// Envelope wrapping every message the server emits.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEnvelope {
    /// Typed payload, tagged by the `type` field.
    #[serde(flatten)]
    pub message: ServerMessage,
    /// Session this message concerns, when there is one.
    pub session_id: Option<Uuid>,
    /// Server send time (milliseconds since the Unix epoch).
    pub timestamp: u64,
}

impl ServerEnvelope {
    /// Stamp a message with the current time.
    pub fn new(session_id: impl Into<Option<Uuid>>, message: ServerMessage) -> Self {
        Self {
            message,
            session_id: session_id.into(),
            timestamp: now_millis(),
        }
    }
}

/// Server-originated messages.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A player entered the lobby.
    PlayerJoined(PlayerJoinedPayload),
    /// A player's connection went away.
    PlayerLeft(PlayerLeftPayload),
    /// The host started the quiz.
    GameStarted(GameStartedPayload),
    /// A question opened for answers.
    QuestionStarted(QuestionStartedPayload),
    /// The answer of the question in play was revealed.
    AnswerRevealed(AnswerRevealedPayload),
    /// The session finished; final results attached.
    GameEnded(GameEndedPayload),
    /// Current standings.
    LeaderboardUpdate(LeaderboardPayload),
    /// Submission feedback for the answering player only.
    AnswerAck(AnswerAckPayload),
    /// Progress notification for the host only.
    AnswerReceived(AnswerReceivedPayload),
    /// Recovered failure, sent to the offending connection only.
    Error(ErrorPayload),
    /// Application-level liveness ping.
    Heartbeat,
}

/// Payload of `player_joined`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    /// The admitted player, including its effective (possibly suffixed) name.
    pub player: PlayerSummary,
    /// Title of the quiz the lobby will play.
    pub quiz_title: String,
    /// Roster size after this join.
    pub player_count: usize,
    /// Whether the requested name was taken and a suffix was appended.
    pub name_changed: bool,
}

/// Payload of `player_left`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    pub player_id: Uuid,
    /// Connected players remaining after the departure.
    pub player_count: usize,
}

/// Payload of `game_started`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    pub question_count: usize,
    pub started_at: u64,
}

/// Payload of `question_started`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStartedPayload {
    /// 0-based position of the question within the quiz.
    pub question_index: usize,
    pub question_count: usize,
    pub question: QuestionPublic,
}

/// Payload of `answer_revealed`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRevealedPayload {
    pub question_id: Uuid,
    /// Index of the correct choice.
    pub correct_answer: usize,
    pub correct_count: usize,
    pub total_answers: usize,
}

/// Payload of `game_ended`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameEndedPayload {
    pub result: GameResultSummary,
}

/// Payload of `leaderboard_update`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPayload {
    pub entries: Vec<LeaderboardEntry>,
}

/// Payload of `answer_ack`, the submitter's private feedback.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAckPayload {
    pub question_id: Uuid,
    pub correct: bool,
    pub points: u32,
    /// 1-based position among correct answers; absent for wrong answers.
    pub rank: Option<usize>,
    /// Size of the correct-answer set at scoring time.
    pub total_correct: Option<usize>,
}

/// Payload of `answer_received`, the host's progress feed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReceivedPayload {
    pub player_id: Uuid,
    pub player_name: String,
    pub question_id: Uuid,
    /// Players that have answered this question so far.
    pub answered_count: usize,
    pub player_count: usize,
}

/// Payload of outbound `error` messages.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorPayload {
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Stable machine-readable code.
    pub code: String,
    /// Extra context, typically the underlying cause.
    pub details: Option<String>,
}

impl From<&ServiceError> for ErrorPayload {
    fn from(err: &ServiceError) -> Self {
        let details = match err {
            ServiceError::Persistence(source) => Some(source.to_string()),
            _ => None,
        };
        Self {
            message: err.to_string(),
            code: err.code().to_string(),
            details,
        }
    }
}
