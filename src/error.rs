use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{dao::storage::StorageError, state::game::InvalidTransition};

/// Errors that can occur in service layer operations.
///
/// Every variant maps to a stable protocol code via [`ServiceError::code`];
/// handlers recover all of them into a single-recipient `error` message and
/// never let one take down a connection or the process.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Quiz, session, player, or question absent from the store.
    #[error("not found: {0}")]
    NotFound(String),
    /// Non-host attempting a host-only action, or a host id mismatch.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Action attempted in the wrong session status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The player already has an answer recorded for this question.
    #[error("question `{question_id}` was already answered")]
    DuplicateAnswer {
        /// The question the duplicate submission targeted.
        question_id: Uuid,
    },
    /// Selected choice index is outside the question's choice list.
    #[error("choice {selected} is out of range (question has {available} choices)")]
    InvalidChoice {
        /// The submitted choice index.
        selected: usize,
        /// Number of choices the question offers.
        available: usize,
    },
    /// Join code does not map to any session.
    #[error("invalid join code `{0}`")]
    InvalidJoinCode(String),
    /// Join attempted after the session left the lobby.
    #[error("game has already started")]
    GameAlreadyStarted,
    /// Start attempted with an empty roster.
    #[error("cannot start a session with no players")]
    NoPlayers,
    /// Join-code generation exhausted its retry attempts.
    #[error("could not allocate a unique join code")]
    CodeAllocationFailed,
    /// Inbound message carried an unrecognized type tag.
    #[error("unknown message type")]
    UnknownMessageType,
    /// Client payload failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Store unreachable or a storage operation failed.
    #[error("persistence failure")]
    Persistence(#[from] StorageError),
}

impl ServiceError {
    /// Stable machine-readable code carried by outbound error messages.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::DuplicateAnswer { .. } => "DUPLICATE_ANSWER",
            ServiceError::InvalidChoice { .. } => "INVALID_CHOICE",
            ServiceError::InvalidJoinCode(_) => "INVALID_JOIN_CODE",
            ServiceError::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            ServiceError::NoPlayers => "NO_PLAYERS",
            ServiceError::CodeAllocationFailed => "CODE_ALLOCATION_FAILED",
            ServiceError::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses on the REST
/// bootstrap surface.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or storage failure.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Persistence(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::InvalidState(_)
            | ServiceError::DuplicateAnswer { .. }
            | ServiceError::GameAlreadyStarted
            | ServiceError::NoPlayers
            | ServiceError::CodeAllocationFailed => AppError::Conflict(err.to_string()),
            ServiceError::InvalidChoice { .. }
            | ServiceError::InvalidJoinCode(_)
            | ServiceError::UnknownMessageType
            | ServiceError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
