use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::storage::StorageResult;
use crate::state::game::{GameResult, GameSession, Player, PlayerAnswer, Quiz, SessionStatus};

/// Partial update applied to a persisted session record.
///
/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New lifecycle status.
    pub status: Option<SessionStatus>,
    /// New index of the next question to serve.
    pub current_question_index: Option<usize>,
    /// Start timestamp (milliseconds).
    pub started_at: Option<u64>,
    /// Finish timestamp (milliseconds).
    pub finished_at: Option<u64>,
}

/// Partial update applied to a persisted player record.
#[derive(Debug, Clone, Default)]
pub struct PlayerPatch {
    /// New cumulative score.
    pub score: Option<u32>,
    /// Replacement answer log (read-modify-write, no transactional guard).
    pub answers: Option<Vec<PlayerAnswer>>,
    /// New liveness flag.
    pub connected: Option<bool>,
}

/// Abstraction over the persistence gateway for sessions, players, join
/// codes, socket mappings, and game results.
///
/// Backends report absence as `Ok(None)`/`Ok(false)` rather than erroring;
/// errors mean the store itself misbehaved. Session- and player-scoped
/// records carry a store-level TTL so abandoned sessions are reclaimed.
pub trait QuizStore: Send + Sync {
    /// Fetch immutable quiz content by id.
    fn get_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Quiz>>>;
    /// Insert quiz content into the catalog (config seeding path).
    fn put_quiz(&self, quiz: Quiz) -> BoxFuture<'static, StorageResult<()>>;
    /// List the quiz catalog.
    fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<Quiz>>>;

    /// Persist a freshly created session.
    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session by id.
    fn get_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>>;
    /// Apply a partial update to a session.
    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Compare-and-set the session status.
    ///
    /// Returns `true` when the stored status was `from` and is now `to`,
    /// `false` when another writer got there first (or the session is gone).
    fn transition_session(
        &self,
        id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Persist a newly admitted player.
    fn save_player(&self, session_id: Uuid, player: Player)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a session's roster in join order.
    fn get_session_players(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Player>>>;
    /// Apply a partial update to a player.
    fn update_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop a player from the roster.
    fn remove_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Reserve a join code for a session.
    ///
    /// Returns `false` when the code is already taken, so a concurrent
    /// allocation collision surfaces as a write conflict instead of being
    /// silently overwritten.
    fn reserve_join_code(
        &self,
        code: &str,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Resolve a join code to its session id.
    fn get_session_by_join_code(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// Release a join code once its session is terminal.
    fn release_join_code(&self, code: &str) -> BoxFuture<'static, StorageResult<()>>;

    /// Record which connection currently speaks for the session host.
    fn set_host_socket(
        &self,
        session_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the host connection for a session.
    fn get_host_socket(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// Record which connection currently speaks for a player.
    fn set_player_socket(
        &self,
        session_id: Uuid,
        player_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the connection bound to a player.
    fn get_player_socket(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// List every player connection registered under a session.
    fn get_all_player_sockets(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    /// Clear any socket-identity mapping referring to `connection_id` so
    /// stale routes are not reused after a disconnect.
    fn remove_socket(
        &self,
        session_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Persist the immutable post-game snapshot.
    fn save_game_result(&self, result: GameResult) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the post-game snapshot of a session.
    fn get_game_result(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameResult>>>;
    /// List results ordered by completion time, newest first.
    fn list_recent_results(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>>;
    /// List publicly visible results, newest first.
    fn list_public_results(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>>;
    /// List results for one quiz, newest first.
    fn list_results_by_quiz(
        &self,
        quiz_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>>;

    /// Verify the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
