use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::{dao::store::QuizStore, error::ServiceError};

/// Length of every join code.
pub const CODE_LENGTH: usize = 6;
/// Uppercase alphanumeric draw space (36 symbols).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Allocation attempts before giving up.
const MAX_ATTEMPTS: usize = 10;

/// Draw a random join code from the full alphabet.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[index] as char
        })
        .collect()
}

/// Reserve a fresh join code mapping to `session_id`.
///
/// The existence check and the reservation are two store operations; losing
/// the reservation to a concurrent allocation counts as a collision and is
/// retried like any other, up to [`MAX_ATTEMPTS`] times.
pub async fn allocate(
    store: &Arc<dyn QuizStore>,
    session_id: Uuid,
) -> Result<String, ServiceError> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate_code();
        if store.get_session_by_join_code(&code).await?.is_some() {
            continue;
        }
        if store.reserve_join_code(&code, session_id).await? {
            return Ok(code);
        }
    }
    Err(ServiceError::CodeAllocationFailed)
}

/// Resolve a join code to its session id.
pub async fn resolve(store: &Arc<dyn QuizStore>, code: &str) -> Result<Uuid, ServiceError> {
    store
        .get_session_by_join_code(code)
        .await?
        .ok_or_else(|| ServiceError::InvalidJoinCode(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::memory::MemoryStore;
    use crate::dao::storage::StorageResult;
    use crate::dao::store::{PlayerPatch, SessionPatch};
    use crate::state::game::{GameResult, GameSession, Player, Quiz, SessionStatus};
    use futures::future::BoxFuture;
    use std::collections::HashSet;

    #[test]
    fn codes_use_the_uppercase_alphanumeric_alphabet() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[tokio::test]
    async fn allocation_produces_unique_codes() {
        let store: Arc<dyn QuizStore> = Arc::new(MemoryStore::new(None));
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let code = allocate(&store, Uuid::new_v4()).await.unwrap();
            assert!(seen.insert(code), "allocated a duplicate code");
        }
    }

    #[tokio::test]
    async fn resolve_round_trips_an_allocation() {
        let store: Arc<dyn QuizStore> = Arc::new(MemoryStore::new(None));
        let session_id = Uuid::new_v4();
        let code = allocate(&store, session_id).await.unwrap();
        assert_eq!(resolve(&store, &code).await.unwrap(), session_id);
    }

    #[tokio::test]
    async fn unmapped_code_is_invalid() {
        let store: Arc<dyn QuizStore> = Arc::new(MemoryStore::new(None));
        let err = resolve(&store, "ZZZZZZ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJoinCode(_)));
    }

    /// Store stub whose code space is fully occupied.
    struct SaturatedStore;

    impl QuizStore for SaturatedStore {
        fn get_session_by_join_code(
            &self,
            _code: &str,
        ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
            Box::pin(async move { Ok(Some(Uuid::new_v4())) })
        }

        fn reserve_join_code(
            &self,
            _code: &str,
            _session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async move { Ok(false) })
        }

        fn get_quiz(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<Option<Quiz>>> {
            unimplemented!()
        }
        fn put_quiz(&self, _quiz: Quiz) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<Quiz>>> {
            unimplemented!()
        }
        fn save_session(&self, _session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn get_session(
            &self,
            _id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
            unimplemented!()
        }
        fn update_session(
            &self,
            _id: Uuid,
            _patch: SessionPatch,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn transition_session(
            &self,
            _id: Uuid,
            _from: SessionStatus,
            _to: SessionStatus,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            unimplemented!()
        }
        fn save_player(
            &self,
            _session_id: Uuid,
            _player: Player,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn get_session_players(
            &self,
            _session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<Player>>> {
            unimplemented!()
        }
        fn update_player(
            &self,
            _session_id: Uuid,
            _player_id: Uuid,
            _patch: PlayerPatch,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn remove_player(
            &self,
            _session_id: Uuid,
            _player_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn release_join_code(&self, _code: &str) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn set_host_socket(
            &self,
            _session_id: Uuid,
            _connection_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn get_host_socket(
            &self,
            _session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
            unimplemented!()
        }
        fn set_player_socket(
            &self,
            _session_id: Uuid,
            _player_id: Uuid,
            _connection_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn get_player_socket(
            &self,
            _session_id: Uuid,
            _player_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
            unimplemented!()
        }
        fn get_all_player_sockets(
            &self,
            _session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
            unimplemented!()
        }
        fn remove_socket(
            &self,
            _session_id: Uuid,
            _connection_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn save_game_result(&self, _result: GameResult) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
        fn get_game_result(
            &self,
            _session_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<GameResult>>> {
            unimplemented!()
        }
        fn list_recent_results(
            &self,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
            unimplemented!()
        }
        fn list_public_results(
            &self,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
            unimplemented!()
        }
        fn list_results_by_quiz(
            &self,
            _quiz_id: Uuid,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
            unimplemented!()
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn exhausted_retries_fail_allocation() {
        let store: Arc<dyn QuizStore> = Arc::new(SaturatedStore);
        let err = allocate(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeAllocationFailed));
    }
}
