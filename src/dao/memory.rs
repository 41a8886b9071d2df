use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::storage::{StorageError, StorageResult};
use crate::dao::store::{PlayerPatch, QuizStore, SessionPatch};
use crate::state::game::{GameResult, GameSession, Player, Quiz, SessionStatus};

/// Record wrapper carrying the optional TTL deadline.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    deadline: Option<Instant>,
}

impl<T> Expiring<T> {
    fn live(&self) -> bool {
        self.deadline.is_none_or(|deadline| Instant::now() < deadline)
    }
}

/// Socket-identity mappings for one session.
#[derive(Debug, Clone, Default)]
struct SocketDirectory {
    host: Option<Uuid>,
    players: IndexMap<Uuid, Uuid>,
}

#[derive(Debug, Default)]
struct Partitions {
    quizzes: DashMap<Uuid, Quiz>,
    sessions: DashMap<Uuid, Expiring<GameSession>>,
    rosters: DashMap<Uuid, Expiring<IndexMap<Uuid, Player>>>,
    join_codes: DashMap<String, Expiring<Uuid>>,
    sockets: DashMap<Uuid, Expiring<SocketDirectory>>,
    results: DashMap<Uuid, GameResult>,
}

/// In-process storage backend keeping every partition in a [`DashMap`].
///
/// Session-scoped records (sessions, rosters, join codes, socket mappings)
/// carry a TTL refreshed on every write; expired records read as absent and
/// are physically dropped by [`MemoryStore::sweep`]. Quiz content and game
/// results are not expired.
#[derive(Clone)]
pub struct MemoryStore {
    ttl: Option<Duration>,
    partitions: Arc<Partitions>,
}

impl MemoryStore {
    /// Build an empty store; `ttl` governs session-scoped record expiry.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            partitions: Arc::new(Partitions::default()),
        }
    }

    fn fresh<T>(&self, value: T) -> Expiring<T> {
        Expiring {
            value,
            deadline: self.ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn touch<T>(&self, record: &mut Expiring<T>) {
        record.deadline = self.ttl.map(|ttl| Instant::now() + ttl);
    }

    /// Drop every expired record, returning how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let before = self.partitions.sessions.len()
            + self.partitions.rosters.len()
            + self.partitions.join_codes.len()
            + self.partitions.sockets.len();

        self.partitions.sessions.retain(|_, record| record.live());
        self.partitions.rosters.retain(|_, record| record.live());
        self.partitions.join_codes.retain(|_, record| record.live());
        self.partitions.sockets.retain(|_, record| record.live());

        let after = self.partitions.sessions.len()
            + self.partitions.rosters.len()
            + self.partitions.join_codes.len()
            + self.partitions.sockets.len();
        before - after
    }
}

impl QuizStore for MemoryStore {
    fn get_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Quiz>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.partitions.quizzes.get(&id).map(|q| q.clone())) })
    }

    fn put_quiz(&self, quiz: Quiz) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.partitions.quizzes.insert(quiz.id, quiz);
            Ok(())
        })
    }

    fn list_quizzes(&self) -> BoxFuture<'static, StorageResult<Vec<Quiz>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut quizzes: Vec<Quiz> = store
                .partitions
                .quizzes
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            quizzes.sort_by(|a, b| a.title.cmp(&b.title));
            Ok(quizzes)
        })
    }

    fn save_session(&self, session: GameSession) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let record = store.fresh(session);
            store.partitions.sessions.insert(record.value.id, record);
            Ok(())
        })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameSession>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .sessions
                .get(&id)
                .filter(|record| record.live())
                .map(|record| record.value.clone()))
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(mut record) = store
                .partitions
                .sessions
                .get_mut(&id)
                .filter(|record| record.live())
            else {
                return Err(StorageError::operation(format!("session `{id}` not found")));
            };

            if let Some(status) = patch.status {
                record.value.status = status;
            }
            if let Some(index) = patch.current_question_index {
                record.value.current_question_index = index;
            }
            if let Some(started_at) = patch.started_at {
                record.value.started_at = Some(started_at);
            }
            if let Some(finished_at) = patch.finished_at {
                record.value.finished_at = Some(finished_at);
            }
            store.touch(&mut record);
            Ok(())
        })
    }

    fn transition_session(
        &self,
        id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(mut record) = store
                .partitions
                .sessions
                .get_mut(&id)
                .filter(|record| record.live())
            else {
                return Ok(false);
            };

            if record.value.status != from {
                return Ok(false);
            }
            record.value.status = to;
            store.touch(&mut record);
            Ok(true)
        })
    }

    fn save_player(
        &self,
        session_id: Uuid,
        player: Player,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut roster = store
                .partitions
                .rosters
                .entry(session_id)
                .or_insert_with(|| store.fresh(IndexMap::new()));
            roster.value.insert(player.id, player);
            store.touch(&mut roster);
            Ok(())
        })
    }

    fn get_session_players(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Player>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .rosters
                .get(&session_id)
                .filter(|record| record.live())
                .map(|record| record.value.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn update_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(mut roster) = store
                .partitions
                .rosters
                .get_mut(&session_id)
                .filter(|record| record.live())
            else {
                return Err(StorageError::operation(format!(
                    "roster for session `{session_id}` not found"
                )));
            };

            let Some(player) = roster.value.get_mut(&player_id) else {
                return Err(StorageError::operation(format!(
                    "player `{player_id}` not found in session `{session_id}`"
                )));
            };

            if let Some(score) = patch.score {
                player.score = score;
            }
            if let Some(answers) = patch.answers {
                player.answers = answers;
            }
            if let Some(connected) = patch.connected {
                player.connected = connected;
            }
            store.touch(&mut roster);
            Ok(())
        })
    }

    fn remove_player(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(mut roster) = store.partitions.rosters.get_mut(&session_id) {
                roster.value.shift_remove(&player_id);
            }
            Ok(())
        })
    }

    fn reserve_join_code(
        &self,
        code: &str,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let code = code.to_string();
        Box::pin(async move {
            match store.partitions.join_codes.entry(code) {
                Entry::Occupied(mut slot) => {
                    if slot.get().live() {
                        Ok(false)
                    } else {
                        slot.insert(store.fresh(session_id));
                        Ok(true)
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(store.fresh(session_id));
                    Ok(true)
                }
            }
        })
    }

    fn get_session_by_join_code(
        &self,
        code: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        let code = code.to_string();
        Box::pin(async move {
            Ok(store
                .partitions
                .join_codes
                .get(&code)
                .filter(|record| record.live())
                .map(|record| record.value))
        })
    }

    fn release_join_code(&self, code: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let code = code.to_string();
        Box::pin(async move {
            store.partitions.join_codes.remove(&code);
            Ok(())
        })
    }

    fn set_host_socket(
        &self,
        session_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut directory = store
                .partitions
                .sockets
                .entry(session_id)
                .or_insert_with(|| store.fresh(SocketDirectory::default()));
            directory.value.host = Some(connection_id);
            store.touch(&mut directory);
            Ok(())
        })
    }

    fn get_host_socket(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .sockets
                .get(&session_id)
                .filter(|record| record.live())
                .and_then(|record| record.value.host))
        })
    }

    fn set_player_socket(
        &self,
        session_id: Uuid,
        player_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut directory = store
                .partitions
                .sockets
                .entry(session_id)
                .or_insert_with(|| store.fresh(SocketDirectory::default()));
            directory.value.players.insert(player_id, connection_id);
            store.touch(&mut directory);
            Ok(())
        })
    }

    fn get_player_socket(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .sockets
                .get(&session_id)
                .filter(|record| record.live())
                .and_then(|record| record.value.players.get(&player_id).copied()))
        })
    }

    fn get_all_player_sockets(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .sockets
                .get(&session_id)
                .filter(|record| record.live())
                .map(|record| record.value.players.values().copied().collect())
                .unwrap_or_default())
        })
    }

    fn remove_socket(
        &self,
        session_id: Uuid,
        connection_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(mut directory) = store.partitions.sockets.get_mut(&session_id) {
                if directory.value.host == Some(connection_id) {
                    directory.value.host = None;
                }
                directory
                    .value
                    .players
                    .retain(|_, socket| *socket != connection_id);
            }
            Ok(())
        })
    }

    fn save_game_result(&self, result: GameResult) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.partitions.results.insert(result.session_id, result);
            Ok(())
        })
    }

    fn get_game_result(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameResult>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .partitions
                .results
                .get(&session_id)
                .map(|result| result.clone()))
        })
    }

    fn list_recent_results(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.collect_results(limit, |_| true)) })
    }

    fn list_public_results(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.collect_results(limit, |result| result.visible)) })
    }

    fn list_results_by_quiz(
        &self,
        quiz_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResult>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.collect_results(limit, |result| result.quiz_id == quiz_id)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

impl MemoryStore {
    fn collect_results(&self, limit: usize, keep: impl Fn(&GameResult) -> bool) -> Vec<GameResult> {
        let mut results: Vec<GameResult> = self
            .partitions
            .results
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::Quiz;

    fn quiz() -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            title: "Capitals".into(),
            questions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn session_round_trip_and_patch() {
        let store = MemoryStore::new(None);
        let session = GameSession::new(Uuid::new_v4(), quiz(), 7);
        let id = session.id;
        store.save_session(session).await.unwrap();

        store
            .update_session(
                id,
                SessionPatch {
                    current_question_index: Some(3),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();

        let loaded = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(loaded.current_question_index, 3);
        assert_eq!(loaded.created_at, 7);
    }

    #[tokio::test]
    async fn status_cas_lets_exactly_one_writer_through() {
        let store = MemoryStore::new(None);
        let mut session = GameSession::new(Uuid::new_v4(), quiz(), 0);
        session.status = SessionStatus::Active;
        let id = session.id;
        store.save_session(session).await.unwrap();

        let first = store
            .transition_session(id, SessionStatus::Active, SessionStatus::Finished)
            .await
            .unwrap();
        let second = store
            .transition_session(id, SessionStatus::Active, SessionStatus::Finished)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn roster_keeps_join_order() {
        let store = MemoryStore::new(None);
        let session_id = Uuid::new_v4();
        for name in ["zoe", "al", "mia"] {
            store
                .save_player(session_id, Player::new(session_id, name.into(), 0))
                .await
                .unwrap();
        }

        let players = store.get_session_players(session_id).await.unwrap();
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zoe", "al", "mia"]);

        store
            .remove_player(session_id, players[1].id)
            .await
            .unwrap();
        let remaining = store.get_session_players(session_id).await.unwrap();
        let names: Vec<&str> = remaining.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zoe", "mia"]);
    }

    #[tokio::test]
    async fn join_code_reservation_detects_conflict() {
        let store = MemoryStore::new(None);
        assert!(
            store
                .reserve_join_code("AAAAAA", Uuid::new_v4())
                .await
                .unwrap()
        );
        assert!(
            !store
                .reserve_join_code("AAAAAA", Uuid::new_v4())
                .await
                .unwrap()
        );

        store.release_join_code("AAAAAA").await.unwrap();
        assert!(
            store
                .reserve_join_code("AAAAAA", Uuid::new_v4())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn expired_records_read_as_absent_and_sweep_drops_them() {
        let store = MemoryStore::new(Some(Duration::from_millis(5)));
        let session = GameSession::new(Uuid::new_v4(), quiz(), 0);
        let id = session.id;
        store.save_session(session).await.unwrap();
        store.reserve_join_code("AB12CD", id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get_session(id).await.unwrap().is_none());
        assert!(
            store
                .get_session_by_join_code("AB12CD")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.sweep(), 2);
    }

    #[tokio::test]
    async fn disconnect_clears_socket_routes() {
        let store = MemoryStore::new(None);
        let session_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let host_conn = Uuid::new_v4();
        let player_conn = Uuid::new_v4();

        store.set_host_socket(session_id, host_conn).await.unwrap();
        store
            .set_player_socket(session_id, player_id, player_conn)
            .await
            .unwrap();

        assert_eq!(
            store.get_all_player_sockets(session_id).await.unwrap(),
            vec![player_conn]
        );

        store.remove_socket(session_id, player_conn).await.unwrap();
        assert!(
            store
                .get_player_socket(session_id, player_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get_all_player_sockets(session_id)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.get_host_socket(session_id).await.unwrap(),
            Some(host_conn)
        );

        store.remove_socket(session_id, host_conn).await.unwrap();
        assert!(store.get_host_socket(session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn result_listings_filter_and_order() {
        let store = MemoryStore::new(None);
        let quiz_id = Uuid::new_v4();
        for (completed_at, visible) in [(10, true), (30, false), (20, true)] {
            let result = GameResult {
                session_id: Uuid::new_v4(),
                quiz_id,
                quiz_title: "Capitals".into(),
                host_id: Uuid::new_v4(),
                completed_at,
                player_count: 1,
                question_count: 1,
                average_score: 50,
                leaderboard: Vec::new(),
                question_stats: Vec::new(),
                duration_ms: None,
                visible,
            };
            store.save_game_result(result).await.unwrap();
        }

        let recent = store.list_recent_results(10).await.unwrap();
        let stamps: Vec<u64> = recent.iter().map(|r| r.completed_at).collect();
        assert_eq!(stamps, vec![30, 20, 10]);

        let public = store.list_public_results(10).await.unwrap();
        assert!(public.iter().all(|r| r.visible));
        assert_eq!(public.len(), 2);

        assert_eq!(store.list_results_by_quiz(quiz_id, 1).await.unwrap().len(), 1);
    }
}
