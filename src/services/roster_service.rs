use std::collections::HashSet;

use crate::{
    dto::now_millis,
    error::ServiceError,
    services::join_code,
    state::{
        SharedState,
        game::{GameSession, Player, SessionStatus},
    },
};

/// Everything a join handler needs to answer and broadcast.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The session the player was admitted into.
    pub session: GameSession,
    /// The freshly created player, with its effective name.
    pub player: Player,
    /// Whether the requested name was taken and got suffixed.
    pub name_changed: bool,
    /// Roster size including the new player.
    pub player_count: usize,
}

/// Admit a player into a waiting session identified by join code.
pub async fn join_session(
    state: &SharedState,
    raw_code: &str,
    requested_name: &str,
) -> Result<JoinOutcome, ServiceError> {
    let store = state.store();

    let requested = requested_name.trim();
    if requested.is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be empty".into(),
        ));
    }

    let code = raw_code.trim().to_ascii_uppercase();
    let session_id = join_code::resolve(&store, &code).await?;
    let Some(session) = store.get_session(session_id).await? else {
        // The code outlived its session record; treat the code as dead.
        return Err(ServiceError::InvalidJoinCode(code));
    };

    if session.status != SessionStatus::Waiting {
        return Err(ServiceError::GameAlreadyStarted);
    }

    let roster = store.get_session_players(session_id).await?;
    let (name, name_changed) = dedupe_name(requested, &roster);
    let player = Player::new(session_id, name, now_millis());
    store.save_player(session_id, player.clone()).await?;

    Ok(JoinOutcome {
        session,
        player,
        name_changed,
        player_count: roster.len() + 1,
    })
}

/// Resolve a display-name collision with an incrementing numeric suffix:
/// `name`, `name2`, `name3`, and so on.
fn dedupe_name(requested: &str, roster: &[Player]) -> (String, bool) {
    let taken: HashSet<&str> = roster.iter().map(|p| p.name.as_str()).collect();
    if !taken.contains(requested) {
        return (requested.to_string(), false);
    }

    let mut suffix: u32 = 2;
    loop {
        let candidate = format!("{requested}{suffix}");
        if !taken.contains(candidate.as_str()) {
            return (candidate, true);
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dao::memory::MemoryStore;
    use crate::state::AppState;
    use crate::state::game::{Question, Quiz};
    use std::sync::Arc;
    use uuid::Uuid;

    fn player(name: &str) -> Player {
        Player::new(Uuid::new_v4(), name.into(), 0)
    }

    #[test]
    fn free_name_is_kept_verbatim() {
        let roster = vec![player("Ann")];
        assert_eq!(dedupe_name("Bea", &roster), ("Bea".into(), false));
    }

    #[test]
    fn collisions_probe_numeric_suffixes() {
        let roster = vec![player("Ann"), player("Ann2"), player("Ann3")];
        assert_eq!(dedupe_name("Ann", &roster), ("Ann4".into(), true));
    }

    async fn seeded_state() -> (SharedState, String, Uuid) {
        let store = Arc::new(MemoryStore::new(None));
        let state = AppState::new(AppConfig::default(), store.clone());

        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: "Capitals".into(),
            questions: vec![Question {
                id: Uuid::new_v4(),
                prompt: "Capital of France?".into(),
                choices: vec!["Paris".into(), "Lyon".into()],
                correct_answer: 0,
                time_limit_ms: 10_000,
                base_points: 100,
            }],
        };
        let quiz_id = quiz.id;
        state.store().put_quiz(quiz).await.unwrap();

        let session = crate::services::session_service::create_session(
            &state,
            Uuid::new_v4(),
            quiz_id,
        )
        .await
        .unwrap();
        let code = session.join_code.clone();
        (state, code, session.host_id)
    }

    #[tokio::test]
    async fn join_admits_and_suffixes_duplicates() {
        let (state, code, _) = seeded_state().await;

        let first = join_session(&state, &code, "Ann").await.unwrap();
        assert_eq!(first.player.name, "Ann");
        assert!(!first.name_changed);
        assert_eq!(first.player_count, 1);
        assert_eq!(first.player.score, 0);
        assert!(first.player.answers.is_empty());

        let second = join_session(&state, &code, "Ann").await.unwrap();
        assert_eq!(second.player.name, "Ann2");
        assert!(second.name_changed);
        assert_eq!(second.player_count, 2);
    }

    #[tokio::test]
    async fn join_code_lookup_is_case_insensitive() {
        let (state, code, _) = seeded_state().await;
        let outcome = join_session(&state, &code.to_ascii_lowercase(), "Ann")
            .await
            .unwrap();
        assert_eq!(outcome.session.join_code, code);
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let (state, _, _) = seeded_state().await;
        let err = join_session(&state, "ZZZZZ0", "Ann").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJoinCode(_)));
    }

    #[tokio::test]
    async fn joining_a_started_game_is_rejected() {
        let (state, code, host_id) = seeded_state().await;
        let admitted = join_session(&state, &code, "Ann").await.unwrap();

        crate::services::session_service::start_session(
            &state,
            admitted.session.id,
            host_id,
        )
        .await
        .unwrap();

        let err = join_session(&state, &code, "Bea").await.unwrap_err();
        assert!(matches!(err, ServiceError::GameAlreadyStarted));
    }

    #[tokio::test]
    async fn blank_name_is_invalid_input() {
        let (state, code, _) = seeded_state().await;
        let err = join_session(&state, &code, "   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
