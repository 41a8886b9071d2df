//! Application-level configuration loading, including the seeded quiz catalog.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::game::{Question, Quiz};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HOTSEAT_BACK_CONFIG_PATH";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HEARTBEAT_SECS: u64 = 30;
const DEFAULT_SESSION_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TIME_LIMIT_MS: u64 = 20_000;
const DEFAULT_BASE_POINTS: u32 = 100;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    port: u16,
    heartbeat: Duration,
    session_ttl: Duration,
    sweep_interval: Duration,
    quizzes: Vec<Quiz>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        quizzes = config.quizzes.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// TCP port the server listens on (env `PORT` still wins in `main`).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// How often each connection gets pinged for liveness.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
    }

    /// TTL applied to session-scoped records in the store.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// How often the store sweeps expired records.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Quiz catalog to seed the store with at boot.
    pub fn seed_quizzes(&self) -> &[Quiz] {
        &self.quizzes
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            quizzes: default_quizzes(),
        }
    }
}

/// JSON representation of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    port: Option<u16>,
    heartbeat_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    #[serde(default)]
    quizzes: Vec<RawQuiz>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let quizzes: Vec<Quiz> = raw.quizzes.into_iter().filter_map(build_quiz).collect();

        Self {
            port: raw.port.unwrap_or(DEFAULT_PORT),
            heartbeat: raw
                .heartbeat_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat),
            session_ttl: raw
                .session_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            sweep_interval: raw
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            quizzes: if quizzes.is_empty() {
                defaults.quizzes
            } else {
                quizzes
            },
        }
    }
}

/// JSON representation of a quiz inside the configuration file.
#[derive(Debug, Deserialize)]
struct RawQuiz {
    title: String,
    questions: Vec<RawQuestion>,
}

/// JSON representation of a question inside the configuration file.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    prompt: String,
    choices: Vec<String>,
    correct_answer: usize,
    time_limit_ms: Option<u64>,
    base_points: Option<u32>,
}

/// Turn a raw quiz into catalog content, rejecting malformed questions.
fn build_quiz(raw: RawQuiz) -> Option<Quiz> {
    if raw.title.trim().is_empty() {
        warn!("skipping configured quiz with an empty title");
        return None;
    }

    let title = raw.title;
    let mut questions = Vec::with_capacity(raw.questions.len());
    for question in raw.questions {
        if question.choices.len() < 2 {
            warn!(quiz = %title, prompt = %question.prompt, "skipping question with fewer than two choices");
            continue;
        }
        if question.correct_answer >= question.choices.len() {
            warn!(quiz = %title, prompt = %question.prompt, "skipping question whose answer index is out of range");
            continue;
        }
        questions.push(Question {
            id: Uuid::new_v4(),
            prompt: question.prompt,
            choices: question.choices,
            correct_answer: question.correct_answer,
            time_limit_ms: question.time_limit_ms.unwrap_or(DEFAULT_TIME_LIMIT_MS),
            base_points: question.base_points.unwrap_or(DEFAULT_BASE_POINTS),
        });
    }

    if questions.is_empty() {
        warn!(quiz = %title, "skipping configured quiz with no usable questions");
        return None;
    }

    Some(Quiz {
        id: Uuid::new_v4(),
        title,
        questions,
    })
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in demo quiz shipped with the binary.
fn default_quizzes() -> Vec<Quiz> {
    vec![Quiz {
        id: Uuid::new_v4(),
        title: "General knowledge warm-up".into(),
        questions: vec![
            Question {
                id: Uuid::new_v4(),
                prompt: "Which planet is known as the Red Planet?".into(),
                choices: vec![
                    "Venus".into(),
                    "Mars".into(),
                    "Jupiter".into(),
                    "Mercury".into(),
                ],
                correct_answer: 1,
                time_limit_ms: DEFAULT_TIME_LIMIT_MS,
                base_points: DEFAULT_BASE_POINTS,
            },
            Question {
                id: Uuid::new_v4(),
                prompt: "What is the capital of Australia?".into(),
                choices: vec![
                    "Sydney".into(),
                    "Melbourne".into(),
                    "Canberra".into(),
                    "Perth".into(),
                ],
                correct_answer: 2,
                time_limit_ms: DEFAULT_TIME_LIMIT_MS,
                base_points: DEFAULT_BASE_POINTS,
            },
            Question {
                id: Uuid::new_v4(),
                prompt: "How many sides does a hexagon have?".into(),
                choices: vec!["five".into(), "six".into(), "seven".into(), "eight".into()],
                correct_answer: 1,
                time_limit_ms: DEFAULT_TIME_LIMIT_MS,
                base_points: DEFAULT_BASE_POINTS,
            },
        ],
    }]
}
