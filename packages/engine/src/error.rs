use kt_algo::AlgoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: String, value: f64 },
    #[error("invalid timestamp: {now} precedes {last}")]
    InvalidTimestamp { now: i64, last: i64 },
    #[error("invalid timestamp: {timestamp} is ahead of the clock at {now}")]
    FutureTimestamp { timestamp: i64, now: i64 },
    #[error("no recommendable question remains for user {user_id}")]
    EmptyCandidatePool { user_id: String },
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
    #[error("invalid answer event: {0}")]
    InvalidEvent(String),
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Dangling references between catalog, store and events
    pub fn is_unknown_entity(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownSkill(_)
                | EngineError::UnknownUser(_)
                | EngineError::UnknownQuestion(_)
        )
    }
}

impl From<AlgoError> for EngineError {
    fn from(err: AlgoError) -> Self {
        match err {
            AlgoError::InvalidParameter { name, value } => EngineError::InvalidParameter {
                name: name.to_string(),
                value,
            },
            AlgoError::InvalidTimestamp { now, last } => {
                EngineError::InvalidTimestamp { now, last }
            }
            AlgoError::EmptyCandidatePool => EngineError::EmptyCandidatePool {
                user_id: String::new(),
            },
        }
    }
}
