use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlgoError {
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("invalid timestamp: {now} precedes last update at {last}")]
    InvalidTimestamp { now: i64, last: i64 },
    #[error("no recommendable question remains")]
    EmptyCandidatePool,
}
