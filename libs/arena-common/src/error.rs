use thiserror::Error;

/// Failures talking to the challenge store or submission recorder
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),
}

/// Conditions that fail a whole judging call before or instead of a verdict.
/// Per-case problems never surface here; they land in the detail list.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("Challenge {0} has no test cases for this mode")]
    NoTestCases(String),

    #[error("Submit requires a user id")]
    MissingUser,

    #[error(transparent)]
    Store(#[from] StoreError),
}
