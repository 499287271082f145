use thiserror::Error;

/// Errors raised by the holder analytics core and its collaborators
///
/// Expected conditions (empty snapshot, nobody eligible for a draw) are not
/// errors and never show up here.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cohort size must be greater than zero")]
    InvalidCohortSize,

    #[error("a poll is already in progress")]
    PollInProgress,

    #[error("snapshot is for mint {got}, session tracks {expected}")]
    MintMismatch { expected: String, got: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
