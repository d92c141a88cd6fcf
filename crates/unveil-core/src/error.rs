//! Core error types for unveil-core.
//!
//! Two layers: `CoreError` covers infrastructure failures (store, config,
//! IO), while `RevealError` is the typed taxonomy of expected protocol
//! outcomes returned to callers. Protocol outcomes are values, never
//! panics; infrastructure failures surface through `RevealError::Unavailable`.

use std::path::PathBuf;
use thiserror::Error;

use crate::reveal::RevealStage;

/// Infrastructure error type for unveil-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Store-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the store
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// A pending reveal already exists for the conversation
    #[error("A pending reveal already exists for conversation {conversation_id}")]
    DuplicateActive { conversation_id: String },

    /// Stored record could not be decoded
    #[error("Corrupt record {id}: {message}")]
    CorruptRecord { id: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Expected, user-facing protocol outcomes.
///
/// Every variant except `Unavailable` is a normal result of using the
/// protocol and maps one-to-one onto an API error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RevealError {
    /// Readiness score below the admission threshold at request time.
    #[error("Connection not ready for a reveal: score {score:.2} is below {required:.2}")]
    InsufficientConnection { score: f64, required: f64 },

    /// Daily reveal cap reached for the user's tier.
    #[error("Daily reveal limit reached ({used} of {limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    /// A pending reveal already exists for this conversation.
    #[error("A reveal is already in progress for conversation {conversation_id}")]
    AlreadyInProgress { conversation_id: String },

    /// Caller is neither requester nor target.
    #[error("Caller is not a participant in this reveal")]
    NotParticipant,

    /// Action submitted for the wrong current stage.
    #[error("Action '{action}' is not valid in stage {stage:?}")]
    InvalidStageTransition { stage: RevealStage, action: &'static str },

    /// Unknown reveal id.
    #[error("Reveal {reveal_id} not found")]
    NotFound { reveal_id: String },

    /// A collaborator (store, feature source, usage source) failed.
    #[error("Subsystem unavailable: {0}")]
    Unavailable(String),
}

impl From<CoreError> for RevealError {
    fn from(err: CoreError) -> Self {
        RevealError::Unavailable(err.to_string())
    }
}

impl From<StoreError> for RevealError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateActive { conversation_id } => {
                RevealError::AlreadyInProgress { conversation_id }
            }
            other => RevealError::Unavailable(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
