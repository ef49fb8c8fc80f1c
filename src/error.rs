//! Error types for wallwarden.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Feed source errors (wall fetch and moderation side effects).
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Feed API returned {status} for {operation}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Invalid feed response: {0}")]
    InvalidResponse(String),

    #[error("User {user_id} is not a member of group {group_id}")]
    NotAMember { group_id: u64, user_id: u64 },
}

/// Policy classifier errors.
///
/// Internal to the `ClassifierClient`: callers always receive a
/// `ClassificationResult` (degraded on outage), never one of these.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to create model client: {0}")]
    ClientCreation(String),
}

/// Action dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Feed action failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Exile of user {user_id} failed after post removal: {reason}")]
    ExileFailed { user_id: u64, reason: String },

    #[error("Could not resolve rank ladder for group {group_id}: {reason}")]
    RankLadder { group_id: u64, reason: String },
}

/// Persistence errors (subscriptions and audit log).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema initialization failed: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Notification sink errors. Best-effort only; never propagated past the
/// dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Publish to {target} failed: {reason}")]
    PublishFailed { target: String, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
