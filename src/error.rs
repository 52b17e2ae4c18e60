//! Error types for the charla core.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the conversational core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(
        "No prompt template for type '{prompt_type}' persona '{persona}' at level {level} (or wildcard)"
    )]
    MissingPrompt {
        prompt_type: String,
        persona: String,
        level: String,
    },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// AI provider errors (chat completion, transcription, speech synthesis).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("All providers failed after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to send on platform {platform}: {reason}")]
    SendFailed { platform: String, reason: String },

    #[error("Failed to fetch from platform {platform}: {reason}")]
    FetchFailed { platform: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Dual-store onboarding state errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Cache operation failed: {0}")]
    Cache(String),

    #[error("Both onboarding state stores failed for user {user_id}: {reason}")]
    BothStoresFailed { user_id: Uuid, reason: String },
}

/// Blob storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to store blob {key}: {reason}")]
    PutFailed { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the core.
pub type Result<T> = std::result::Result<T, Error>;
