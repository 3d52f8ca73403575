//! Error types for the sluice rate limiting engine.

use thiserror::Error;

/// Main error type for sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No strategy registered for the configured tag
    #[error("No strategy found for type {0}")]
    UnknownStrategy(String),

    /// Time unit outside the supported set (ns, us, ms, s)
    #[error("Invalid time unit {0}")]
    UnknownTimeUnit(String),

    /// A rule already exists for this (entity type, attribute type, attribute value) key
    #[error("Duplicate rule exists for {0}")]
    DuplicateRule(String),

    /// Update targeted a rule key that is not in the cache
    #[error("Cannot update rule, no rule found for {0}")]
    RuleNotFound(String),

    /// An entity rule group was imported with an empty attribute list
    #[error("Rule group for entity type {0} has no attribute rules")]
    EmptyRuleGroup(String),

    /// Malformed limit request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rule and state disagree about the entity behind the same key
    #[error("Incorrect entity comparison, rule {rule} vs state {state}")]
    EntityMismatch { rule: String, state: String },

    /// The strict in-process store had no state for a requested attribute
    #[error("No state found for key {0}")]
    MissingState(String),

    /// A stored counter record could not be decoded
    #[error("Failed to parse state for attribute {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: prost::DecodeError,
    },

    /// Transport or command failure on the remote store
    #[error("State store error: {0}")]
    Store(#[from] redis::RedisError),
}

/// Result type alias for sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;
