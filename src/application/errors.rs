//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Service '{service}' failed: {reason}")]
    Service { service: &'static str, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Carries the hint shown to the caller
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config has not been set up yet: {0}")]
    NotSetUp(String),
}

/// Event pump errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PumpError {
    #[error("Event pump is closed")]
    Closed,

    #[error("Blocking send from the pump thread would deadlock")]
    WouldDeadlock,
}
