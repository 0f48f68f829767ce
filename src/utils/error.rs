use thiserror::Error;

/// Custom error types for the edge guard service
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid configuration values caught by startup validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cache backend errors
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Malformed rate specification (expected "<count>/<unit>")
    #[error("Invalid rate spec: {0}")]
    InvalidRate(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for edge guard operations
pub type GuardResult<T> = Result<T, GuardError>;

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        GuardError::Internal(err.to_string())
    }
}
