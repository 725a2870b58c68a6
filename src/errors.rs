use thiserror::Error;

/// Error type for contentgraph operations.
#[derive(Debug, Error)]
pub enum ContentGraphError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("transaction error: {0}")]
    TransactionError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("fault injected: {0}")]
    FaultInjected(String),
}

impl ContentGraphError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::ConfigError(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::QueryError(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::InvalidInput(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::ValidationError(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::TransactionError(msg.into())
    }

    pub fn parse<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::ParseError(msg.into())
    }

    pub fn fault_injection<T: Into<String>>(msg: T) -> Self {
        ContentGraphError::FaultInjected(msg.into())
    }

    /// Whether the error was raised before anything touched the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ContentGraphError::ValidationError(_) | ContentGraphError::InvalidInput(_)
        )
    }
}
