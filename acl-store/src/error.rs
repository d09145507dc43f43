use thiserror::Error;

#[derive(Error, Debug)]
pub enum AclError {
    /// The caller broke an argument contract. Raised before any I/O.
    #[error("Broke parameter contract: {0}")]
    ContractViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AclError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// True for errors caused by the caller rather than the storage layer.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }
}

impl From<config::ConfigError> for AclError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type AclResult<T> = std::result::Result<T, AclError>;
