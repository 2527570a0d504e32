use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// A write lost an optimistic concurrency check (stale revision, taken
    /// unique key or moved counter). The lifecycle services re-read and
    /// revalidate when they see it.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Only store outages are worth retrying; guard and validation failures
    /// produce the same answer every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
