use domain::{
    CartError, CouponError, DomainError, OrderError, ParseStatusError, ReservationError,
    StockError,
};
use thiserror::Error;

/// Postgres SQLSTATE for `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional write found the row in a different state than expected.
    #[error("Concurrent update of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// A domain rule rejected the operation; nothing was written.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The statement exceeded its time budget and was cancelled.
    #[error("Statement timed out")]
    Timeout,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.code().as_deref() == Some(QUERY_CANCELED)
        {
            return StoreError::Timeout;
        }
        StoreError::Database(err)
    }
}

impl From<ParseStatusError> for StoreError {
    fn from(err: ParseStatusError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

macro_rules! domain_error_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for StoreError {
                fn from(err: $err) -> Self {
                    StoreError::Domain(err.into())
                }
            }
        )*
    };
}

domain_error_from!(StockError, ReservationError, OrderError, CouponError, CartError);

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
