//! Error types for the credit ledger

use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Balance not initialized for plantation
    #[error("Balance not found for plantation: {0}")]
    BalanceNotFound(Uuid),

    /// Listing not found
    #[error("Listing not found: {0}")]
    ListingNotFound(Uuid),

    /// Trade not found
    #[error("Trade not found: {0}")]
    TradeNotFound(Uuid),

    /// Balance already initialized for plantation
    #[error("Balance already exists for plantation: {0}")]
    AlreadyExists(Uuid),

    /// Non-positive quantity or price
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Listing creation would exceed the available balance
    #[error(
        "Insufficient available credits on plantation {plantation_id}: \
         available = {available}, requested = {requested}"
    )]
    InsufficientAvailable {
        /// Plantation whose balance was checked
        plantation_id: Uuid,
        /// Credits currently available
        available: u64,
        /// Credits requested
        requested: u64,
    },

    /// Trade would exceed the listing's remaining quantity
    #[error(
        "Insufficient remaining credits on listing {listing_id}: \
         remaining = {remaining}, requested = {requested}"
    )]
    InsufficientRemaining {
        /// Listing that was targeted
        listing_id: Uuid,
        /// Credits remaining on the listing
        remaining: u64,
        /// Credits requested
        requested: u64,
    },

    /// Listing is in a terminal status (filled or cancelled)
    #[error("Listing is not available for trading: {0}")]
    ListingUnavailable(Uuid),

    /// Invariant violation (ledger corruption; fatal, never clamped)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.); safe to retry
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the operation may be retried with the same idempotency key.
    ///
    /// Validation errors are deterministic; only infrastructure failures
    /// qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Concurrency(_) | Error::Storage(_) | Error::Io(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
