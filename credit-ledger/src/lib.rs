//! Verdi Credit Ledger
//!
//! Per-plantation green-credit accounting with atomic trade settlement.
//!
//! # Architecture
//!
//! - **Single Writer**: one logical writer task eliminates race conditions
//!   between concurrent listing and trade requests
//! - **Atomic Batches**: every multi-row mutation commits one RocksDB
//!   `WriteBatch`, so balance, listing, trade, and idempotency rows never
//!   diverge
//! - **Idempotent Settlement**: each trade is keyed by a caller-supplied
//!   idempotency key; retries observe the original outcome
//!
//! # Invariants
//!
//! - Balance conservation: `total == available + locked` for every balance
//! - No oversell: fills against a listing never exceed its total quantity
//! - Exactly-once: at most one trade per idempotency key

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::CreditLedger;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{CreditListing, ListingStatus, PlantationBalance, Trade};
