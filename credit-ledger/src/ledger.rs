//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor, and metrics
//! into a high-level API for credit issuance, listings, and trade
//! settlement.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, CreditLedger};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = CreditLedger::open(config).await?;
//!
//!     let plantation_id = Uuid::new_v4();
//!     ledger.initialize_balance(plantation_id).await?;
//!     ledger.credit(plantation_id, 100).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    storage::OpenListings,
    types::{CreditListing, PlantationBalance, Trade},
    Config, Metrics, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface.
///
/// Mutations go through the actor; reads hit storage directly.
pub struct CreditLedger {
    /// Actor handle for mutating operations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl CreditLedger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        let metrics = Metrics::new()
            .map_err(|e| crate::Error::Other(format!("Failed to create metrics: {}", e)))?;

        // Spawn actor
        let handle = spawn_ledger_actor(storage.clone(), config.mailbox_capacity, metrics.clone());

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    // Balance operations

    /// Create a zeroed balance for a plantation (registration time)
    pub async fn initialize_balance(&self, plantation_id: Uuid) -> Result<PlantationBalance> {
        self.handle.initialize_balance(plantation_id).await
    }

    /// Add issued credits: `total += amount; available += amount`
    pub async fn credit(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.handle.credit(plantation_id, amount).await
    }

    /// Move available credits into the locked state
    pub async fn lock(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.handle.lock(plantation_id, amount).await
    }

    /// Move locked credits back to available
    pub async fn unlock(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.handle.unlock(plantation_id, amount).await
    }

    /// Current balance snapshot
    pub fn balance(&self, plantation_id: Uuid) -> Result<PlantationBalance> {
        self.storage.get_balance(plantation_id)
    }

    // Listing operations

    /// Lock `credits` of the plantation's available balance and create an
    /// active listing, as one atomic unit.
    pub async fn create_listing(
        &self,
        plantation_id: Uuid,
        seller_id: Uuid,
        credits: u64,
        price_per_credit: Decimal,
    ) -> Result<CreditListing> {
        self.handle
            .create_listing(plantation_id, seller_id, credits, price_per_credit)
            .await
    }

    /// Get listing by ID
    pub fn listing(&self, listing_id: Uuid) -> Result<CreditListing> {
        self.storage.get_listing(listing_id)
    }

    /// Lazy, restartable iterator over active and partially filled listings,
    /// optionally filtered by plantation
    pub fn open_listings(&self, plantation_id: Option<Uuid>) -> Result<OpenListings<'_>> {
        self.storage.open_listings(plantation_id)
    }

    /// Cancel a non-terminal listing, unlocking its remaining credits
    pub async fn cancel_listing(&self, listing_id: Uuid) -> Result<CreditListing> {
        self.handle.cancel_listing(listing_id).await
    }

    // Trade operations

    /// Execute a buy against a listing.
    ///
    /// Exactly-once under retries: a previously seen idempotency key returns
    /// the original trade with no further validation or mutation.
    pub async fn execute_trade(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        credits: u64,
        idempotency_key: impl Into<String>,
    ) -> Result<Trade> {
        self.handle
            .execute_trade(listing_id, buyer_id, credits, idempotency_key.into())
            .await
    }

    /// Get trade by ID
    pub fn trade(&self, trade_id: Uuid) -> Result<Trade> {
        self.storage.get_trade(trade_id)
    }

    /// Look up a trade by idempotency key
    pub fn trade_by_idempotency_key(&self, key: &str) -> Result<Option<Trade>> {
        self.storage.lookup_idempotency(key)
    }

    // Introspection

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
