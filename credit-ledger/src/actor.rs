//! Actor-based concurrency for the credit ledger
//!
//! All ledger mutations flow through one Tokio task (the single-writer
//! pattern): concurrent trade and listing requests are serialized at the
//! mailbox, so the check-and-mutate sequence for a balance or listing can
//! never interleave with another writer. Each handled message commits a
//! single RocksDB `WriteBatch`, keeping the listing row, balance row, trade
//! row, and idempotency mapping consistent as one unit.
//!
//! Reads do not pass through the actor; they hit storage directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │             Request handlers (parallel)               │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ LedgerHandle (Clone)
//!                       ▼
//!               mpsc::channel (bounded)
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   validate → mutate in memory → WriteBatch commit     │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::types::{CreditListing, PlantationBalance, Trade};
use crate::{Error, Metrics, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Create a zeroed balance for a plantation
    InitializeBalance {
        plantation_id: Uuid,
        response: oneshot::Sender<Result<PlantationBalance>>,
    },

    /// Add issued credits to a plantation balance
    Credit {
        plantation_id: Uuid,
        amount: u64,
        response: oneshot::Sender<Result<PlantationBalance>>,
    },

    /// Move credits from available to locked
    Lock {
        plantation_id: Uuid,
        amount: u64,
        response: oneshot::Sender<Result<PlantationBalance>>,
    },

    /// Move credits from locked back to available
    Unlock {
        plantation_id: Uuid,
        amount: u64,
        response: oneshot::Sender<Result<PlantationBalance>>,
    },

    /// Lock credits and insert an active listing
    CreateListing {
        plantation_id: Uuid,
        seller_id: Uuid,
        credits: u64,
        price_per_credit: Decimal,
        response: oneshot::Sender<Result<CreditListing>>,
    },

    /// Execute an idempotent buy against a listing
    ExecuteTrade {
        listing_id: Uuid,
        buyer_id: Uuid,
        credits: u64,
        idempotency_key: String,
        response: oneshot::Sender<Result<Trade>>,
    },

    /// Cancel a listing and unlock its remaining credits
    CancelListing {
        listing_id: Uuid,
        response: oneshot::Sender<Result<CreditListing>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Metrics collector
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::InitializeBalance {
                plantation_id,
                response,
            } => {
                let result = self.storage.init_balance(plantation_id);
                let _ = response.send(result);
            }

            LedgerMessage::Credit {
                plantation_id,
                amount,
                response,
            } => {
                let result = self.credit(plantation_id, amount);
                let _ = response.send(result);
            }

            LedgerMessage::Lock {
                plantation_id,
                amount,
                response,
            } => {
                let result = self.mutate_balance(plantation_id, |b| b.lock(amount));
                let _ = response.send(result);
            }

            LedgerMessage::Unlock {
                plantation_id,
                amount,
                response,
            } => {
                let result = self.mutate_balance(plantation_id, |b| b.unlock(amount));
                let _ = response.send(result);
            }

            LedgerMessage::CreateListing {
                plantation_id,
                seller_id,
                credits,
                price_per_credit,
                response,
            } => {
                let result = self.create_listing(plantation_id, seller_id, credits, price_per_credit);
                let _ = response.send(result);
            }

            LedgerMessage::ExecuteTrade {
                listing_id,
                buyer_id,
                credits,
                idempotency_key,
                response,
            } => {
                let started = Instant::now();
                let result = self.execute_trade(listing_id, buyer_id, credits, idempotency_key);
                self.metrics
                    .record_settle_duration(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }

            LedgerMessage::CancelListing {
                listing_id,
                response,
            } => {
                let result = self.cancel_listing(listing_id);
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn credit(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        let balance = self.mutate_balance(plantation_id, |b| b.credit(amount))?;
        self.metrics.record_credits_issued(amount);

        tracing::info!(
            plantation_id = %plantation_id,
            amount,
            total = balance.total_credits,
            "Credits issued"
        );

        Ok(balance)
    }

    fn mutate_balance(
        &self,
        plantation_id: Uuid,
        transition: impl FnOnce(&mut PlantationBalance) -> Result<()>,
    ) -> Result<PlantationBalance> {
        let mut balance = self.storage.get_balance(plantation_id)?;
        transition(&mut balance)?;
        self.storage.put_balance(&balance)?;
        Ok(balance)
    }

    /// Lock credits and insert the listing as one atomic unit.
    ///
    /// Availability is checked here, inside the single writer, so two
    /// concurrent creates cannot both observe a sufficient balance.
    fn create_listing(
        &self,
        plantation_id: Uuid,
        seller_id: Uuid,
        credits: u64,
        price_per_credit: Decimal,
    ) -> Result<CreditListing> {
        let listing = CreditListing::new(plantation_id, seller_id, credits, price_per_credit)?;

        let mut balance = self.storage.get_balance(plantation_id)?;
        balance.lock(credits)?;

        self.storage.create_listing_atomic(&listing, &balance)?;
        self.metrics.record_listing_created();

        tracing::info!(
            listing_id = %listing.listing_id,
            plantation_id = %plantation_id,
            credits,
            price = %price_per_credit,
            "Listing created"
        );

        Ok(listing)
    }

    /// Execute a buy against a listing with exactly-once settlement.
    ///
    /// The idempotency lookup is the first observable step: a replayed key
    /// returns the original trade without touching listing state, even if
    /// that state has since changed.
    fn execute_trade(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        credits: u64,
        idempotency_key: String,
    ) -> Result<Trade> {
        if let Some(existing) = self.storage.lookup_idempotency(&idempotency_key)? {
            self.metrics.record_trade_replay();
            tracing::debug!(
                trade_id = %existing.trade_id,
                idempotency_key = %idempotency_key,
                "Trade replayed from idempotency store"
            );
            return Ok(existing);
        }

        // Validation happens on in-memory copies; nothing is written until
        // every check has passed.
        let mut listing = self.storage.get_listing(listing_id)?;
        let previous_status = listing.status;
        listing.fill(credits)?;

        let mut balance = self.storage.get_balance(listing.plantation_id)?;
        balance.consume_locked(credits)?;

        let total_price = Decimal::from(credits)
            .checked_mul(listing.price_per_credit)
            .ok_or_else(|| {
                Error::InvalidAmount(format!(
                    "trade value {} x {} overflows on listing {}",
                    credits, listing.price_per_credit, listing_id
                ))
            })?;

        let trade = Trade {
            trade_id: Uuid::now_v7(),
            listing_id,
            buyer_id,
            credits,
            total_price,
            idempotency_key,
            executed_at: Utc::now(),
        };

        self.storage
            .settle_trade_atomic(&listing, previous_status, &balance, &trade)?;
        self.metrics.record_trade_settled();

        tracing::info!(
            trade_id = %trade.trade_id,
            listing_id = %listing_id,
            buyer_id = %buyer_id,
            credits,
            total_price = %total_price,
            listing_status = ?listing.status,
            "Trade settled"
        );

        Ok(trade)
    }

    fn cancel_listing(&self, listing_id: Uuid) -> Result<CreditListing> {
        let mut listing = self.storage.get_listing(listing_id)?;
        let previous_status = listing.status;
        let unlocked = listing.cancel()?;

        let mut balance = self.storage.get_balance(listing.plantation_id)?;
        balance.unlock(unlocked)?;

        self.storage
            .cancel_listing_atomic(&listing, previous_status, &balance)?;
        self.metrics.record_listing_cancelled();

        tracing::info!(
            listing_id = %listing_id,
            unlocked,
            "Listing cancelled"
        );

        Ok(listing)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make_msg: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make_msg(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Initialize a zeroed balance
    pub async fn initialize_balance(&self, plantation_id: Uuid) -> Result<PlantationBalance> {
        self.request(|response| LedgerMessage::InitializeBalance {
            plantation_id,
            response,
        })
        .await
    }

    /// Credit a plantation balance
    pub async fn credit(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.request(|response| LedgerMessage::Credit {
            plantation_id,
            amount,
            response,
        })
        .await
    }

    /// Lock available credits
    pub async fn lock(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.request(|response| LedgerMessage::Lock {
            plantation_id,
            amount,
            response,
        })
        .await
    }

    /// Unlock locked credits
    pub async fn unlock(&self, plantation_id: Uuid, amount: u64) -> Result<PlantationBalance> {
        self.request(|response| LedgerMessage::Unlock {
            plantation_id,
            amount,
            response,
        })
        .await
    }

    /// Create a listing
    pub async fn create_listing(
        &self,
        plantation_id: Uuid,
        seller_id: Uuid,
        credits: u64,
        price_per_credit: Decimal,
    ) -> Result<CreditListing> {
        self.request(|response| LedgerMessage::CreateListing {
            plantation_id,
            seller_id,
            credits,
            price_per_credit,
            response,
        })
        .await
    }

    /// Execute a trade
    pub async fn execute_trade(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        credits: u64,
        idempotency_key: String,
    ) -> Result<Trade> {
        self.request(|response| LedgerMessage::ExecuteTrade {
            listing_id,
            buyer_id,
            credits,
            idempotency_key,
            response,
        })
        .await
    }

    /// Cancel a listing
    pub async fn cancel_listing(&self, listing_id: Uuid) -> Result<CreditListing> {
        self.request(|response| LedgerMessage::CancelListing {
            listing_id,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    mailbox_capacity: usize,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn test_storage() -> (Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage, 100, Metrics::new().unwrap());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_balance_lifecycle() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage, 100, Metrics::new().unwrap());
        let plantation_id = Uuid::new_v4();

        let balance = handle.initialize_balance(plantation_id).await.unwrap();
        assert_eq!(balance.total_credits, 0);

        let balance = handle.credit(plantation_id, 100).await.unwrap();
        assert_eq!(balance.available_credits, 100);

        let balance = handle.lock(plantation_id, 30).await.unwrap();
        assert_eq!(balance.available_credits, 70);
        assert_eq!(balance.locked_credits, 30);

        let balance = handle.unlock(plantation_id, 30).await.unwrap();
        assert_eq!(balance.available_credits, 100);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_trade_flow() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage.clone(), 100, Metrics::new().unwrap());
        let plantation_id = Uuid::new_v4();
        let seller_id = Uuid::new_v4();
        let buyer_id = Uuid::new_v4();

        handle.initialize_balance(plantation_id).await.unwrap();
        handle.credit(plantation_id, 100).await.unwrap();

        let listing = handle
            .create_listing(plantation_id, seller_id, 40, Decimal::new(2, 0))
            .await
            .unwrap();

        let trade = handle
            .execute_trade(listing.listing_id, buyer_id, 40, "k1".to_string())
            .await
            .unwrap();
        assert_eq!(trade.total_price, Decimal::new(80, 0));

        // Replay returns the identical trade
        let replay = handle
            .execute_trade(listing.listing_id, buyer_id, 40, "k1".to_string())
            .await
            .unwrap();
        assert_eq!(replay, trade);

        let balance = storage.get_balance(plantation_id).unwrap();
        assert_eq!(balance.total_credits, 60);
        assert_eq!(balance.available_credits, 60);
        assert_eq!(balance.locked_credits, 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_trade_value_overflow_rejected() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage.clone(), 100, Metrics::new().unwrap());
        let plantation_id = Uuid::new_v4();

        handle.initialize_balance(plantation_id).await.unwrap();
        handle.credit(plantation_id, u64::MAX).await.unwrap();

        let listing = handle
            .create_listing(plantation_id, Uuid::new_v4(), u64::MAX, Decimal::MAX)
            .await
            .unwrap();

        // credits x price exceeds Decimal's range
        let err = handle
            .execute_trade(listing.listing_id, Uuid::new_v4(), u64::MAX, "huge".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));

        // The failed trade settles nothing
        let listing = storage.get_listing(listing.listing_id).unwrap();
        assert_eq!(listing.remaining_credits, u64::MAX);
        assert_eq!(listing.status, crate::types::ListingStatus::Active);

        let balance = storage.get_balance(plantation_id).unwrap();
        assert_eq!(balance.locked_credits, u64::MAX);
        assert!(storage.lookup_idempotency("huge").unwrap().is_none());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_create_listing_insufficient() {
        let (storage, _temp) = test_storage();
        let handle = spawn_ledger_actor(storage, 100, Metrics::new().unwrap());
        let plantation_id = Uuid::new_v4();

        handle.initialize_balance(plantation_id).await.unwrap();
        handle.credit(plantation_id, 10).await.unwrap();

        let err = handle
            .create_listing(plantation_id, Uuid::new_v4(), 11, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientAvailable { .. }));

        handle.shutdown().await.unwrap();
    }
}
