//! Marketplace engine
//!
//! Thin boundary over the credit ledger: validates requests, runs capability
//! checks through the [`AccessPolicy`], then delegates to the ledger. All
//! balance and trade semantics live in the ledger; nothing here mutates
//! state directly.

use crate::{
    auth::AccessPolicy,
    types::{CreateListingRequest, PlantationDashboard, Principal, TradeRequest},
    Config, Error, Result,
};
use credit_ledger::{CreditLedger, CreditListing, Metrics, PlantationBalance, Trade};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Marketplace engine
pub struct MarketplaceEngine {
    ledger: Arc<CreditLedger>,
    policy: Arc<dyn AccessPolicy>,
    config: Config,
}

impl std::fmt::Debug for MarketplaceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MarketplaceEngine {
    /// Open the engine, creating the embedded ledger from `config`
    pub async fn open(config: Config, policy: Arc<dyn AccessPolicy>) -> Result<Self> {
        let ledger = CreditLedger::open(config.ledger_config()).await?;

        info!(
            service = %config.service_name,
            version = %config.service_version,
            "Marketplace engine started"
        );

        Ok(Self {
            ledger: Arc::new(ledger),
            policy,
            config,
        })
    }

    /// Register a new plantation for the calling owner.
    ///
    /// Creates the zeroed balance; ownership recording is the policy's
    /// concern and happens at the auth layer.
    #[instrument(skip(self))]
    pub async fn register_plantation(
        &self,
        principal: &Principal,
        plantation_id: Uuid,
    ) -> Result<PlantationBalance> {
        self.policy.can_manage_plantation(principal, plantation_id)?;

        let balance = self.ledger.initialize_balance(plantation_id).await?;
        info!(%plantation_id, owner = %principal.user_id, "Plantation registered");
        Ok(balance)
    }

    /// Issue verified credits to a plantation, owner-only
    #[instrument(skip(self))]
    pub async fn issue_credits(
        &self,
        principal: &Principal,
        plantation_id: Uuid,
        amount: u64,
    ) -> Result<PlantationBalance> {
        self.policy.can_manage_plantation(principal, plantation_id)?;

        let balance = self.ledger.credit(plantation_id, amount).await?;
        info!(%plantation_id, amount, "Credits issued");
        Ok(balance)
    }

    /// Create a sell listing over the caller's plantation
    #[instrument(skip(self, request), fields(plantation_id = %request.plantation_id))]
    pub async fn create_listing(
        &self,
        principal: &Principal,
        request: CreateListingRequest,
    ) -> Result<CreditListing> {
        self.policy
            .can_manage_plantation(principal, request.plantation_id)?;

        let listing = self
            .ledger
            .create_listing(
                request.plantation_id,
                principal.user_id,
                request.credits,
                request.price_per_credit,
            )
            .await?;

        info!(
            listing_id = %listing.listing_id,
            credits = listing.total_credits,
            "Listing created"
        );
        Ok(listing)
    }

    /// All active and partially filled listings, any role
    pub fn open_listings(&self) -> Result<Vec<CreditListing>> {
        self.ledger
            .open_listings(None)?
            .collect::<credit_ledger::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Buy credits from a listing.
    ///
    /// The idempotency key is mandatory; retried requests carrying the same
    /// key observe the original trade.
    #[instrument(skip(self, request), fields(listing_id = %request.listing_id))]
    pub async fn execute_trade(
        &self,
        principal: &Principal,
        request: TradeRequest,
    ) -> Result<Trade> {
        self.policy.can_trade(principal)?;

        let key = match request.idempotency_key {
            Some(key) if !key.is_empty() => key,
            _ => return Err(Error::MissingIdempotencyKey),
        };

        let trade = self
            .ledger
            .execute_trade(request.listing_id, principal.user_id, request.credits, key)
            .await?;

        info!(
            trade_id = %trade.trade_id,
            credits = trade.credits,
            total_price = %trade.total_price,
            "Trade settled"
        );
        Ok(trade)
    }

    /// Cancel one of the caller's listings, unlocking its remaining credits
    #[instrument(skip(self))]
    pub async fn cancel_listing(
        &self,
        principal: &Principal,
        listing_id: Uuid,
    ) -> Result<CreditListing> {
        let listing = self.ledger.listing(listing_id)?;
        self.policy
            .can_manage_plantation(principal, listing.plantation_id)?;

        let cancelled = self.ledger.cancel_listing(listing_id).await?;
        info!(%listing_id, unlocked = cancelled.remaining_credits, "Listing cancelled");
        Ok(cancelled)
    }

    /// Current balance of the caller's plantation
    pub fn balance(
        &self,
        principal: &Principal,
        plantation_id: Uuid,
    ) -> Result<PlantationBalance> {
        self.policy.can_manage_plantation(principal, plantation_id)?;
        Ok(self.ledger.balance(plantation_id)?)
    }

    /// Owner view of one plantation: balance plus its open listings
    pub fn plantation_dashboard(
        &self,
        principal: &Principal,
        plantation_id: Uuid,
    ) -> Result<PlantationDashboard> {
        self.policy.can_manage_plantation(principal, plantation_id)?;

        let balance = self.ledger.balance(plantation_id)?;
        let open_listings = self
            .ledger
            .open_listings(Some(plantation_id))?
            .collect::<credit_ledger::Result<Vec<_>>>()?;

        Ok(PlantationDashboard {
            plantation_id,
            balance,
            open_listings,
        })
    }

    /// Ledger metrics collector
    pub fn metrics(&self) -> &Metrics {
        self.ledger.metrics()
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown, flushing the embedded ledger
    pub async fn shutdown(self) -> Result<()> {
        match Arc::try_unwrap(self.ledger) {
            Ok(ledger) => Ok(ledger.shutdown().await?),
            // Other handles still alive; the actor stops when they drop
            Err(_) => Ok(()),
        }
    }
}
