//! End-to-end marketplace walkthrough.
//!
//! Registers a plantation, issues credits, lists 40 of them, settles a full
//! buy, then replays the same idempotency key to show exactly-once
//! settlement.
//!
//! Run with:
//! ```bash
//! cargo run --bin marketplace-demo
//! ```

use anyhow::Result;
use marketplace::{
    Config, CreateListingRequest, MarketplaceEngine, OwnerRegistry, Principal, Role, TradeRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let temp_dir = tempfile_dir()?;
    let mut config = Config::default();
    config.ledger_data_dir = temp_dir.clone();

    let registry = Arc::new(OwnerRegistry::new());
    let engine = MarketplaceEngine::open(config, registry.clone()).await?;

    let owner = Principal::new(Uuid::new_v4(), Role::PlantationOwner);
    let buyer = Principal::new(Uuid::new_v4(), Role::Industry);
    let plantation_id = Uuid::new_v4();

    // Register and issue 100 credits
    registry.register(plantation_id, owner.user_id);
    engine.register_plantation(&owner, plantation_id).await?;
    let balance = engine.issue_credits(&owner, plantation_id, 100).await?;
    info!(
        total = balance.total_credits,
        available = balance.available_credits,
        "Issued credits"
    );

    // List 40 credits at 2.0 each
    let listing = engine
        .create_listing(
            &owner,
            CreateListingRequest {
                plantation_id,
                credits: 40,
                price_per_credit: Decimal::new(2, 0),
            },
        )
        .await?;

    let open = engine.open_listings()?;
    info!(open_listings = open.len(), "Marketplace state");

    // Buy all 40
    let trade = engine
        .execute_trade(
            &buyer,
            TradeRequest {
                listing_id: listing.listing_id,
                credits: 40,
                idempotency_key: Some("demo-buy-1".to_string()),
            },
        )
        .await?;
    info!(
        trade_id = %trade.trade_id,
        total_price = %trade.total_price,
        "Trade settled"
    );

    // Retry with the same key: the original trade comes back, nothing moves
    let replay = engine
        .execute_trade(
            &buyer,
            TradeRequest {
                listing_id: listing.listing_id,
                credits: 40,
                idempotency_key: Some("demo-buy-1".to_string()),
            },
        )
        .await?;
    assert_eq!(replay.trade_id, trade.trade_id);
    info!(trade_id = %replay.trade_id, "Replay returned the original trade");

    let dashboard = engine.plantation_dashboard(&owner, plantation_id)?;
    info!(
        total = dashboard.balance.total_credits,
        available = dashboard.balance.available_credits,
        locked = dashboard.balance.locked_credits,
        open_listings = dashboard.open_listings.len(),
        "Owner dashboard"
    );

    engine.shutdown().await?;
    std::fs::remove_dir_all(&temp_dir)?;
    Ok(())
}

fn tempfile_dir() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("marketplace-demo-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
