//! Boundary types for the marketplace engine

use credit_ledger::{CreditListing, PlantationBalance};
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Role of an authenticated user, supplied by the auth collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Registers plantations, receives credits, creates listings
    PlantationOwner,
    /// Buys credits
    Industry,
    /// Monitors the system
    Admin,
}

/// Authenticated principal, supplied by the auth collaborator.
///
/// The engine never derives identity itself; it only checks capabilities
/// against this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User ID
    pub user_id: Uuid,

    /// Role
    pub role: Role,
}

impl Principal {
    /// Create a new principal
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Request to create a sell listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateListingRequest {
    /// Plantation whose credits are offered
    pub plantation_id: Uuid,

    /// Quantity to lock and offer
    pub credits: u64,

    /// Price per credit
    pub price_per_credit: Decimal,
}

/// Request to buy credits from a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Target listing
    pub listing_id: Uuid,

    /// Quantity to buy
    pub credits: u64,

    /// Caller-supplied idempotency key (mandatory; e.g. from a request
    /// header)
    pub idempotency_key: Option<String>,
}

/// Aggregated owner view of one plantation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantationDashboard {
    /// Plantation ID
    pub plantation_id: Uuid,

    /// Current credit balance
    pub balance: PlantationBalance,

    /// Active and partially filled listings
    pub open_listings: Vec<CreditListing>,
}
