//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Invariant enforcement at the type level (the only mutators are
//!   checked transition methods)
//! - Exact arithmetic (integer credits, Decimal for prices)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Per-plantation green-credit balance.
///
/// Invariant: `total_credits == available_credits + locked_credits` after
/// every transition. The fields are public for reads; all writes go through
/// the checked methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantationBalance {
    /// Plantation this balance belongs to (one balance per plantation)
    pub plantation_id: Uuid,

    /// Total credits currently on the seller's ledger
    pub total_credits: u64,

    /// Credits that can still be listed for sale
    pub available_credits: u64,

    /// Credits locked in open listings
    pub locked_credits: u64,
}

impl PlantationBalance {
    /// Create a zeroed balance (plantation-registration time)
    pub fn new(plantation_id: Uuid) -> Self {
        Self {
            plantation_id,
            total_credits: 0,
            available_credits: 0,
            locked_credits: 0,
        }
    }

    /// Add newly issued credits: `total += amount; available += amount`.
    ///
    /// The amount comes from an external collaborator; an issuance that
    /// would overflow the ledger is rejected without touching the balance.
    pub fn credit(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "Credit amount must be positive".to_string(),
            ));
        }
        let total = self.total_credits.checked_add(amount).ok_or_else(|| {
            Error::InvalidAmount(format!(
                "crediting {} credits would overflow plantation {}: total = {}",
                amount, self.plantation_id, self.total_credits
            ))
        })?;
        // available <= total, so this cannot overflow once total fits
        self.total_credits = total;
        self.available_credits += amount;
        Ok(())
    }

    /// Move credits from available to locked (listing creation)
    pub fn lock(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "Lock amount must be positive".to_string(),
            ));
        }
        if self.available_credits < amount {
            return Err(Error::InsufficientAvailable {
                plantation_id: self.plantation_id,
                available: self.available_credits,
                requested: amount,
            });
        }
        self.available_credits -= amount;
        self.locked_credits += amount;
        Ok(())
    }

    /// Move credits from locked back to available (listing cancellation)
    pub fn unlock(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "Unlock amount must be positive".to_string(),
            ));
        }
        if self.locked_credits < amount {
            return Err(Error::InvariantViolation(format!(
                "cannot unlock {} credits on plantation {}: locked = {}",
                amount, self.plantation_id, self.locked_credits
            )));
        }
        self.locked_credits -= amount;
        self.available_credits += amount;
        Ok(())
    }

    /// Consume locked credits on a trade fill.
    ///
    /// Sold credits leave the seller's ledger entirely: `locked -= amount`
    /// and `total -= amount`, so total and available reflect only the
    /// unsold remainder. A shortfall in `locked` is ledger corruption and
    /// surfaces as a fatal `InvariantViolation`.
    pub fn consume_locked(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount(
                "Consume amount must be positive".to_string(),
            ));
        }
        if self.locked_credits < amount {
            return Err(Error::InvariantViolation(format!(
                "cannot consume {} locked credits on plantation {}: locked = {}",
                amount, self.plantation_id, self.locked_credits
            )));
        }
        self.locked_credits -= amount;
        self.total_credits -= amount;
        Ok(())
    }

    /// Verify `total == available + locked`
    pub fn check_invariant(&self) -> Result<()> {
        if self.total_credits != self.available_credits + self.locked_credits {
            return Err(Error::InvariantViolation(format!(
                "balance conservation broken on plantation {}: total = {}, available = {}, locked = {}",
                self.plantation_id,
                self.total_credits,
                self.available_credits,
                self.locked_credits
            )));
        }
        Ok(())
    }
}

/// Listing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ListingStatus {
    /// No fills yet, remaining == total
    Active = 1,
    /// At least one fill, remaining > 0
    PartiallyFilled = 2,
    /// Fully sold, remaining == 0 (terminal)
    Filled = 3,
    /// Withdrawn by the seller (terminal)
    Cancelled = 4,
}

impl ListingStatus {
    /// Check if no further trade can succeed against this listing
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListingStatus::Filled | ListingStatus::Cancelled)
    }
}

/// A sell listing backed by locked credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditListing {
    /// Unique listing ID (UUIDv7 for time-ordering)
    pub listing_id: Uuid,

    /// Plantation whose credits are offered
    pub plantation_id: Uuid,

    /// Owner who created the listing
    pub seller_id: Uuid,

    /// Quantity offered at creation (immutable)
    pub total_credits: u64,

    /// Quantity still for sale; decreases as trades fill it
    pub remaining_credits: u64,

    /// Price per credit (immutable, positive)
    pub price_per_credit: Decimal,

    /// Current status
    pub status: ListingStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CreditListing {
    /// Create a new active listing offering `credits` at `price_per_credit`
    pub fn new(
        plantation_id: Uuid,
        seller_id: Uuid,
        credits: u64,
        price_per_credit: Decimal,
    ) -> Result<Self> {
        if credits == 0 {
            return Err(Error::InvalidAmount(
                "Listing quantity must be positive".to_string(),
            ));
        }
        if price_per_credit <= Decimal::ZERO {
            return Err(Error::InvalidAmount(
                "Price per credit must be positive".to_string(),
            ));
        }

        Ok(Self {
            listing_id: Uuid::now_v7(),
            plantation_id,
            seller_id,
            total_credits: credits,
            remaining_credits: credits,
            price_per_credit,
            status: ListingStatus::Active,
            created_at: Utc::now(),
        })
    }

    /// Check if the listing accepts trades
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Fill `credits` from the listing.
    ///
    /// Status becomes `Filled` exactly when remaining hits zero, else
    /// `PartiallyFilled`.
    pub fn fill(&mut self, credits: u64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::ListingUnavailable(self.listing_id));
        }
        if credits == 0 {
            return Err(Error::InvalidAmount(
                "Trade quantity must be positive".to_string(),
            ));
        }
        if credits > self.remaining_credits {
            return Err(Error::InsufficientRemaining {
                listing_id: self.listing_id,
                remaining: self.remaining_credits,
                requested: credits,
            });
        }

        self.remaining_credits -= credits;
        self.status = if self.remaining_credits == 0 {
            ListingStatus::Filled
        } else {
            ListingStatus::PartiallyFilled
        };

        Ok(())
    }

    /// Cancel the listing, returning the quantity to unlock.
    pub fn cancel(&mut self) -> Result<u64> {
        if self.status.is_terminal() {
            return Err(Error::ListingUnavailable(self.listing_id));
        }
        let unlocked = self.remaining_credits;
        self.status = ListingStatus::Cancelled;
        Ok(unlocked)
    }
}

/// A settled trade. Immutable after creation, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade ID (UUIDv7)
    pub trade_id: Uuid,

    /// Listing the trade filled
    pub listing_id: Uuid,

    /// Industry user who bought the credits
    pub buyer_id: Uuid,

    /// Quantity purchased
    pub credits: u64,

    /// `credits × price_per_credit` at execution time
    pub total_price: Decimal,

    /// Caller-supplied key; unique across all trades
    pub idempotency_key: String,

    /// Execution timestamp
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_credit_and_lock() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(100).unwrap();
        assert_eq!(balance.total_credits, 100);
        assert_eq!(balance.available_credits, 100);

        balance.lock(40).unwrap();
        assert_eq!(balance.available_credits, 60);
        assert_eq!(balance.locked_credits, 40);
        balance.check_invariant().unwrap();
    }

    #[test]
    fn test_balance_credit_overflow_rejected() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(u64::MAX).unwrap();

        let err = balance.credit(1).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));

        // Rejected issuance leaves the balance untouched
        assert_eq!(balance.total_credits, u64::MAX);
        assert_eq!(balance.available_credits, u64::MAX);
        balance.check_invariant().unwrap();
    }

    #[test]
    fn test_balance_rejects_zero_amounts() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        assert!(matches!(balance.credit(0), Err(Error::InvalidAmount(_))));
        assert!(matches!(balance.lock(0), Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_balance_lock_insufficient() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(10).unwrap();

        let err = balance.lock(11).unwrap_err();
        assert!(matches!(err, Error::InsufficientAvailable { .. }));

        // Failed lock leaves the balance untouched
        assert_eq!(balance.available_credits, 10);
        assert_eq!(balance.locked_credits, 0);
    }

    #[test]
    fn test_balance_consume_removes_from_total() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(100).unwrap();
        balance.lock(40).unwrap();
        balance.consume_locked(40).unwrap();

        // Sold credits are gone, not returned to available
        assert_eq!(balance.total_credits, 60);
        assert_eq!(balance.available_credits, 60);
        assert_eq!(balance.locked_credits, 0);
        balance.check_invariant().unwrap();
    }

    #[test]
    fn test_balance_consume_over_locked_is_fatal() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(10).unwrap();
        balance.lock(5).unwrap();

        let err = balance.consume_locked(6).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_balance_unlock_roundtrip() {
        let mut balance = PlantationBalance::new(Uuid::new_v4());
        balance.credit(50).unwrap();
        balance.lock(30).unwrap();
        balance.unlock(30).unwrap();

        assert_eq!(balance.available_credits, 50);
        assert_eq!(balance.locked_credits, 0);
        balance.check_invariant().unwrap();
    }

    #[test]
    fn test_listing_requires_positive_price() {
        let result = CreditListing::new(Uuid::new_v4(), Uuid::new_v4(), 10, Decimal::ZERO);
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_listing_fill_status_transitions() {
        let mut listing =
            CreditListing::new(Uuid::new_v4(), Uuid::new_v4(), 40, Decimal::new(2, 0)).unwrap();
        assert_eq!(listing.status, ListingStatus::Active);

        listing.fill(10).unwrap();
        assert_eq!(listing.status, ListingStatus::PartiallyFilled);
        assert_eq!(listing.remaining_credits, 30);

        listing.fill(30).unwrap();
        assert_eq!(listing.status, ListingStatus::Filled);
        assert_eq!(listing.remaining_credits, 0);

        // Terminal status rejects further fills
        let err = listing.fill(1).unwrap_err();
        assert!(matches!(err, Error::ListingUnavailable(_)));
    }

    #[test]
    fn test_listing_fill_over_remaining() {
        let mut listing =
            CreditListing::new(Uuid::new_v4(), Uuid::new_v4(), 5, Decimal::ONE).unwrap();

        let err = listing.fill(6).unwrap_err();
        assert!(matches!(err, Error::InsufficientRemaining { .. }));
        assert_eq!(listing.remaining_credits, 5);
        assert_eq!(listing.status, ListingStatus::Active);
    }

    #[test]
    fn test_listing_cancel_returns_remaining() {
        let mut listing =
            CreditListing::new(Uuid::new_v4(), Uuid::new_v4(), 20, Decimal::ONE).unwrap();
        listing.fill(8).unwrap();

        let unlocked = listing.cancel().unwrap();
        assert_eq!(unlocked, 12);
        assert_eq!(listing.status, ListingStatus::Cancelled);

        assert!(matches!(listing.cancel(), Err(Error::ListingUnavailable(_))));
    }
}
