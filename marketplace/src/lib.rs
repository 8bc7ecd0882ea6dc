//! Verdi Marketplace
//!
//! Boundary layer over the credit ledger: request validation, role and
//! ownership checks, and owner-facing aggregates. Identity comes from an
//! external auth collaborator as a [`Principal`]; this crate checks
//! capabilities via [`AccessPolicy`] and delegates all state changes to
//! `credit_ledger`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;

// Re-exports
pub use auth::{AccessPolicy, OwnerRegistry};
pub use config::Config;
pub use engine::MarketplaceEngine;
pub use error::{Error, Result};
pub use types::{
    CreateListingRequest, PlantationDashboard, Principal, Role, TradeRequest,
};
