//! Capability checks for marketplace operations
//!
//! Identity is established by an external auth collaborator; the engine
//! only receives a [`Principal`] and asks this module whether the caller
//! may perform an operation. Ownership of plantations is tracked here so
//! the ledger stays identity-free.

use crate::{
    types::{Principal, Role},
    Error, Result,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Authorization seam between the auth collaborator and the engine.
///
/// Implementations answer capability questions; they never mutate ledger
/// state.
pub trait AccessPolicy: Send + Sync {
    /// May this principal manage (list, cancel, view) the plantation?
    fn can_manage_plantation(&self, principal: &Principal, plantation_id: Uuid) -> Result<()>;

    /// May this principal buy credits?
    fn can_trade(&self, principal: &Principal) -> Result<()>;
}

/// In-process policy backed by a plantation -> owner map.
///
/// Owners may only manage their own plantations; admins may manage any.
/// Only industry users may trade.
#[derive(Debug, Default)]
pub struct OwnerRegistry {
    owners: RwLock<HashMap<Uuid, Uuid>>,
}

impl OwnerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner_id` as the owner of `plantation_id`
    pub fn register(&self, plantation_id: Uuid, owner_id: Uuid) {
        self.owners.write().insert(plantation_id, owner_id);
    }

    /// Owner of a plantation, if registered
    pub fn owner_of(&self, plantation_id: Uuid) -> Option<Uuid> {
        self.owners.read().get(&plantation_id).copied()
    }
}

impl AccessPolicy for OwnerRegistry {
    fn can_manage_plantation(&self, principal: &Principal, plantation_id: Uuid) -> Result<()> {
        match principal.role {
            Role::Admin => Ok(()),
            Role::PlantationOwner => match self.owner_of(plantation_id) {
                Some(owner_id) if owner_id == principal.user_id => Ok(()),
                Some(_) => Err(Error::Forbidden(format!(
                    "user {} does not own plantation {}",
                    principal.user_id, plantation_id
                ))),
                None => Err(Error::Forbidden(format!(
                    "plantation {} is not registered",
                    plantation_id
                ))),
            },
            Role::Industry => Err(Error::Forbidden(
                "industry users cannot manage plantations".to_string(),
            )),
        }
    }

    fn can_trade(&self, principal: &Principal) -> Result<()> {
        match principal.role {
            Role::Industry => Ok(()),
            Role::PlantationOwner | Role::Admin => Err(Error::Forbidden(format!(
                "role {:?} cannot buy credits",
                principal.role
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_can_manage_own_plantation() {
        let registry = OwnerRegistry::new();
        let owner = Principal::new(Uuid::new_v4(), Role::PlantationOwner);
        let plantation_id = Uuid::new_v4();

        registry.register(plantation_id, owner.user_id);
        registry.can_manage_plantation(&owner, plantation_id).unwrap();
    }

    #[test]
    fn test_owner_cannot_manage_foreign_plantation() {
        let registry = OwnerRegistry::new();
        let owner = Principal::new(Uuid::new_v4(), Role::PlantationOwner);
        let plantation_id = Uuid::new_v4();

        registry.register(plantation_id, Uuid::new_v4());
        let err = registry
            .can_manage_plantation(&owner, plantation_id)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_admin_manages_any_plantation() {
        let registry = OwnerRegistry::new();
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);

        registry
            .can_manage_plantation(&admin, Uuid::new_v4())
            .unwrap();
    }

    #[test]
    fn test_only_industry_trades() {
        let registry = OwnerRegistry::new();

        registry
            .can_trade(&Principal::new(Uuid::new_v4(), Role::Industry))
            .unwrap();

        let err = registry
            .can_trade(&Principal::new(Uuid::new_v4(), Role::PlantationOwner))
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
