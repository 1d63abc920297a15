//! Access Control
//!
//! Privileged operations take an explicit `AuthContext` and check it against
//! one process-wide grant table instead of per-contract modifiers.

use super::errors::{ProtocolError, ProtocolResult};
use super::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Protocol roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "owner")]
    Owner, // market/epoch creation, controller deployment, role grants
    #[serde(rename = "time_locker")]
    TimeLocker, // delayed parameter changes
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Owner => "owner",
            Role::TimeLocker => "time_locker",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "owner" => Some(Role::Owner),
            "time_locker" | "timelocker" => Some(Role::TimeLocker),
            _ => None,
        }
    }
}

/// Identity of whoever submits an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub caller: Address,
}

impl AuthContext {
    pub fn new(caller: Address) -> Self {
        Self { caller }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    grants: HashSet<(Address, Role)>,
}

impl AccessControl {
    pub fn new(owner: Address, time_locker: Address) -> Self {
        let mut grants = HashSet::new();
        grants.insert((owner, Role::Owner));
        grants.insert((time_locker, Role::TimeLocker));
        Self { grants }
    }

    pub fn has_role(&self, account: Address, role: Role) -> bool {
        self.grants.contains(&(account, role))
    }

    pub fn require_owner(&self, ctx: &AuthContext) -> ProtocolResult<()> {
        if self.has_role(ctx.caller, Role::Owner) {
            Ok(())
        } else {
            Err(ProtocolError::NotAuthorized { caller: ctx.caller })
        }
    }

    pub fn require_time_locker(&self, ctx: &AuthContext) -> ProtocolResult<()> {
        if self.has_role(ctx.caller, Role::TimeLocker) {
            Ok(())
        } else {
            Err(ProtocolError::NotTimeLocker { caller: ctx.caller })
        }
    }

    /// Owner or time locker.
    pub fn require_admin(&self, ctx: &AuthContext) -> ProtocolResult<()> {
        if self.has_role(ctx.caller, Role::Owner) || self.has_role(ctx.caller, Role::TimeLocker) {
            Ok(())
        } else {
            Err(ProtocolError::NotAuthorized { caller: ctx.caller })
        }
    }

    pub fn grant(&mut self, ctx: &AuthContext, account: Address, role: Role) -> ProtocolResult<bool> {
        self.require_owner(ctx)?;
        if account.is_zero() {
            return Err(ProtocolError::AddressZero { field: "account" });
        }
        Ok(self.grants.insert((account, role)))
    }

    /// Revoking the caller's own last owner grant is refused so the table can
    /// never lock itself out.
    pub fn revoke(&mut self, ctx: &AuthContext, account: Address, role: Role) -> ProtocolResult<bool> {
        self.require_owner(ctx)?;
        if role == Role::Owner && self.holders(Role::Owner).len() <= 1 && self.has_role(account, role) {
            return Err(ProtocolError::NotAuthorized { caller: ctx.caller });
        }
        Ok(self.grants.remove(&(account, role)))
    }

    pub fn holders(&self, role: Role) -> Vec<Address> {
        let mut out: Vec<Address> = self
            .grants
            .iter()
            .filter(|(_, r)| *r == role)
            .map(|(a, _)| *a)
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (AccessControl, Address, Address) {
        let owner = Address::derive("owner");
        let locker = Address::derive("timelock");
        (AccessControl::new(owner, locker), owner, locker)
    }

    #[test]
    fn test_role_checks() {
        let (acl, owner, locker) = table();
        let stranger = AuthContext::new(Address::derive("stranger"));

        assert!(acl.require_owner(&AuthContext::new(owner)).is_ok());
        assert!(acl.require_time_locker(&AuthContext::new(locker)).is_ok());
        assert!(acl.require_admin(&AuthContext::new(locker)).is_ok());
        assert!(matches!(
            acl.require_time_locker(&AuthContext::new(owner)),
            Err(ProtocolError::NotTimeLocker { .. })
        ));
        assert!(matches!(
            acl.require_admin(&stranger),
            Err(ProtocolError::NotAuthorized { .. })
        ));
    }

    #[test]
    fn test_grant_and_revoke() {
        let (mut acl, owner, _) = table();
        let ctx = AuthContext::new(owner);
        let keeper = Address::derive("keeper");

        assert!(acl.grant(&ctx, keeper, Role::TimeLocker).unwrap());
        assert!(acl.has_role(keeper, Role::TimeLocker));
        assert!(acl.revoke(&ctx, keeper, Role::TimeLocker).unwrap());
        assert!(!acl.has_role(keeper, Role::TimeLocker));

        // last owner cannot be removed
        assert!(acl.revoke(&ctx, owner, Role::Owner).is_err());
        assert!(acl
            .grant(&AuthContext::new(keeper), keeper, Role::Owner)
            .is_err());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::from_str("TimeLocker"), Some(Role::TimeLocker));
        assert_eq!(Role::Owner.as_str(), "owner");
        assert_eq!(Role::from_str("admin"), None);
    }
}
