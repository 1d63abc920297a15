//! Share Ledger
//!
//! Per-epoch share balances for one vault (ERC-1155 style: the epoch id is
//! the token id). Shares are minted 1:1 with the assets that back them and
//! `total_supply(epoch)` is the side's TVL until the epoch resolves.

use super::errors::{ProtocolError, ProtocolResult};
use super::types::{Address, Amount, EpochId};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    balances: HashMap<EpochId, BTreeMap<Address, Amount>>,
    supply: HashMap<EpochId, Amount>,
    /// (owner, operator) pairs allowed to act for the owner
    operators: HashSet<(Address, Address)>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: Address, epoch: EpochId) -> Amount {
        self.balances
            .get(&epoch)
            .and_then(|b| b.get(&account))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self, epoch: EpochId) -> Amount {
        self.supply.get(&epoch).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, epoch: EpochId, to: Address, shares: Amount) -> ProtocolResult<()> {
        if shares == 0 {
            return Ok(());
        }
        let supply = self
            .total_supply(epoch)
            .checked_add(shares)
            .ok_or(ProtocolError::MathOverflow("share supply"))?;
        *self
            .balances
            .entry(epoch)
            .or_default()
            .entry(to)
            .or_insert(0) += shares;
        self.supply.insert(epoch, supply);
        Ok(())
    }

    pub fn burn(&mut self, epoch: EpochId, from: Address, shares: Amount) -> ProtocolResult<()> {
        let available = self.balance_of(from, epoch);
        if available < shares {
            return Err(ProtocolError::InsufficientBalance {
                needed: shares,
                available,
            });
        }
        if shares == 0 {
            return Ok(());
        }
        if let Some(book) = self.balances.get_mut(&epoch) {
            if available == shares {
                book.remove(&from);
            } else {
                book.insert(from, available - shares);
            }
        }
        let supply = self.total_supply(epoch) - shares;
        self.supply.insert(epoch, supply);
        Ok(())
    }

    /// Holders of `epoch` in address order.
    pub fn holders(&self, epoch: EpochId) -> Vec<(Address, Amount)> {
        self.balances
            .get(&epoch)
            .map(|b| b.iter().map(|(a, s)| (*a, *s)).collect())
            .unwrap_or_default()
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    /// Caller is the owner or one of its operators.
    pub fn is_authorized(&self, caller: Address, owner: Address) -> bool {
        caller == owner || self.is_approved_for_all(owner, caller)
    }
}
