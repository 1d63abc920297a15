//! Token Ledgers
//!
//! In-memory ERC-20 style balances for the underlying assets and the
//! emissions token. Vaults and the controller never touch ledgers directly:
//! they return `TokenMovement`s and the engine settles them in order inside
//! the same transaction, so a failed transfer reverts the whole operation.

use super::errors::{ProtocolError, ProtocolResult};
use super::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Allowance value that is never decremented.
pub const UNLIMITED_ALLOWANCE: Amount = u128::MAX;

#[derive(Debug, Clone)]
pub struct TokenLedger {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
}

impl TokenLedger {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: 0,
        }
    }

    pub fn balance_of(&self, account: Address) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn set_balance(&mut self, account: Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Faucet mint.
    pub fn mint(&mut self, to: Address, amount: Amount) -> ProtocolResult<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ProtocolError::MathOverflow("token supply"))?;
        *self.balances.entry(to).or_insert(0) += amount;
        self.total_supply = supply;
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        if spender != from {
            let allowed = self.allowance(from, spender);
            if allowed < amount {
                return Err(ProtocolError::InsufficientAllowance {
                    needed: amount,
                    available: allowed,
                });
            }
            if allowed != UNLIMITED_ALLOWANCE {
                self.approve(from, spender, allowed - amount);
            }
        }
        self.transfer(from, to, amount)
    }
}

/// A transfer intent produced by protocol logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMovement {
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    TransferFrom {
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
}

impl TokenMovement {
    pub fn token(&self) -> Address {
        match self {
            TokenMovement::Transfer { token, .. } | TokenMovement::TransferFrom { token, .. } => *token,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            TokenMovement::Transfer { amount, .. } | TokenMovement::TransferFrom { amount, .. } => {
                *amount
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenLedger>,
}

impl TokenRegistry {
    pub fn register(&mut self, ledger: TokenLedger) -> bool {
        if self.tokens.contains_key(&ledger.address) {
            return false;
        }
        self.tokens.insert(ledger.address, ledger);
        true
    }

    pub fn contains(&self, token: Address) -> bool {
        self.tokens.contains_key(&token)
    }

    pub fn get(&self, token: Address) -> ProtocolResult<&TokenLedger> {
        self.tokens
            .get(&token)
            .ok_or(ProtocolError::UnknownToken(token))
    }

    pub fn get_mut(&mut self, token: Address) -> ProtocolResult<&mut TokenLedger> {
        self.tokens
            .get_mut(&token)
            .ok_or(ProtocolError::UnknownToken(token))
    }

    pub fn balance_of(&self, token: Address, account: Address) -> Amount {
        self.tokens
            .get(&token)
            .map(|t| t.balance_of(account))
            .unwrap_or(0)
    }

    /// Apply movements in order. Zero-amount movements are skipped.
    pub fn settle(&mut self, movements: &[TokenMovement]) -> ProtocolResult<()> {
        for movement in movements {
            if movement.amount() == 0 {
                continue;
            }
            match *movement {
                TokenMovement::Transfer {
                    token,
                    from,
                    to,
                    amount,
                } => self.get_mut(token)?.transfer(from, to, amount)?,
                TokenMovement::TransferFrom {
                    token,
                    spender,
                    from,
                    to,
                    amount,
                } => self.get_mut(token)?.transfer_from(spender, from, to, amount)?,
            }
        }
        Ok(())
    }
}

// =============================================================================
// UNDO
// =============================================================================

/// Pre-images of the balances, allowances and supplies a transaction wrote.
/// Only the first write to each entry is recorded.
#[derive(Debug, Default)]
pub(crate) struct TokenUndo {
    registered: Vec<Address>,
    balances: HashMap<(Address, Address), Amount>,
    allowances: HashMap<(Address, Address, Address), Amount>,
    supplies: HashMap<Address, Amount>,
}

impl TokenUndo {
    fn balance(&mut self, ledger: &TokenLedger, account: Address) {
        self.balances
            .entry((ledger.address, account))
            .or_insert_with(|| ledger.balance_of(account));
    }

    fn allowance(&mut self, ledger: &TokenLedger, owner: Address, spender: Address) {
        self.allowances
            .entry((ledger.address, owner, spender))
            .or_insert_with(|| ledger.allowance(owner, spender));
    }

    fn supply(&mut self, ledger: &TokenLedger) {
        self.supplies
            .entry(ledger.address)
            .or_insert(ledger.total_supply);
    }

    /// Entries that would be restored on rollback.
    pub fn len(&self) -> usize {
        self.registered.len() + self.balances.len() + self.allowances.len() + self.supplies.len()
    }
}

impl TokenRegistry {
    pub(crate) fn register_logged(&mut self, ledger: TokenLedger, undo: &mut TokenUndo) -> bool {
        let address = ledger.address;
        let added = self.register(ledger);
        if added {
            undo.registered.push(address);
        }
        added
    }

    pub(crate) fn mint_logged(
        &mut self,
        token: Address,
        to: Address,
        amount: Amount,
        undo: &mut TokenUndo,
    ) -> ProtocolResult<()> {
        let ledger = self.get_mut(token)?;
        undo.balance(ledger, to);
        undo.supply(ledger);
        ledger.mint(to, amount)
    }

    pub(crate) fn approve_logged(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: Amount,
        undo: &mut TokenUndo,
    ) -> ProtocolResult<()> {
        let ledger = self.get_mut(token)?;
        undo.allowance(ledger, owner, spender);
        ledger.approve(owner, spender, amount);
        Ok(())
    }

    /// `settle`, recording every entry the movements can write first.
    pub(crate) fn settle_logged(&mut self, movements: &[TokenMovement], undo: &mut TokenUndo) -> ProtocolResult<()> {
        for movement in movements.iter().filter(|m| m.amount() > 0) {
            let ledger = self.get(movement.token())?;
            match *movement {
                TokenMovement::Transfer { from, to, .. } => {
                    undo.balance(ledger, from);
                    undo.balance(ledger, to);
                }
                TokenMovement::TransferFrom {
                    spender, from, to, ..
                } => {
                    undo.allowance(ledger, from, spender);
                    undo.balance(ledger, from);
                    undo.balance(ledger, to);
                }
            }
        }
        self.settle(movements)
    }

    pub(crate) fn rollback(&mut self, undo: TokenUndo) {
        for ((token, account), amount) in undo.balances {
            if let Some(ledger) = self.tokens.get_mut(&token) {
                ledger.set_balance(account, amount);
            }
        }
        for ((token, owner, spender), amount) in undo.allowances {
            if let Some(ledger) = self.tokens.get_mut(&token) {
                ledger.approve(owner, spender, amount);
            }
        }
        for (token, supply) in undo.supplies {
            if let Some(ledger) = self.tokens.get_mut(&token) {
                ledger.total_supply = supply;
            }
        }
        for token in undo.registered {
            self.tokens.remove(&token);
        }
    }
}
