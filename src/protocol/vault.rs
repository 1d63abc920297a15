//! Vault
//!
//! One side (premium or collateral) of one market. A vault owns the share
//! ledger for every epoch of its market, the resolution snapshots the
//! controller writes, and, for carousel vaults, the deposit and rollover
//! queues.
//!
//! ```text
//!                 ┌────────────────────── Vault ──────────────────────┐
//!   deposit ─────▶│ Plain:    mint shares 1:1                         │
//!                 │ Carousel: DepositQueue ──mint_deposit_in_queue──▶ │──▶ ShareLedger
//!                 │           RolloverQueue ──mint_rollovers───────▶  │
//!   withdraw ◀────│ shares × claim_tvl / final_tvl                     │
//!                 └───────────────────────────────────────────────────┘
//! ```
//!
//! Vault methods never move tokens. They return the `TokenMovement`s the
//! operation implies and the engine settles them in the same transaction.

use super::epoch::{EpochConfig, EpochSettlement, EpochStatus};
use super::errors::{ProtocolError, ProtocolResult};
use super::ledger::ShareLedger;
use super::queue::{DepositQueue, RolloverQueue};
use super::token::TokenMovement;
use super::types::{bps_of, mul_div_down, mul_div_up, Address, Amount, EpochId, MarketId, Timestamp, VaultSide};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// =============================================================================
// VARIANTS
// =============================================================================

/// Queueing parameters of a carousel vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselParams {
    /// Fee taken from each queued deposit when it is minted (basis points).
    pub deposit_fee_bps: u16,
    /// Fee paid to the relayer per executed rollover (wei).
    pub relayer_fee: Amount,
    /// Smallest queued deposit or rollover accepted (wei).
    pub min_queue_deposit: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultKind {
    /// Mints on deposit; no queues, no rollovers.
    Plain,
    /// Queued deposits and rollovers.
    Carousel(CarouselParams),
}

impl VaultKind {
    pub fn supports_queueing(&self) -> bool {
        matches!(self, VaultKind::Carousel(_))
    }
}

/// Immutable identity of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIdentity {
    pub address: Address,
    pub market_id: MarketId,
    pub side: VaultSide,
    /// Underlying asset deposited and paid out.
    pub asset: Address,
    /// Pegged token being insured.
    pub token: Address,
    pub strike: Amount,
    pub name: String,
    pub token_uri: String,
    pub emissions_token: Option<Address>,
}

// =============================================================================
// RECEIPTS
// =============================================================================

/// Result of a state change plus the token transfers it requires.
#[derive(Debug, Clone)]
pub(crate) struct Applied<T> {
    pub value: T,
    pub movements: Vec<TokenMovement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub vault: Address,
    pub epoch_id: EpochId,
    pub receiver: Address,
    pub assets: Amount,
    /// Shares minted now (0 when queued).
    pub shares_minted: Amount,
    /// Queue sequence number when the deposit was queued.
    pub queue_seq: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedDeposit {
    pub depositor: Address,
    pub receiver: Address,
    pub assets: Amount,
    pub fee: Amount,
    pub shares: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMintReceipt {
    pub vault: Address,
    pub epoch_id: EpochId,
    pub minted: Vec<MintedDeposit>,
    pub shares_minted: Amount,
    pub deposit_fees: Amount,
    /// Entries still pending for the epoch.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub shares_burned: Amount,
    pub assets: Amount,
    pub emissions: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverExecution {
    pub owner: Address,
    pub from_epoch: EpochId,
    pub shares_burned: Amount,
    pub shares_minted: Amount,
    pub emissions: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverMintReceipt {
    pub vault: Address,
    pub epoch_id: EpochId,
    /// Slots visited, including skipped ones.
    pub processed: usize,
    pub executions: Vec<RolloverExecution>,
    pub relayer_fees: Amount,
    /// `rollover_accounting` after the call.
    pub cursor: usize,
}

// =============================================================================
// VAULT
// =============================================================================

#[derive(Debug, Clone)]
pub struct Vault {
    identity: VaultIdentity,
    kind: VaultKind,
    controller: Address,
    epochs: Vec<EpochId>,
    configs: HashMap<EpochId, EpochConfig>,
    settlements: HashMap<EpochId, EpochSettlement>,
    emissions: HashMap<EpochId, Amount>,
    ledger: ShareLedger,
    deposit_queue: DepositQueue,
    rollover_queue: RolloverQueue,
}

impl Vault {
    pub fn new(identity: VaultIdentity, kind: VaultKind, controller: Address) -> Self {
        Self {
            identity,
            kind,
            controller,
            epochs: Vec::new(),
            configs: HashMap::new(),
            settlements: HashMap::new(),
            emissions: HashMap::new(),
            ledger: ShareLedger::new(),
            deposit_queue: DepositQueue::new(),
            rollover_queue: RolloverQueue::new(),
        }
    }

    // -------------------------------------------------------------------------
    // identity
    // -------------------------------------------------------------------------

    pub fn identity(&self) -> &VaultIdentity {
        &self.identity
    }

    pub fn address(&self) -> Address {
        self.identity.address
    }

    pub fn side(&self) -> VaultSide {
        self.identity.side
    }

    pub fn asset(&self) -> Address {
        self.identity.asset
    }

    pub fn kind(&self) -> VaultKind {
        self.kind
    }

    pub fn supports_queueing(&self) -> bool {
        self.kind.supports_queueing()
    }

    pub fn carousel_params(&self) -> Option<CarouselParams> {
        match self.kind {
            VaultKind::Carousel(params) => Some(params),
            VaultKind::Plain => None,
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    fn carousel(&self, operation: &'static str) -> ProtocolResult<CarouselParams> {
        self.carousel_params()
            .ok_or(ProtocolError::QueueingNotSupported { operation })
    }

    // -------------------------------------------------------------------------
    // epochs
    // -------------------------------------------------------------------------

    pub fn epochs(&self) -> &[EpochId] {
        &self.epochs
    }

    pub fn latest_epoch(&self) -> Option<EpochId> {
        self.epochs.last().copied()
    }

    fn previous_epoch(&self, epoch: EpochId) -> Option<EpochId> {
        let pos = self.epochs.iter().position(|e| *e == epoch)?;
        pos.checked_sub(1).map(|p| self.epochs[p])
    }

    pub fn epoch_exists(&self, epoch: EpochId) -> bool {
        self.configs.contains_key(&epoch)
    }

    pub fn epoch_config(&self, epoch: EpochId) -> ProtocolResult<&EpochConfig> {
        self.configs
            .get(&epoch)
            .ok_or(ProtocolError::EpochNotExist(epoch))
    }

    pub fn settlement(&self, epoch: EpochId) -> EpochSettlement {
        self.settlements.get(&epoch).copied().unwrap_or_default()
    }

    pub fn epoch_status(&self, epoch: EpochId, now: Timestamp) -> ProtocolResult<EpochStatus> {
        let config = self.epoch_config(epoch)?;
        Ok(EpochStatus::derive(config, &self.settlement(epoch), now))
    }

    pub fn epoch_resolved(&self, epoch: EpochId) -> bool {
        self.settlement(epoch).resolved
    }

    pub fn epoch_null(&self, epoch: EpochId) -> bool {
        self.settlement(epoch).null
    }

    pub fn epoch_depegged(&self, epoch: EpochId) -> bool {
        self.settlement(epoch).depegged
    }

    pub fn final_tvl(&self, epoch: EpochId) -> Amount {
        self.settlement(epoch).final_tvl
    }

    pub fn claim_tvl(&self, epoch: EpochId) -> Amount {
        self.settlement(epoch).claim_tvl
    }

    pub fn emissions(&self, epoch: EpochId) -> Amount {
        self.emissions.get(&epoch).copied().unwrap_or(0)
    }

    /// Share supply of `epoch`.
    pub fn total_assets(&self, epoch: EpochId) -> Amount {
        self.ledger.total_supply(epoch)
    }

    pub fn balance_of(&self, account: Address, epoch: EpochId) -> Amount {
        self.ledger.balance_of(account, epoch)
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    pub fn deposit_queue(&self) -> &DepositQueue {
        &self.deposit_queue
    }

    pub fn rollover_queue(&self) -> &RolloverQueue {
        &self.rollover_queue
    }

    // -------------------------------------------------------------------------
    // pricing
    // -------------------------------------------------------------------------

    /// `(fee, assets_after_fee)` for a queued deposit of `assets`.
    pub fn get_epoch_deposit_fee(&self, epoch: EpochId, assets: Amount) -> ProtocolResult<(Amount, Amount)> {
        self.epoch_config(epoch)?;
        let fee = match self.kind {
            VaultKind::Carousel(params) => bps_of(assets, params.deposit_fee_bps),
            VaultKind::Plain => 0,
        };
        Ok((fee, assets - fee))
    }

    /// Assets `shares` of a resolved epoch redeem for. Zero before
    /// resolution.
    pub fn preview_withdraw(&self, epoch: EpochId, shares: Amount) -> ProtocolResult<Amount> {
        self.epoch_config(epoch)?;
        let settlement = self.settlement(epoch);
        if !settlement.resolved || settlement.final_tvl == 0 {
            return Ok(0);
        }
        mul_div_down(shares, settlement.claim_tvl, settlement.final_tvl)
            .ok_or(ProtocolError::MathOverflow("preview_withdraw"))
    }

    /// Emissions `shares` of a resolved, non-null epoch are entitled to.
    pub fn preview_emissions_withdraw(&self, epoch: EpochId, shares: Amount) -> ProtocolResult<Amount> {
        self.epoch_config(epoch)?;
        let settlement = self.settlement(epoch);
        let emissions = self.emissions(epoch);
        if !settlement.resolved || settlement.null || settlement.final_tvl == 0 || emissions == 0 {
            return Ok(0);
        }
        mul_div_down(shares, emissions, settlement.final_tvl)
            .ok_or(ProtocolError::MathOverflow("preview_emissions_withdraw"))
    }

    /// Shares that redeem for at least `assets` in a resolved epoch.
    pub fn preview_amount_in_shares(&self, epoch: EpochId, assets: Amount) -> ProtocolResult<Amount> {
        self.epoch_config(epoch)?;
        let settlement = self.settlement(epoch);
        if !settlement.resolved || settlement.claim_tvl == 0 {
            return Ok(0);
        }
        mul_div_up(assets, settlement.final_tvl, settlement.claim_tvl)
            .ok_or(ProtocolError::MathOverflow("preview_amount_in_shares"))
    }

    // -------------------------------------------------------------------------
    // deposits
    // -------------------------------------------------------------------------

    fn require_open(&self, epoch: EpochId, now: Timestamp) -> ProtocolResult<EpochConfig> {
        let config = *self.epoch_config(epoch)?;
        if self.settlement(epoch).resolved {
            return Err(ProtocolError::EpochFinishedAlready);
        }
        if config.has_ended(now) {
            return Err(ProtocolError::EpochExpired);
        }
        Ok(config)
    }

    /// Pull `assets` from `caller`. Plain vaults mint to `receiver` at once;
    /// carousel vaults queue the deposit.
    pub(crate) fn deposit(
        &mut self,
        now: Timestamp,
        caller: Address,
        epoch: EpochId,
        assets: Amount,
        receiver: Address,
    ) -> ProtocolResult<Applied<DepositReceipt>> {
        if receiver.is_zero() {
            return Err(ProtocolError::AddressZero { field: "receiver" });
        }
        self.require_open(epoch, now)?;
        if assets == 0 {
            return Err(ProtocolError::InvalidAmount {
                amount: 0,
                minimum: 1,
            });
        }

        let pull = TokenMovement::TransferFrom {
            token: self.identity.asset,
            spender: self.identity.address,
            from: caller,
            to: self.identity.address,
            amount: assets,
        };

        let (shares_minted, queue_seq) = match self.kind {
            VaultKind::Plain => {
                self.ledger.mint(epoch, receiver, assets)?;
                (assets, None)
            }
            VaultKind::Carousel(params) => {
                if assets < params.min_queue_deposit {
                    return Err(ProtocolError::InvalidAmount {
                        amount: assets,
                        minimum: params.min_queue_deposit,
                    });
                }
                let seq = self.deposit_queue.push(epoch, caller, receiver, assets);
                (0, Some(seq))
            }
        };

        Ok(Applied {
            value: DepositReceipt {
                vault: self.identity.address,
                epoch_id: epoch,
                receiver,
                assets,
                shares_minted,
                queue_seq,
            },
            movements: vec![pull],
        })
    }

    /// Mint the first `count` queued deposits of `epoch`, net of the deposit
    /// fee, which goes to `treasury`.
    pub(crate) fn mint_deposit_in_queue(
        &mut self,
        epoch: EpochId,
        count: usize,
        treasury: Address,
    ) -> ProtocolResult<Applied<QueueMintReceipt>> {
        let params = self.carousel("mint_deposit_in_queue")?;
        self.epoch_config(epoch)?;

        let mut receipt = QueueMintReceipt {
            vault: self.identity.address,
            epoch_id: epoch,
            minted: Vec::new(),
            shares_minted: 0,
            deposit_fees: 0,
            remaining: self.deposit_queue.len_for(epoch),
        };
        if count == 0 {
            return Ok(Applied {
                value: receipt,
                movements: Vec::new(),
            });
        }

        // Entries queued before `end` stay mintable until resolution; the
        // controller refuses to resolve while any are pending.
        if self.settlement(epoch).resolved {
            return Err(ProtocolError::EpochFinishedAlready);
        }
        let items = self.deposit_queue.pop_front(epoch, count)?;
        for item in items {
            let fee = bps_of(item.assets, params.deposit_fee_bps);
            let shares = item.assets - fee;
            self.ledger.mint(epoch, item.receiver, shares)?;
            receipt.shares_minted += shares;
            receipt.deposit_fees += fee;
            receipt.minted.push(MintedDeposit {
                depositor: item.depositor,
                receiver: item.receiver,
                assets: item.assets,
                fee,
                shares,
            });
        }
        receipt.remaining = self.deposit_queue.len_for(epoch);

        let movements = vec![TokenMovement::Transfer {
            token: self.identity.asset,
            from: self.identity.address,
            to: treasury,
            amount: receipt.deposit_fees,
        }];
        Ok(Applied {
            value: receipt,
            movements,
        })
    }

    // -------------------------------------------------------------------------
    // withdrawals
    // -------------------------------------------------------------------------

    pub(crate) fn withdraw(
        &mut self,
        caller: Address,
        epoch: EpochId,
        shares: Amount,
        receiver: Address,
        owner: Address,
    ) -> ProtocolResult<Applied<WithdrawReceipt>> {
        self.epoch_config(epoch)?;
        if receiver.is_zero() {
            return Err(ProtocolError::AddressZero { field: "receiver" });
        }
        if !self.settlement(epoch).resolved {
            return Err(ProtocolError::EpochNotExpired);
        }
        if !self.ledger.is_authorized(caller, owner) {
            return Err(ProtocolError::OwnerDidNotAuthorize { caller, owner });
        }
        if shares == 0 {
            return Err(ProtocolError::InvalidAmount {
                amount: 0,
                minimum: 1,
            });
        }
        let balance = self.ledger.balance_of(owner, epoch);
        if balance < shares {
            return Err(ProtocolError::InsufficientBalance {
                needed: shares,
                available: balance,
            });
        }
        if let Some(item) = self.rollover_queue.get(owner) {
            if item.is_active() && item.epoch_id == epoch && balance - shares < item.shares {
                return Err(ProtocolError::AlreadyRollingOver);
            }
        }

        let assets = self.preview_withdraw(epoch, shares)?;
        let emissions = self.preview_emissions_withdraw(epoch, shares)?;
        self.ledger.burn(epoch, owner, shares)?;

        let mut movements = vec![TokenMovement::Transfer {
            token: self.identity.asset,
            from: self.identity.address,
            to: receiver,
            amount: assets,
        }];
        if emissions > 0 {
            movements.push(self.emissions_transfer(receiver, emissions)?);
        }

        Ok(Applied {
            value: WithdrawReceipt {
                shares_burned: shares,
                assets,
                emissions,
            },
            movements,
        })
    }

    fn emissions_transfer(&self, to: Address, amount: Amount) -> ProtocolResult<TokenMovement> {
        let token = self
            .identity
            .emissions_token
            .ok_or(ProtocolError::EmissionsTokenNotSet)?;
        Ok(TokenMovement::Transfer {
            token,
            from: self.identity.address,
            to,
            amount,
        })
    }

    pub(crate) fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        self.ledger.set_approval_for_all(owner, operator, approved);
    }

    // -------------------------------------------------------------------------
    // rollovers
    // -------------------------------------------------------------------------

    /// Enlist `shares` of `receiver` in `epoch` for rollover. Returns the
    /// slot index.
    pub(crate) fn enlist_in_rollover(
        &mut self,
        caller: Address,
        epoch: EpochId,
        shares: Amount,
        receiver: Address,
    ) -> ProtocolResult<usize> {
        let params = self.carousel("enlist_in_rollover")?;
        self.epoch_config(epoch)?;
        if receiver.is_zero() {
            return Err(ProtocolError::AddressZero { field: "receiver" });
        }
        if !self.ledger.is_authorized(caller, receiver) {
            return Err(ProtocolError::OwnerDidNotAuthorize {
                caller,
                owner: receiver,
            });
        }
        if shares < params.min_queue_deposit {
            return Err(ProtocolError::InvalidAmount {
                amount: shares,
                minimum: params.min_queue_deposit,
            });
        }
        let balance = self.ledger.balance_of(receiver, epoch);
        if balance == 0 || balance < shares {
            return Err(ProtocolError::InsufficientBalance {
                needed: shares,
                available: balance,
            });
        }
        self.rollover_queue.enlist(receiver, epoch, shares)
    }

    pub(crate) fn delist_in_rollover(&mut self, caller: Address, owner: Address) -> ProtocolResult<Amount> {
        self.carousel("delist_in_rollover")?;
        if !self.ledger.is_authorized(caller, owner) {
            return Err(ProtocolError::OwnerDidNotAuthorize { caller, owner });
        }
        Ok(self.rollover_queue.delist(owner)?.shares)
    }

    /// Carry the next `count` rollover slots into `epoch`.
    ///
    /// Slots that cannot roll (delisted, already in `epoch`, source not
    /// resolved, position lost, too small to pay the relayer, shares gone)
    /// are skipped but still consumed by the cursor.
    pub(crate) fn mint_rollovers(
        &mut self,
        now: Timestamp,
        relayer: Address,
        epoch: EpochId,
        count: usize,
    ) -> ProtocolResult<Applied<RolloverMintReceipt>> {
        let params = self.carousel("mint_rollovers")?;
        self.epoch_config(epoch)?;
        if self.latest_epoch() != Some(epoch) {
            return Err(ProtocolError::InvalidEpochId { epoch_id: epoch });
        }
        self.require_open(epoch, now)?;
        match self.previous_epoch(epoch) {
            Some(prev) if self.epoch_resolved(prev) => {}
            _ => return Err(ProtocolError::EpochNotResolved),
        }

        let window = self.rollover_queue.window(epoch, count)?;
        let mut executions = Vec::new();

        for slot in window {
            let Some(item) = self.rollover_queue.slot(slot).cloned() else {
                continue;
            };
            if !item.is_active() || item.epoch_id == epoch {
                continue;
            }
            let source = self.settlement(item.epoch_id);
            if !source.resolved {
                continue;
            }
            // Only the par value (one asset per enlisted share) moves on;
            // any profit above par stays withdrawable in the source epoch.
            let par_value = item.shares;
            let redeemable = self.preview_withdraw(item.epoch_id, item.shares)?;
            if redeemable < par_value || par_value <= params.relayer_fee {
                continue;
            }
            let to_burn = mul_div_up(par_value, source.final_tvl, source.claim_tvl)
                .ok_or(ProtocolError::MathOverflow("mint_rollovers"))?;
            if self.ledger.balance_of(item.owner, item.epoch_id) < to_burn {
                debug!(owner = %item.owner, slot, "rollover skipped: shares no longer held");
                continue;
            }

            let emissions = self.preview_emissions_withdraw(item.epoch_id, to_burn)?;
            let minted = par_value - params.relayer_fee;
            self.ledger.burn(item.epoch_id, item.owner, to_burn)?;
            self.ledger.mint(epoch, item.owner, minted)?;
            if let Some(entry) = self.rollover_queue.slot_mut(slot) {
                entry.shares = minted;
                entry.epoch_id = epoch;
            }
            executions.push(RolloverExecution {
                owner: item.owner,
                from_epoch: item.epoch_id,
                shares_burned: to_burn,
                shares_minted: minted,
                emissions,
            });
        }
        self.rollover_queue.advance(epoch, count);

        let relayer_fees = params.relayer_fee * executions.len() as Amount;
        let mut movements = vec![TokenMovement::Transfer {
            token: self.identity.asset,
            from: self.identity.address,
            to: relayer,
            amount: relayer_fees,
        }];
        for exec in executions.iter().filter(|e| e.emissions > 0) {
            movements.push(self.emissions_transfer(exec.owner, exec.emissions)?);
        }

        Ok(Applied {
            value: RolloverMintReceipt {
                vault: self.identity.address,
                epoch_id: epoch,
                processed: count,
                executions,
                relayer_fees,
                cursor: self.rollover_queue.cursor(epoch),
            },
            movements,
        })
    }

    /// Drop the slots of `owners` that are delisted or no longer backed by
    /// shares. Returns the owners removed.
    pub(crate) fn cleanup_rollover_queue(&mut self, owners: &[Address]) -> ProtocolResult<Vec<Address>> {
        self.carousel("cleanup_rollover_queue")?;
        let ledger = &self.ledger;
        Ok(self.rollover_queue.remove_where(owners, |item| {
            !item.is_active() || ledger.balance_of(item.owner, item.epoch_id) < item.shares
        }))
    }

    // -------------------------------------------------------------------------
    // factory hooks
    // -------------------------------------------------------------------------

    pub(crate) fn set_epoch(&mut self, epoch: EpochId, config: EpochConfig) -> ProtocolResult<()> {
        if self.configs.contains_key(&epoch) {
            return Err(ProtocolError::EpochAlreadyExists(epoch));
        }
        self.configs.insert(epoch, config);
        self.epochs.push(epoch);
        Ok(())
    }

    pub(crate) fn set_emissions(&mut self, epoch: EpochId, amount: Amount) -> ProtocolResult<()> {
        self.epoch_config(epoch)?;
        self.emissions.insert(epoch, amount);
        Ok(())
    }

    pub(crate) fn set_emissions_token(&mut self, token: Address) {
        self.identity.emissions_token = Some(token);
    }

    pub(crate) fn change_controller(&mut self, controller: Address) {
        self.controller = controller;
    }

    pub(crate) fn change_deposit_fee(&mut self, fee_bps: u16) -> ProtocolResult<()> {
        let mut params = self.carousel("change_deposit_fee")?;
        if !self.deposit_queue.is_empty() {
            return Err(ProtocolError::QueueNotEmpty);
        }
        params.deposit_fee_bps = fee_bps;
        self.kind = VaultKind::Carousel(params);
        Ok(())
    }

    pub(crate) fn change_relayer_fee(&mut self, relayer_fee: Amount) -> ProtocolResult<()> {
        let mut params = self.carousel("change_relayer_fee")?;
        params.relayer_fee = relayer_fee;
        self.kind = VaultKind::Carousel(params);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // controller hooks
    // -------------------------------------------------------------------------

    /// Snapshot the share supply and mark the epoch resolved. Returns the
    /// final TVL.
    pub(crate) fn resolve_epoch(&mut self, epoch: EpochId, now: Timestamp) -> ProtocolResult<Amount> {
        let config = *self.epoch_config(epoch)?;
        if self.epoch_resolved(epoch) {
            return Err(ProtocolError::EpochFinishedAlready);
        }
        if !config.has_started(now) {
            return Err(ProtocolError::EpochNotStarted);
        }
        let final_tvl = self.ledger.total_supply(epoch);
        let settlement = self.settlements.entry(epoch).or_default();
        settlement.resolved = true;
        settlement.final_tvl = final_tvl;
        settlement.resolved_at = Some(now);
        Ok(final_tvl)
    }

    pub(crate) fn set_claim_tvl(&mut self, epoch: EpochId, claim_tvl: Amount) {
        self.settlements.entry(epoch).or_default().claim_tvl = claim_tvl;
    }

    /// Null epochs redeem 1:1.
    pub(crate) fn set_epoch_null(&mut self, epoch: EpochId) {
        let settlement = self.settlements.entry(epoch).or_default();
        settlement.null = true;
        settlement.claim_tvl = settlement.final_tvl;
    }

    pub(crate) fn set_epoch_depegged(&mut self, epoch: EpochId) {
        self.settlements.entry(epoch).or_default().depegged = true;
    }
}
