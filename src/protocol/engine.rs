//! Protocol Engine
//!
//! Owns all protocol state and serializes every operation through one lock.
//!
//! ```text
//!   caller ──▶ Protocol::op(ctx, ..)
//!                 │ lock state
//!                 │ Tx { &mut state, undo log, now, feeds }
//!                 │ run op; first write to a vault/token entry
//!                 │ records its pre-image in the undo log
//!                 │ stamp events, append to journal ── Err ─▶ replay undo log
//!                 │ publish events (bus, ring)      ── Ok
//!                 ▼ unlock
//! ```
//!
//! Factory and controller operations live in `factory.rs` and
//! `controller.rs` as further `impl Protocol` blocks.

use super::access::{AccessControl, AuthContext, Role};
use super::clock::Clock;
use super::config::ProtocolConfig;
use super::controller::Controller;
use super::epoch::{EpochConfig, EpochStatus};
use super::errors::{ProtocolError, ProtocolResult};
use super::events::{EventBus, EventRecord, ProtocolEvent};
use super::factory::Factory;
use super::journal::EventJournal;
use super::oracle::{FeedRegistry, PriceFeed, SequencerUptimeFeed};
use super::token::{TokenLedger, TokenMovement, TokenRegistry, TokenUndo};
use super::types::{Address, Amount, EpochId, Timestamp};
use super::vault::{DepositReceipt, QueueMintReceipt, RolloverMintReceipt, Vault, WithdrawReceipt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// =============================================================================
// STATE
// =============================================================================

/// Everything a transaction may change.
#[derive(Debug, Clone)]
pub struct ProtocolState {
    pub(crate) access: AccessControl,
    pub(crate) factory: Factory,
    pub(crate) controllers: HashMap<Address, Controller>,
    pub(crate) vaults: HashMap<Address, Vault>,
    pub(crate) tokens: TokenRegistry,
}

impl ProtocolState {
    pub(crate) fn vault(&self, address: Address) -> ProtocolResult<&Vault> {
        self.vaults
            .get(&address)
            .ok_or(ProtocolError::VaultNotFound(address))
    }
}

/// Pre-images of what a transaction wrote. Vaults are copied whole on
/// first write; token entries one balance or allowance at a time.
#[derive(Default)]
struct UndoLog {
    access: Option<AccessControl>,
    factory: Option<Factory>,
    controllers: Option<HashMap<Address, Controller>>,
    vaults: HashMap<Address, Option<Vault>>,
    tokens: TokenUndo,
}

impl UndoLog {
    fn rollback(self, state: &mut ProtocolState) {
        if let Some(access) = self.access {
            state.access = access;
        }
        if let Some(factory) = self.factory {
            state.factory = factory;
        }
        if let Some(controllers) = self.controllers {
            state.controllers = controllers;
        }
        for (address, vault) in self.vaults {
            match vault {
                Some(vault) => {
                    state.vaults.insert(address, vault);
                }
                None => {
                    state.vaults.remove(&address);
                }
            }
        }
        state.tokens.rollback(self.tokens);
    }

    fn len(&self) -> usize {
        usize::from(self.access.is_some())
            + usize::from(self.factory.is_some())
            + usize::from(self.controllers.is_some())
            + self.vaults.len()
            + self.tokens.len()
    }
}

/// A running transaction over the live state. Every write goes through a
/// method that logs the pre-image first, so an `Err` can be undone.
pub(crate) struct Tx<'a> {
    state: &'a mut ProtocolState,
    undo: UndoLog,
    pub now: Timestamp,
    pub feeds: &'a FeedRegistry,
    pub config: &'a ProtocolConfig,
    events: Vec<ProtocolEvent>,
}

impl Tx<'_> {
    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    pub fn state(&self) -> &ProtocolState {
        &*self.state
    }

    pub fn access_mut(&mut self) -> &mut AccessControl {
        if self.undo.access.is_none() {
            self.undo.access = Some(self.state.access.clone());
        }
        &mut self.state.access
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        if self.undo.factory.is_none() {
            self.undo.factory = Some(self.state.factory.clone());
        }
        &mut self.state.factory
    }

    pub fn controllers_mut(&mut self) -> &mut HashMap<Address, Controller> {
        if self.undo.controllers.is_none() {
            self.undo.controllers = Some(self.state.controllers.clone());
        }
        &mut self.state.controllers
    }

    fn log_vault(&mut self, address: Address) {
        let vaults = &self.state.vaults;
        self.undo
            .vaults
            .entry(address)
            .or_insert_with(|| vaults.get(&address).cloned());
    }

    pub fn vault_mut(&mut self, address: Address) -> ProtocolResult<&mut Vault> {
        if !self.state.vaults.contains_key(&address) {
            return Err(ProtocolError::VaultNotFound(address));
        }
        self.log_vault(address);
        self.state
            .vaults
            .get_mut(&address)
            .ok_or(ProtocolError::VaultNotFound(address))
    }

    /// Move a vault out of the map so two can be mutated at once. Put it
    /// back with `insert_vault`.
    pub fn take_vault(&mut self, address: Address) -> ProtocolResult<Vault> {
        if !self.state.vaults.contains_key(&address) {
            return Err(ProtocolError::VaultNotFound(address));
        }
        self.log_vault(address);
        self.state
            .vaults
            .remove(&address)
            .ok_or(ProtocolError::VaultNotFound(address))
    }

    pub fn insert_vault(&mut self, vault: Vault) {
        let address = vault.address();
        self.log_vault(address);
        self.state.vaults.insert(address, vault);
    }

    pub fn register_token(&mut self, ledger: TokenLedger) -> bool {
        self.state.tokens.register_logged(ledger, &mut self.undo.tokens)
    }

    pub fn mint_token(&mut self, token: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.state.tokens.mint_logged(token, to, amount, &mut self.undo.tokens)
    }

    pub fn approve_token(&mut self, token: Address, owner: Address, spender: Address, amount: Amount) -> ProtocolResult<()> {
        self.state
            .tokens
            .approve_logged(token, owner, spender, amount, &mut self.undo.tokens)
    }

    /// Apply token movements in order.
    pub fn settle(&mut self, movements: &[TokenMovement]) -> ProtocolResult<()> {
        self.state.tokens.settle_logged(movements, &mut self.undo.tokens)
    }
}

/// Addresses wired in at construction.
#[derive(Debug, Clone)]
pub struct ProtocolSetup {
    pub owner: Address,
    pub time_locker: Address,
    pub treasury: Address,
    /// Default underlying asset (18 decimals), registered automatically.
    pub weth: Address,
    /// Emissions reward token, registered automatically when set.
    pub emissions_token: Option<Address>,
}

// =============================================================================
// PROTOCOL
// =============================================================================

pub struct Protocol {
    config: ProtocolConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<ProtocolState>,
    feeds: RwLock<FeedRegistry>,
    bus: EventBus,
    journal: Option<EventJournal>,
}

impl Protocol {
    pub fn new(config: ProtocolConfig, setup: ProtocolSetup, clock: Arc<dyn Clock>) -> ProtocolResult<Self> {
        for (field, addr) in [
            ("owner", setup.owner),
            ("time_locker", setup.time_locker),
            ("treasury", setup.treasury),
            ("weth", setup.weth),
        ] {
            if addr.is_zero() {
                return Err(ProtocolError::AddressZero { field });
            }
        }

        let mut tokens = TokenRegistry::default();
        tokens.register(TokenLedger::new(setup.weth, "WETH", 18));
        if let Some(emissions) = setup.emissions_token {
            tokens.register(TokenLedger::new(emissions, "Y2K", 18));
        }

        let state = ProtocolState {
            access: AccessControl::new(setup.owner, setup.time_locker),
            factory: Factory::new(setup.treasury, setup.weth, setup.emissions_token),
            controllers: HashMap::new(),
            vaults: HashMap::new(),
            tokens,
        };
        let bus = EventBus::new(config.events.channel_capacity, config.events.recent_capacity);

        info!(
            owner = %setup.owner,
            time_locker = %setup.time_locker,
            treasury = %setup.treasury,
            "protocol initialized"
        );

        Ok(Self {
            config,
            clock,
            state: Mutex::new(state),
            feeds: RwLock::new(FeedRegistry::default()),
            bus,
            journal: None,
        })
    }

    /// Attach `journal`. Event numbering continues after the last event it
    /// already holds.
    pub fn with_journal(mut self, journal: EventJournal) -> anyhow::Result<Self> {
        self.bus.resume_at(journal.next_seq()?);
        debug!(next_seq = self.bus.next_seq(), "event journal resumed");
        self.journal = Some(journal);
        Ok(self)
    }

    /// Attach the journal named by `events.journal_path`, if any.
    pub fn with_configured_journal(self) -> anyhow::Result<Self> {
        match self.config.events.journal_path.clone() {
            Some(path) => {
                let journal = EventJournal::open(&path)?;
                info!(path = %path, "event journal attached");
                self.with_journal(journal)
            }
            None => Ok(self),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.bus.subscribe()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.bus.recent(limit)
    }

    pub fn journal(&self) -> Option<&EventJournal> {
        self.journal.as_ref()
    }

    // -------------------------------------------------------------------------
    // transaction plumbing
    // -------------------------------------------------------------------------

    /// Run `f` against the live state. Writes are undone unless `f`
    /// succeeds and its events reach the journal.
    pub(crate) fn transact<T, F>(&self, op: &'static str, f: F) -> ProtocolResult<T>
    where
        F: FnOnce(&mut Tx<'_>) -> ProtocolResult<T>,
    {
        let mut state = self.state.lock();
        let feeds = self.feeds.read();
        let now = self.clock.now();
        let mut tx = Tx {
            state: &mut *state,
            undo: UndoLog::default(),
            now,
            feeds: &feeds,
            config: &self.config,
            events: Vec::new(),
        };

        let result = f(&mut tx);
        let Tx { undo, events, .. } = tx;
        let result = result.and_then(|value| {
            let records = self.bus.stamp(now, events);
            if let Some(journal) = &self.journal {
                journal
                    .append(&records)
                    .map_err(|e| ProtocolError::JournalWrite(format!("{e:#}")))?;
            }
            Ok((value, records))
        });

        match result {
            Ok((value, records)) => {
                self.bus.commit(&records);
                debug!(op, events = records.len(), writes = undo.len(), "transaction committed");
                Ok(value)
            }
            Err(err) => {
                undo.rollback(&mut state);
                warn!(
                    op,
                    error = err.name(),
                    class = err.class().as_str(),
                    detail = %err,
                    "transaction reverted"
                );
                Err(err)
            }
        }
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&ProtocolState) -> T) -> T {
        let state = self.state.lock();
        f(&state)
    }

    /// Read with feeds and the current time, for oracle-dependent views.
    pub(crate) fn read_with_feeds<T>(
        &self,
        f: impl FnOnce(&ProtocolState, &FeedRegistry, Timestamp) -> T,
    ) -> T {
        let state = self.state.lock();
        let feeds = self.feeds.read();
        f(&state, &feeds, self.clock.now())
    }

    fn view_vault<T>(&self, vault: Address, f: impl FnOnce(&Vault) -> ProtocolResult<T>) -> ProtocolResult<T> {
        self.read(|state| f(state.vault(vault)?))
    }

    // -------------------------------------------------------------------------
    // roles
    // -------------------------------------------------------------------------

    pub fn grant_role(&self, ctx: &AuthContext, account: Address, role: Role) -> ProtocolResult<bool> {
        self.transact("grant_role", |tx| tx.access_mut().grant(ctx, account, role))
    }

    pub fn revoke_role(&self, ctx: &AuthContext, account: Address, role: Role) -> ProtocolResult<bool> {
        self.transact("revoke_role", |tx| tx.access_mut().revoke(ctx, account, role))
    }

    pub fn has_role(&self, account: Address, role: Role) -> bool {
        self.read(|state| state.access.has_role(account, role))
    }

    // -------------------------------------------------------------------------
    // tokens and feeds (external collaborators)
    // -------------------------------------------------------------------------

    /// Register an underlying asset. Owner only.
    pub fn register_token(
        &self,
        ctx: &AuthContext,
        token: Address,
        symbol: &str,
        decimals: u8,
    ) -> ProtocolResult<bool> {
        self.transact("register_token", |tx| {
            tx.state().access.require_owner(ctx)?;
            if token.is_zero() {
                return Err(ProtocolError::AddressZero { field: "token" });
            }
            Ok(tx.register_token(TokenLedger::new(token, symbol, decimals)))
        })
    }

    /// Faucet: credit `amount` of `token` to `to`.
    pub fn mint_tokens(&self, token: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.transact("mint_tokens", |tx| tx.mint_token(token, to, amount))
    }

    pub fn approve(&self, ctx: &AuthContext, token: Address, spender: Address, amount: Amount) -> ProtocolResult<()> {
        self.transact("approve", |tx| tx.approve_token(token, ctx.caller, spender, amount))
    }

    pub fn token_balance(&self, token: Address, account: Address) -> Amount {
        self.read(|state| state.tokens.balance_of(token, account))
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.read(|state| {
            state
                .tokens
                .get(token)
                .map(|t| t.allowance(owner, spender))
                .unwrap_or(0)
        })
    }

    pub fn register_price_feed(&self, oracle: Address, feed: Arc<dyn PriceFeed>) {
        self.feeds.write().set_price_feed(oracle, feed);
    }

    pub fn register_sequencer_feed(&self, address: Address, feed: Arc<dyn SequencerUptimeFeed>) {
        self.feeds.write().set_sequencer_feed(address, feed);
    }

    // -------------------------------------------------------------------------
    // vault operations
    // -------------------------------------------------------------------------

    /// Deposit `assets` into `epoch_id`. Plain vaults mint at once; carousel
    /// vaults queue the deposit until a relayer mints it.
    pub fn deposit(
        &self,
        ctx: &AuthContext,
        vault: Address,
        epoch_id: EpochId,
        assets: Amount,
        receiver: Address,
    ) -> ProtocolResult<DepositReceipt> {
        self.transact("deposit", |tx| {
            let now = tx.now;
            let target = tx.vault_mut(vault)?;
            let side = target.side();
            let applied = target.deposit(now, ctx.caller, epoch_id, assets, receiver)?;
            tx.settle(&applied.movements)?;

            let receipt = applied.value;
            if receipt.queue_seq.is_some() {
                tx.emit(ProtocolEvent::DepositInQueue {
                    vault,
                    epoch_id,
                    depositor: ctx.caller,
                    receiver,
                    assets,
                });
            } else {
                tx.emit(ProtocolEvent::Deposit {
                    vault,
                    side,
                    epoch_id,
                    caller: ctx.caller,
                    receiver,
                    assets,
                    shares: receipt.shares_minted,
                });
            }
            debug!(
                vault = %vault,
                epoch_id = %epoch_id.short(),
                assets,
                queued = receipt.queue_seq.is_some(),
                "deposit"
            );
            Ok(receipt)
        })
    }

    /// Mint the first `count` queued deposits of `epoch_id`.
    pub fn mint_deposit_in_queue(
        &self,
        ctx: &AuthContext,
        vault: Address,
        epoch_id: EpochId,
        count: usize,
    ) -> ProtocolResult<QueueMintReceipt> {
        self.transact("mint_deposit_in_queue", |tx| {
            let treasury = tx.state().factory.treasury();
            let target = tx.vault_mut(vault)?;
            let side = target.side();
            let applied = target.mint_deposit_in_queue(epoch_id, count, treasury)?;
            tx.settle(&applied.movements)?;

            let receipt = applied.value;
            if receipt.minted.is_empty() {
                return Ok(receipt);
            }
            for minted in &receipt.minted {
                tx.emit(ProtocolEvent::Deposit {
                    vault,
                    side,
                    epoch_id,
                    caller: minted.depositor,
                    receiver: minted.receiver,
                    assets: minted.assets,
                    shares: minted.shares,
                });
            }
            tx.emit(ProtocolEvent::RelayerMinted {
                vault,
                epoch_id,
                relayer: ctx.caller,
                operations: receipt.minted.len(),
                deposit_fees: receipt.deposit_fees,
            });
            info!(
                vault = %vault,
                epoch_id = %epoch_id.short(),
                operations = receipt.minted.len(),
                remaining = receipt.remaining,
                "queued deposits minted"
            );
            Ok(receipt)
        })
    }

    /// Burn `shares` of `owner` in a resolved epoch and pay `receiver`.
    pub fn withdraw(
        &self,
        ctx: &AuthContext,
        vault: Address,
        epoch_id: EpochId,
        shares: Amount,
        receiver: Address,
        owner: Address,
    ) -> ProtocolResult<WithdrawReceipt> {
        self.transact("withdraw", |tx| {
            let applied = tx
                .vault_mut(vault)?
                .withdraw(ctx.caller, epoch_id, shares, receiver, owner)?;
            tx.settle(&applied.movements)?;

            let receipt = applied.value;
            tx.emit(ProtocolEvent::Withdraw {
                vault,
                epoch_id,
                caller: ctx.caller,
                receiver,
                owner,
                shares: receipt.shares_burned,
                assets: receipt.assets,
                emissions: receipt.emissions,
            });
            debug!(
                vault = %vault,
                epoch_id = %epoch_id.short(),
                shares,
                assets = receipt.assets,
                "withdraw"
            );
            Ok(receipt)
        })
    }

    pub fn set_approval_for_all(
        &self,
        ctx: &AuthContext,
        vault: Address,
        operator: Address,
        approved: bool,
    ) -> ProtocolResult<()> {
        self.transact("set_approval_for_all", |tx| {
            tx.vault_mut(vault)?
                .set_approval_for_all(ctx.caller, operator, approved);
            tx.emit(ProtocolEvent::ApprovalForAll {
                vault,
                owner: ctx.caller,
                operator,
                approved,
            });
            Ok(())
        })
    }

    /// Enlist `shares` of `receiver` in `epoch_id` for rollover. Returns
    /// the queue slot.
    pub fn enlist_in_rollover(
        &self,
        ctx: &AuthContext,
        vault: Address,
        epoch_id: EpochId,
        shares: Amount,
        receiver: Address,
    ) -> ProtocolResult<usize> {
        self.transact("enlist_in_rollover", |tx| {
            let slot = tx
                .vault_mut(vault)?
                .enlist_in_rollover(ctx.caller, epoch_id, shares, receiver)?;
            tx.emit(ProtocolEvent::RolloverQueued {
                vault,
                epoch_id,
                owner: receiver,
                shares,
            });
            Ok(slot)
        })
    }

    /// Remove `owner` from the rollover queue. Returns the shares that were
    /// enlisted.
    pub fn delist_in_rollover(&self, ctx: &AuthContext, vault: Address, owner: Address) -> ProtocolResult<Amount> {
        self.transact("delist_in_rollover", |tx| {
            let target = tx.vault_mut(vault)?;
            let epoch_id = target
                .rollover_queue()
                .get(owner)
                .map(|item| item.epoch_id)
                .ok_or(ProtocolError::NotEnlisted(owner))?;
            let shares = target.delist_in_rollover(ctx.caller, owner)?;
            tx.emit(ProtocolEvent::RolloverDelisted {
                vault,
                epoch_id,
                owner,
            });
            Ok(shares)
        })
    }

    /// Process the next `count` rollover slots into `epoch_id`. The caller
    /// receives the relayer fee for each executed rollover.
    pub fn mint_rollovers(
        &self,
        ctx: &AuthContext,
        vault: Address,
        epoch_id: EpochId,
        count: usize,
    ) -> ProtocolResult<RolloverMintReceipt> {
        self.transact("mint_rollovers", |tx| {
            let now = tx.now;
            let applied = tx
                .vault_mut(vault)?
                .mint_rollovers(now, ctx.caller, epoch_id, count)?;
            tx.settle(&applied.movements)?;

            let receipt = applied.value;
            if receipt.processed == 0 {
                return Ok(receipt);
            }
            for exec in &receipt.executions {
                tx.emit(ProtocolEvent::RolloverMinted {
                    vault,
                    epoch_id,
                    from_epoch: exec.from_epoch,
                    owner: exec.owner,
                    shares_burned: exec.shares_burned,
                    shares_minted: exec.shares_minted,
                    emissions: exec.emissions,
                });
            }
            tx.emit(ProtocolEvent::RolloverBatchProcessed {
                vault,
                epoch_id,
                relayer: ctx.caller,
                processed: receipt.processed,
                executions: receipt.executions.len(),
                relayer_fees: receipt.relayer_fees,
            });
            info!(
                vault = %vault,
                epoch_id = %epoch_id.short(),
                processed = receipt.processed,
                executions = receipt.executions.len(),
                cursor = receipt.cursor,
                "rollovers minted"
            );
            Ok(receipt)
        })
    }

    /// Drop stale rollover slots of `owners`. Owner or time locker only.
    pub fn cleanup_rollover_queue(
        &self,
        ctx: &AuthContext,
        vault: Address,
        owners: &[Address],
    ) -> ProtocolResult<usize> {
        self.transact("cleanup_rollover_queue", |tx| {
            tx.state().access.require_admin(ctx)?;
            let removed = tx.vault_mut(vault)?.cleanup_rollover_queue(owners)?;
            let count = removed.len();
            if count > 0 {
                tx.emit(ProtocolEvent::RolloverQueueCleaned { vault, removed });
            }
            Ok(count)
        })
    }

    // -------------------------------------------------------------------------
    // vault views
    // -------------------------------------------------------------------------

    /// Snapshot of a vault.
    pub fn vault(&self, vault: Address) -> ProtocolResult<Vault> {
        self.view_vault(vault, |v| Ok(v.clone()))
    }

    pub fn balance_of(&self, vault: Address, account: Address, epoch_id: EpochId) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| Ok(v.balance_of(account, epoch_id)))
    }

    pub fn total_assets(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| Ok(v.total_assets(epoch_id)))
    }

    pub fn preview_withdraw(&self, vault: Address, epoch_id: EpochId, shares: Amount) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| v.preview_withdraw(epoch_id, shares))
    }

    pub fn preview_emissions_withdraw(
        &self,
        vault: Address,
        epoch_id: EpochId,
        shares: Amount,
    ) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| v.preview_emissions_withdraw(epoch_id, shares))
    }

    pub fn preview_amount_in_shares(
        &self,
        vault: Address,
        epoch_id: EpochId,
        assets: Amount,
    ) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| v.preview_amount_in_shares(epoch_id, assets))
    }

    /// `(fee, assets_after_fee)`.
    pub fn get_epoch_deposit_fee(
        &self,
        vault: Address,
        epoch_id: EpochId,
        assets: Amount,
    ) -> ProtocolResult<(Amount, Amount)> {
        self.view_vault(vault, |v| v.get_epoch_deposit_fee(epoch_id, assets))
    }

    pub fn get_epoch_config(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<EpochConfig> {
        self.view_vault(vault, |v| v.epoch_config(epoch_id).copied())
    }

    pub fn epoch_status(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<EpochStatus> {
        let now = self.now();
        self.view_vault(vault, |v| v.epoch_status(epoch_id, now))
    }

    pub fn epoch_resolved(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<bool> {
        self.view_vault(vault, |v| Ok(v.epoch_resolved(epoch_id)))
    }

    pub fn epoch_null(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<bool> {
        self.view_vault(vault, |v| Ok(v.epoch_null(epoch_id)))
    }

    pub fn epoch_depegged(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<bool> {
        self.view_vault(vault, |v| Ok(v.epoch_depegged(epoch_id)))
    }

    pub fn final_tvl(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| Ok(v.final_tvl(epoch_id)))
    }

    pub fn claim_tvl(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| Ok(v.claim_tvl(epoch_id)))
    }

    pub fn emissions(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<Amount> {
        self.view_vault(vault, |v| Ok(v.emissions(epoch_id)))
    }

    pub fn is_approved_for_all(&self, vault: Address, owner: Address, operator: Address) -> ProtocolResult<bool> {
        self.view_vault(vault, |v| Ok(v.ledger().is_approved_for_all(owner, operator)))
    }

    /// Pending deposits across all epochs.
    pub fn get_deposit_queue_length(&self, vault: Address) -> ProtocolResult<usize> {
        self.view_vault(vault, |v| Ok(v.deposit_queue().len()))
    }

    pub fn get_deposit_queue_length_for(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<usize> {
        self.view_vault(vault, |v| Ok(v.deposit_queue().len_for(epoch_id)))
    }

    pub fn get_rollover_queue_length(&self, vault: Address) -> ProtocolResult<usize> {
        self.view_vault(vault, |v| Ok(v.rollover_queue().len()))
    }

    pub fn is_enlisted_in_rollover_queue(&self, vault: Address, owner: Address) -> ProtocolResult<bool> {
        self.view_vault(vault, |v| Ok(v.rollover_queue().is_enlisted(owner)))
    }

    pub fn get_rollover_index(&self, vault: Address, owner: Address) -> ProtocolResult<usize> {
        self.view_vault(vault, |v| {
            v.rollover_queue()
                .position(owner)
                .ok_or(ProtocolError::NotEnlisted(owner))
        })
    }

    /// Rollover slots already processed for `epoch_id`.
    pub fn rollover_accounting(&self, vault: Address, epoch_id: EpochId) -> ProtocolResult<usize> {
        self.view_vault(vault, |v| Ok(v.rollover_queue().cursor(epoch_id)))
    }
}
