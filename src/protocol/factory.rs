//! Market Factory
//!
//! Registry of markets and their epochs. A market is a (token, strike,
//! underlying) triple backed by a premium/collateral vault pair and an
//! append-only list of epochs.
//!
//! ```text
//!   createNewMarket ─────────┐
//!   createNewCarouselMarket ─┴─▶ Market { premium, collateral, epochs[] }
//!                                   │
//!   createEpoch[WithEmissions] ─────┴─▶ EpochConfig written to both vaults
//! ```
//!
//! Controllers must be deployed and whitelisted before a market can point
//! at them.

use super::access::AuthContext;
use super::controller::Controller;
use super::engine::{Protocol, Tx};
use super::epoch::EpochConfig;
use super::errors::{ProtocolError, ProtocolResult};
use super::events::ProtocolEvent;
use super::ids;
use super::token::TokenMovement;
use super::types::{Address, Amount, EpochId, MarketId, Timestamp, VaultSide};
use super::vault::{CarouselParams, Vault, VaultIdentity, VaultKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

// =============================================================================
// CONFIG TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Pegged token being insured.
    pub token: Address,
    /// Depeg threshold, 18 decimals.
    pub strike: Amount,
    /// Price feed address.
    pub oracle: Address,
    pub underlying_asset: Address,
    pub name: String,
    pub token_uri: String,
    pub controller: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselMarketConfig {
    pub market: MarketConfig,
    pub relayer_fee: Amount,
    pub deposit_fee_bps: u16,
    pub min_queue_deposit: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: MarketId,
    pub token: Address,
    pub strike: Amount,
    pub underlying_asset: Address,
    pub oracle: Address,
    pub controller: Address,
    pub premium: Address,
    pub collateral: Address,
    pub epochs: Vec<EpochId>,
    pub name: String,
    pub carousel: bool,
}

impl Market {
    pub fn vault(&self, side: VaultSide) -> Address {
        match side {
            VaultSide::Premium => self.premium,
            VaultSide::Collateral => self.collateral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMarket {
    pub premium: Address,
    pub collateral: Address,
    pub market_id: MarketId,
}

// =============================================================================
// FACTORY STATE
// =============================================================================

#[derive(Debug, Clone)]
pub struct Factory {
    address: Address,
    treasury: Address,
    weth: Address,
    emissions_token: Option<Address>,
    markets: HashMap<MarketId, Market>,
    market_order: Vec<MarketId>,
    epoch_fees: HashMap<EpochId, u16>,
    epoch_market: HashMap<EpochId, MarketId>,
    whitelist: HashSet<Address>,
    controller_nonce: u64,
}

impl Factory {
    pub fn new(treasury: Address, weth: Address, emissions_token: Option<Address>) -> Self {
        Self {
            address: Address::derive("carousel-factory"),
            treasury,
            weth,
            emissions_token,
            markets: HashMap::new(),
            market_order: Vec::new(),
            epoch_fees: HashMap::new(),
            epoch_market: HashMap::new(),
            whitelist: HashSet::new(),
            controller_nonce: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn weth(&self) -> Address {
        self.weth
    }

    pub fn emissions_token(&self) -> Option<Address> {
        self.emissions_token
    }

    pub fn market(&self, market_id: MarketId) -> ProtocolResult<&Market> {
        self.markets
            .get(&market_id)
            .ok_or(ProtocolError::MarketDoesNotExist(market_id))
    }

    fn market_mut(&mut self, market_id: MarketId) -> ProtocolResult<&mut Market> {
        self.markets
            .get_mut(&market_id)
            .ok_or(ProtocolError::MarketDoesNotExist(market_id))
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.market_order.iter().filter_map(|id| self.markets.get(id))
    }

    pub fn is_whitelisted(&self, controller: Address) -> bool {
        self.whitelist.contains(&controller)
    }

    pub fn epoch_fee(&self, epoch_id: EpochId) -> Option<u16> {
        self.epoch_fees.get(&epoch_id).copied()
    }

    /// Market an epoch belongs to.
    pub fn epoch_market(&self, epoch_id: EpochId) -> Option<MarketId> {
        self.epoch_market.get(&epoch_id).copied()
    }

    fn require_whitelisted(&self, controller: Address) -> ProtocolResult<()> {
        if controller.is_zero() {
            return Err(ProtocolError::AddressZero { field: "controller" });
        }
        if !self.is_whitelisted(controller) {
            return Err(ProtocolError::ControllerNotSet(controller));
        }
        Ok(())
    }
}

fn validate_market_config(config: &MarketConfig) -> ProtocolResult<()> {
    for (field, addr) in [
        ("token", config.token),
        ("oracle", config.oracle),
        ("underlying_asset", config.underlying_asset),
        ("controller", config.controller),
    ] {
        if addr.is_zero() {
            return Err(ProtocolError::AddressZero { field });
        }
    }
    Ok(())
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl Protocol {
    /// Deploy a controller bound to this factory. `sequencer_feed` enables
    /// the L2 uptime checks. Owner only.
    pub fn deploy_controller(&self, ctx: &AuthContext, sequencer_feed: Option<Address>) -> ProtocolResult<Address> {
        self.transact("deploy_controller", |tx| {
            tx.state().access.require_owner(ctx)?;
            if sequencer_feed.is_some_and(|feed| feed.is_zero()) {
                return Err(ProtocolError::AddressZero { field: "sequencer_feed" });
            }
            let oracle = &tx.config.oracle;
            let (grace_period_secs, price_timeout_secs) = (oracle.grace_period_secs, oracle.price_timeout_secs);
            let factory = tx.factory_mut();
            let address = ids::controller_address(factory.address, factory.controller_nonce);
            factory.controller_nonce += 1;

            let controller = Controller {
                address,
                factory: factory.address,
                sequencer_feed,
                grace_period_secs,
                price_timeout_secs,
            };
            tx.controllers_mut().insert(address, controller);
            tx.emit(ProtocolEvent::ControllerDeployed {
                controller: address,
                sequencer_feed,
            });
            info!(controller = %address, "controller deployed");
            Ok(address)
        })
    }

    /// Toggle whether markets may use `controller`. Owner or time locker.
    /// Returns the new membership.
    pub fn whitelist_controller(&self, ctx: &AuthContext, controller: Address) -> ProtocolResult<bool> {
        self.transact("whitelist_controller", |tx| {
            tx.state().access.require_admin(ctx)?;
            if controller.is_zero() {
                return Err(ProtocolError::AddressZero { field: "controller" });
            }
            if !tx.state().controllers.contains_key(&controller) {
                return Err(ProtocolError::ControllerNotSet(controller));
            }
            let whitelist = &mut tx.factory_mut().whitelist;
            let whitelisted = if whitelist.remove(&controller) {
                false
            } else {
                whitelist.insert(controller);
                true
            };
            tx.emit(ProtocolEvent::AddressWhitelisted {
                address: controller,
                whitelisted,
            });
            info!(controller = %controller, whitelisted, "controller whitelist updated");
            Ok(whitelisted)
        })
    }

    /// Create a plain market whose vaults mint on deposit.
    pub fn create_new_market(&self, ctx: &AuthContext, config: MarketConfig) -> ProtocolResult<CreatedMarket> {
        self.transact("create_new_market", |tx| {
            tx.state().access.require_owner(ctx)?;
            validate_market_config(&config)?;
            insert_market(tx, config, VaultKind::Plain)
        })
    }

    /// Create a market whose vaults queue deposits and support rollovers.
    pub fn create_new_carousel_market(
        &self,
        ctx: &AuthContext,
        config: CarouselMarketConfig,
    ) -> ProtocolResult<CreatedMarket> {
        self.transact("create_new_carousel_market", |tx| {
            tx.state().access.require_owner(ctx)?;
            validate_market_config(&config.market)?;

            let fees = &tx.config.fees;
            if config.deposit_fee_bps > fees.max_deposit_fee_bps {
                return Err(ProtocolError::InvalidDepositFee {
                    fee: config.deposit_fee_bps,
                    max: fees.max_deposit_fee_bps,
                });
            }
            let min_relayer_fee = fees.min_relayer_fee as Amount;
            if config.relayer_fee < min_relayer_fee {
                return Err(ProtocolError::InvalidRelayerFee {
                    fee: config.relayer_fee,
                    min: min_relayer_fee,
                });
            }
            if config.min_queue_deposit <= config.relayer_fee {
                return Err(ProtocolError::InvalidMinQueueDeposit {
                    min_queue_deposit: config.min_queue_deposit,
                    relayer_fee: config.relayer_fee,
                });
            }

            let kind = VaultKind::Carousel(CarouselParams {
                deposit_fee_bps: config.deposit_fee_bps,
                relayer_fee: config.relayer_fee,
                min_queue_deposit: config.min_queue_deposit,
            });
            insert_market(tx, config.market, kind)
        })
    }

    /// Create an epoch on both vaults of `market_id`.
    pub fn create_epoch(
        &self,
        ctx: &AuthContext,
        market_id: MarketId,
        begin: Timestamp,
        end: Timestamp,
        withdrawal_fee_bps: u16,
    ) -> ProtocolResult<EpochId> {
        self.transact("create_epoch", |tx| {
            tx.state().access.require_owner(ctx)?;
            let (epoch_id, market) = insert_epoch(tx, market_id, begin, end, withdrawal_fee_bps)?;
            tx.emit(ProtocolEvent::EpochCreated {
                epoch_id,
                market_id,
                begin,
                end,
                premium: market.premium,
                collateral: market.collateral,
                token: market.token,
                strike: market.strike,
                withdrawal_fee_bps,
            });
            Ok(epoch_id)
        })
    }

    /// Create an epoch and fund both vaults with emissions pulled from the
    /// treasury. The treasury must have approved the factory.
    #[allow(clippy::too_many_arguments)]
    pub fn create_epoch_with_emissions(
        &self,
        ctx: &AuthContext,
        market_id: MarketId,
        begin: Timestamp,
        end: Timestamp,
        withdrawal_fee_bps: u16,
        premium_emissions: Amount,
        collateral_emissions: Amount,
    ) -> ProtocolResult<EpochId> {
        self.transact("create_epoch_with_emissions", |tx| {
            tx.state().access.require_owner(ctx)?;
            let emissions_token = tx
                .state()
                .factory
                .emissions_token
                .ok_or(ProtocolError::EmissionsTokenNotSet)?;
            let (epoch_id, market) = insert_epoch(tx, market_id, begin, end, withdrawal_fee_bps)?;

            let factory = tx.state().factory.address;
            let treasury = tx.state().factory.treasury;
            let mut movements = Vec::with_capacity(2);
            for (side, amount) in [
                (VaultSide::Premium, premium_emissions),
                (VaultSide::Collateral, collateral_emissions),
            ] {
                let vault = market.vault(side);
                let target = tx.vault_mut(vault)?;
                target.set_emissions_token(emissions_token);
                target.set_emissions(epoch_id, amount)?;
                movements.push(TokenMovement::TransferFrom {
                    token: emissions_token,
                    spender: factory,
                    from: treasury,
                    to: vault,
                    amount,
                });
            }
            tx.settle(&movements)?;

            tx.emit(ProtocolEvent::EpochCreatedWithEmissions {
                epoch_id,
                market_id,
                begin,
                end,
                withdrawal_fee_bps,
                premium_emissions,
                collateral_emissions,
            });
            Ok(epoch_id)
        })
    }

    // -------------------------------------------------------------------------
    // time-locked administration
    // -------------------------------------------------------------------------

    /// Point a market and both its vaults at another whitelisted controller.
    pub fn change_controller(&self, ctx: &AuthContext, market_id: MarketId, controller: Address) -> ProtocolResult<()> {
        self.transact("change_controller", |tx| {
            tx.state().access.require_time_locker(ctx)?;
            tx.state().factory.require_whitelisted(controller)?;
            let market = tx.factory_mut().market_mut(market_id)?;
            market.controller = controller;
            let (premium, collateral) = (market.premium, market.collateral);
            tx.vault_mut(premium)?.change_controller(controller);
            tx.vault_mut(collateral)?.change_controller(controller);
            tx.emit(ProtocolEvent::ControllerChanged {
                market_id,
                controller,
                premium,
                collateral,
            });
            info!(market_id = %market_id.short(), controller = %controller, "controller changed");
            Ok(())
        })
    }

    pub fn change_treasury(&self, ctx: &AuthContext, treasury: Address) -> ProtocolResult<()> {
        self.transact("change_treasury", |tx| {
            tx.state().access.require_time_locker(ctx)?;
            if treasury.is_zero() {
                return Err(ProtocolError::AddressZero { field: "treasury" });
            }
            tx.factory_mut().treasury = treasury;
            tx.emit(ProtocolEvent::TreasuryChanged { treasury });
            Ok(())
        })
    }

    pub fn change_oracle(&self, ctx: &AuthContext, market_id: MarketId, oracle: Address) -> ProtocolResult<()> {
        self.transact("change_oracle", |tx| {
            tx.state().access.require_time_locker(ctx)?;
            if oracle.is_zero() {
                return Err(ProtocolError::AddressZero { field: "oracle" });
            }
            tx.factory_mut().market_mut(market_id)?.oracle = oracle;
            tx.emit(ProtocolEvent::OracleChanged { market_id, oracle });
            Ok(())
        })
    }

    /// Change the deposit fee of one vault (0 = premium, 1 = collateral).
    /// Refused while that vault has pending queued deposits.
    pub fn change_deposit_fee(
        &self,
        ctx: &AuthContext,
        market_id: MarketId,
        vault_index: usize,
        fee_bps: u16,
    ) -> ProtocolResult<()> {
        self.transact("change_deposit_fee", |tx| {
            tx.state().access.require_time_locker(ctx)?;
            let side = VaultSide::from_index(vault_index)
                .ok_or(ProtocolError::InvalidVaultIndex { index: vault_index })?;
            let max = tx.config.fees.max_deposit_fee_bps;
            if fee_bps > max {
                return Err(ProtocolError::InvalidDepositFee { fee: fee_bps, max });
            }
            let vault = tx.state().factory.market(market_id)?.vault(side);
            tx.vault_mut(vault)?.change_deposit_fee(fee_bps)?;
            tx.emit(ProtocolEvent::DepositFeeChanged {
                market_id,
                vault,
                fee_bps,
            });
            Ok(())
        })
    }

    /// Change the relayer fee of both vaults of a carousel market.
    pub fn change_relayer_fee(&self, ctx: &AuthContext, market_id: MarketId, relayer_fee: Amount) -> ProtocolResult<()> {
        self.transact("change_relayer_fee", |tx| {
            tx.state().access.require_time_locker(ctx)?;
            let min = tx.config.fees.min_relayer_fee as Amount;
            if relayer_fee < min {
                return Err(ProtocolError::InvalidRelayerFee { fee: relayer_fee, min });
            }
            let market = tx.state().factory.market(market_id)?;
            let (premium, collateral) = (market.premium, market.collateral);
            tx.vault_mut(premium)?.change_relayer_fee(relayer_fee)?;
            tx.vault_mut(collateral)?.change_relayer_fee(relayer_fee)?;
            tx.emit(ProtocolEvent::RelayerFeeChanged {
                market_id,
                relayer_fee,
            });
            Ok(())
        })
    }

    // -------------------------------------------------------------------------
    // views
    // -------------------------------------------------------------------------

    pub fn get_market_id(&self, token: Address, strike: Amount, underlying: Address) -> MarketId {
        ids::market_id(token, strike, underlying)
    }

    pub fn get_epoch_id(&self, market_id: MarketId, begin: Timestamp, end: Timestamp) -> EpochId {
        ids::epoch_id(market_id, begin, end)
    }

    pub fn get_market_info(&self, market_id: MarketId) -> ProtocolResult<Market> {
        self.read(|state| state.factory.market(market_id).cloned())
    }

    /// Vault at `index` (0 = premium, 1 = collateral). The zero address when
    /// the market does not exist.
    pub fn market_id_to_vaults(&self, market_id: MarketId, index: usize) -> ProtocolResult<Address> {
        let side = VaultSide::from_index(index).ok_or(ProtocolError::InvalidVaultIndex { index })?;
        Ok(self.read(|state| {
            state
                .factory
                .market(market_id)
                .map(|m| m.vault(side))
                .unwrap_or(Address::ZERO)
        }))
    }

    pub fn get_vaults(&self, market_id: MarketId) -> ProtocolResult<[Address; 2]> {
        self.read(|state| {
            let market = state.factory.market(market_id)?;
            Ok([market.premium, market.collateral])
        })
    }

    pub fn get_epochs_by_market_id(&self, market_id: MarketId) -> ProtocolResult<Vec<EpochId>> {
        self.read(|state| Ok(state.factory.market(market_id)?.epochs.clone()))
    }

    pub fn get_epoch_fee(&self, epoch_id: EpochId) -> ProtocolResult<u16> {
        self.read(|state| {
            state
                .factory
                .epoch_fee(epoch_id)
                .ok_or(ProtocolError::EpochNotExist(epoch_id))
        })
    }

    /// Whether `controller` is whitelisted.
    pub fn controllers(&self, controller: Address) -> bool {
        self.read(|state| state.factory.is_whitelisted(controller))
    }

    pub fn treasury(&self) -> Address {
        self.read(|state| state.factory.treasury)
    }

    pub fn factory_address(&self) -> Address {
        self.read(|state| state.factory.address)
    }

    pub fn market_count(&self) -> usize {
        self.read(|state| state.factory.market_order.len())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn insert_market(
    tx: &mut Tx<'_>,
    config: MarketConfig,
    kind: VaultKind,
) -> ProtocolResult<CreatedMarket> {
    tx.state().tokens.get(config.underlying_asset)?;
    tx.state().factory.require_whitelisted(config.controller)?;

    let market_id = ids::market_id(config.token, config.strike, config.underlying_asset);
    if tx.state().factory.markets.contains_key(&market_id) {
        return Err(ProtocolError::MarketAlreadyExists(market_id));
    }

    let emissions_token = tx.state().factory.emissions_token;
    let mut addresses = [Address::ZERO; 2];
    for side in [VaultSide::Premium, VaultSide::Collateral] {
        let address = ids::vault_address(market_id, side);
        let identity = VaultIdentity {
            address,
            market_id,
            side,
            asset: config.underlying_asset,
            token: config.token,
            strike: config.strike,
            name: format!("{} {}", config.name, side.as_str()),
            token_uri: config.token_uri.clone(),
            emissions_token,
        };
        tx.insert_vault(Vault::new(identity, kind, config.controller));
        addresses[side.index()] = address;
    }

    let market = Market {
        market_id,
        token: config.token,
        strike: config.strike,
        underlying_asset: config.underlying_asset,
        oracle: config.oracle,
        controller: config.controller,
        premium: addresses[0],
        collateral: addresses[1],
        epochs: Vec::new(),
        name: config.name,
        carousel: kind.supports_queueing(),
    };
    tx.emit(ProtocolEvent::MarketCreated {
        market_id,
        premium: market.premium,
        collateral: market.collateral,
        underlying_asset: market.underlying_asset,
        token: market.token,
        name: market.name.clone(),
        strike: market.strike,
        controller: market.controller,
        carousel: market.carousel,
    });
    info!(
        market_id = %market_id.short(),
        name = %market.name,
        carousel = market.carousel,
        "market created"
    );

    let created = CreatedMarket {
        premium: market.premium,
        collateral: market.collateral,
        market_id,
    };
    let factory = tx.factory_mut();
    factory.markets.insert(market_id, market);
    factory.market_order.push(market_id);
    Ok(created)
}

fn insert_epoch(
    tx: &mut Tx<'_>,
    market_id: MarketId,
    begin: Timestamp,
    end: Timestamp,
    withdrawal_fee_bps: u16,
) -> ProtocolResult<(EpochId, Market)> {
    let market = tx.state().factory.market(market_id)?.clone();
    if withdrawal_fee_bps == 0 {
        return Err(ProtocolError::FeeCannotBe0);
    }
    let max = tx.config.fees.max_withdrawal_fee_bps;
    if withdrawal_fee_bps > max {
        return Err(ProtocolError::InvalidWithdrawalFee {
            fee: withdrawal_fee_bps,
            max,
        });
    }
    if begin >= end {
        return Err(ProtocolError::InvalidEpochWindow { begin, end });
    }
    if begin < tx.now {
        return Err(ProtocolError::EpochBeginInPast { begin, now: tx.now });
    }
    if !tx.state().controllers.contains_key(&market.controller) {
        return Err(ProtocolError::ControllerNotSet(market.controller));
    }

    let epoch_id = ids::epoch_id(market_id, begin, end);
    if tx.state().factory.epoch_market.contains_key(&epoch_id) {
        return Err(ProtocolError::EpochAlreadyExists(epoch_id));
    }

    let config = EpochConfig {
        begin,
        end,
        created_at: tx.now,
        withdrawal_fee_bps,
    };
    tx.vault_mut(market.premium)?.set_epoch(epoch_id, config)?;
    tx.vault_mut(market.collateral)?.set_epoch(epoch_id, config)?;

    let factory = tx.factory_mut();
    factory.epoch_fees.insert(epoch_id, withdrawal_fee_bps);
    factory.epoch_market.insert(epoch_id, market_id);
    let market_entry = factory.market_mut(market_id)?;
    market_entry.epochs.push(epoch_id);

    info!(
        market_id = %market_id.short(),
        epoch_id = %epoch_id.short(),
        begin,
        end,
        withdrawal_fee_bps,
        "epoch created"
    );
    Ok((epoch_id, market_entry.clone()))
}
