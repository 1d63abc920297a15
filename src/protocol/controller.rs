//! Epoch Controller
//!
//! Decides how an epoch ends and writes the outcome to both vaults of the
//! market in one transaction.
//!
//! ```text
//!                     ┌── now >= end ───────────────▶ triggerEndEpoch   (strike not met)
//!   Active epoch ─────┼── price < strike, fresh ────▶ triggerDepeg      (strike met)
//!                     └── one side empty ───────────▶ triggerNullEpoch  (1:1 refund)
//! ```
//!
//! Price reads go through the sequencer uptime check (when configured), the
//! staleness window and the round freshness check before a depeg is trusted.
//! Every `trigger_*` has a `can_exec_*` twin that runs the same checks
//! without mutating anything.

use super::engine::{Protocol, ProtocolState, Tx};
use super::epoch::EpochConfig;
use super::errors::{ProtocolError, ProtocolResult};
use super::events::{ProtocolEvent, VaultTvl};
use super::factory::Market;
use super::oracle::{normalize_price, FeedRegistry, SEQUENCER_UP};
use super::token::TokenMovement;
use super::types::{bps_of, Address, Amount, EpochId, MarketId, Timestamp};
use super::vault::Vault;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A deployed controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub address: Address,
    pub factory: Address,
    /// L2 sequencer uptime feed. `None` on chains without a sequencer.
    pub sequencer_feed: Option<Address>,
    pub grace_period_secs: u64,
    pub price_timeout_secs: u64,
}

impl Controller {
    /// Latest price of `oracle`, normalized to 18 decimals, after every
    /// trust check passed.
    pub fn latest_price(&self, feeds: &FeedRegistry, oracle: Address, now: Timestamp) -> ProtocolResult<i128> {
        if let Some(sequencer) = self.sequencer_feed {
            let round = feeds
                .sequencer_feed(sequencer)
                .and_then(|feed| feed.latest_round_data())
                .ok_or(ProtocolError::SequencerDown)?;
            if round.answer != SEQUENCER_UP {
                return Err(ProtocolError::SequencerDown);
            }
            if now.saturating_sub(round.started_at) <= self.grace_period_secs {
                return Err(ProtocolError::GracePeriodNotOver);
            }
        }

        let feed = feeds.price_feed(oracle).ok_or(ProtocolError::OraclePriceZero)?;
        let round = feed.latest_round_data().ok_or(ProtocolError::OraclePriceZero)?;
        if round.updated_at < now.saturating_sub(self.price_timeout_secs) {
            return Err(ProtocolError::PriceOutdated {
                updated_at: round.updated_at,
            });
        }

        let price = normalize_price(round.answer, feed.decimals());
        if price <= 0 {
            return Err(ProtocolError::OraclePriceZero);
        }
        if round.is_stale() {
            return Err(ProtocolError::RoundIDOutdated {
                round_id: round.round_id,
                answered_in_round: round.answered_in_round,
            });
        }
        Ok(price)
    }
}

// =============================================================================
// CHECKS
// =============================================================================

/// Everything a resolution needs to know about one (market, epoch).
struct Resolution {
    market: Market,
    controller: Controller,
    epoch_id: EpochId,
    config: EpochConfig,
    premium_tvl: Amount,
    collateral_tvl: Amount,
    /// Queued deposits of this epoch on either side, not yet minted.
    pending_deposits: usize,
    resolved: bool,
}

fn locate(state: &ProtocolState, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<Resolution> {
    let market = state.factory.market(market_id)?.clone();
    if state.factory.epoch_market(epoch_id) != Some(market_id) {
        return Err(ProtocolError::EpochNotExist(epoch_id));
    }
    let controller = state
        .controllers
        .get(&market.controller)
        .cloned()
        .ok_or(ProtocolError::ControllerNotSet(market.controller))?;

    let premium = state.vault(market.premium)?;
    let collateral = state.vault(market.collateral)?;
    let config = *premium.epoch_config(epoch_id)?;
    Ok(Resolution {
        premium_tvl: premium.total_assets(epoch_id),
        collateral_tvl: collateral.total_assets(epoch_id),
        pending_deposits: premium.deposit_queue().len_for(epoch_id)
            + collateral.deposit_queue().len_for(epoch_id),
        resolved: premium.epoch_resolved(epoch_id) || collateral.epoch_resolved(epoch_id),
        market,
        controller,
        epoch_id,
        config,
    })
}

/// Queued deposits must be minted before the TVL snapshot, or their assets
/// would sit in the vault with no shares.
fn require_queue_drained(r: &Resolution) -> ProtocolResult<()> {
    if r.pending_deposits > 0 {
        return Err(ProtocolError::QueueNotEmpty);
    }
    Ok(())
}

fn check_end_epoch(r: &Resolution, now: Timestamp) -> ProtocolResult<()> {
    if now < r.config.end {
        return Err(ProtocolError::EpochNotExpired);
    }
    if r.resolved {
        return Err(ProtocolError::EpochFinishedAlready);
    }
    require_queue_drained(r)?;
    if r.premium_tvl == 0 || r.collateral_tvl == 0 {
        return Err(ProtocolError::VaultZeroTVL);
    }
    Ok(())
}

/// Returns the price that breached the strike.
fn check_depeg(r: &Resolution, feeds: &FeedRegistry, now: Timestamp) -> ProtocolResult<i128> {
    if now < r.config.begin {
        return Err(ProtocolError::EpochNotStarted);
    }
    if now > r.config.end {
        return Err(ProtocolError::EpochExpired);
    }
    if r.resolved {
        return Err(ProtocolError::EpochFinishedAlready);
    }
    require_queue_drained(r)?;
    if r.premium_tvl == 0 || r.collateral_tvl == 0 {
        return Err(ProtocolError::VaultZeroTVL);
    }

    let price = r.controller.latest_price(feeds, r.market.oracle, now)?;
    let strike = i128::try_from(r.market.strike).unwrap_or(i128::MAX);
    if price >= strike {
        return Err(ProtocolError::PriceNotAtStrikePrice {
            price,
            strike: r.market.strike,
        });
    }
    Ok(price)
}

fn check_null_epoch(r: &Resolution, now: Timestamp) -> ProtocolResult<()> {
    if r.resolved {
        return Err(ProtocolError::EpochFinishedAlready);
    }
    if now < r.config.begin {
        return Err(ProtocolError::EpochNotStarted);
    }
    require_queue_drained(r)?;
    if r.premium_tvl != 0 && r.collateral_tvl != 0 {
        return Err(ProtocolError::VaultNotZeroTVL);
    }
    Ok(())
}

// =============================================================================
// SETTLEMENT
// =============================================================================

/// Resolve both vaults, run `settle` on them, and put them back. The vaults
/// are taken out of the map so both can be mutated at once; on failure the
/// transaction's undo log puts both back untouched.
fn resolve_pair<F>(tx: &mut Tx<'_>, r: &Resolution, settle: F) -> ProtocolResult<(VaultTvl, Vec<TokenMovement>)>
where
    F: FnOnce(&mut Vault, &mut Vault, Amount, Amount) -> Vec<TokenMovement>,
{
    let (premium_addr, collateral_addr) = (r.market.premium, r.market.collateral);
    let mut premium = tx.take_vault(premium_addr)?;
    let mut collateral = tx.take_vault(collateral_addr)?;

    let premium_final = premium.resolve_epoch(r.epoch_id, tx.now)?;
    let collateral_final = collateral.resolve_epoch(r.epoch_id, tx.now)?;
    let movements = settle(&mut premium, &mut collateral, premium_final, collateral_final);

    let tvl = VaultTvl {
        premium_claim: premium.claim_tvl(r.epoch_id),
        premium_final,
        collateral_claim: collateral.claim_tvl(r.epoch_id),
        collateral_final,
    };
    tx.insert_vault(premium);
    tx.insert_vault(collateral);
    Ok((tvl, movements))
}

impl Protocol {
    /// Normalized price of the market's oracle, after the trust checks.
    pub fn get_latest_price(&self, market_id: MarketId) -> ProtocolResult<i128> {
        self.read_with_feeds(|state, feeds, now| {
            let market = state.factory.market(market_id)?;
            let controller = state
                .controllers
                .get(&market.controller)
                .ok_or(ProtocolError::ControllerNotSet(market.controller))?;
            controller.latest_price(feeds, market.oracle, now)
        })
    }

    /// Resolve an expired epoch without a depeg. Premium pays its TVL, minus
    /// the withdrawal fee, to collateral.
    pub fn trigger_end_epoch(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<VaultTvl> {
        self.transact("trigger_end_epoch", |tx| {
            let r = locate(tx.state(), market_id, epoch_id)?;
            check_end_epoch(&r, tx.now)?;
            let treasury = tx.state().factory.treasury();
            let fee_bps = r.config.withdrawal_fee_bps;

            let (tvl, movements) = resolve_pair(tx, &r, |premium, collateral, premium_final, collateral_final| {
                let fee = bps_of(premium_final, fee_bps);
                let premium_to_collateral = premium_final - fee;
                premium.set_claim_tvl(epoch_id, 0);
                collateral.set_claim_tvl(epoch_id, collateral_final + premium_to_collateral);
                let asset = premium.asset();
                vec![
                    TokenMovement::Transfer {
                        token: asset,
                        from: premium.address(),
                        to: treasury,
                        amount: fee,
                    },
                    TokenMovement::Transfer {
                        token: asset,
                        from: premium.address(),
                        to: collateral.address(),
                        amount: premium_to_collateral,
                    },
                ]
            })?;
            tx.settle(&movements)?;

            let timestamp = tx.now;
            tx.emit(ProtocolEvent::EpochResolved {
                epoch_id,
                market_id,
                tvl,
                strike_met: false,
                timestamp,
                depeg_price: None,
            });
            info!(
                market_id = %market_id.short(),
                epoch_id = %epoch_id.short(),
                premium_final = tvl.premium_final,
                collateral_claim = tvl.collateral_claim,
                "epoch ended"
            );
            Ok(tvl)
        })
    }

    /// Resolve an active epoch whose price fell below the strike. Each side
    /// pays its TVL, minus the withdrawal fee, to the other.
    pub fn trigger_depeg(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<VaultTvl> {
        self.transact("trigger_depeg", |tx| {
            let r = locate(tx.state(), market_id, epoch_id)?;
            let price = check_depeg(&r, tx.feeds, tx.now)?;
            let treasury = tx.state().factory.treasury();
            let fee_bps = r.config.withdrawal_fee_bps;

            let (tvl, movements) = resolve_pair(tx, &r, |premium, collateral, premium_final, collateral_final| {
                let premium_fee = bps_of(premium_final, fee_bps);
                let collateral_fee = bps_of(collateral_final, fee_bps);
                let premium_to_collateral = premium_final - premium_fee;
                let collateral_to_premium = collateral_final - collateral_fee;

                premium.set_claim_tvl(epoch_id, collateral_to_premium);
                collateral.set_claim_tvl(epoch_id, premium_to_collateral);
                premium.set_epoch_depegged(epoch_id);
                collateral.set_epoch_depegged(epoch_id);

                let asset = premium.asset();
                let (p, c) = (premium.address(), collateral.address());
                vec![
                    TokenMovement::Transfer {
                        token: asset,
                        from: p,
                        to: treasury,
                        amount: premium_fee,
                    },
                    TokenMovement::Transfer {
                        token: asset,
                        from: c,
                        to: treasury,
                        amount: collateral_fee,
                    },
                    TokenMovement::Transfer {
                        token: asset,
                        from: p,
                        to: c,
                        amount: premium_to_collateral,
                    },
                    TokenMovement::Transfer {
                        token: asset,
                        from: c,
                        to: p,
                        amount: collateral_to_premium,
                    },
                ]
            })?;
            tx.settle(&movements)?;

            let timestamp = tx.now;
            tx.emit(ProtocolEvent::EpochResolved {
                epoch_id,
                market_id,
                tvl,
                strike_met: true,
                timestamp,
                depeg_price: Some(price),
            });
            info!(
                market_id = %market_id.short(),
                epoch_id = %epoch_id.short(),
                price,
                premium_claim = tvl.premium_claim,
                collateral_claim = tvl.collateral_claim,
                "epoch depegged"
            );
            Ok(tvl)
        })
    }

    /// Void an epoch that has no counterparty. Both sides redeem 1:1.
    pub fn trigger_null_epoch(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<VaultTvl> {
        self.transact("trigger_null_epoch", |tx| {
            let r = locate(tx.state(), market_id, epoch_id)?;
            check_null_epoch(&r, tx.now)?;

            let (tvl, _) = resolve_pair(tx, &r, |premium, collateral, _, _| {
                premium.set_epoch_null(epoch_id);
                collateral.set_epoch_null(epoch_id);
                Vec::new()
            })?;

            let timestamp = tx.now;
            tx.emit(ProtocolEvent::NullEpoch {
                epoch_id,
                market_id,
                tvl,
                timestamp,
            });
            info!(
                market_id = %market_id.short(),
                epoch_id = %epoch_id.short(),
                premium_final = tvl.premium_final,
                collateral_final = tvl.collateral_final,
                "epoch nulled"
            );
            Ok(tvl)
        })
    }

    // -------------------------------------------------------------------------
    // keeper predicates
    // -------------------------------------------------------------------------

    pub fn check_end_epoch(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<()> {
        self.read_with_feeds(|state, _, now| check_end_epoch(&locate(state, market_id, epoch_id)?, now))
    }

    /// Returns the breaching price.
    pub fn check_depeg(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<i128> {
        self.read_with_feeds(|state, feeds, now| check_depeg(&locate(state, market_id, epoch_id)?, feeds, now))
    }

    pub fn check_null_epoch(&self, market_id: MarketId, epoch_id: EpochId) -> ProtocolResult<()> {
        self.read_with_feeds(|state, _, now| check_null_epoch(&locate(state, market_id, epoch_id)?, now))
    }

    pub fn can_exec_end(&self, market_id: MarketId, epoch_id: EpochId) -> bool {
        let result = self.check_end_epoch(market_id, epoch_id);
        if let Err(e) = &result {
            debug!(epoch_id = %epoch_id.short(), reason = e.name(), "end epoch not executable");
        }
        result.is_ok()
    }

    pub fn can_exec_depeg(&self, market_id: MarketId, epoch_id: EpochId) -> bool {
        let result = self.check_depeg(market_id, epoch_id);
        if let Err(e) = &result {
            debug!(epoch_id = %epoch_id.short(), reason = e.name(), "depeg not executable");
        }
        result.is_ok()
    }

    pub fn can_exec_null_epoch(&self, market_id: MarketId, epoch_id: EpochId) -> bool {
        let result = self.check_null_epoch(market_id, epoch_id);
        if let Err(e) = &result {
            debug!(epoch_id = %epoch_id.short(), reason = e.name(), "null epoch not executable");
        }
        result.is_ok()
    }

    pub fn controller_info(&self, controller: Address) -> Option<Controller> {
        self.read(|state| state.controllers.get(&controller).cloned())
    }
}
