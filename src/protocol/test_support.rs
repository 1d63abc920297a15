//! Shared fixture for protocol tests.

use crate::protocol::access::AuthContext;
use crate::protocol::clock::SimClock;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::engine::{Protocol, ProtocolSetup};
use crate::protocol::factory::{CarouselMarketConfig, CreatedMarket, MarketConfig};
use crate::protocol::oracle::ManualFeed;
use crate::protocol::token::UNLIMITED_ALLOWANCE;
use crate::protocol::types::{Address, Amount, EpochId, Timestamp, SECONDS_PER_DAY, WAD};
use std::sync::Arc;

pub const START: Timestamp = 1_700_000_000;
pub const DEPOSIT_FEE_BPS: u16 = 50;
pub const RELAYER_FEE: Amount = 2_000_000_000;
pub const WITHDRAWAL_FEE_BPS: u16 = 50;
/// Chainlink USD feeds report 8 decimals.
pub const FEED_DECIMALS: u8 = 8;

pub struct Fixture {
    pub protocol: Protocol,
    pub clock: Arc<SimClock>,
    pub owner: AuthContext,
    pub time_locker: AuthContext,
    pub treasury: Address,
    pub weth: Address,
    pub emissions: Address,
    pub token: Address,
    pub oracle: Address,
    pub feed: Arc<ManualFeed>,
    pub controller: Address,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(ProtocolConfig::default(), None)
    }

    /// Fixture whose controller checks an L2 sequencer feed.
    pub fn with_sequencer(sequencer: Arc<ManualFeed>) -> Self {
        Self::build(ProtocolConfig::default(), Some(sequencer))
    }

    pub fn build(config: ProtocolConfig, sequencer: Option<Arc<ManualFeed>>) -> Self {
        let clock = Arc::new(SimClock::new(START));
        let owner = Address::derive("owner");
        let time_locker = Address::derive("time-locker");
        let treasury = Address::derive("treasury");
        let weth = Address::derive("weth");
        let emissions = Address::derive("y2k");
        let setup = ProtocolSetup {
            owner,
            time_locker,
            treasury,
            weth,
            emissions_token: Some(emissions),
        };
        let protocol = Protocol::new(config, setup, clock.clone()).unwrap();
        let owner = AuthContext::new(owner);

        let oracle = Address::derive("usdc-usd-feed");
        let feed = Arc::new(ManualFeed::new(FEED_DECIMALS));
        feed.push_round(100_000_000, START, START);
        protocol.register_price_feed(oracle, feed.clone());

        let sequencer_address = sequencer.map(|seq| {
            let address = Address::derive("sequencer-feed");
            protocol.register_sequencer_feed(address, seq);
            address
        });
        let controller = protocol.deploy_controller(&owner, sequencer_address).unwrap();
        protocol.whitelist_controller(&owner, controller).unwrap();

        protocol.mint_tokens(emissions, treasury, 10_000 * WAD).unwrap();
        let factory = protocol.factory_address();
        protocol
            .approve(&AuthContext::new(treasury), emissions, factory, UNLIMITED_ALLOWANCE)
            .unwrap();

        Self {
            protocol,
            clock,
            owner,
            time_locker: AuthContext::new(time_locker),
            treasury,
            weth,
            emissions,
            token: Address::derive("usdc"),
            oracle,
            feed,
            controller,
        }
    }

    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            token: self.token,
            strike: WAD,
            oracle: self.oracle,
            underlying_asset: self.weth,
            name: "USD Coin".to_string(),
            token_uri: "USDC".to_string(),
            controller: self.controller,
        }
    }

    pub fn carousel_config(&self) -> CarouselMarketConfig {
        CarouselMarketConfig {
            market: self.market_config(),
            relayer_fee: RELAYER_FEE,
            deposit_fee_bps: DEPOSIT_FEE_BPS,
            min_queue_deposit: WAD,
        }
    }

    pub fn plain_market(&self) -> CreatedMarket {
        self.protocol
            .create_new_market(&self.owner, self.market_config())
            .unwrap()
    }

    pub fn carousel_market(&self) -> CreatedMarket {
        self.protocol
            .create_new_carousel_market(&self.owner, self.carousel_config())
            .unwrap()
    }

    /// Epoch over `[now + begin_days, now + end_days]`.
    pub fn epoch(&self, market: &CreatedMarket, begin_days: u64, end_days: u64) -> (EpochId, Timestamp, Timestamp) {
        let now = self.protocol.now();
        let begin = now + begin_days * SECONDS_PER_DAY;
        let end = now + end_days * SECONDS_PER_DAY;
        let epoch_id = self
            .protocol
            .create_epoch(&self.owner, market.market_id, begin, end, WITHDRAWAL_FEE_BPS)
            .unwrap();
        (epoch_id, begin, end)
    }

    /// A user with `amount` WETH and unlimited approval to both vaults.
    pub fn user(&self, label: &str, market: &CreatedMarket, amount: Amount) -> AuthContext {
        let user = AuthContext::new(Address::derive(label));
        self.protocol.mint_tokens(self.weth, user.caller, amount).unwrap();
        for vault in [market.premium, market.collateral] {
            self.protocol
                .approve(&user, self.weth, vault, UNLIMITED_ALLOWANCE)
                .unwrap();
        }
        user
    }

    /// Publish a fresh price in feed decimals.
    pub fn set_price(&self, answer: i128) {
        let now = self.protocol.now();
        self.feed.push_round(answer, now, now);
    }

    pub fn weth_balance(&self, account: Address) -> Amount {
        self.protocol.token_balance(self.weth, account)
    }
}

pub fn ether(n: u128) -> Amount {
    n * WAD
}
