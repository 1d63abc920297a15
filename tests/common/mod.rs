//! Shared setup for the integration tests. Uses only the public API.

#![allow(dead_code)]

use carousel_backend::protocol::{
    AuthContext, CarouselMarketConfig, CreatedMarket, EpochId, ManualFeed, MarketConfig, Protocol,
    ProtocolConfig, ProtocolSetup, SimClock, Timestamp, UNLIMITED_ALLOWANCE, SECONDS_PER_DAY, WAD,
};
use carousel_backend::protocol::{Address, Amount};
use std::sync::Arc;

pub const START: Timestamp = 1_700_000_000;
/// 2 gwei, as on Arbitrum deployments.
pub const RELAYER_FEE: Amount = 2_000_000_000;
pub const DEPOSIT_FEE_BPS: u16 = 50;
pub const WITHDRAWAL_FEE_BPS: u16 = 50;

pub struct World {
    pub protocol: Protocol,
    pub clock: Arc<SimClock>,
    pub owner: AuthContext,
    pub treasury: Address,
    pub weth: Address,
    pub emissions: Address,
    pub feed: Arc<ManualFeed>,
    pub oracle: Address,
    pub controller: Address,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        let clock = Arc::new(SimClock::new(START));
        let owner = AuthContext::new(Address::derive("owner"));
        let treasury = Address::derive("treasury");
        let weth = Address::derive("weth");
        let emissions = Address::derive("y2k");
        let protocol = Protocol::new(
            config,
            ProtocolSetup {
                owner: owner.caller,
                time_locker: Address::derive("time-locker"),
                treasury,
                weth,
                emissions_token: Some(emissions),
            },
            clock.clone(),
        )
        .unwrap()
        .with_configured_journal()
        .unwrap();

        let oracle = Address::derive("usdc-usd-feed");
        let feed = Arc::new(ManualFeed::new(8));
        feed.push_round(100_000_000, START, START);
        protocol.register_price_feed(oracle, feed.clone());

        let controller = protocol.deploy_controller(&owner, None).unwrap();
        protocol.whitelist_controller(&owner, controller).unwrap();

        protocol.mint_tokens(emissions, treasury, 10_000 * WAD).unwrap();
        protocol
            .approve(
                &AuthContext::new(treasury),
                emissions,
                protocol.factory_address(),
                UNLIMITED_ALLOWANCE,
            )
            .unwrap();

        Self {
            protocol,
            clock,
            owner,
            treasury,
            weth,
            emissions,
            feed,
            oracle,
            controller,
        }
    }

    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            token: Address::derive("usdc"),
            strike: WAD,
            oracle: self.oracle,
            underlying_asset: self.weth,
            name: "USD Coin".into(),
            token_uri: "USDC".into(),
            controller: self.controller,
        }
    }

    pub fn earthquake_market(&self) -> CreatedMarket {
        self.protocol
            .create_new_market(&self.owner, self.market_config())
            .unwrap()
    }

    pub fn carousel_market(&self) -> CreatedMarket {
        self.protocol
            .create_new_carousel_market(
                &self.owner,
                CarouselMarketConfig {
                    market: self.market_config(),
                    relayer_fee: RELAYER_FEE,
                    deposit_fee_bps: DEPOSIT_FEE_BPS,
                    min_queue_deposit: WAD,
                },
            )
            .unwrap()
    }

    /// Epoch over `[now + begin_days, now + end_days]`.
    pub fn epoch(&self, market: &CreatedMarket, begin_days: u64, end_days: u64) -> (EpochId, Timestamp, Timestamp) {
        let now = self.protocol.now();
        let begin = now + begin_days * SECONDS_PER_DAY;
        let end = now + end_days * SECONDS_PER_DAY;
        let epoch = self
            .protocol
            .create_epoch(&self.owner, market.market_id, begin, end, WITHDRAWAL_FEE_BPS)
            .unwrap();
        (epoch, begin, end)
    }

    /// Funded user with unlimited approval to both vaults of `market`.
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

    pub fn set_price(&self, answer: i128) {
        let now = self.protocol.now();
        self.feed.push_round(answer, now, now);
    }

    pub fn weth(&self, account: Address) -> Amount {
        self.protocol.token_balance(self.weth, account)
    }
}

pub fn ether(n: u128) -> Amount {
    n * WAD
}
