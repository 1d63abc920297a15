//! Price and Sequencer Feeds
//!
//! Aggregator-style feeds consumed by controllers. The engine only reads the
//! latest round; trust checks (staleness, round lag, sequencer uptime) live
//! in the controller.
//!
//! ```text
//!   FeedRegistry
//!     ├── price feeds      oracle address → Arc<dyn PriceFeed>
//!     └── sequencer feeds  feed address   → Arc<dyn SequencerUptimeFeed>
//! ```

use super::types::{Address, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Decimals every price is normalized to before comparing with a strike.
pub const PRICE_DECIMALS: u8 = 18;

/// Sequencer feed answer meaning "up".
pub const SEQUENCER_UP: i128 = 0;

/// Sequencer feed answer meaning "down".
pub const SEQUENCER_DOWN: i128 = 1;

/// One aggregator round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: u128,
    /// Raw answer in feed decimals.
    pub answer: i128,
    /// When the round started. For sequencer feeds: when the status last
    /// changed.
    pub started_at: Timestamp,
    /// When the round was last updated.
    pub updated_at: Timestamp,
    /// Round in which the answer was computed.
    pub answered_in_round: u128,
}

impl RoundData {
    /// The answer was carried over from an earlier round.
    pub fn is_stale(&self) -> bool {
        self.answered_in_round < self.round_id
    }
}

pub trait PriceFeed: Send + Sync {
    fn decimals(&self) -> u8;
    fn latest_round_data(&self) -> Option<RoundData>;
}

pub trait SequencerUptimeFeed: Send + Sync {
    fn latest_round_data(&self) -> Option<RoundData>;
}

/// Scale a raw answer to 18 decimals.
pub fn normalize_price(answer: i128, decimals: u8) -> i128 {
    if decimals == PRICE_DECIMALS {
        answer
    } else if decimals < PRICE_DECIMALS {
        let factor = 10i128.pow((PRICE_DECIMALS - decimals) as u32);
        answer.saturating_mul(factor)
    } else {
        let factor = 10i128.pow(((decimals - PRICE_DECIMALS) as u32).min(38));
        answer / factor
    }
}

// =============================================================================
// MANUAL FEED
// =============================================================================

/// Feed whose rounds are pushed by hand (simulation, tests, or a relay that
/// copies rounds from an external source).
pub struct ManualFeed {
    decimals: u8,
    rounds: RwLock<Vec<RoundData>>,
}

impl ManualFeed {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals,
            rounds: RwLock::new(Vec::new()),
        }
    }

    /// Sequencer feed that has been up since `since`.
    pub fn sequencer_up_since(since: Timestamp) -> Self {
        let feed = Self::new(0);
        feed.push_round(SEQUENCER_UP, since, since);
        feed
    }

    /// Append a fresh round answered in itself. Returns its round id.
    pub fn push_round(&self, answer: i128, started_at: Timestamp, updated_at: Timestamp) -> u128 {
        let mut rounds = self.rounds.write();
        let round_id = rounds.last().map(|r| r.round_id + 1).unwrap_or(1);
        rounds.push(RoundData {
            round_id,
            answer,
            started_at,
            updated_at,
            answered_in_round: round_id,
        });
        round_id
    }

    /// Append a round verbatim.
    pub fn push_raw(&self, round: RoundData) {
        self.rounds.write().push(round);
    }

    pub fn round_count(&self) -> usize {
        self.rounds.read().len()
    }
}

impl fmt::Debug for ManualFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualFeed")
            .field("decimals", &self.decimals)
            .field("rounds", &self.round_count())
            .finish()
    }
}

impl PriceFeed for ManualFeed {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn latest_round_data(&self) -> Option<RoundData> {
        self.rounds.read().last().copied()
    }
}

impl SequencerUptimeFeed for ManualFeed {
    fn latest_round_data(&self) -> Option<RoundData> {
        self.rounds.read().last().copied()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default, Clone)]
pub struct FeedRegistry {
    price_feeds: HashMap<Address, Arc<dyn PriceFeed>>,
    sequencer_feeds: HashMap<Address, Arc<dyn SequencerUptimeFeed>>,
}

impl FeedRegistry {
    pub fn set_price_feed(&mut self, oracle: Address, feed: Arc<dyn PriceFeed>) {
        self.price_feeds.insert(oracle, feed);
    }

    pub fn set_sequencer_feed(&mut self, address: Address, feed: Arc<dyn SequencerUptimeFeed>) {
        self.sequencer_feeds.insert(address, feed);
    }

    pub fn price_feed(&self, oracle: Address) -> Option<&Arc<dyn PriceFeed>> {
        self.price_feeds.get(&oracle)
    }

    pub fn sequencer_feed(&self, address: Address) -> Option<&Arc<dyn SequencerUptimeFeed>> {
        self.sequencer_feeds.get(&address)
    }
}

impl fmt::Debug for FeedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedRegistry")
            .field("price_feeds", &self.price_feeds.len())
            .field("sequencer_feeds", &self.sequencer_feeds.len())
            .finish()
    }
}
