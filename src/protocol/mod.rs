//! Carousel Protocol
//!
//! Epoch-based depeg insurance. Each market pairs a premium vault (buyers of
//! cover) with a collateral vault (sellers of cover). A controller resolves
//! every epoch by time or by oracle price and moves funds between the two
//! sides.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Protocol                              │
//! │  (one state lock; every operation is a Tx with an undo log)     │
//! └─────────────────────────────────────────────────────────────────┘
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  Factory    │        │ Controller  │        │ TokenReg.   │
//! │ (markets,   │        │ (resolve by │        │ (underlying │
//! │  epochs)    │        │  time/price)│        │  + rewards) │
//! └──────┬──────┘        └──────┬──────┘        └─────────────┘
//!        │                      │ writes both sides at once
//!        ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Vault (premium)   │   Vault (collateral)           │
//! │   ShareLedger · DepositQueue · RolloverQueue · settlements      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//!                 EventBus (broadcast + ring) → EventJournal (SQLite)
//! ```
//!
//! # Guarantees
//!
//! - **Fail-atomic**: an operation that errors leaves no trace, including
//!   token transfers and events.
//! - **Ordered**: operations are totally ordered; events carry a global
//!   sequence number in commit order.
//! - **One-shot resolution**: an epoch resolves once, on both vaults
//!   together.

pub mod access;
pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod epoch;
pub mod errors;
pub mod events;
pub mod factory;
pub mod ids;
pub mod journal;
pub mod ledger;
pub mod oracle;
pub mod queue;
pub mod token;
pub mod types;
pub mod vault;

#[cfg(test)]
mod factory_tests;
#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use access::{AccessControl, AuthContext, Role};
pub use clock::{Clock, SimClock, SystemClock};
pub use config::{EventSettings, FeeBounds, OracleSettings, ProtocolConfig};
pub use controller::Controller;
pub use engine::{Protocol, ProtocolSetup, ProtocolState};
pub use epoch::{EpochConfig, EpochSettlement, EpochStatus};
pub use errors::{ErrorClass, ProtocolError, ProtocolResult};
pub use events::{EventBus, EventRecord, ProtocolEvent, VaultTvl};
pub use factory::{CarouselMarketConfig, CreatedMarket, Market, MarketConfig};
pub use journal::{EventJournal, JournalEntry};
pub use ledger::ShareLedger;
pub use oracle::{
    normalize_price, FeedRegistry, ManualFeed, PriceFeed, RoundData, SequencerUptimeFeed,
    PRICE_DECIMALS, SEQUENCER_DOWN, SEQUENCER_UP,
};
pub use queue::{DepositQueue, QueueItem, RolloverItem, RolloverQueue};
pub use token::{TokenLedger, TokenMovement, TokenRegistry, UNLIMITED_ALLOWANCE};
pub use types::{
    bps_of, format_ether, mul_div_down, mul_div_up, parse_ether, parse_units, Address, Amount,
    EpochId, MarketId, Timestamp, VaultSide, BPS_DENOMINATOR, SECONDS_PER_DAY, WAD,
};
pub use vault::{
    CarouselParams, DepositReceipt, MintedDeposit, QueueMintReceipt, RolloverExecution,
    RolloverMintReceipt, Vault, VaultIdentity, VaultKind, WithdrawReceipt,
};
