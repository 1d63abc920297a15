//! Protocol Events
//!
//! Every committed state change produces events for indexers. Events are
//! staged inside a transaction and only published after it commits, in
//! commit order, each stamped with a global sequence number.

use super::types::{Address, Amount, EpochId, MarketId, Timestamp, VaultSide};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// TVL figures of both sides at resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTvl {
    pub premium_claim: Amount,
    pub premium_final: Amount,
    pub collateral_claim: Amount,
    pub collateral_final: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolEvent {
    // --- factory -------------------------------------------------------------
    MarketCreated {
        market_id: MarketId,
        premium: Address,
        collateral: Address,
        underlying_asset: Address,
        token: Address,
        name: String,
        strike: Amount,
        controller: Address,
        carousel: bool,
    },
    EpochCreated {
        epoch_id: EpochId,
        market_id: MarketId,
        begin: Timestamp,
        end: Timestamp,
        premium: Address,
        collateral: Address,
        token: Address,
        strike: Amount,
        withdrawal_fee_bps: u16,
    },
    EpochCreatedWithEmissions {
        epoch_id: EpochId,
        market_id: MarketId,
        begin: Timestamp,
        end: Timestamp,
        withdrawal_fee_bps: u16,
        premium_emissions: Amount,
        collateral_emissions: Amount,
    },
    ControllerDeployed {
        controller: Address,
        sequencer_feed: Option<Address>,
    },
    AddressWhitelisted {
        address: Address,
        whitelisted: bool,
    },
    ControllerChanged {
        market_id: MarketId,
        controller: Address,
        premium: Address,
        collateral: Address,
    },
    TreasuryChanged {
        treasury: Address,
    },
    OracleChanged {
        market_id: MarketId,
        oracle: Address,
    },
    DepositFeeChanged {
        market_id: MarketId,
        vault: Address,
        fee_bps: u16,
    },
    RelayerFeeChanged {
        market_id: MarketId,
        relayer_fee: Amount,
    },

    // --- controller ----------------------------------------------------------
    EpochResolved {
        epoch_id: EpochId,
        market_id: MarketId,
        tvl: VaultTvl,
        strike_met: bool,
        timestamp: Timestamp,
        /// Normalized price that triggered a depeg.
        depeg_price: Option<i128>,
    },
    NullEpoch {
        epoch_id: EpochId,
        market_id: MarketId,
        tvl: VaultTvl,
        timestamp: Timestamp,
    },

    // --- vaults --------------------------------------------------------------
    Deposit {
        vault: Address,
        side: VaultSide,
        epoch_id: EpochId,
        caller: Address,
        receiver: Address,
        assets: Amount,
        shares: Amount,
    },
    DepositInQueue {
        vault: Address,
        epoch_id: EpochId,
        depositor: Address,
        receiver: Address,
        assets: Amount,
    },
    RelayerMinted {
        vault: Address,
        epoch_id: EpochId,
        relayer: Address,
        operations: usize,
        deposit_fees: Amount,
    },
    Withdraw {
        vault: Address,
        epoch_id: EpochId,
        caller: Address,
        receiver: Address,
        owner: Address,
        shares: Amount,
        assets: Amount,
        emissions: Amount,
    },
    ApprovalForAll {
        vault: Address,
        owner: Address,
        operator: Address,
        approved: bool,
    },
    RolloverQueued {
        vault: Address,
        epoch_id: EpochId,
        owner: Address,
        shares: Amount,
    },
    RolloverDelisted {
        vault: Address,
        epoch_id: EpochId,
        owner: Address,
    },
    RolloverMinted {
        vault: Address,
        epoch_id: EpochId,
        from_epoch: EpochId,
        owner: Address,
        shares_burned: Amount,
        shares_minted: Amount,
        emissions: Amount,
    },
    RolloverBatchProcessed {
        vault: Address,
        epoch_id: EpochId,
        relayer: Address,
        processed: usize,
        executions: usize,
        relayer_fees: Amount,
    },
    RolloverQueueCleaned {
        vault: Address,
        removed: Vec<Address>,
    },
}

impl ProtocolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolEvent::MarketCreated { .. } => "MarketCreated",
            ProtocolEvent::EpochCreated { .. } => "EpochCreated",
            ProtocolEvent::EpochCreatedWithEmissions { .. } => "EpochCreatedWithEmissions",
            ProtocolEvent::ControllerDeployed { .. } => "ControllerDeployed",
            ProtocolEvent::AddressWhitelisted { .. } => "AddressWhitelisted",
            ProtocolEvent::ControllerChanged { .. } => "ControllerChanged",
            ProtocolEvent::TreasuryChanged { .. } => "TreasuryChanged",
            ProtocolEvent::OracleChanged { .. } => "OracleChanged",
            ProtocolEvent::DepositFeeChanged { .. } => "DepositFeeChanged",
            ProtocolEvent::RelayerFeeChanged { .. } => "RelayerFeeChanged",
            ProtocolEvent::EpochResolved { .. } => "EpochResolved",
            ProtocolEvent::NullEpoch { .. } => "NullEpoch",
            ProtocolEvent::Deposit { .. } => "Deposit",
            ProtocolEvent::DepositInQueue { .. } => "DepositInQueue",
            ProtocolEvent::RelayerMinted { .. } => "RelayerMinted",
            ProtocolEvent::Withdraw { .. } => "Withdraw",
            ProtocolEvent::ApprovalForAll { .. } => "ApprovalForAll",
            ProtocolEvent::RolloverQueued { .. } => "RolloverQueued",
            ProtocolEvent::RolloverDelisted { .. } => "RolloverDelisted",
            ProtocolEvent::RolloverMinted { .. } => "RolloverMinted",
            ProtocolEvent::RolloverBatchProcessed { .. } => "RolloverBatchProcessed",
            ProtocolEvent::RolloverQueueCleaned { .. } => "RolloverQueueCleaned",
        }
    }

    /// Epoch the event is attributable to.
    pub fn epoch_id(&self) -> Option<EpochId> {
        use ProtocolEvent::*;
        match self {
            EpochCreated { epoch_id, .. }
            | EpochCreatedWithEmissions { epoch_id, .. }
            | EpochResolved { epoch_id, .. }
            | NullEpoch { epoch_id, .. }
            | Deposit { epoch_id, .. }
            | DepositInQueue { epoch_id, .. }
            | RelayerMinted { epoch_id, .. }
            | Withdraw { epoch_id, .. }
            | RolloverQueued { epoch_id, .. }
            | RolloverDelisted { epoch_id, .. }
            | RolloverMinted { epoch_id, .. }
            | RolloverBatchProcessed { epoch_id, .. } => Some(*epoch_id),
            _ => None,
        }
    }

    pub fn market_id(&self) -> Option<MarketId> {
        use ProtocolEvent::*;
        match self {
            MarketCreated { market_id, .. }
            | EpochCreated { market_id, .. }
            | EpochCreatedWithEmissions { market_id, .. }
            | ControllerChanged { market_id, .. }
            | OracleChanged { market_id, .. }
            | DepositFeeChanged { market_id, .. }
            | RelayerFeeChanged { market_id, .. }
            | EpochResolved { market_id, .. }
            | NullEpoch { market_id, .. } => Some(*market_id),
            _ => None,
        }
    }
}

/// A committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub event: ProtocolEvent,
}

// =============================================================================
// BUS
// =============================================================================

/// Broadcast fan-out plus a bounded ring of recent events.
pub struct EventBus {
    update_tx: broadcast::Sender<EventRecord>,
    recent: Mutex<VecDeque<EventRecord>>,
    recent_capacity: usize,
    next_seq: AtomicU64,
}

impl EventBus {
    pub fn new(channel_capacity: usize, recent_capacity: usize) -> Self {
        let (update_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            update_tx,
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.update_tx.subscribe()
    }

    /// Stamp a batch with the next sequence numbers without publishing it.
    ///
    /// Callers serialize `stamp` and `commit`; the engine does so under the
    /// state lock.
    pub fn stamp(&self, timestamp: Timestamp, events: Vec<ProtocolEvent>) -> Vec<EventRecord> {
        let base = self.next_seq.load(Ordering::SeqCst);
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| EventRecord {
                seq: base + i as u64,
                timestamp,
                event,
            })
            .collect()
    }

    /// Publish stamped records and move the sequence past them.
    pub fn commit(&self, records: &[EventRecord]) {
        let Some(last) = records.last() else {
            return;
        };
        self.next_seq.fetch_max(last.seq + 1, Ordering::SeqCst);
        let mut recent = self.recent.lock();
        for record in records {
            if self.recent_capacity > 0 {
                if recent.len() == self.recent_capacity {
                    recent.pop_front();
                }
                recent.push_back(record.clone());
            }
            // No subscribers is fine.
            let _ = self.update_tx.send(record.clone());
        }
    }

    /// Stamp and publish a batch. Returns the records.
    pub fn publish(&self, timestamp: Timestamp, events: Vec<ProtocolEvent>) -> Vec<EventRecord> {
        let records = self.stamp(timestamp, events);
        self.commit(&records);
        records
    }

    /// Continue numbering at `next`. Never moves the sequence backwards.
    pub fn resume_at(&self, next: u64) {
        self.next_seq.fetch_max(next, Ordering::SeqCst);
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    /// Sequence number the next event will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }
}
