//! Deposit and Rollover Queues
//!
//! Carousel vaults never mint on deposit. Deposits wait in a per-epoch FIFO
//! until a relayer drains them in count-bounded batches; rollovers are
//! carried from one epoch into the next through a persistent enlistment list
//! walked by a per-epoch cursor.
//!
//! ```text
//!   DepositQueue (per epoch)          RolloverQueue (per vault)
//!   ┌──────┬──────┬──────┐            slot: 0     1     2     3
//!   │ d0   │ d1   │ d2   │ ← push     owner: A     B     C     D
//!   └──────┴──────┴──────┘            cursor[e5] ──────────┘
//!     ↑ pop_front(count)              entries [cursor, cursor+count) minted next
//! ```
//!
//! # Ordering Guarantees
//! 1. Deposit entries leave in insertion order and exactly once.
//! 2. Rollover slots keep insertion order; an account owns at most one slot.
//! 3. A cursor only moves forward, so repeated drains never revisit a slot.

use super::errors::{ProtocolError, ProtocolResult};
use super::types::{Address, Amount, EpochId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

// =============================================================================
// DEPOSIT QUEUE
// =============================================================================

/// A pending deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub depositor: Address,
    pub receiver: Address,
    pub assets: Amount,
    /// Vault-wide insertion sequence.
    pub seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DepositQueue {
    pending: HashMap<EpochId, VecDeque<QueueItem>>,
    next_seq: u64,
}

impl DepositQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a deposit for `epoch`. Returns the entry's sequence number.
    pub fn push(&mut self, epoch: EpochId, depositor: Address, receiver: Address, assets: Amount) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.entry(epoch).or_default().push_back(QueueItem {
            depositor,
            receiver,
            assets,
            seq,
        });
        seq
    }

    /// Remove the first `count` entries for `epoch`.
    ///
    /// `count == 0` returns nothing; `count` above the pending length fails
    /// with `InvalidCount` and leaves the queue untouched.
    pub fn pop_front(&mut self, epoch: EpochId, count: usize) -> ProtocolResult<Vec<QueueItem>> {
        let available = self.len_for(epoch);
        if count > available {
            return Err(ProtocolError::InvalidCount {
                requested: count,
                available,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let Some(queue) = self.pending.get_mut(&epoch) else {
            return Ok(Vec::new());
        };
        let drained: Vec<QueueItem> = queue.drain(..count).collect();
        if queue.is_empty() {
            self.pending.remove(&epoch);
        }
        Ok(drained)
    }

    /// Pending entries across all epochs.
    pub fn len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len_for(&self, epoch: EpochId) -> usize {
        self.pending.get(&epoch).map(VecDeque::len).unwrap_or(0)
    }
}

// =============================================================================
// ROLLOVER QUEUE
// =============================================================================

/// One enlisted account. `shares == 0` marks a delisted slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverItem {
    pub owner: Address,
    /// Shares of `epoch_id` to carry forward. A rollover moves their par
    /// value and re-points the slot at the shares minted in the new epoch.
    pub shares: Amount,
    pub epoch_id: EpochId,
}

impl RolloverItem {
    pub fn is_active(&self) -> bool {
        self.shares > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RolloverQueue {
    items: Vec<RolloverItem>,
    index: HashMap<Address, usize>,
    /// Next slot to process when minting into a given epoch.
    cursors: HashMap<EpochId, usize>,
}

impl RolloverQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots, including delisted ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_enlisted(&self, owner: Address) -> bool {
        self.get(owner).map(RolloverItem::is_active).unwrap_or(false)
    }

    pub fn get(&self, owner: Address) -> Option<&RolloverItem> {
        self.index.get(&owner).map(|&i| &self.items[i])
    }

    pub fn position(&self, owner: Address) -> Option<usize> {
        self.index.get(&owner).copied()
    }

    pub fn items(&self) -> &[RolloverItem] {
        &self.items
    }

    /// Enlist `owner`, reusing its slot if it was delisted. Returns the slot.
    pub fn enlist(&mut self, owner: Address, epoch_id: EpochId, shares: Amount) -> ProtocolResult<usize> {
        if let Some(&slot) = self.index.get(&owner) {
            let item = &mut self.items[slot];
            if item.is_active() {
                return Err(ProtocolError::AlreadyEnlisted(owner));
            }
            item.shares = shares;
            item.epoch_id = epoch_id;
            return Ok(slot);
        }
        let slot = self.items.len();
        self.items.push(RolloverItem {
            owner,
            shares,
            epoch_id,
        });
        self.index.insert(owner, slot);
        Ok(slot)
    }

    /// Mark the owner's slot empty. The slot itself stays so cursors remain
    /// valid.
    pub fn delist(&mut self, owner: Address) -> ProtocolResult<RolloverItem> {
        let slot = *self
            .index
            .get(&owner)
            .ok_or(ProtocolError::NotEnlisted(owner))?;
        let item = &mut self.items[slot];
        if !item.is_active() {
            return Err(ProtocolError::NotEnlisted(owner));
        }
        let previous = item.clone();
        item.shares = 0;
        Ok(previous)
    }

    /// How many slots have been processed for `epoch`.
    pub fn cursor(&self, epoch: EpochId) -> usize {
        self.cursors.get(&epoch).copied().unwrap_or(0)
    }

    /// Slot range `[cursor, cursor + count)` for `epoch`.
    pub fn window(&self, epoch: EpochId, count: usize) -> ProtocolResult<std::ops::Range<usize>> {
        let start = self.cursor(epoch).min(self.items.len());
        let available = self.items.len() - start;
        if count > available {
            return Err(ProtocolError::InvalidCount {
                requested: count,
                available,
            });
        }
        Ok(start..start + count)
    }

    pub fn advance(&mut self, epoch: EpochId, count: usize) {
        let next = (self.cursor(epoch) + count).min(self.items.len());
        self.cursors.insert(epoch, next);
    }

    pub fn slot(&self, slot: usize) -> Option<&RolloverItem> {
        self.items.get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut RolloverItem> {
        self.items.get_mut(slot)
    }

    /// Remove the slots of `owners` for which `stale` returns true.
    ///
    /// Removal is stable. Each cursor is re-based to the number of surviving
    /// slots that sat before it. Returns the owners removed.
    pub fn remove_where<F>(&mut self, owners: &[Address], mut stale: F) -> Vec<Address>
    where
        F: FnMut(&RolloverItem) -> bool,
    {
        let targets: HashSet<usize> = owners
            .iter()
            .filter_map(|o| self.index.get(o).copied())
            .filter(|&slot| stale(&self.items[slot]))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        // surviving[i] = survivors strictly before old slot i
        let mut surviving = Vec::with_capacity(self.items.len() + 1);
        let mut kept = 0usize;
        for slot in 0..self.items.len() {
            surviving.push(kept);
            if !targets.contains(&slot) {
                kept += 1;
            }
        }
        surviving.push(kept);

        for cursor in self.cursors.values_mut() {
            *cursor = surviving[(*cursor).min(self.items.len())];
        }

        let mut removed = Vec::with_capacity(targets.len());
        let mut slot = 0usize;
        self.items.retain(|item| {
            let keep = !targets.contains(&slot);
            if !keep {
                removed.push(item.owner);
            }
            slot += 1;
            keep
        });

        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.owner, i))
            .collect();
        removed
    }
}
