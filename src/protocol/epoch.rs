//! Epoch configuration and resolution snapshot.
//!
//! ```text
//!   NotStarted ──begin──▶ Active ──end──▶ AwaitingResolution
//!        │                  │                    │
//!        │ (null)           │ (depeg / null)     │ (end / null)
//!        ▼                  ▼                    ▼
//!      Null            Depegged | Null       Resolved | Null
//! ```
//!
//! Terminal states never transition back.

use super::types::{Amount, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window and fee of one epoch, shared by both vaults of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub begin: Timestamp,
    pub end: Timestamp,
    pub created_at: Timestamp,
    /// Withdrawal fee taken by the controller at resolution (basis points).
    pub withdrawal_fee_bps: u16,
}

impl EpochConfig {
    pub fn has_started(&self, now: Timestamp) -> bool {
        now >= self.begin
    }

    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.end
    }
}

/// Per-vault resolution snapshot written only by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSettlement {
    pub resolved: bool,
    pub null: bool,
    pub depegged: bool,
    /// Share supply when the epoch resolved.
    pub final_tvl: Amount,
    /// Assets claimable by those shares after the controller moved funds.
    pub claim_tvl: Amount,
    pub resolved_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochStatus {
    NotStarted,
    Active,
    /// Past `end`, waiting for a controller.
    AwaitingResolution,
    Resolved,
    Depegged,
    Null,
}

impl EpochStatus {
    pub fn derive(config: &EpochConfig, settlement: &EpochSettlement, now: Timestamp) -> Self {
        if settlement.null {
            EpochStatus::Null
        } else if settlement.depegged {
            EpochStatus::Depegged
        } else if settlement.resolved {
            EpochStatus::Resolved
        } else if !config.has_started(now) {
            EpochStatus::NotStarted
        } else if !config.has_ended(now) {
            EpochStatus::Active
        } else {
            EpochStatus::AwaitingResolution
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpochStatus::Resolved | EpochStatus::Depegged | EpochStatus::Null
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpochStatus::NotStarted => "not_started",
            EpochStatus::Active => "active",
            EpochStatus::AwaitingResolution => "awaiting_resolution",
            EpochStatus::Resolved => "resolved",
            EpochStatus::Depegged => "depegged",
            EpochStatus::Null => "null",
        }
    }
}

impl fmt::Display for EpochStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_clock_until_resolved() {
        let config = EpochConfig {
            begin: 100,
            end: 200,
            created_at: 0,
            withdrawal_fee_bps: 50,
        };
        let mut settlement = EpochSettlement::default();
        assert_eq!(EpochStatus::derive(&config, &settlement, 50), EpochStatus::NotStarted);
        assert_eq!(EpochStatus::derive(&config, &settlement, 100), EpochStatus::Active);
        assert_eq!(
            EpochStatus::derive(&config, &settlement, 200),
            EpochStatus::AwaitingResolution
        );

        settlement.resolved = true;
        settlement.depegged = true;
        let status = EpochStatus::derive(&config, &settlement, 150);
        assert_eq!(status, EpochStatus::Depegged);
        assert!(status.is_terminal());
    }
}
