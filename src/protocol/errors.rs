//! Protocol errors.
//!
//! Every failure is fail-atomic: the transaction that raised it leaves no
//! trace in protocol state. `ErrorClass` tells a keeper whether waiting and
//! retrying can help.

use super::types::{Address, Amount, EpochId, MarketId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad parameters; rejected at call time.
    Configuration,
    /// The epoch/market is not in the right state yet (or any more).
    StatePrecondition,
    /// Caller lacks the required role or approval.
    Authorization,
    /// Oracle or sequencer data cannot be trusted right now.
    OracleTrust,
    /// Caller logic error against protocol invariants.
    Invariant,
    /// The event journal refused the commit.
    Storage,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::StatePrecondition => "state_precondition",
            ErrorClass::Authorization => "authorization",
            ErrorClass::OracleTrust => "oracle_trust",
            ErrorClass::Invariant => "invariant",
            ErrorClass::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // --- configuration ---------------------------------------------------
    #[error("zero address supplied for {field}")]
    AddressZero { field: &'static str },
    #[error("deposit fee {fee} bps exceeds maximum {max} bps")]
    InvalidDepositFee { fee: u16, max: u16 },
    #[error("relayer fee {fee} below minimum {min}")]
    InvalidRelayerFee { fee: Amount, min: Amount },
    #[error("withdrawal fee cannot be 0")]
    FeeCannotBe0,
    #[error("withdrawal fee {fee} bps exceeds maximum {max} bps")]
    InvalidWithdrawalFee { fee: u16, max: u16 },
    #[error("invalid vault index {index}")]
    InvalidVaultIndex { index: usize },
    #[error("amount {amount} below minimum {minimum}")]
    InvalidAmount { amount: Amount, minimum: Amount },
    #[error("count {requested} exceeds {available} available entries")]
    InvalidCount { requested: usize, available: usize },
    #[error("epoch window invalid: begin {begin} must precede end {end}")]
    InvalidEpochWindow { begin: Timestamp, end: Timestamp },
    #[error("epoch begin {begin} is in the past (now {now})")]
    EpochBeginInPast { begin: Timestamp, now: Timestamp },
    #[error("minimum queue deposit {min_queue_deposit} must exceed relayer fee {relayer_fee}")]
    InvalidMinQueueDeposit {
        min_queue_deposit: Amount,
        relayer_fee: Amount,
    },
    #[error("epoch {epoch_id} is not the latest epoch of the vault")]
    InvalidEpochId { epoch_id: EpochId },
    #[error("unknown token {0}")]
    UnknownToken(Address),
    #[error("unknown vault {0}")]
    VaultNotFound(Address),
    #[error("emissions token not configured")]
    EmissionsTokenNotSet,
    #[error("{operation} is not supported by a plain vault")]
    QueueingNotSupported { operation: &'static str },

    // --- state preconditions -----------------------------------------------
    #[error("epoch has not started")]
    EpochNotStarted,
    #[error("epoch has not expired")]
    EpochNotExpired,
    #[error("epoch already finished")]
    EpochFinishedAlready,
    #[error("epoch expired")]
    EpochExpired,
    #[error("previous epoch is not resolved")]
    EpochNotResolved,
    #[error("market {0} does not exist")]
    MarketDoesNotExist(MarketId),
    #[error("epoch {0} does not exist")]
    EpochNotExist(EpochId),

    // --- authorization -------------------------------------------------------
    #[error("caller {caller} is not authorized")]
    NotAuthorized { caller: Address },
    #[error("caller {caller} is not the time locker")]
    NotTimeLocker { caller: Address },
    #[error("controller {0} is not whitelisted")]
    ControllerNotSet(Address),
    #[error("owner {owner} did not authorize {caller}")]
    OwnerDidNotAuthorize { caller: Address, owner: Address },

    // --- oracle trust --------------------------------------------------------
    #[error("oracle price is outdated (updated at {updated_at})")]
    PriceOutdated { updated_at: Timestamp },
    #[error("oracle round {answered_in_round} answered behind round {round_id}")]
    RoundIDOutdated { round_id: u128, answered_in_round: u128 },
    #[error("L2 sequencer is down")]
    SequencerDown,
    #[error("sequencer grace period not over")]
    GracePeriodNotOver,
    #[error("price {price} is not below strike {strike}")]
    PriceNotAtStrikePrice { price: i128, strike: Amount },
    #[error("oracle price is zero or unavailable")]
    OraclePriceZero,

    // --- invariants ----------------------------------------------------------
    #[error("a vault has zero TVL")]
    VaultZeroTVL,
    #[error("both vaults have TVL")]
    VaultNotZeroTVL,
    #[error("deposit queue is not empty")]
    QueueNotEmpty,
    #[error("{0} is already enlisted in the rollover queue")]
    AlreadyEnlisted(Address),
    #[error("{0} is not enlisted in the rollover queue")]
    NotEnlisted(Address),
    #[error("market {0} already exists")]
    MarketAlreadyExists(MarketId),
    #[error("epoch {0} already exists")]
    EpochAlreadyExists(EpochId),
    #[error("shares are enlisted for rollover")]
    AlreadyRollingOver,
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },
    #[error("insufficient allowance: need {needed}, have {available}")]
    InsufficientAllowance { needed: Amount, available: Amount },
    #[error("arithmetic overflow in {0}")]
    MathOverflow(&'static str),

    // --- storage ---------------------------------------------------------
    #[error("event journal write failed: {0}")]
    JournalWrite(String),
}

impl ProtocolError {
    pub fn class(&self) -> ErrorClass {
        use ProtocolError::*;
        match self {
            AddressZero { .. }
            | InvalidDepositFee { .. }
            | InvalidRelayerFee { .. }
            | FeeCannotBe0
            | InvalidWithdrawalFee { .. }
            | InvalidVaultIndex { .. }
            | InvalidAmount { .. }
            | InvalidCount { .. }
            | InvalidEpochWindow { .. }
            | EpochBeginInPast { .. }
            | InvalidMinQueueDeposit { .. }
            | InvalidEpochId { .. }
            | UnknownToken(_)
            | VaultNotFound(_)
            | EmissionsTokenNotSet
            | QueueingNotSupported { .. } => ErrorClass::Configuration,

            EpochNotStarted
            | EpochNotExpired
            | EpochFinishedAlready
            | EpochExpired
            | EpochNotResolved
            | MarketDoesNotExist(_)
            | EpochNotExist(_) => ErrorClass::StatePrecondition,

            NotAuthorized { .. }
            | NotTimeLocker { .. }
            | ControllerNotSet(_)
            | OwnerDidNotAuthorize { .. } => ErrorClass::Authorization,

            PriceOutdated { .. }
            | RoundIDOutdated { .. }
            | SequencerDown
            | GracePeriodNotOver
            | PriceNotAtStrikePrice { .. }
            | OraclePriceZero => ErrorClass::OracleTrust,

            VaultZeroTVL
            | VaultNotZeroTVL
            | QueueNotEmpty
            | AlreadyEnlisted(_)
            | NotEnlisted(_)
            | MarketAlreadyExists(_)
            | EpochAlreadyExists(_)
            | AlreadyRollingOver
            | InsufficientBalance { .. }
            | InsufficientAllowance { .. }
            | MathOverflow(_) => ErrorClass::Invariant,

            JournalWrite(_) => ErrorClass::Storage,
        }
    }

    /// Whether an external keeper may succeed by retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::StatePrecondition | ErrorClass::OracleTrust | ErrorClass::Storage
        )
    }

    /// Stable error name for logs and journals.
    pub fn name(&self) -> &'static str {
        use ProtocolError::*;
        match self {
            AddressZero { .. } => "AddressZero",
            InvalidDepositFee { .. } => "InvalidDepositFee",
            InvalidRelayerFee { .. } => "InvalidRelayerFee",
            FeeCannotBe0 => "FeeCannotBe0",
            InvalidWithdrawalFee { .. } => "InvalidWithdrawalFee",
            InvalidVaultIndex { .. } => "InvalidVaultIndex",
            InvalidAmount { .. } => "InvalidAmount",
            InvalidCount { .. } => "InvalidCount",
            InvalidEpochWindow { .. } => "InvalidEpochWindow",
            EpochBeginInPast { .. } => "EpochBeginInPast",
            InvalidMinQueueDeposit { .. } => "InvalidMinQueueDeposit",
            InvalidEpochId { .. } => "InvalidEpochId",
            UnknownToken(_) => "UnknownToken",
            VaultNotFound(_) => "VaultNotFound",
            EmissionsTokenNotSet => "EmissionsTokenNotSet",
            QueueingNotSupported { .. } => "QueueingNotSupported",
            EpochNotStarted => "EpochNotStarted",
            EpochNotExpired => "EpochNotExpired",
            EpochFinishedAlready => "EpochFinishedAlready",
            EpochExpired => "EpochExpired",
            EpochNotResolved => "EpochNotResolved",
            MarketDoesNotExist(_) => "MarketDoesNotExist",
            EpochNotExist(_) => "EpochNotExist",
            NotAuthorized { .. } => "NotAuthorized",
            NotTimeLocker { .. } => "NotTimeLocker",
            ControllerNotSet(_) => "ControllerNotSet",
            OwnerDidNotAuthorize { .. } => "OwnerDidNotAuthorize",
            PriceOutdated { .. } => "PriceOutdated",
            RoundIDOutdated { .. } => "RoundIDOutdated",
            SequencerDown => "SequencerDown",
            GracePeriodNotOver => "GracePeriodNotOver",
            PriceNotAtStrikePrice { .. } => "PriceNotAtStrikePrice",
            OraclePriceZero => "OraclePriceZero",
            VaultZeroTVL => "VaultZeroTVL",
            VaultNotZeroTVL => "VaultNotZeroTVL",
            QueueNotEmpty => "QueueNotEmpty",
            AlreadyEnlisted(_) => "AlreadyEnlisted",
            NotEnlisted(_) => "NotEnlisted",
            MarketAlreadyExists(_) => "MarketAlreadyExists",
            EpochAlreadyExists(_) => "EpochAlreadyExists",
            AlreadyRollingOver => "AlreadyRollingOver",
            InsufficientBalance { .. } => "InsufficientBalance",
            InsufficientAllowance { .. } => "InsufficientAllowance",
            MathOverflow(_) => "MathOverflow",
            JournalWrite(_) => "JournalWrite",
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_and_timing_errors_are_retryable() {
        assert!(ProtocolError::SequencerDown.is_retryable());
        assert!(ProtocolError::EpochNotExpired.is_retryable());
        assert!(!ProtocolError::VaultZeroTVL.is_retryable());
        assert!(!ProtocolError::NotAuthorized {
            caller: Address::ZERO
        }
        .is_retryable());
    }

    #[test]
    fn test_classes() {
        assert_eq!(ProtocolError::FeeCannotBe0.class(), ErrorClass::Configuration);
        assert_eq!(
            ProtocolError::ControllerNotSet(Address::ZERO).class(),
            ErrorClass::Authorization
        );
        assert_eq!(ProtocolError::QueueNotEmpty.class(), ErrorClass::Invariant);
        assert_eq!(ProtocolError::QueueNotEmpty.name(), "QueueNotEmpty");
        let journal = ProtocolError::JournalWrite("disk full".into());
        assert_eq!(journal.class(), ErrorClass::Storage);
        assert!(journal.is_retryable());
    }
}
