//! Error types for the GEB core.
//!
//! Every failure is local and synchronous. The variant carries enough context
//! to be surfaced losslessly as a revert reason; [`Error::kind`] groups the
//! variants into the coarse families callers match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for GEB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure families exposed to the submission collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller lacks the required role or approval
    Unauthorized,
    /// Mutating call on a disabled module
    ContractDisabled,
    /// Collateralization or solvency check failed
    InvariantViolation,
    /// State-machine precondition not met
    PhaseError,
    /// Auction timing or bid-size rule violated
    AuctionTimingError,
    /// Balance too small for the requested movement
    InsufficientBalance,
    /// Malformed input or arithmetic fault
    Validation,
    /// Serialization or synchronization fault
    Internal,
}

/// Main error type for the GEB core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller is not an authorized account of the module
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Module State Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Module has been disabled by the shutdown cascade
    #[error("Contract disabled: {0}")]
    ContractDisabled(String),

    /// Operation requires the module to be disabled first
    #[error("Contract still enabled: {0}")]
    StillEnabled(String),

    // ═══════════════════════════════════════════════════════════════════
    // Ledger Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Account balance too small for the requested movement
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        /// Ledger and account that was short
        account: String,
        /// Amount requested
        required: String,
        /// Amount available
        available: String,
    },

    /// Collateral type was never initialized
    #[error("Collateral type not found: {0}")]
    CollateralTypeNotFound(String),

    /// Collateral type initialized twice
    #[error("Collateral type already initialized: {0}")]
    CollateralTypeExists(String),

    // ═══════════════════════════════════════════════════════════════════
    // Collateralization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Debt ceiling of the collateral type or of the system exceeded
    #[error("Debt ceiling exceeded for {scope}: ceiling {ceiling}, resulting debt {resulting}")]
    CeilingExceeded {
        /// Collateral type name or "global"
        scope: String,
        /// Configured ceiling
        ceiling: String,
        /// Debt after the modification
        resulting: String,
    },

    /// Safe would be undercollateralized after the modification
    #[error("Safe undercollateralized: debt {debt} exceeds collateral value {collateral_value}")]
    Undercollateralized {
        /// Actual debt of the safe (Rad)
        debt: String,
        /// Locked collateral times safety price (Rad)
        collateral_value: String,
    },

    /// Safe debt is non-zero but below the collateral type's floor
    #[error("Safe debt {debt} below debt floor {floor}")]
    DebtFloorViolated {
        /// Actual debt of the safe (Rad)
        debt: String,
        /// Floor of the collateral type (Rad)
        floor: String,
    },

    /// Safe is healthy and cannot be liquidated
    #[error("Safe {0} is not liquidatable")]
    SafeNotLiquidatable(String),

    /// Ledger identity does not hold
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Shutdown Phase Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Emergency shutdown was already triggered
    #[error("Shutdown already triggered")]
    AlreadyTriggered,

    /// Staked governance tokens below the trigger threshold
    #[error("Below trigger threshold: required {required}, available {available}")]
    BelowThreshold {
        /// Trigger threshold
        required: String,
        /// Balance or allowance offered by the caller
        available: String,
    },

    /// Settlement step called before the shutdown trigger
    #[error("Shutdown not triggered")]
    ShutdownNotTriggered,

    /// Collateral type was already frozen
    #[error("Collateral type already frozen: {0}")]
    AlreadyFrozen(String),

    /// Collateral type not frozen yet
    #[error("Collateral type not frozen: {0}")]
    NotFrozen(String),

    /// Safe still carries debt
    #[error("Safe still in debt: {0}")]
    StillInDebt(String),

    /// Cooldown has not elapsed yet
    #[error("Cooldown not elapsed: ready at {ready_at}, now {now}")]
    CooldownNotElapsed {
        /// First admissible timestamp
        ready_at: u64,
        /// Current timestamp
        now: u64,
    },

    /// One-shot value already recorded
    #[error("Already set: {0}")]
    AlreadySet(String),

    /// Outstanding coin supply has not been fixed yet
    #[error("Outstanding coin supply not set")]
    SupplyNotSet,

    /// Cash price for the collateral type not computed yet
    #[error("Cash price not set: {0}")]
    CashPriceNotSet(String),

    /// Coin bag fully used for this collateral type
    #[error("Nothing to redeem for {0}")]
    NothingToRedeem(String),

    /// Disabled auction houses still hold live auctions
    #[error("{count} auctions still active")]
    AuctionsStillActive {
        /// Number of live auctions
        count: usize,
    },

    /// Accounting engine still holds coins
    #[error("Surplus not drained: {0}")]
    SurplusNotDrained(String),

    /// Post-settlement surplus drain address was never configured
    #[error("Post-settlement surplus drain not set")]
    DrainNotSet,

    /// No oracle quote recorded for the collateral type
    #[error("Oracle price unavailable: {0}")]
    PriceUnavailable(String),

    // ═══════════════════════════════════════════════════════════════════
    // Auction Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Auction id never started in this house
    #[error("Auction {0} not found")]
    AuctionNotFound(u64),

    /// Bid arrived after the bid expiry or the auction deadline
    #[error("Auction {0} expired")]
    AuctionExpired(u64),

    /// Settlement attempted before expiry
    #[error("Auction {0} not yet expired")]
    NotYetExpired(u64),

    /// Bid does not beat the current one by the required increment
    #[error("Bid too low for auction {id}: minimum {minimum}")]
    BidTooLow {
        /// Auction id
        id: u64,
        /// Smallest (or largest, for lot bids) acceptable value
        minimum: String,
    },

    /// Auction already settled or terminated
    #[error("Auction {0} already settled")]
    AlreadySettled(u64),

    /// Active-auction limit reached
    #[error("Auction capacity exceeded: max {max} active auctions")]
    CapacityExceeded {
        /// Configured limit
        max: usize,
    },

    /// Auction has no bid to settle
    #[error("Auction {0} has no bids")]
    NoBidsPlaced(u64),

    /// Auction cannot be restarted once a bid exists
    #[error("Auction {0} already has bids")]
    BidsAlreadyPlaced(u64),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Injected clock moved backwards
    #[error("Clock moved backwards: current {current}, requested {requested}")]
    ClockRegression {
        /// Last accepted timestamp
        current: u64,
        /// Rejected timestamp
        requested: u64,
    },

    /// Configuration file or environment is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,
}

impl Error {
    /// Coarse family of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) => ErrorKind::Unauthorized,

            Error::ContractDisabled(_) => ErrorKind::ContractDisabled,

            Error::CeilingExceeded { .. }
            | Error::Undercollateralized { .. }
            | Error::DebtFloorViolated { .. }
            | Error::SafeNotLiquidatable(_)
            | Error::InvariantViolation(_) => ErrorKind::InvariantViolation,

            Error::StillEnabled(_)
            | Error::CollateralTypeNotFound(_)
            | Error::CollateralTypeExists(_)
            | Error::AlreadyTriggered
            | Error::ShutdownNotTriggered
            | Error::AlreadyFrozen(_)
            | Error::NotFrozen(_)
            | Error::StillInDebt(_)
            | Error::CooldownNotElapsed { .. }
            | Error::AlreadySet(_)
            | Error::SupplyNotSet
            | Error::CashPriceNotSet(_)
            | Error::NothingToRedeem(_)
            | Error::AuctionsStillActive { .. }
            | Error::SurplusNotDrained(_)
            | Error::DrainNotSet
            | Error::PriceUnavailable(_)
            | Error::AuctionNotFound(_)
            | Error::AlreadySettled(_)
            | Error::CapacityExceeded { .. }
            | Error::NoBidsPlaced(_)
            | Error::BidsAlreadyPlaced(_) => ErrorKind::PhaseError,

            Error::AuctionExpired(_) | Error::NotYetExpired(_) | Error::BidTooLow { .. } => {
                ErrorKind::AuctionTimingError
            }

            Error::InsufficientBalance { .. } | Error::BelowThreshold { .. } => {
                ErrorKind::InsufficientBalance
            }

            Error::InvalidParameter { .. }
            | Error::ZeroAmount
            | Error::Overflow { .. }
            | Error::Underflow { .. }
            | Error::ClockRegression { .. }
            | Error::Config(_) => ErrorKind::Validation,

            Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Internal(_)
            | Error::Lock => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying later (after time passes or balances change) may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CooldownNotElapsed { .. }
                | Error::NotYetExpired(_)
                | Error::InsufficientBalance { .. }
                | Error::AuctionsStillActive { .. }
                | Error::SurplusNotDrained(_)
                | Error::Lock
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Revert reason string handed to the submission collaborator
    pub fn revert_reason(&self) -> String {
        self.to_string()
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Authorization errors: 1xxx
            Error::Unauthorized(_) => 1001,

            // Module state errors: 2xxx
            Error::ContractDisabled(_) => 2001,
            Error::StillEnabled(_) => 2002,

            // Ledger errors: 3xxx
            Error::InsufficientBalance { .. } => 3001,
            Error::CollateralTypeNotFound(_) => 3002,
            Error::CollateralTypeExists(_) => 3003,

            // Collateralization errors: 4xxx
            Error::CeilingExceeded { .. } => 4001,
            Error::Undercollateralized { .. } => 4002,
            Error::DebtFloorViolated { .. } => 4003,
            Error::SafeNotLiquidatable(_) => 4004,
            Error::InvariantViolation(_) => 4005,

            // Shutdown phase errors: 5xxx
            Error::AlreadyTriggered => 5001,
            Error::BelowThreshold { .. } => 5002,
            Error::ShutdownNotTriggered => 5003,
            Error::AlreadyFrozen(_) => 5004,
            Error::NotFrozen(_) => 5005,
            Error::StillInDebt(_) => 5006,
            Error::CooldownNotElapsed { .. } => 5007,
            Error::AlreadySet(_) => 5008,
            Error::SupplyNotSet => 5009,
            Error::CashPriceNotSet(_) => 5010,
            Error::NothingToRedeem(_) => 5011,
            Error::AuctionsStillActive { .. } => 5012,
            Error::SurplusNotDrained(_) => 5013,
            Error::DrainNotSet => 5014,
            Error::PriceUnavailable(_) => 5015,

            // Auction errors: 6xxx
            Error::AuctionNotFound(_) => 6001,
            Error::AuctionExpired(_) => 6002,
            Error::NotYetExpired(_) => 6003,
            Error::BidTooLow { .. } => 6004,
            Error::AlreadySettled(_) => 6005,
            Error::CapacityExceeded { .. } => 6006,
            Error::NoBidsPlaced(_) => 6007,
            Error::BidsAlreadyPlaced(_) => 6008,

            // Validation errors: 7xxx
            Error::InvalidParameter { .. } => 7001,
            Error::ZeroAmount => 7002,
            Error::Overflow { .. } => 7003,
            Error::Underflow { .. } => 7004,
            Error::ClockRegression { .. } => 7005,
            Error::Config(_) => 7006,

            // Serialization errors: 8xxx
            Error::Serialization(_) => 8001,
            Error::Deserialization(_) => 8002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
            Error::Lock => 9002,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::Unauthorized("".into()).code(),
            Error::ContractDisabled("".into()).code(),
            Error::StillEnabled("".into()).code(),
            Error::InsufficientBalance {
                account: "".into(),
                required: "".into(),
                available: "".into(),
            }
            .code(),
            Error::AlreadyTriggered.code(),
            Error::AlreadyFrozen("".into()).code(),
            Error::CooldownNotElapsed { ready_at: 0, now: 0 }.code(),
            Error::AuctionExpired(1).code(),
            Error::NotYetExpired(1).code(),
            Error::BidTooLow { id: 1, minimum: "".into() }.code(),
            Error::ZeroAmount.code(),
            Error::Internal("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Unauthorized("x".into()).kind(), ErrorKind::Unauthorized);
        assert_eq!(Error::ContractDisabled("x".into()).kind(), ErrorKind::ContractDisabled);
        assert_eq!(Error::StillInDebt("x".into()).kind(), ErrorKind::PhaseError);
        assert_eq!(Error::AuctionExpired(3).kind(), ErrorKind::AuctionTimingError);
        assert_eq!(
            Error::Undercollateralized { debt: "2".into(), collateral_value: "1".into() }.kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(
            Error::BelowThreshold { required: "2".into(), available: "1".into() }.kind(),
            ErrorKind::InsufficientBalance
        );
    }

    #[test]
    fn test_revert_reason_preserves_context() {
        let err = Error::CooldownNotElapsed { ready_at: 1_000, now: 999 };
        let reason = err.revert_reason();
        assert!(reason.contains("1000"));
        assert!(reason.contains("999"));
    }

    #[test]
    fn test_is_critical() {
        assert!(Error::InvariantViolation("test".into()).is_critical());
        assert!(Error::Overflow { operation: "test".into() }.is_critical());
        assert!(!Error::AlreadySettled(1).is_critical());
        assert!(Error::NotYetExpired(1).is_recoverable());
    }
}
