//! Protocol operations - the submit surface of the ledger.
//!
//! Every state-changing call reaches the system as one [`ProtocolOperation`]
//! carrying its caller. The state machine applies it atomically and returns
//! an [`OperationResult`] inside a receipt.

use serde::{Deserialize, Serialize};

use crate::auction::house::{AuctionKind, AuctionStatus, Bid};
use crate::core::accounting::AuctionAttempt;
use crate::core::safe_engine::{Safe, SafeModification};
use crate::error::{Error, ErrorKind};
use crate::liquidation::engine::LiquidationRecord;
use crate::shutdown::global_settlement::ProcessedSafe;
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{Amount, Delta, FixedPointValue, Rad, Ray, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION HOUSE SELECTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Which auction house an auction operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionHouseId {
    /// Sells surplus coins for protocol tokens
    Surplus,
    /// Mints protocol tokens for coins
    Debt,
    /// Sells post-settlement coins for protocol tokens
    PostSettlementSurplus,
}

impl AuctionHouseId {
    /// Stable name used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionHouseId::Surplus => "surplus",
            AuctionHouseId::Debt => "debt",
            AuctionHouseId::PostSettlementSurplus => "post_settlement_surplus",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All operations accepted by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOperation {
    // Ledger
    /// Credit or debit free collateral (collateral adapter, authorized)
    ModifyCollateralBalance {
        /// Authorized adapter
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Account whose free collateral changes
        account: Address,
        /// Signed change
        delta: Delta<Wad>,
    },
    /// Allow `delegate` to act on the owner's safes and balances
    ApproveSafeModification {
        /// Granting owner
        owner: Address,
        /// Receiving delegate
        delegate: Address,
    },
    /// Revoke a delegate
    DenySafeModification {
        /// Revoking owner
        owner: Address,
        /// Revoked delegate
        delegate: Address,
    },
    /// Lock/free collateral and generate/repay debt
    ModifySafeCollateralization {
        /// Owner or approved delegate
        caller: Address,
        /// Requested change
        modification: SafeModification,
    },
    /// Move free collateral
    TransferCollateral {
        /// Source or its delegate
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Debited account
        src: Address,
        /// Credited account
        dst: Address,
        /// Amount moved
        amount: Wad,
    },
    /// Move internal coins
    TransferInternalCoins {
        /// Source or its delegate
        caller: Address,
        /// Debited account
        src: Address,
        /// Credited account
        dst: Address,
        /// Amount moved
        amount: Rad,
    },
    /// Accrue stability fees into the accounting engine (authorized)
    UpdateAccumulatedRate {
        /// Authorized tax collector
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Added to the accumulated rate
        rate_increase: Ray,
    },

    // Oracle
    /// Push a fresh feed price through the relayer (authorized)
    UpdateCollateralPrice {
        /// Authorized feed
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Feed price in coins per collateral unit
        price: Wad,
    },

    // Protocol token
    /// Mint protocol tokens (authorized)
    MintProtocolToken {
        /// Authorized minter
        caller: Address,
        /// Receiver
        to: Address,
        /// Amount minted
        amount: Wad,
    },
    /// Set a protocol token allowance
    ApproveProtocolToken {
        /// Token owner
        owner: Address,
        /// Approved spender
        spender: Address,
        /// New allowance
        amount: Wad,
    },

    // Liquidation and accounting
    /// Confiscate an unsafe safe
    LiquidateSafe {
        /// Any keeper
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Safe owner
        safe: Address,
    },
    /// Release a queued debt batch
    PopDebtFromQueue {
        /// Any keeper
        caller: Address,
        /// Timestamp the batch was queued at
        queued_at: u64,
    },
    /// Cancel engine coins against unbacked debt
    SettleDebt {
        /// Any keeper
        caller: Address,
        /// Amount cancelled
        amount: Rad,
    },
    /// Start a surplus auction if the engine holds enough surplus
    AuctionSurplus {
        /// Any keeper
        caller: Address,
    },
    /// Start a debt auction if the engine holds enough uncovered debt
    AuctionDebt {
        /// Any keeper
        caller: Address,
    },
    /// Drain coins that reached the disabled accounting engine
    TransferPostSettlementSurplus {
        /// Any keeper
        caller: Address,
    },

    // Auctions
    /// Raise the bid of a surplus or post-settlement auction
    IncreaseBidSize {
        /// Bidder paying in protocol tokens
        bidder: Address,
        /// Surplus or post-settlement house
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// Must equal the current lot
        amount_to_sell: Rad,
        /// New bid
        bid: Wad,
    },
    /// Accept fewer minted tokens in a debt auction
    DecreaseSoldAmount {
        /// Bidder paying in coins
        bidder: Address,
        /// Auction id
        id: u64,
        /// New, smaller lot
        amount_to_sell: Wad,
        /// Must equal the fixed coin bid
        bid: Rad,
    },
    /// Close an auction after its bid or auction deadline
    SettleAuction {
        /// Any keeper
        caller: Address,
        /// Target house
        house: AuctionHouseId,
        /// Auction id
        id: u64,
    },
    /// Extend an auction that expired without bids
    RestartAuction {
        /// Any keeper
        caller: Address,
        /// Target house
        house: AuctionHouseId,
        /// Auction id
        id: u64,
    },
    /// Unwind a live auction of a disabled house
    TerminateAuctionPrematurely {
        /// Any keeper
        caller: Address,
        /// Target house
        house: AuctionHouseId,
        /// Auction id
        id: u64,
    },

    // Shutdown
    /// Stake protocol tokens in the ESM and shut the system down
    TriggerShutdown {
        /// Token holder
        caller: Address,
    },
    /// Fix the final coin-per-collateral price of a type
    FreezeCollateralType {
        /// Any keeper
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
    },
    /// Settle one safe at the final price
    ProcessSafe {
        /// Any keeper
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Safe owner
        safe: Address,
    },
    /// Withdraw surplus collateral from a debt-free safe
    FreeCollateral {
        /// Safe owner
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
    },
    /// Snapshot the outstanding coin supply
    SetOutstandingCoinSupply {
        /// Any keeper
        caller: Address,
    },
    /// Derive the per-coin collateral payout of a type
    CalculateCashPrice {
        /// Any keeper
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
    },
    /// Lock coins in the caller's redemption bag
    PrepareCoinsForRedeeming {
        /// Coin holder
        caller: Address,
        /// Coins added to the bag
        amount: Wad,
    },
    /// Redeem the unused part of the bag for one collateral type
    RedeemCollateral {
        /// Coin holder
        caller: Address,
        /// Collateral type
        collateral_type: CollateralTypeId,
    },
    /// Auction coins held by the settlement surplus auctioneer
    AuctionPostSettlementSurplus {
        /// Any keeper
        caller: Address,
    },
}

impl ProtocolOperation {
    /// Stable operation name
    pub fn operation_type(&self) -> &'static str {
        match self {
            ProtocolOperation::ModifyCollateralBalance { .. } => "modify_collateral_balance",
            ProtocolOperation::ApproveSafeModification { .. } => "approve_safe_modification",
            ProtocolOperation::DenySafeModification { .. } => "deny_safe_modification",
            ProtocolOperation::ModifySafeCollateralization { .. } => "modify_safe_collateralization",
            ProtocolOperation::TransferCollateral { .. } => "transfer_collateral",
            ProtocolOperation::TransferInternalCoins { .. } => "transfer_internal_coins",
            ProtocolOperation::UpdateAccumulatedRate { .. } => "update_accumulated_rate",
            ProtocolOperation::UpdateCollateralPrice { .. } => "update_collateral_price",
            ProtocolOperation::MintProtocolToken { .. } => "mint_protocol_token",
            ProtocolOperation::ApproveProtocolToken { .. } => "approve_protocol_token",
            ProtocolOperation::LiquidateSafe { .. } => "liquidate_safe",
            ProtocolOperation::PopDebtFromQueue { .. } => "pop_debt_from_queue",
            ProtocolOperation::SettleDebt { .. } => "settle_debt",
            ProtocolOperation::AuctionSurplus { .. } => "auction_surplus",
            ProtocolOperation::AuctionDebt { .. } => "auction_debt",
            ProtocolOperation::TransferPostSettlementSurplus { .. } => "transfer_post_settlement_surplus",
            ProtocolOperation::IncreaseBidSize { .. } => "increase_bid_size",
            ProtocolOperation::DecreaseSoldAmount { .. } => "decrease_sold_amount",
            ProtocolOperation::SettleAuction { .. } => "settle_auction",
            ProtocolOperation::RestartAuction { .. } => "restart_auction",
            ProtocolOperation::TerminateAuctionPrematurely { .. } => "terminate_auction_prematurely",
            ProtocolOperation::TriggerShutdown { .. } => "trigger_shutdown",
            ProtocolOperation::FreezeCollateralType { .. } => "freeze_collateral_type",
            ProtocolOperation::ProcessSafe { .. } => "process_safe",
            ProtocolOperation::FreeCollateral { .. } => "free_collateral",
            ProtocolOperation::SetOutstandingCoinSupply { .. } => "set_outstanding_coin_supply",
            ProtocolOperation::CalculateCashPrice { .. } => "calculate_cash_price",
            ProtocolOperation::PrepareCoinsForRedeeming { .. } => "prepare_coins_for_redeeming",
            ProtocolOperation::RedeemCollateral { .. } => "redeem_collateral",
            ProtocolOperation::AuctionPostSettlementSurplus { .. } => "auction_post_settlement_surplus",
        }
    }

    /// Account submitting the operation
    pub fn caller(&self) -> Address {
        match self {
            ProtocolOperation::ApproveSafeModification { owner, .. }
            | ProtocolOperation::DenySafeModification { owner, .. }
            | ProtocolOperation::ApproveProtocolToken { owner, .. } => *owner,
            ProtocolOperation::IncreaseBidSize { bidder, .. }
            | ProtocolOperation::DecreaseSoldAmount { bidder, .. } => *bidder,
            ProtocolOperation::ModifyCollateralBalance { caller, .. }
            | ProtocolOperation::ModifySafeCollateralization { caller, .. }
            | ProtocolOperation::TransferCollateral { caller, .. }
            | ProtocolOperation::TransferInternalCoins { caller, .. }
            | ProtocolOperation::UpdateAccumulatedRate { caller, .. }
            | ProtocolOperation::UpdateCollateralPrice { caller, .. }
            | ProtocolOperation::MintProtocolToken { caller, .. }
            | ProtocolOperation::LiquidateSafe { caller, .. }
            | ProtocolOperation::PopDebtFromQueue { caller, .. }
            | ProtocolOperation::SettleDebt { caller, .. }
            | ProtocolOperation::AuctionSurplus { caller }
            | ProtocolOperation::AuctionDebt { caller }
            | ProtocolOperation::TransferPostSettlementSurplus { caller }
            | ProtocolOperation::SettleAuction { caller, .. }
            | ProtocolOperation::RestartAuction { caller, .. }
            | ProtocolOperation::TerminateAuctionPrematurely { caller, .. }
            | ProtocolOperation::TriggerShutdown { caller }
            | ProtocolOperation::FreezeCollateralType { caller, .. }
            | ProtocolOperation::ProcessSafe { caller, .. }
            | ProtocolOperation::FreeCollateral { caller, .. }
            | ProtocolOperation::SetOutstandingCoinSupply { caller }
            | ProtocolOperation::CalculateCashPrice { caller, .. }
            | ProtocolOperation::PrepareCoinsForRedeeming { caller, .. }
            | ProtocolOperation::RedeemCollateral { caller, .. }
            | ProtocolOperation::AuctionPostSettlementSurplus { caller } => *caller,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind-erased copy of an auction's bid record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidSnapshot {
    /// House holding the auction
    pub house: AuctionHouseId,
    /// Auction id
    pub id: u64,
    /// Current bid
    pub bid_amount: Amount,
    /// Current lot
    pub amount_to_sell: Amount,
    /// Current high bidder
    pub high_bidder: Address,
    /// When the current bid wins
    pub bid_expiry: u64,
    /// Absolute auction deadline
    pub auction_deadline: u64,
    /// Lifecycle status
    pub status: AuctionStatus,
}

impl BidSnapshot {
    /// Erase the kind of a bid record
    pub fn from_bid<K: AuctionKind>(house: AuctionHouseId, bid: &Bid<K>) -> Self {
        Self {
            house,
            id: bid.id,
            bid_amount: bid.bid_amount.into_amount(),
            amount_to_sell: bid.amount_to_sell.into_amount(),
            high_bidder: bid.high_bidder,
            bid_expiry: bid.bid_expiry,
            auction_deadline: bid.auction_deadline,
            status: bid.status,
        }
    }
}

/// Value returned by a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// State changed, nothing to report
    Applied,
    /// Safe after the modification
    Safe(Safe),
    /// Derived prices pushed to the ledger
    Prices {
        /// Price with the safety margin
        safety_price: Ray,
        /// Price with the liquidation margin
        liquidation_price: Ray,
    },
    /// Liquidation outcome
    Liquidated(LiquidationRecord),
    /// Auction started or skipped
    Auction(AuctionAttempt),
    /// Bid record after a bid, settlement, restart or termination
    Bid(BidSnapshot),
    /// Amount moved, released or redeemed
    Amount(Amount),
    /// Price fixed during settlement
    Price(Ray),
    /// Safe settlement outcome
    SafeProcessed(ProcessedSafe),
}

impl OperationResult {
    /// Amount payload, if any
    pub fn amount(&self) -> Option<Amount> {
        match self {
            OperationResult::Amount(amount) => Some(*amount),
            _ => None,
        }
    }

    /// Started auction id, if any
    pub fn auction_id(&self) -> Option<u64> {
        match self {
            OperationResult::Auction(attempt) => attempt.started(),
            OperationResult::Bid(snapshot) => Some(snapshot.id),
            _ => None,
        }
    }
}

/// Record of one committed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Operation name
    pub operation: String,
    /// Returned value
    pub result: OperationResult,
    /// Events emitted by the operation, in order
    pub events: Vec<crate::protocol::events::ProtocolEvent>,
    /// Block the operation was applied in
    pub block_height: u64,
    /// Clock value the operation saw
    pub timestamp: u64,
}

/// Collaborator-facing failure: the operation reverted and left no trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainError {
    /// Always true
    pub reverted: bool,
    /// Stable numeric code
    pub code: u32,
    /// Coarse family
    pub kind: ErrorKind,
    /// Lossless revert reason
    pub reason: String,
}

impl From<Error> for ChainError {
    fn from(error: Error) -> Self {
        Self {
            reverted: true,
            code: error.code(),
            kind: error.kind(),
            reason: error.revert_reason(),
        }
    }
}

impl From<&Error> for ChainError {
    fn from(error: &Error) -> Self {
        Self {
            reverted: true,
            code: error.code(),
            kind: error.kind(),
            reason: error.revert_reason(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::house::SurplusAuction;

    #[test]
    fn test_caller_extraction() {
        let alice = Address::derive("alice");
        let op = ProtocolOperation::IncreaseBidSize {
            bidder: alice,
            house: AuctionHouseId::Surplus,
            id: 1,
            amount_to_sell: Rad::from_integer(100),
            bid: Wad::from_integer(1),
        };
        assert_eq!(op.caller(), alice);
        assert_eq!(op.operation_type(), "increase_bid_size");

        let op = ProtocolOperation::ApproveSafeModification {
            owner: alice,
            delegate: Address::derive("bob"),
        };
        assert_eq!(op.caller(), alice);
    }

    #[test]
    fn test_bid_snapshot_tags_units() {
        let bid: Bid<SurplusAuction> = Bid {
            id: 3,
            bid_amount: Wad::from_integer(2),
            amount_to_sell: Rad::from_integer(100),
            high_bidder: Address::derive("alice"),
            originator: Address::derive("ae"),
            bid_expiry: 10,
            auction_deadline: 20,
            status: AuctionStatus::Active,
        };
        let snapshot = BidSnapshot::from_bid(AuctionHouseId::Surplus, &bid);
        assert_eq!(snapshot.bid_amount, Amount::Wad(Wad::from_integer(2)));
        assert_eq!(snapshot.amount_to_sell, Amount::Rad(Rad::from_integer(100)));
        assert_eq!(OperationResult::Bid(snapshot).auction_id(), Some(3));
    }

    #[test]
    fn test_chain_error_from_error() {
        let failure = ChainError::from(Error::AlreadyTriggered);
        assert!(failure.reverted);
        assert_eq!(failure.kind, ErrorKind::PhaseError);
        assert_eq!(failure.code, Error::AlreadyTriggered.code());
        assert!(!failure.reason.is_empty());
    }
}
