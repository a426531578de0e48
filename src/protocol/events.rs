//! Protocol events for state change notifications.
//!
//! Every committed operation emits one or more events. Keepers follow
//! auctions and settlement progress through them; the per-block log can be
//! digested for the external durable log.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::accounting::SkipReason;
use crate::liquidation::engine::LiquidationRecord;
use crate::protocol::operations::AuctionHouseId;
use crate::shutdown::global_settlement::ProcessedSafe;
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{Amount, Delta, Rad, Ray, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Payload of a protocol event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    // Ledger events
    /// Free collateral credited or debited by an adapter
    CollateralBalanceModified {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Account
        account: Address,
        /// Applied change
        delta: Delta<Wad>,
    },
    /// Delegate rights changed
    SafeRightsChanged {
        /// Owner
        owner: Address,
        /// Delegate
        delegate: Address,
        /// Granted or revoked
        granted: bool,
    },
    /// Safe collateral or debt changed
    SafeModified {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Safe owner
        safe: Address,
        /// Collateral change
        delta_collateral: Delta<Wad>,
        /// Nominal debt change
        delta_debt: Delta<Wad>,
    },
    /// Free collateral moved
    CollateralTransferred {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Debited account
        src: Address,
        /// Credited account
        dst: Address,
        /// Amount
        amount: Wad,
    },
    /// Internal coins moved
    CoinsTransferred {
        /// Debited account
        src: Address,
        /// Credited account
        dst: Address,
        /// Amount
        amount: Rad,
    },
    /// Stability fees accrued
    RateUpdated {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Rate after the update
        accumulated_rate: Ray,
    },

    // Oracle events
    /// Feed price pushed into the ledger
    PriceUpdated {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Feed price
        price: Wad,
        /// Derived safety price
        safety_price: Ray,
        /// Derived liquidation price
        liquidation_price: Ray,
    },

    // Token events
    /// Protocol tokens minted
    ProtocolTokenMinted {
        /// Receiver
        to: Address,
        /// Amount
        amount: Wad,
    },
    /// Protocol token allowance set
    ProtocolTokenApproved {
        /// Owner
        owner: Address,
        /// Spender
        spender: Address,
        /// Allowance
        amount: Wad,
    },

    // Liquidation and accounting events
    /// Safe confiscated
    SafeLiquidated(LiquidationRecord),
    /// Queued debt released
    DebtPopped {
        /// Queue timestamp of the batch
        queued_at: u64,
        /// Released debt
        amount: Rad,
    },
    /// Engine coins cancelled against debt
    DebtSettled {
        /// Cancelled amount
        amount: Rad,
    },
    /// Post-settlement coins drained
    PostSettlementSurplusTransferred {
        /// Drained amount
        amount: Rad,
    },

    // Auction events
    /// Auction opened
    AuctionStarted {
        /// House
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// Lot
        amount_to_sell: Amount,
        /// Opening bid
        initial_bid: Amount,
    },
    /// Auction trigger found nothing to do
    AuctionSkipped {
        /// House
        house: AuctionHouseId,
        /// Why
        reason: SkipReason,
    },
    /// New high bid
    BidPlaced {
        /// House
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// Bidder
        bidder: Address,
        /// Bid
        bid: Amount,
        /// Lot
        amount_to_sell: Amount,
        /// When the bid wins
        bid_expiry: u64,
    },
    /// Auction settled to its winner
    AuctionSettled {
        /// House
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// Winner
        winner: Address,
        /// Winning bid
        bid: Amount,
        /// Delivered lot
        amount_to_sell: Amount,
    },
    /// Auction extended after expiring without bids
    AuctionRestarted {
        /// House
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// New deadline
        auction_deadline: u64,
    },
    /// Auction unwound after shutdown
    AuctionTerminated {
        /// House
        house: AuctionHouseId,
        /// Auction id
        id: u64,
        /// Bidder refunded
        refunded_bidder: Address,
        /// Refunded bid
        refunded_bid: Amount,
        /// Lot returned to the originator
        lot_returned: Amount,
    },

    // Shutdown events
    /// Emergency shutdown fired
    ShutdownTriggered {
        /// Staking token holder
        caller: Address,
        /// Tokens burned
        staked: Wad,
    },
    /// Final price fixed
    CollateralTypeFrozen {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Final coin-per-collateral price
        final_coin_per_collateral_price: Ray,
    },
    /// Safe settled at the final price
    SafeProcessed {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Safe owner
        safe: Address,
        /// Outcome
        outcome: ProcessedSafe,
    },
    /// Excess collateral withdrawn
    CollateralFreed {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Safe owner
        owner: Address,
        /// Withdrawn collateral
        amount: Wad,
    },
    /// Outstanding supply fixed
    OutstandingCoinSupplySet {
        /// Supply
        supply: Rad,
    },
    /// Cash price fixed
    CashPriceCalculated {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Collateral per coin
        cash_price: Ray,
    },
    /// Coins locked for redemption
    CoinsPrepared {
        /// Holder
        owner: Address,
        /// Added coins
        amount: Wad,
        /// Bag after the call
        bag: Wad,
    },
    /// Collateral redeemed
    CollateralRedeemed {
        /// Collateral type
        collateral_type: CollateralTypeId,
        /// Holder
        owner: Address,
        /// Collateral paid out
        collateral: Wad,
    },
}

impl EventKind {
    /// Stable event name
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::CollateralBalanceModified { .. } => "collateral_balance_modified",
            EventKind::SafeRightsChanged { .. } => "safe_rights_changed",
            EventKind::SafeModified { .. } => "safe_modified",
            EventKind::CollateralTransferred { .. } => "collateral_transferred",
            EventKind::CoinsTransferred { .. } => "coins_transferred",
            EventKind::RateUpdated { .. } => "rate_updated",
            EventKind::PriceUpdated { .. } => "price_updated",
            EventKind::ProtocolTokenMinted { .. } => "protocol_token_minted",
            EventKind::ProtocolTokenApproved { .. } => "protocol_token_approved",
            EventKind::SafeLiquidated(_) => "safe_liquidated",
            EventKind::DebtPopped { .. } => "debt_popped",
            EventKind::DebtSettled { .. } => "debt_settled",
            EventKind::PostSettlementSurplusTransferred { .. } => "post_settlement_surplus_transferred",
            EventKind::AuctionStarted { .. } => "auction_started",
            EventKind::AuctionSkipped { .. } => "auction_skipped",
            EventKind::BidPlaced { .. } => "bid_placed",
            EventKind::AuctionSettled { .. } => "auction_settled",
            EventKind::AuctionRestarted { .. } => "auction_restarted",
            EventKind::AuctionTerminated { .. } => "auction_terminated",
            EventKind::ShutdownTriggered { .. } => "shutdown_triggered",
            EventKind::CollateralTypeFrozen { .. } => "collateral_type_frozen",
            EventKind::SafeProcessed { .. } => "safe_processed",
            EventKind::CollateralFreed { .. } => "collateral_freed",
            EventKind::OutstandingCoinSupplySet { .. } => "outstanding_coin_supply_set",
            EventKind::CashPriceCalculated { .. } => "cash_price_calculated",
            EventKind::CoinsPrepared { .. } => "coins_prepared",
            EventKind::CollateralRedeemed { .. } => "collateral_redeemed",
        }
    }
}

/// An event stamped with the block it was emitted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    block_height: u64,
    timestamp: u64,
    kind: EventKind,
}

impl ProtocolEvent {
    /// Stamp a payload
    pub fn new(block_height: u64, timestamp: u64, kind: EventKind) -> Self {
        Self {
            block_height,
            timestamp,
            kind,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Get event timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Get event block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Payload
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// SHA-256 of the JSON encoding
    pub fn hash(&self) -> [u8; 32] {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        Sha256::digest(&encoded).into()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered list of emitted events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append events in order
    pub fn extend(&mut self, events: impl IntoIterator<Item = ProtocolEvent>) {
        self.events.extend(events);
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Chained digest of all events, `h = sha256(h || event_hash)`
    pub fn digest(&self) -> [u8; 32] {
        self.events.iter().fold([0u8; 32], |acc, event| {
            let mut hasher = Sha256::new();
            hasher.update(acc);
            hasher.update(event.hash());
            hasher.finalize().into()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
