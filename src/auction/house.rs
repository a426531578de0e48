//! Generic English auction engine.
//!
//! One bid state machine serves every auction variant. A variant is a
//! zero-sized [`AuctionKind`] marker that fixes the fixed-point kinds of the
//! lot and of the bid. Fund movements are delegated to an [`AuctionLedger`]
//! capability supplied by the call site, so the house itself never touches a
//! balance.
//!
//! Lifecycle: `NotStarted -> Active -> Settled`, or `Active -> TerminatedEarly`
//! once the house has been disabled.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

use crate::core::auth::Authority;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::{FixedPointValue, Rad, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION KINDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixes the lot and bid kinds of an auction variant
pub trait AuctionKind: Clone + fmt::Debug + Default + Send + Sync + 'static {
    /// What is being sold
    type Lot: FixedPointValue;
    /// What bidders pay
    type Bid: FixedPointValue;
    /// House name for logs and errors
    const NAME: &'static str;
}

/// Variants where bidders raise the bid for a fixed lot
pub trait IncreasingBid: AuctionKind {}

/// Sells surplus coins for protocol tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusAuction;

/// Sells freshly minted protocol tokens for a fixed amount of coins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtAuction;

/// Sells coins left over after shutdown for protocol tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSettlementSurplusAuction;

impl AuctionKind for SurplusAuction {
    type Lot = Rad;
    type Bid = Wad;
    const NAME: &'static str = "SurplusAuctionHouse";
}

impl AuctionKind for DebtAuction {
    type Lot = Wad;
    type Bid = Rad;
    const NAME: &'static str = "DebtAuctionHouse";
}

impl AuctionKind for PostSettlementSurplusAuction {
    type Lot = Rad;
    type Bid = Wad;
    const NAME: &'static str = "PostSettlementSurplusAuctionHouse";
}

impl IncreasingBid for SurplusAuction {}
impl IncreasingBid for PostSettlementSurplusAuction {}

/// Surplus auction house
pub type SurplusAuctionHouse = AuctionHouse<SurplusAuction>;

/// Debt auction house
pub type DebtAuctionHouse = AuctionHouse<DebtAuction>;

/// Post-settlement surplus auction house
pub type PostSettlementSurplusAuctionHouse = AuctionHouse<PostSettlementSurplusAuction>;

// ═══════════════════════════════════════════════════════════════════════════════
// BID RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Auction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    /// No auction with this id
    NotStarted,
    /// Accepting bids
    Active,
    /// Lot delivered to the winner
    Settled,
    /// Unwound after the house was disabled
    TerminatedEarly,
}

impl AuctionStatus {
    /// True for settled or terminated auctions
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Settled | AuctionStatus::TerminatedEarly)
    }
}

/// Bid record of one auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Bid<K: AuctionKind> {
    /// Monotonic id within the house
    pub id: u64,
    /// Current bid
    pub bid_amount: K::Bid,
    /// Current lot
    pub amount_to_sell: K::Lot,
    /// Current high bidder; the originator until someone bids
    pub high_bidder: Address,
    /// Module that started the auction and receives unwound lots
    pub originator: Address,
    /// When the current bid wins; zero until the first bid
    pub bid_expiry: u64,
    /// Absolute cap on the auction's lifetime
    pub auction_deadline: u64,
    /// Lifecycle status
    pub status: AuctionStatus,
}

impl<K: AuctionKind> Bid<K> {
    /// True once someone other than the originator bid
    pub fn has_bids(&self) -> bool {
        self.bid_expiry != 0
    }
}

/// Timing and increment parameters of a house
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParams {
    /// Minimum bid multiplier (bid houses) or lot divisor (lot houses), e.g. 1.05
    pub bid_increase: Wad,
    /// Lifetime of a bid
    pub bid_duration: u64,
    /// Lifetime of an auction
    pub total_auction_length: u64,
    /// Optional cap on simultaneously active auctions
    pub max_active_auctions: Option<usize>,
}

impl AuctionParams {
    /// Reject parameter sets the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bid_increase <= Wad::ONE {
            return Err(Error::InvalidParameter {
                name: "bid_increase".into(),
                reason: format!("{} must exceed 1", self.bid_increase),
            });
        }
        if self.bid_duration == 0 || self.total_auction_length == 0 {
            return Err(Error::InvalidParameter {
                name: "bid_duration".into(),
                reason: "durations must be positive".into(),
            });
        }
        if self.total_auction_length < self.bid_duration {
            return Err(Error::InvalidParameter {
                name: "total_auction_length".into(),
                reason: "shorter than bid_duration".into(),
            });
        }
        if self.max_active_auctions == Some(0) {
            return Err(Error::InvalidParameter {
                name: "max_active_auctions".into(),
                reason: "must be positive when set".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SETTLEMENT CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Fund movements of an auction variant, supplied by the call site
pub trait AuctionLedger<K: AuctionKind> {
    /// Collect `bid` from `bidder` and release `previous_bid` to `previous_bidder`
    fn replace_bid(
        &mut self,
        house: Address,
        bidder: Address,
        bid: K::Bid,
        previous_bidder: Address,
        previous_bid: K::Bid,
    ) -> Result<()>;

    /// Deliver the lot to the winner and consume the winning bid
    fn on_settle(&mut self, house: Address, auction: &Bid<K>) -> Result<()>;

    /// Refund the high bidder and hand the lot back to the originator
    fn on_terminate(&mut self, house: Address, auction: &Bid<K>) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION HOUSE
// ═══════════════════════════════════════════════════════════════════════════════

/// English auction house for one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AuctionHouse<K: AuctionKind> {
    address: Address,
    authority: Authority,
    params: AuctionParams,
    bids: BTreeMap<u64, Bid<K>>,
    active: BTreeSet<u64>,
    auctions_started: u64,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: AuctionKind> AuctionHouse<K> {
    /// Create a house administered by `deployer`
    pub fn new(address: Address, deployer: Address, params: AuctionParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            address,
            authority: Authority::new(K::NAME, deployer),
            params,
            bids: BTreeMap::new(),
            active: BTreeSet::new(),
            auctions_started: 0,
            kind: PhantomData,
        })
    }

    /// Authorize an auction originator
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Open a new auction. The caller must already have moved any escrowed lot
    /// into the house.
    pub fn start_auction(
        &mut self,
        caller: &Address,
        amount_to_sell: K::Lot,
        initial_bid: K::Bid,
        now: u64,
    ) -> Result<u64> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        if let Some(max) = self.params.max_active_auctions {
            if self.active.len() >= max {
                return Err(Error::CapacityExceeded { max });
            }
        }
        let id = self.auctions_started.checked_add(1).ok_or_else(|| Error::Overflow {
            operation: format!("{} auction id", K::NAME),
        })?;
        let auction_deadline = now.checked_add(self.params.total_auction_length).ok_or_else(|| {
            Error::Overflow {
                operation: "auction deadline".into(),
            }
        })?;

        self.bids.insert(
            id,
            Bid {
                id,
                bid_amount: initial_bid,
                amount_to_sell,
                high_bidder: *caller,
                originator: *caller,
                bid_expiry: 0,
                auction_deadline,
                status: AuctionStatus::Active,
            },
        );
        self.active.insert(id);
        self.auctions_started = id;

        tracing::info!(
            "{} started auction {}: selling {}, initial bid {}",
            K::NAME,
            id,
            amount_to_sell,
            initial_bid
        );
        Ok(id)
    }

    /// Deliver the lot of an expired auction to its winner
    pub fn settle_auction<L: AuctionLedger<K>>(&mut self, ledger: &mut L, id: u64, now: u64) -> Result<Bid<K>> {
        self.authority.require_enabled()?;
        let auction = self.live_auction(id)?.clone();
        if !auction.has_bids() {
            if now < auction.auction_deadline {
                return Err(Error::NotYetExpired(id));
            }
            return Err(Error::NoBidsPlaced(id));
        }
        if now < auction.bid_expiry && now < auction.auction_deadline {
            return Err(Error::NotYetExpired(id));
        }

        ledger.on_settle(self.address, &auction)?;

        let record = self.record_mut(id)?;
        record.status = AuctionStatus::Settled;
        let settled = record.clone();
        self.active.remove(&id);

        tracing::info!("{} settled auction {} to {}", K::NAME, id, settled.high_bidder);
        Ok(settled)
    }

    /// Give an auction that expired without bids a fresh deadline
    pub fn restart_auction(&mut self, id: u64, now: u64) -> Result<Bid<K>> {
        self.authority.require_enabled()?;
        let auction = self.live_auction(id)?;
        if auction.has_bids() {
            return Err(Error::BidsAlreadyPlaced(id));
        }
        if now <= auction.auction_deadline {
            return Err(Error::NotYetExpired(id));
        }
        let auction_deadline = now.saturating_add(self.params.total_auction_length);

        let record = self.record_mut(id)?;
        record.auction_deadline = auction_deadline;
        tracing::debug!("{} restarted auction {} until {}", K::NAME, id, auction_deadline);
        Ok(record.clone())
    }

    /// Unwind a live auction of a disabled house: refund the bidder in full
    /// and return the lot to its originator.
    pub fn terminate_auction_prematurely<L: AuctionLedger<K>>(
        &mut self,
        ledger: &mut L,
        id: u64,
    ) -> Result<Bid<K>> {
        self.authority.require_disabled()?;
        let auction = self.live_auction(id)?.clone();

        ledger.on_terminate(self.address, &auction)?;

        let record = self.record_mut(id)?;
        record.status = AuctionStatus::TerminatedEarly;
        record.high_bidder = Address::ZERO;
        self.active.remove(&id);

        tracing::info!(
            "{} terminated auction {} early, refunded {} to {}",
            K::NAME,
            id,
            auction.bid_amount,
            auction.high_bidder
        );
        Ok(auction)
    }

    /// One-way disable, issued by the accounting engine during shutdown
    pub fn disable_contract(&mut self, caller: &Address) -> Result<()> {
        if self.authority.disable(caller)? {
            tracing::info!("{} disabled with {} active auctions", K::NAME, self.active.len());
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// House address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Whether the house accepts bids
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// Bid record of an auction
    pub fn bids(&self, id: u64) -> Option<&Bid<K>> {
        self.bids.get(&id)
    }

    /// Lifecycle status of an auction id
    pub fn status(&self, id: u64) -> AuctionStatus {
        self.bids
            .get(&id)
            .map(|b| b.status)
            .unwrap_or(AuctionStatus::NotStarted)
    }

    /// Number of auctions ever started (also the last id)
    pub fn auctions_started(&self) -> u64 {
        self.auctions_started
    }

    /// Number of live auctions
    pub fn active_auctions(&self) -> usize {
        self.active.len()
    }

    /// Ids of live auctions
    pub fn active_auction_ids(&self) -> Vec<u64> {
        self.active.iter().copied().collect()
    }

    /// Timing parameters
    pub fn params(&self) -> &AuctionParams {
        &self.params
    }

    /// Lifetime of a bid
    pub fn bid_duration(&self) -> u64 {
        self.params.bid_duration
    }

    /// Lifetime of an auction
    pub fn total_auction_length(&self) -> u64 {
        self.params.total_auction_length
    }

    fn live_auction(&self, id: u64) -> Result<&Bid<K>> {
        let auction = self.bids.get(&id).ok_or(Error::AuctionNotFound(id))?;
        if auction.status.is_terminal() {
            return Err(Error::AlreadySettled(id));
        }
        Ok(auction)
    }

    fn record_mut(&mut self, id: u64) -> Result<&mut Bid<K>> {
        self.bids.get_mut(&id).ok_or(Error::AuctionNotFound(id))
    }

    fn check_bid_window(&self, auction: &Bid<K>, now: u64) -> Result<()> {
        if auction.bid_expiry != 0 && now > auction.bid_expiry {
            return Err(Error::AuctionExpired(auction.id));
        }
        if now > auction.auction_deadline {
            return Err(Error::AuctionExpired(auction.id));
        }
        Ok(())
    }

    fn next_expiry(&self, auction: &Bid<K>, now: u64) -> u64 {
        now.saturating_add(self.params.bid_duration)
            .min(auction.auction_deadline)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BIDDING
// ═══════════════════════════════════════════════════════════════════════════════

impl<K: IncreasingBid> AuctionHouse<K> {
    /// Raise the bid for the unchanged lot
    pub fn increase_bid_size<L: AuctionLedger<K>>(
        &mut self,
        ledger: &mut L,
        bidder: Address,
        id: u64,
        amount_to_sell: K::Lot,
        bid: K::Bid,
        now: u64,
    ) -> Result<Bid<K>> {
        self.authority.require_enabled()?;
        let auction = self.live_auction(id)?.clone();
        self.check_bid_window(&auction, now)?;
        if amount_to_sell != auction.amount_to_sell {
            return Err(Error::InvalidParameter {
                name: "amount_to_sell".into(),
                reason: format!("auction {} sells {}", id, auction.amount_to_sell),
            });
        }
        let minimum = auction.bid_amount.mul_wad(self.params.bid_increase)?;
        if bid <= auction.bid_amount || bid < minimum {
            return Err(Error::BidTooLow {
                id,
                minimum: minimum.to_string(),
            });
        }

        ledger.replace_bid(
            self.address,
            bidder,
            bid,
            auction.high_bidder,
            auction.bid_amount,
        )?;

        let bid_expiry = self.next_expiry(&auction, now);
        let record = self.record_mut(id)?;
        record.high_bidder = bidder;
        record.bid_amount = bid;
        record.bid_expiry = bid_expiry;

        tracing::debug!("{} auction {}: {} bid {}", K::NAME, id, bidder.short(), bid);
        Ok(record.clone())
    }
}

impl AuctionHouse<DebtAuction> {
    /// Accept fewer minted tokens for the unchanged coin bid
    pub fn decrease_sold_amount<L: AuctionLedger<DebtAuction>>(
        &mut self,
        ledger: &mut L,
        bidder: Address,
        id: u64,
        amount_to_sell: Wad,
        bid: Rad,
        now: u64,
    ) -> Result<Bid<DebtAuction>> {
        self.authority.require_enabled()?;
        let auction = self.live_auction(id)?.clone();
        self.check_bid_window(&auction, now)?;
        if bid != auction.bid_amount {
            return Err(Error::InvalidParameter {
                name: "bid".into(),
                reason: format!("auction {} requires a bid of exactly {}", id, auction.bid_amount),
            });
        }
        if amount_to_sell >= auction.amount_to_sell
            || amount_to_sell.mul_wad(self.params.bid_increase)? > auction.amount_to_sell
        {
            return Err(Error::BidTooLow {
                id,
                minimum: format!("lot of at most {} / {}", auction.amount_to_sell, self.params.bid_increase),
            });
        }

        ledger.replace_bid(self.address, bidder, bid, auction.high_bidder, auction.bid_amount)?;

        let bid_expiry = self.next_expiry(&auction, now);
        let record = self.record_mut(id)?;
        record.high_bidder = bidder;
        record.amount_to_sell = amount_to_sell;
        record.bid_expiry = bid_expiry;

        tracing::debug!(
            "{} auction {}: {} accepts {}",
            DebtAuction::NAME,
            id,
            bidder.short(),
            amount_to_sell
        );
        Ok(record.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
