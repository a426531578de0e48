//! Accounting engine.
//!
//! Receives the bad debt of liquidated safes and the coins of accrued
//! interest, cancels one against the other, and hands the imbalance to the
//! auction houses:
//! - Surplus coins are sold for protocol tokens (surplus auctions)
//! - Uncovered debt is covered by minting protocol tokens (debt auctions)
//!
//! During shutdown it disables both houses and drains its remaining coins
//! to the settlement surplus auctioneer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auction::house::{DebtAuctionHouse, SurplusAuctionHouse};
use crate::core::auth::Authority;
use crate::core::safe_engine::SafeEngine;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::{FixedPointValue, Rad, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Accounting engine parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingParams {
    /// Minimum time between surplus auctions
    pub surplus_auction_delay: u64,
    /// Time queued debt must wait before it can be auctioned
    pub pop_debt_delay: u64,
    /// Coins sold per surplus auction
    pub surplus_auction_amount_to_sell: Rad,
    /// Coins raised per debt auction
    pub debt_auction_bid_size: Rad,
    /// Protocol tokens initially offered per debt auction
    pub initial_debt_auction_minted_tokens: Wad,
    /// Coins kept back from surplus auctions
    pub surplus_buffer: Rad,
    /// Delay after shutdown before late surplus may be drained again
    pub disable_cooldown: u64,
}

/// Outcome of a polled auction trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionAttempt {
    /// An auction was started with this id
    Started(u64),
    /// Preconditions unmet, nothing changed
    Skipped(SkipReason),
}

impl AuctionAttempt {
    /// Id of the started auction, if any
    pub fn started(&self) -> Option<u64> {
        match self {
            AuctionAttempt::Started(id) => Some(*id),
            AuctionAttempt::Skipped(_) => None,
        }
    }
}

/// Why an auction trigger did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The inter-auction delay has not elapsed
    DelayNotElapsed,
    /// Unsettled bad debt must be cleared first
    UnsettledDebt,
    /// Coins do not exceed debt plus lot plus buffer
    InsufficientSurplus,
    /// The lot size is zero
    NothingToSell,
    /// Uncovered debt is below one auction's bid size
    InsufficientDebt,
    /// Coins remain after settling debt, so no deficit exists
    SurplusRemaining,
    /// No coins to auction
    NoSurplus,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNTING ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Surplus and bad-debt bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingEngine {
    address: Address,
    authority: Authority,
    params: AccountingParams,
    /// Queued bad debt by the timestamp it was pushed
    debt_queue: BTreeMap<u64, Rad>,
    total_queued_debt: Rad,
    total_on_auction_debt: Rad,
    last_surplus_auction_time: u64,
    disable_timestamp: Option<u64>,
    post_settlement_surplus_drain: Option<Address>,
}

impl AccountingEngine {
    /// Create an engine administered by `deployer`
    pub fn new(address: Address, deployer: Address, params: AccountingParams) -> Self {
        Self {
            address,
            authority: Authority::new("AccountingEngine", deployer),
            params,
            debt_queue: BTreeMap::new(),
            total_queued_debt: Rad::ZERO,
            total_on_auction_debt: Rad::ZERO,
            last_surplus_auction_time: 0,
            disable_timestamp: None,
            post_settlement_surplus_drain: None,
        }
    }

    /// Authorize an account
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Replace the parameter set (authorized)
    pub fn modify_parameters(&mut self, caller: &Address, params: AccountingParams) -> Result<()> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        self.params = params;
        Ok(())
    }

    /// Set where coins go on shutdown. Settable once.
    pub fn set_post_settlement_surplus_drain(&mut self, caller: &Address, drain: Address) -> Result<()> {
        self.authority.require_authorized(caller)?;
        if self.post_settlement_surplus_drain.is_some() {
            return Err(Error::AlreadySet("post_settlement_surplus_drain".into()));
        }
        self.post_settlement_surplus_drain = Some(drain);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEBT QUEUE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue freshly confiscated debt (authorized)
    pub fn push_debt_to_queue(&mut self, caller: &Address, debt: Rad, now: u64) -> Result<()> {
        self.authority.require_authorized(caller)?;
        let slot = self.debt_queue_at(now).safe_add(debt)?;
        let total = self.total_queued_debt.safe_add(debt)?;
        self.debt_queue.insert(now, slot);
        self.total_queued_debt = total;
        tracing::debug!("queued {} of bad debt at {}", debt, now);
        Ok(())
    }

    /// Release the debt queued at `timestamp` once `pop_debt_delay` passed.
    /// Returns the released amount.
    pub fn pop_debt_from_queue(&mut self, timestamp: u64, now: u64) -> Result<Rad> {
        let ready_at = timestamp.saturating_add(self.params.pop_debt_delay);
        if ready_at > now {
            return Err(Error::CooldownNotElapsed { ready_at, now });
        }
        let released = self.debt_queue_at(timestamp);
        self.total_queued_debt = self.total_queued_debt.safe_sub(released)?;
        self.debt_queue.remove(&timestamp);
        if !released.is_zero() {
            tracing::debug!("released {} of queued debt from {}", released, timestamp);
        }
        Ok(released)
    }

    /// Cancel coins against debt that is neither queued nor on auction
    pub fn settle_debt(&mut self, safe_engine: &mut SafeEngine, amount: Rad) -> Result<()> {
        let coins = safe_engine.coin_balance(&self.address);
        if amount > coins {
            return Err(Error::InsufficientBalance {
                account: format!("coins of {}", self.authority.module()),
                required: amount.to_string(),
                available: coins.to_string(),
            });
        }
        let unsettled = self.unqueued_unauctioned_debt(safe_engine);
        if amount > unsettled {
            return Err(Error::InsufficientBalance {
                account: "unqueued unauctioned debt".into(),
                required: amount.to_string(),
                available: unsettled.to_string(),
            });
        }
        safe_engine.settle_debt(&self.address, amount)
    }

    /// Cancel coins against debt currently on auction
    pub fn cancel_auctioned_debt_with_surplus(
        &mut self,
        safe_engine: &mut SafeEngine,
        amount: Rad,
    ) -> Result<()> {
        let remaining = self.total_on_auction_debt.checked_sub(amount).ok_or_else(|| {
            Error::InsufficientBalance {
                account: "debt on auction".into(),
                required: amount.to_string(),
                available: self.total_on_auction_debt.to_string(),
            }
        })?;
        safe_engine.settle_debt(&self.address, amount)?;
        self.total_on_auction_debt = remaining;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AUCTION TRIGGERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start a debt auction when uncovered debt reaches one bid size.
    ///
    /// Coins held by the engine are first cancelled against uncovered debt;
    /// if coins remain there is no deficit and nothing happens.
    pub fn auction_debt(
        &mut self,
        safe_engine: &mut SafeEngine,
        debt_house: &mut DebtAuctionHouse,
        now: u64,
    ) -> Result<AuctionAttempt> {
        self.authority.require_enabled()?;
        let coins = safe_engine.coin_balance(&self.address);
        let unsettled = self.unqueued_unauctioned_debt(safe_engine);
        let settled = coins.min(unsettled);

        if coins > settled {
            return Ok(AuctionAttempt::Skipped(SkipReason::SurplusRemaining));
        }
        if unsettled.safe_sub(settled)? < self.params.debt_auction_bid_size {
            return Ok(AuctionAttempt::Skipped(SkipReason::InsufficientDebt));
        }
        let on_auction = self
            .total_on_auction_debt
            .safe_add(self.params.debt_auction_bid_size)?;

        let id = debt_house.start_auction(
            &self.address,
            self.params.initial_debt_auction_minted_tokens,
            self.params.debt_auction_bid_size,
            now,
        )?;
        if !settled.is_zero() {
            safe_engine.settle_debt(&self.address, settled)?;
        }
        self.total_on_auction_debt = on_auction;

        tracing::info!(
            "debt auction {} started for {} coins",
            id,
            self.params.debt_auction_bid_size
        );
        Ok(AuctionAttempt::Started(id))
    }

    /// Start a surplus auction when coins exceed debt, lot and buffer.
    ///
    /// Unmet preconditions yield `Skipped`; errors are reserved for a
    /// disabled engine or a failing house.
    pub fn auction_surplus(
        &mut self,
        safe_engine: &mut SafeEngine,
        surplus_house: &mut SurplusAuctionHouse,
        now: u64,
    ) -> Result<AuctionAttempt> {
        self.authority.require_enabled()?;
        let amount = self.params.surplus_auction_amount_to_sell;

        if now < self
            .last_surplus_auction_time
            .saturating_add(self.params.surplus_auction_delay)
        {
            return Ok(AuctionAttempt::Skipped(SkipReason::DelayNotElapsed));
        }
        if amount.is_zero() {
            return Ok(AuctionAttempt::Skipped(SkipReason::NothingToSell));
        }
        // Unqueued, unauctioned debt is cancelled against coins first;
        // queued or auctioned debt still blocks.
        let coins = safe_engine.coin_balance(&self.address);
        let settled = coins.min(self.unqueued_unauctioned_debt(safe_engine));
        let debt = safe_engine.debt_balance(&self.address).safe_sub(settled)?;
        if !debt.is_zero() {
            return Ok(AuctionAttempt::Skipped(SkipReason::UnsettledDebt));
        }
        let required = debt
            .safe_add(amount)?
            .safe_add(self.params.surplus_buffer)?;
        if coins.safe_sub(settled)? <= required {
            return Ok(AuctionAttempt::Skipped(SkipReason::InsufficientSurplus));
        }

        let id = surplus_house.start_auction(&self.address, amount, Wad::ZERO, now)?;
        if !settled.is_zero() {
            safe_engine.settle_debt(&self.address, settled)?;
        }
        safe_engine.transfer_internal_coins(&self.address, self.address, surplus_house.address(), amount)?;
        self.last_surplus_auction_time = now;

        tracing::info!("surplus auction {} started for {}", id, amount);
        Ok(AuctionAttempt::Started(id))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SHUTDOWN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Disable the engine and both auction houses, settle what can be
    /// settled and drain the remaining coins in one transfer. A second call
    /// is a no-op.
    pub fn disable_contract(
        &mut self,
        caller: &Address,
        safe_engine: &mut SafeEngine,
        surplus_house: &mut SurplusAuctionHouse,
        debt_house: &mut DebtAuctionHouse,
        now: u64,
    ) -> Result<()> {
        self.authority.require_authorized(caller)?;
        if !self.authority.contract_enabled() {
            return Ok(());
        }
        let drain = self.post_settlement_surplus_drain.ok_or(Error::DrainNotSet)?;
        surplus_house.authority().require_authorized(&self.address)?;
        debt_house.authority().require_authorized(&self.address)?;

        self.authority.disable(caller)?;
        surplus_house.disable_contract(&self.address)?;
        debt_house.disable_contract(&self.address)?;

        self.total_queued_debt = Rad::ZERO;
        self.total_on_auction_debt = Rad::ZERO;
        self.debt_queue.clear();
        self.disable_timestamp = Some(now);

        let drained = self.settle_and_drain(safe_engine, drain)?;
        tracing::info!("accounting engine disabled, drained {} to {}", drained, drain);
        Ok(())
    }

    /// Drain coins that reached the engine after shutdown, once
    /// `disable_cooldown` has passed. Returns the drained amount.
    pub fn transfer_post_settlement_surplus(&mut self, safe_engine: &mut SafeEngine, now: u64) -> Result<Rad> {
        self.authority.require_disabled()?;
        let drain = self.post_settlement_surplus_drain.ok_or(Error::DrainNotSet)?;
        let ready_at = self
            .disable_timestamp
            .unwrap_or_default()
            .saturating_add(self.params.disable_cooldown);
        if now < ready_at {
            return Err(Error::CooldownNotElapsed { ready_at, now });
        }
        self.settle_and_drain(safe_engine, drain)
    }

    fn settle_and_drain(&self, safe_engine: &mut SafeEngine, drain: Address) -> Result<Rad> {
        let coins = safe_engine.coin_balance(&self.address);
        let debt = safe_engine.debt_balance(&self.address);
        let settled = coins.min(debt);
        if !settled.is_zero() {
            safe_engine.settle_debt(&self.address, settled)?;
        }
        let remaining = coins.safe_sub(settled)?;
        if !remaining.is_zero() {
            safe_engine.transfer_internal_coins(&self.address, self.address, drain, remaining)?;
        }
        Ok(remaining)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Engine address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Whether the engine still runs auctions
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// Current parameters
    pub fn params(&self) -> &AccountingParams {
        &self.params
    }

    /// Total queued debt
    pub fn debt_queue(&self) -> Rad {
        self.total_queued_debt
    }

    /// Debt queued at one timestamp
    pub fn debt_queue_at(&self, timestamp: u64) -> Rad {
        self.debt_queue.get(&timestamp).copied().unwrap_or(Rad::ZERO)
    }

    /// Debt currently covered by debt auctions
    pub fn total_on_auction_debt(&self) -> Rad {
        self.total_on_auction_debt
    }

    /// Bad debt neither queued nor on auction
    pub fn unqueued_unauctioned_debt(&self, safe_engine: &SafeEngine) -> Rad {
        safe_engine
            .debt_balance(&self.address)
            .saturating_sub(self.total_queued_debt)
            .saturating_sub(self.total_on_auction_debt)
    }

    /// Start time of the last surplus auction
    pub fn last_surplus_auction_time(&self) -> u64 {
        self.last_surplus_auction_time
    }

    /// When the engine was disabled
    pub fn disable_timestamp(&self) -> Option<u64> {
        self.disable_timestamp
    }

    /// Shutdown drain
    pub fn post_settlement_surplus_drain(&self) -> Option<Address> {
        self.post_settlement_surplus_drain
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::house::AuctionParams;

    struct Fixture {
        gov: Address,
        engine: SafeEngine,
        accounting: AccountingEngine,
        surplus_house: SurplusAuctionHouse,
        debt_house: DebtAuctionHouse,
    }

    fn params() -> AccountingParams {
        AccountingParams {
            surplus_auction_delay: 100,
            pop_debt_delay: 50,
            surplus_auction_amount_to_sell: Rad::from_integer(100),
            debt_auction_bid_size: Rad::from_integer(50),
            initial_debt_auction_minted_tokens: Wad::from_integer(10),
            surplus_buffer: Rad::from_integer(10),
            disable_cooldown: 1_000,
        }
    }

    fn auction_params() -> AuctionParams {
        AuctionParams {
            bid_increase: "1.05".parse().unwrap(),
            bid_duration: 100,
            total_auction_length: 1_000,
            max_active_auctions: None,
        }
    }

    fn setup() -> Fixture {
        let gov = Address::derive("gov");
        let ae = Address::derive("accounting_engine");
        let engine = SafeEngine::new(Address::derive("safe_engine"), gov);
        let accounting = AccountingEngine::new(ae, gov, params());
        let surplus_house =
            SurplusAuctionHouse::new(Address::derive("surplus_house"), ae, auction_params()).unwrap();
        let debt_house = DebtAuctionHouse::new(Address::derive("debt_house"), ae, auction_params()).unwrap();
        Fixture {
            gov,
            engine,
            accounting,
            surplus_house,
            debt_house,
        }
    }

    /// Give the engine `coins` of surplus and `debt` of bad debt
    fn fund(f: &mut Fixture, coins: u64, debt: u64) {
        let ae = f.accounting.address();
        let outsider = Address::derive("outsider");
        if coins > 0 {
            f.engine
                .create_unbacked_debt(&f.gov, outsider, ae, Rad::from_integer(coins))
                .unwrap();
        }
        if debt > 0 {
            f.engine
                .create_unbacked_debt(&f.gov, ae, outsider, Rad::from_integer(debt))
                .unwrap();
        }
    }

    #[test]
    fn test_queue_push_and_pop() {
        let mut f = setup();
        let gov = f.gov;
        f.accounting.push_debt_to_queue(&gov, Rad::from_integer(30), 10).unwrap();
        f.accounting.push_debt_to_queue(&gov, Rad::from_integer(20), 10).unwrap();
        assert_eq!(f.accounting.debt_queue(), Rad::from_integer(50));

        assert!(matches!(
            f.accounting.pop_debt_from_queue(10, 59),
            Err(Error::CooldownNotElapsed { ready_at: 60, now: 59 })
        ));
        assert_eq!(f.accounting.pop_debt_from_queue(10, 60).unwrap(), Rad::from_integer(50));
        assert_eq!(f.accounting.debt_queue(), Rad::ZERO);
        assert_eq!(f.accounting.debt_queue_at(10), Rad::ZERO);
    }

    #[test]
    fn test_push_requires_authorization() {
        let mut f = setup();
        let mallory = Address::derive("mallory");
        assert!(matches!(
            f.accounting.push_debt_to_queue(&mallory, Rad::ONE, 0),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_settle_debt_bounds() {
        let mut f = setup();
        fund(&mut f, 40, 60);
        assert!(f.accounting.settle_debt(&mut f.engine, Rad::from_integer(41)).is_err());
        f.accounting.settle_debt(&mut f.engine, Rad::from_integer(40)).unwrap();
        let ae = f.accounting.address();
        assert_eq!(f.engine.debt_balance(&ae), Rad::from_integer(20));
        assert_eq!(f.engine.coin_balance(&ae), Rad::ZERO);
    }

    #[test]
    fn test_auction_surplus_skips_until_solvent() {
        let mut f = setup();
        fund(&mut f, 110, 0);
        // 110 is not strictly above 0 + 100 + 10
        assert_eq!(
            f.accounting
                .auction_surplus(&mut f.engine, &mut f.surplus_house, 200)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::InsufficientSurplus)
        );

        fund(&mut f, 1, 0);
        let attempt = f
            .accounting
            .auction_surplus(&mut f.engine, &mut f.surplus_house, 200)
            .unwrap();
        assert_eq!(attempt, AuctionAttempt::Started(1));
        assert_eq!(
            f.engine.coin_balance(&f.surplus_house.address()),
            Rad::from_integer(100)
        );

        fund(&mut f, 500, 0);
        assert_eq!(
            f.accounting
                .auction_surplus(&mut f.engine, &mut f.surplus_house, 250)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::DelayNotElapsed)
        );
    }

    #[test]
    fn test_auction_surplus_settles_free_debt_first() {
        let mut f = setup();
        fund(&mut f, 500, 5);
        // 500 > 5 + 100 + 10
        assert_eq!(
            f.accounting
                .auction_surplus(&mut f.engine, &mut f.surplus_house, 200)
                .unwrap(),
            AuctionAttempt::Started(1)
        );
        let ae = f.accounting.address();
        assert_eq!(f.engine.debt_balance(&ae), Rad::ZERO);
        assert_eq!(f.engine.coin_balance(&ae), Rad::from_integer(395));
        assert_eq!(
            f.engine.coin_balance(&f.surplus_house.address()),
            Rad::from_integer(100)
        );
        f.engine.check_invariants().unwrap();
    }

    #[test]
    fn test_auction_surplus_counts_debt_in_threshold() {
        let mut f = setup();
        fund(&mut f, 115, 5);
        // 115 is not strictly above 5 + 100 + 10, and nothing is settled
        assert_eq!(
            f.accounting
                .auction_surplus(&mut f.engine, &mut f.surplus_house, 200)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::InsufficientSurplus)
        );
        assert_eq!(f.engine.debt_balance(&f.accounting.address()), Rad::from_integer(5));
    }

    #[test]
    fn test_auction_surplus_blocked_by_queued_debt() {
        let mut f = setup();
        let gov = f.gov;
        fund(&mut f, 500, 5);
        f.accounting.push_debt_to_queue(&gov, Rad::from_integer(5), 0).unwrap();
        assert_eq!(
            f.accounting
                .auction_surplus(&mut f.engine, &mut f.surplus_house, 200)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::UnsettledDebt)
        );
        assert_eq!(f.engine.coin_balance(&f.accounting.address()), Rad::from_integer(500));
    }

    #[test]
    fn test_auction_debt_settles_then_starts() {
        let mut f = setup();
        fund(&mut f, 20, 80);
        let attempt = f
            .accounting
            .auction_debt(&mut f.engine, &mut f.debt_house, 0)
            .unwrap();
        assert_eq!(attempt, AuctionAttempt::Started(1));

        let ae = f.accounting.address();
        assert_eq!(f.engine.coin_balance(&ae), Rad::ZERO);
        assert_eq!(f.engine.debt_balance(&ae), Rad::from_integer(60));
        assert_eq!(f.accounting.total_on_auction_debt(), Rad::from_integer(50));
        assert_eq!(f.accounting.unqueued_unauctioned_debt(&f.engine), Rad::from_integer(10));

        // remaining 10 is below one bid size
        assert_eq!(
            f.accounting
                .auction_debt(&mut f.engine, &mut f.debt_house, 0)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::InsufficientDebt)
        );
    }

    #[test]
    fn test_auction_debt_skips_with_surplus() {
        let mut f = setup();
        fund(&mut f, 100, 80);
        assert_eq!(
            f.accounting
                .auction_debt(&mut f.engine, &mut f.debt_house, 0)
                .unwrap(),
            AuctionAttempt::Skipped(SkipReason::SurplusRemaining)
        );
        // nothing was settled
        assert_eq!(
            f.engine.debt_balance(&f.accounting.address()),
            Rad::from_integer(80)
        );
    }

    #[test]
    fn test_disable_drains_to_auctioneer() {
        let mut f = setup();
        let gov = f.gov;
        let drain = Address::derive("auctioneer");
        fund(&mut f, 300, 100);
        f.accounting.push_debt_to_queue(&gov, Rad::from_integer(100), 0).unwrap();

        assert!(matches!(
            f.accounting.disable_contract(
                &gov,
                &mut f.engine,
                &mut f.surplus_house,
                &mut f.debt_house,
                5
            ),
            Err(Error::DrainNotSet)
        ));
        assert!(f.accounting.contract_enabled());

        f.accounting.set_post_settlement_surplus_drain(&gov, drain).unwrap();
        assert!(matches!(
            f.accounting.set_post_settlement_surplus_drain(&gov, drain),
            Err(Error::AlreadySet(_))
        ));
        f.accounting
            .disable_contract(&gov, &mut f.engine, &mut f.surplus_house, &mut f.debt_house, 5)
            .unwrap();

        let ae = f.accounting.address();
        assert!(!f.accounting.contract_enabled());
        assert!(!f.surplus_house.contract_enabled());
        assert!(!f.debt_house.contract_enabled());
        assert_eq!(f.accounting.debt_queue(), Rad::ZERO);
        assert_eq!(f.engine.coin_balance(&ae), Rad::ZERO);
        assert_eq!(f.engine.debt_balance(&ae), Rad::ZERO);
        assert_eq!(f.engine.coin_balance(&drain), Rad::from_integer(200));

        // idempotent
        f.accounting
            .disable_contract(&gov, &mut f.engine, &mut f.surplus_house, &mut f.debt_house, 6)
            .unwrap();
        assert!(matches!(
            f.accounting.auction_surplus(&mut f.engine, &mut f.surplus_house, 10_000),
            Err(Error::ContractDisabled(_))
        ));
    }

    #[test]
    fn test_post_settlement_surplus_cooldown() {
        let mut f = setup();
        let gov = f.gov;
        let drain = Address::derive("auctioneer");
        f.accounting.set_post_settlement_surplus_drain(&gov, drain).unwrap();
        assert!(matches!(
            f.accounting.transfer_post_settlement_surplus(&mut f.engine, 0),
            Err(Error::StillEnabled(_))
        ));
        f.accounting
            .disable_contract(&gov, &mut f.engine, &mut f.surplus_house, &mut f.debt_house, 100)
            .unwrap();

        fund(&mut f, 25, 0);
        assert!(matches!(
            f.accounting.transfer_post_settlement_surplus(&mut f.engine, 1_099),
            Err(Error::CooldownNotElapsed { .. })
        ));
        assert_eq!(
            f.accounting
                .transfer_post_settlement_surplus(&mut f.engine, 1_100)
                .unwrap(),
            Rad::from_integer(25)
        );
        assert_eq!(f.engine.coin_balance(&drain), Rad::from_integer(25));
    }
}
