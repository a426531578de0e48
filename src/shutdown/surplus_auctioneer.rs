//! Settlement surplus auctioneer.
//!
//! Receives the accounting engine's coins at shutdown and sells them for
//! protocol tokens through the post-settlement surplus auction house.

use serde::{Deserialize, Serialize};

use crate::auction::house::PostSettlementSurplusAuctionHouse;
use crate::core::accounting::{AccountingEngine, AuctionAttempt, SkipReason};
use crate::core::safe_engine::SafeEngine;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::Wad;

/// Seller of post-settlement surplus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSurplusAuctioneer {
    address: Address,
    accounting_engine: Address,
    safe_engine: Address,
    last_surplus_auction_time: u64,
}

impl SettlementSurplusAuctioneer {
    /// Create an auctioneer draining `accounting_engine`
    pub fn new(address: Address, accounting_engine: Address, safe_engine: Address) -> Self {
        Self {
            address,
            accounting_engine,
            safe_engine,
            last_surplus_auction_time: 0,
        }
    }

    /// Auction up to one lot of the held coins.
    ///
    /// Runs only after the accounting engine was disabled; uses its surplus
    /// delay and lot size.
    pub fn auction_surplus(
        &mut self,
        safe_engine: &mut SafeEngine,
        accounting_engine: &AccountingEngine,
        house: &mut PostSettlementSurplusAuctionHouse,
        now: u64,
    ) -> Result<AuctionAttempt> {
        if accounting_engine.contract_enabled() {
            return Err(Error::StillEnabled(accounting_engine.authority().module().to_string()));
        }
        let params = accounting_engine.params();
        if now < self
            .last_surplus_auction_time
            .saturating_add(params.surplus_auction_delay)
        {
            return Ok(AuctionAttempt::Skipped(SkipReason::DelayNotElapsed));
        }
        let balance = safe_engine.coin_balance(&self.address);
        if balance.is_zero() {
            return Ok(AuctionAttempt::Skipped(SkipReason::NoSurplus));
        }
        let amount = balance.min(params.surplus_auction_amount_to_sell);
        if amount.is_zero() {
            return Ok(AuctionAttempt::Skipped(SkipReason::NothingToSell));
        }

        let id = house.start_auction(&self.address, amount, Wad::ZERO, now)?;
        safe_engine.transfer_internal_coins(&self.address, self.address, house.address(), amount)?;
        self.last_surplus_auction_time = now;

        tracing::info!("post-settlement surplus auction {} started for {}", id, amount);
        Ok(AuctionAttempt::Started(id))
    }

    /// Auctioneer address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Start time of the last auction
    pub fn last_surplus_auction_time(&self) -> u64 {
        self.last_surplus_auction_time
    }

    /// Accounting engine this auctioneer drains
    pub fn accounting_engine(&self) -> Address {
        self.accounting_engine
    }

    /// Coin ledger address
    pub fn safe_engine(&self) -> Address {
        self.safe_engine
    }
}
