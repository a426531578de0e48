//! Settlement capabilities wiring auction houses to the ledgers they move.

use crate::auction::house::{AuctionKind, AuctionLedger, Bid, DebtAuction};
use crate::core::accounting::AccountingEngine;
use crate::core::safe_engine::SafeEngine;
use crate::core::token::ProtocolToken;
use crate::error::Result;
use crate::utils::address::Address;
use crate::utils::math::{FixedPointValue, Rad, Wad};

/// Coins for protocol tokens: bids are escrowed in the house and burned on settlement.
///
/// Serves both the surplus and the post-settlement surplus house. Bidders
/// must have approved the house as a token spender.
pub struct SurplusLedger<'a> {
    /// Holds the auctioned coins
    pub safe_engine: &'a mut SafeEngine,
    /// Token bidders pay in
    pub token: &'a mut ProtocolToken,
}

impl<K> AuctionLedger<K> for SurplusLedger<'_>
where
    K: AuctionKind<Lot = Rad, Bid = Wad>,
{
    fn replace_bid(
        &mut self,
        house: Address,
        bidder: Address,
        bid: Wad,
        previous_bidder: Address,
        previous_bid: Wad,
    ) -> Result<()> {
        if previous_bidder == bidder {
            return self
                .token
                .transfer_from(&house, bidder, house, bid.safe_sub(previous_bid)?);
        }
        self.token.transfer_from(&house, bidder, house, bid)?;
        if !previous_bid.is_zero() {
            self.token.transfer(&house, previous_bidder, previous_bid)?;
        }
        Ok(())
    }

    fn on_settle(&mut self, house: Address, auction: &Bid<K>) -> Result<()> {
        self.safe_engine
            .transfer_internal_coins(&house, house, auction.high_bidder, auction.amount_to_sell)?;
        self.token.burn(&house, auction.bid_amount)
    }

    fn on_terminate(&mut self, house: Address, auction: &Bid<K>) -> Result<()> {
        if auction.high_bidder != auction.originator && !auction.bid_amount.is_zero() {
            self.token.transfer(&house, auction.high_bidder, auction.bid_amount)?;
        }
        self.safe_engine
            .transfer_internal_coins(&house, house, auction.originator, auction.amount_to_sell)
    }
}

/// Minted tokens for coins: each bid pays the previous bidder directly.
///
/// While the accounting engine is still the high bidder, the first real bid
/// pays it and immediately cancels auctioned debt. Bidders must have
/// approved the house as a delegate on the safe engine.
pub struct DebtLedger<'a> {
    /// Coin ledger
    pub safe_engine: &'a mut SafeEngine,
    /// Token minted to winners
    pub token: &'a mut ProtocolToken,
    /// Originator of every debt auction
    pub accounting_engine: &'a mut AccountingEngine,
}

impl AuctionLedger<DebtAuction> for DebtLedger<'_> {
    fn replace_bid(
        &mut self,
        house: Address,
        bidder: Address,
        bid: Rad,
        previous_bidder: Address,
        _previous_bid: Rad,
    ) -> Result<()> {
        self.safe_engine
            .transfer_internal_coins(&house, bidder, previous_bidder, bid)?;
        if previous_bidder == self.accounting_engine.address() {
            let on_auction = self.accounting_engine.total_on_auction_debt();
            self.accounting_engine
                .cancel_auctioned_debt_with_surplus(self.safe_engine, bid.min(on_auction))?;
        }
        Ok(())
    }

    fn on_settle(&mut self, house: Address, auction: &Bid<DebtAuction>) -> Result<()> {
        self.token
            .mint(&house, auction.high_bidder, auction.amount_to_sell)
    }

    fn on_terminate(&mut self, house: Address, auction: &Bid<DebtAuction>) -> Result<()> {
        if auction.high_bidder == auction.originator {
            return Ok(());
        }
        self.safe_engine.create_unbacked_debt(
            &house,
            auction.originator,
            auction.high_bidder,
            auction.bid_amount,
        )
    }
}
