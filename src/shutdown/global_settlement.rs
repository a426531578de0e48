//! Global settlement.
//!
//! Winds the system down after the emergency shutdown module fired. Every
//! step is operator-invoked and checks its own readiness:
//!
//! 1. `shutdown_system` disables the core modules in a fixed order
//! 2. `freeze_collateral_type` snapshots the final price of each type
//! 3. `process_safe` cancels each safe's debt against its collateral
//! 4. `free_collateral` releases what is left to the owners
//! 5. `set_outstanding_coin_supply` freezes the coin supply after the cooldown
//! 6. `calculate_cash_price` fixes the collateral paid per coin
//! 7. `prepare_coins_for_redeeming` locks coins into a bag
//! 8. `redeem_collateral` pays the bag out per collateral type

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auction::house::{DebtAuctionHouse, SurplusAuctionHouse};
use crate::core::accounting::AccountingEngine;
use crate::core::auth::Authority;
use crate::core::safe_engine::SafeEngine;
use crate::error::{Error, Result};
use crate::liquidation::engine::LiquidationEngine;
use crate::oracle::relayer::OracleRelayer;
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{mul_div, FixedPointValue, Rad, Ray, Wad, RAY_SCALE};

/// Modules disabled by the shutdown cascade, borrowed for one call
pub struct ShutdownCascade<'a> {
    /// Disabled first
    pub safe_engine: &'a mut SafeEngine,
    /// Disabled second
    pub liquidation_engine: &'a mut LiquidationEngine,
    /// Disabled third, together with both auction houses
    pub accounting_engine: &'a mut AccountingEngine,
    /// Disabled by the accounting engine
    pub surplus_house: &'a mut SurplusAuctionHouse,
    /// Disabled by the accounting engine
    pub debt_house: &'a mut DebtAuctionHouse,
    /// Disabled last
    pub oracle_relayer: &'a mut OracleRelayer,
}

/// Outcome of processing one safe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSafe {
    /// Debt valued in collateral at the final price
    pub owed: Wad,
    /// Collateral moved into the settlement pool
    pub seized: Wad,
    /// Part of `owed` the safe could not cover
    pub shortfall: Wad,
    /// Debt handed to the accounting engine
    pub debt: Rad,
}

/// Settlement state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettlement {
    address: Address,
    authority: Authority,
    shutdown_time: Option<u64>,
    shutdown_cooldown: u64,
    outstanding_coin_supply: Option<Rad>,
    final_coin_per_collateral_price: BTreeMap<CollateralTypeId, Ray>,
    collateral_shortfall: BTreeMap<CollateralTypeId, Wad>,
    collateral_total_debt: BTreeMap<CollateralTypeId, Wad>,
    collateral_cash_price: BTreeMap<CollateralTypeId, Ray>,
    coin_bag: BTreeMap<Address, Wad>,
    coins_used_to_redeem: BTreeMap<(CollateralTypeId, Address), Wad>,
}

impl GlobalSettlement {
    /// Create an idle settlement module
    pub fn new(address: Address, deployer: Address, shutdown_cooldown: u64) -> Self {
        Self {
            address,
            authority: Authority::new("GlobalSettlement", deployer),
            shutdown_time: None,
            shutdown_cooldown,
            outstanding_coin_supply: None,
            final_coin_per_collateral_price: BTreeMap::new(),
            collateral_shortfall: BTreeMap::new(),
            collateral_total_debt: BTreeMap::new(),
            collateral_cash_price: BTreeMap::new(),
            coin_bag: BTreeMap::new(),
            coins_used_to_redeem: BTreeMap::new(),
        }
    }

    /// Authorize an account (the emergency shutdown module)
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SHUTDOWN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Disable the safe engine, liquidation engine, accounting engine and
    /// oracle relayer, in that order, and record the shutdown time.
    pub fn shutdown_system(&mut self, caller: &Address, cascade: ShutdownCascade<'_>, now: u64) -> Result<()> {
        self.authority.require_authorized(caller)?;
        if !self.authority.contract_enabled() {
            return Err(Error::AlreadyTriggered);
        }

        cascade.safe_engine.authority().require_authorized(&self.address)?;
        cascade.liquidation_engine.authority().require_authorized(&self.address)?;
        cascade.accounting_engine.authority().require_authorized(&self.address)?;
        cascade.oracle_relayer.authority().require_authorized(&self.address)?;
        if cascade.accounting_engine.contract_enabled() {
            if cascade.accounting_engine.post_settlement_surplus_drain().is_none() {
                return Err(Error::DrainNotSet);
            }
            let ae = cascade.accounting_engine.address();
            cascade.surplus_house.authority().require_authorized(&ae)?;
            cascade.debt_house.authority().require_authorized(&ae)?;
        }

        self.authority.disable(caller)?;
        self.shutdown_time = Some(now);

        cascade.safe_engine.disable_contract(&self.address)?;
        cascade.liquidation_engine.disable_contract(&self.address)?;
        cascade.accounting_engine.disable_contract(
            &self.address,
            cascade.safe_engine,
            cascade.surplus_house,
            cascade.debt_house,
            now,
        )?;
        cascade.oracle_relayer.disable_contract(&self.address)?;

        tracing::warn!("global settlement started at {}", now);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT STEPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Snapshot the final price and total debt of a collateral type
    pub fn freeze_collateral_type(
        &mut self,
        safe_engine: &SafeEngine,
        oracle_relayer: &OracleRelayer,
        id: &CollateralTypeId,
    ) -> Result<Ray> {
        self.require_triggered()?;
        if self.final_coin_per_collateral_price.contains_key(id) {
            return Err(Error::AlreadyFrozen(id.to_string()));
        }
        let kind = safe_engine.collateral_type(id)?;
        let price = oracle_relayer.oracle_price(id);
        if price.is_zero() {
            return Err(Error::PriceUnavailable(id.to_string()));
        }
        let total_debt = kind.debt_amount.rmul(kind.accumulated_rate)?;
        let final_price = price.to_ray()?.rdiv(kind.accumulated_rate)?;

        self.collateral_total_debt.insert(id.clone(), total_debt);
        self.final_coin_per_collateral_price.insert(id.clone(), final_price);
        tracing::info!("froze {} at {} with total debt {}", id, final_price, total_debt);
        Ok(final_price)
    }

    /// Cancel a safe's debt against its collateral at the frozen price.
    /// A safe without debt is left untouched.
    pub fn process_safe(
        &mut self,
        safe_engine: &mut SafeEngine,
        accounting_engine: Address,
        id: &CollateralTypeId,
        owner: Address,
    ) -> Result<ProcessedSafe> {
        self.require_triggered()?;
        let final_price = self.frozen_price(id)?;
        let rate = safe_engine.collateral_type(id)?.accumulated_rate;
        let safe = safe_engine.safe(id, &owner);
        if safe.generated_debt.is_zero() {
            return Ok(ProcessedSafe {
                owed: Wad::ZERO,
                seized: Wad::ZERO,
                shortfall: Wad::ZERO,
                debt: Rad::ZERO,
            });
        }

        let owed = safe.generated_debt.rmul(rate)?.rmul(final_price)?;
        let seized = owed.min(safe.locked_collateral);
        let shortfall = owed.safe_sub(seized)?;
        let total_shortfall = self.collateral_shortfall(id).safe_add(shortfall)?;

        let debt = safe_engine.confiscate_safe_collateral_and_debt(
            &self.address,
            id,
            owner,
            self.address,
            accounting_engine,
            seized,
            safe.generated_debt,
        )?;
        self.collateral_shortfall.insert(id.clone(), total_shortfall);

        tracing::debug!(
            "processed safe {} in {}: owed {}, seized {}, shortfall {}",
            owner.short(),
            id,
            owed,
            seized,
            shortfall
        );
        Ok(ProcessedSafe {
            owed,
            seized,
            shortfall,
            debt,
        })
    }

    /// Release the caller's remaining locked collateral once its safe is debt-free
    pub fn free_collateral(
        &mut self,
        caller: &Address,
        safe_engine: &mut SafeEngine,
        accounting_engine: Address,
        id: &CollateralTypeId,
    ) -> Result<Wad> {
        self.require_triggered()?;
        let safe = safe_engine.safe(id, caller);
        if !safe.generated_debt.is_zero() {
            return Err(Error::StillInDebt(format!("{} in {}", caller, id)));
        }
        if safe.locked_collateral.is_zero() {
            return Ok(Wad::ZERO);
        }
        safe_engine.confiscate_safe_collateral_and_debt(
            &self.address,
            id,
            *caller,
            *caller,
            accounting_engine,
            safe.locked_collateral,
            Wad::ZERO,
        )?;
        tracing::debug!("freed {} {} for {}", safe.locked_collateral, id, caller.short());
        Ok(safe.locked_collateral)
    }

    /// Freeze the outstanding coin supply once the cooldown passed, every
    /// surplus or debt auction is resolved and the accounting engine is empty.
    pub fn set_outstanding_coin_supply(
        &mut self,
        safe_engine: &SafeEngine,
        accounting_engine: &AccountingEngine,
        surplus_house: &SurplusAuctionHouse,
        debt_house: &DebtAuctionHouse,
        now: u64,
    ) -> Result<Rad> {
        let shutdown_time = self.require_triggered()?;
        if self.outstanding_coin_supply.is_some() {
            return Err(Error::AlreadySet("outstanding_coin_supply".into()));
        }
        let ready_at = shutdown_time.saturating_add(self.shutdown_cooldown);
        if now < ready_at {
            return Err(Error::CooldownNotElapsed { ready_at, now });
        }
        let count = surplus_house.active_auctions() + debt_house.active_auctions();
        if count > 0 {
            return Err(Error::AuctionsStillActive { count });
        }
        let leftover = safe_engine.coin_balance(&accounting_engine.address());
        if !leftover.is_zero() {
            return Err(Error::SurplusNotDrained(leftover.to_string()));
        }

        let supply = safe_engine.global_debt();
        self.outstanding_coin_supply = Some(supply);
        tracing::info!("outstanding coin supply frozen at {}", supply);
        Ok(supply)
    }

    /// Fix the collateral paid out per coin for one type
    pub fn calculate_cash_price(&mut self, id: &CollateralTypeId) -> Result<Ray> {
        self.require_triggered()?;
        let supply = self.outstanding_coin_supply.ok_or(Error::SupplyNotSet)?;
        let final_price = self.frozen_price(id)?;
        if self.collateral_cash_price.contains_key(id) {
            return Err(Error::AlreadySet(format!("cash price of {}", id)));
        }

        let backed = self.collateral_total_debt(id).rmul(final_price)?;
        let redeemable = backed.saturating_sub(self.collateral_shortfall(id));
        let coins = supply.to_wad();
        let cash_price = if coins.is_zero() {
            Ray::ZERO
        } else {
            Ray::from_raw(mul_div(redeemable.raw(), RAY_SCALE, coins.raw(), "cash price")?)
        };

        self.collateral_cash_price.insert(id.clone(), cash_price);
        tracing::info!("cash price of {} set to {}", id, cash_price);
        Ok(cash_price)
    }

    /// Move coins from the caller to the accounting engine and add them to the caller's bag
    pub fn prepare_coins_for_redeeming(
        &mut self,
        caller: &Address,
        safe_engine: &mut SafeEngine,
        accounting_engine: Address,
        amount: Wad,
    ) -> Result<Wad> {
        self.require_triggered()?;
        if self.outstanding_coin_supply.is_none() {
            return Err(Error::SupplyNotSet);
        }
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let bag = self.coin_bag(caller).safe_add(amount)?;
        safe_engine.transfer_internal_coins(caller, *caller, accounting_engine, amount.to_rad()?)?;
        self.coin_bag.insert(*caller, bag);
        Ok(bag)
    }

    /// Pay out the caller's not yet redeemed bag in collateral of one type
    pub fn redeem_collateral(
        &mut self,
        caller: &Address,
        safe_engine: &mut SafeEngine,
        id: &CollateralTypeId,
    ) -> Result<Wad> {
        self.require_triggered()?;
        let cash_price = self
            .collateral_cash_price
            .get(id)
            .copied()
            .ok_or_else(|| Error::CashPriceNotSet(id.to_string()))?;
        let used = self.coins_used_to_redeem(id, caller);
        let unused = self.coin_bag(caller).saturating_sub(used);
        if unused.is_zero() {
            return Err(Error::NothingToRedeem(format!("{} in {}", caller, id)));
        }
        let collateral = unused.rmul(cash_price)?;
        let total_used = used.safe_add(unused)?;

        safe_engine.transfer_collateral(&self.address, id, self.address, *caller, collateral)?;
        self.coins_used_to_redeem.insert((id.clone(), *caller), total_used);

        tracing::debug!("{} redeemed {} coins for {} {}", caller.short(), unused, collateral, id);
        Ok(collateral)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Module address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// False once shutdown was triggered
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// When shutdown was triggered
    pub fn shutdown_time(&self) -> Option<u64> {
        self.shutdown_time
    }

    /// Delay between shutdown and the supply snapshot
    pub fn shutdown_cooldown(&self) -> u64 {
        self.shutdown_cooldown
    }

    /// Frozen coin supply
    pub fn outstanding_coin_supply(&self) -> Option<Rad> {
        self.outstanding_coin_supply
    }

    /// Frozen price of a type; zero until frozen
    pub fn final_coin_per_collateral_price(&self, id: &CollateralTypeId) -> Ray {
        self.final_coin_per_collateral_price
            .get(id)
            .copied()
            .unwrap_or(Ray::ZERO)
    }

    /// Debt of a type not covered by collateral
    pub fn collateral_shortfall(&self, id: &CollateralTypeId) -> Wad {
        self.collateral_shortfall.get(id).copied().unwrap_or(Wad::ZERO)
    }

    /// Actual debt of a type at freeze time
    pub fn collateral_total_debt(&self, id: &CollateralTypeId) -> Wad {
        self.collateral_total_debt.get(id).copied().unwrap_or(Wad::ZERO)
    }

    /// Collateral paid per coin; zero until calculated
    pub fn collateral_cash_price(&self, id: &CollateralTypeId) -> Ray {
        self.collateral_cash_price.get(id).copied().unwrap_or(Ray::ZERO)
    }

    /// Coins an account locked for redemption
    pub fn coin_bag(&self, owner: &Address) -> Wad {
        self.coin_bag.get(owner).copied().unwrap_or(Wad::ZERO)
    }

    /// Part of the bag already redeemed for a type
    pub fn coins_used_to_redeem(&self, id: &CollateralTypeId, owner: &Address) -> Wad {
        self.coins_used_to_redeem
            .get(&(id.clone(), *owner))
            .copied()
            .unwrap_or(Wad::ZERO)
    }

    fn require_triggered(&self) -> Result<u64> {
        self.shutdown_time.ok_or(Error::ShutdownNotTriggered)
    }

    fn frozen_price(&self, id: &CollateralTypeId) -> Result<Ray> {
        self.final_coin_per_collateral_price
            .get(id)
            .copied()
            .ok_or_else(|| Error::NotFrozen(id.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::house::AuctionParams;
    use crate::core::accounting::AccountingParams;
    use crate::core::safe_engine::{SafeEngineParameter, SafeModification};
    use crate::oracle::relayer::OracleRelayerParameter;
    use crate::utils::math::Delta;

    struct System {
        gov: Address,
        alice: Address,
        eth: CollateralTypeId,
        engine: SafeEngine,
        liquidation: LiquidationEngine,
        accounting: AccountingEngine,
        surplus_house: SurplusAuctionHouse,
        debt_house: DebtAuctionHouse,
        relayer: OracleRelayer,
        settlement: GlobalSettlement,
    }

    fn auction_params() -> AuctionParams {
        AuctionParams {
            bid_increase: "1.05".parse().unwrap(),
            bid_duration: 100,
            total_auction_length: 1_000,
            max_active_auctions: None,
        }
    }

    /// One ETH-A safe of alice holding `locked` collateral against `debt` coins
    fn system(locked: u64, debt: u64) -> System {
        let gov = Address::derive("gov");
        let alice = Address::derive("alice");
        let gs = Address::derive("global_settlement");
        let ae = Address::derive("accounting_engine");
        let eth = CollateralTypeId::new("ETH-A");

        let mut engine = SafeEngine::new(Address::derive("safe_engine"), gov);
        engine.init_collateral_type(&gov, eth.clone()).unwrap();
        for param in [
            SafeEngineParameter::GlobalDebtCeiling(Rad::from_integer(1_000_000)),
            SafeEngineParameter::DebtCeiling(eth.clone(), Rad::from_integer(1_000_000)),
            SafeEngineParameter::SafetyPrice(eth.clone(), Ray::from_integer(1_000)),
        ] {
            engine.modify_parameters(&gov, param).unwrap();
        }
        engine
            .modify_collateral_balance(&gov, &eth, alice, Delta::Increase(Wad::from_integer(locked)))
            .unwrap();
        engine
            .modify_safe_collateralization(
                &alice,
                SafeModification {
                    collateral_type: eth.clone(),
                    safe: alice,
                    collateral_source: alice,
                    debt_destination: alice,
                    delta_collateral: Delta::Increase(Wad::from_integer(locked)),
                    delta_debt: Delta::Increase(Wad::from_integer(debt)),
                },
            )
            .unwrap();

        let mut liquidation = LiquidationEngine::new(Address::derive("liquidation_engine"), gov, gov);
        let mut accounting = AccountingEngine::new(
            ae,
            gov,
            AccountingParams {
                surplus_auction_delay: 0,
                pop_debt_delay: 0,
                surplus_auction_amount_to_sell: Rad::from_integer(100),
                debt_auction_bid_size: Rad::from_integer(100),
                initial_debt_auction_minted_tokens: Wad::from_integer(10),
                surplus_buffer: Rad::ZERO,
                disable_cooldown: 0,
            },
        );
        accounting
            .set_post_settlement_surplus_drain(&gov, Address::derive("auctioneer"))
            .unwrap();
        let surplus_house = SurplusAuctionHouse::new(Address::derive("surplus_house"), ae, auction_params()).unwrap();
        let debt_house = DebtAuctionHouse::new(Address::derive("debt_house"), ae, auction_params()).unwrap();

        let mut relayer = OracleRelayer::new(Address::derive("oracle_relayer"), gov);
        relayer
            .modify_parameters(&gov, OracleRelayerParameter::SafetyCRatio(eth.clone(), Ray::ONE))
            .unwrap();
        relayer
            .modify_parameters(&gov, OracleRelayerParameter::LiquidationCRatio(eth.clone(), Ray::ONE))
            .unwrap();
        engine.add_authorization(&gov, relayer.address()).unwrap();

        engine.add_authorization(&gov, gs).unwrap();
        liquidation.add_authorization(&gov, gs).unwrap();
        accounting.add_authorization(&gov, gs).unwrap();
        relayer.add_authorization(&gov, gs).unwrap();

        System {
            gov,
            alice,
            eth,
            engine,
            liquidation,
            accounting,
            surplus_house,
            debt_house,
            relayer,
            settlement: GlobalSettlement::new(gs, gov, 100),
        }
    }

    fn report_price(s: &mut System, price: u64) {
        let gov = s.gov;
        s.relayer
            .update_collateral_price(&gov, &mut s.engine, &s.eth, Wad::from_integer(price))
            .unwrap();
    }

    fn trigger(s: &mut System, now: u64) -> Result<()> {
        let gov = s.gov;
        s.settlement.shutdown_system(
            &gov,
            ShutdownCascade {
                safe_engine: &mut s.engine,
                liquidation_engine: &mut s.liquidation,
                accounting_engine: &mut s.accounting,
                surplus_house: &mut s.surplus_house,
                debt_house: &mut s.debt_house,
                oracle_relayer: &mut s.relayer,
            },
            now,
        )
    }

    #[test]
    fn test_shutdown_disables_every_module() {
        let mut s = system(10, 100);
        trigger(&mut s, 1_000).unwrap();

        assert!(!s.engine.contract_enabled());
        assert!(!s.liquidation.contract_enabled());
        assert!(!s.accounting.contract_enabled());
        assert!(!s.surplus_house.contract_enabled());
        assert!(!s.debt_house.contract_enabled());
        assert!(!s.relayer.contract_enabled());
        assert!(!s.settlement.contract_enabled());
        assert_eq!(s.settlement.shutdown_time(), Some(1_000));

        assert!(matches!(trigger(&mut s, 1_001), Err(Error::AlreadyTriggered)));
    }

    #[test]
    fn test_steps_require_shutdown() {
        let mut s = system(10, 100);
        report_price(&mut s, 200);
        assert!(matches!(
            s.settlement.freeze_collateral_type(&s.engine, &s.relayer, &s.eth),
            Err(Error::ShutdownNotTriggered)
        ));
        assert!(matches!(
            s.settlement.calculate_cash_price(&s.eth),
            Err(Error::ShutdownNotTriggered)
        ));
    }

    #[test]
    fn test_freeze_and_process_with_accrued_rate() {
        let mut s = system(5, 10);
        let gov = s.gov;
        let ae = s.accounting.address();
        s.engine
            .update_accumulated_rate(&gov, &s.eth, ae, "0.05".parse().unwrap())
            .unwrap();
        report_price(&mut s, 200);
        trigger(&mut s, 1_000).unwrap();

        let final_price = s
            .settlement
            .freeze_collateral_type(&s.engine, &s.relayer, &s.eth)
            .unwrap();
        assert_eq!(
            final_price.raw(),
            ethereum_types::U256::from_dec_str("190476190476190476190476190476").unwrap()
        );
        assert!(matches!(
            s.settlement.freeze_collateral_type(&s.engine, &s.relayer, &s.eth),
            Err(Error::AlreadyFrozen(_))
        ));

        let processed = s
            .settlement
            .process_safe(&mut s.engine, ae, &s.eth, s.alice)
            .unwrap();
        assert_eq!(
            processed.owed.raw(),
            ethereum_types::U256::from_dec_str("1999999999999999999999").unwrap()
        );
        assert_eq!(processed.seized, Wad::from_integer(5));
        assert_eq!(processed.shortfall, processed.owed.safe_sub(Wad::from_integer(5)).unwrap());
        assert_eq!(s.settlement.collateral_shortfall(&s.eth), processed.shortfall);
        assert!(s.engine.safe(&s.eth, &s.alice).is_empty());

        // second pass is a no-op
        let again = s
            .settlement
            .process_safe(&mut s.engine, ae, &s.eth, s.alice)
            .unwrap();
        assert_eq!(again.seized, Wad::ZERO);
        assert_eq!(s.settlement.collateral_shortfall(&s.eth), processed.shortfall);
    }

    #[test]
    fn test_free_collateral_requires_no_debt() {
        let mut s = system(10, 1);
        let ae = s.accounting.address();
        let alice = s.alice;
        report_price(&mut s, 2);
        trigger(&mut s, 1_000).unwrap();
        s.settlement
            .freeze_collateral_type(&s.engine, &s.relayer, &s.eth)
            .unwrap();

        assert!(matches!(
            s.settlement.free_collateral(&alice, &mut s.engine, ae, &s.eth),
            Err(Error::StillInDebt(_))
        ));
        let processed = s
            .settlement
            .process_safe(&mut s.engine, ae, &s.eth, alice)
            .unwrap();
        assert_eq!(processed.seized, Wad::from_integer(2));

        let freed = s
            .settlement
            .free_collateral(&alice, &mut s.engine, ae, &s.eth)
            .unwrap();
        assert_eq!(freed, Wad::from_integer(8));
        assert_eq!(s.engine.token_collateral(&s.eth, &alice), Wad::from_integer(8));
    }

    #[test]
    fn test_supply_cash_price_and_redemption() {
        let mut s = system(100, 10);
        let ae = s.accounting.address();
        let alice = s.alice;
        report_price(&mut s, 200);
        trigger(&mut s, 1_000).unwrap();
        s.settlement
            .freeze_collateral_type(&s.engine, &s.relayer, &s.eth)
            .unwrap();
        s.settlement
            .process_safe(&mut s.engine, ae, &s.eth, alice)
            .unwrap();

        assert!(matches!(
            s.settlement.calculate_cash_price(&s.eth),
            Err(Error::SupplyNotSet)
        ));
        assert!(matches!(
            s.settlement
                .set_outstanding_coin_supply(&s.engine, &s.accounting, &s.surplus_house, &s.debt_house, 1_099),
            Err(Error::CooldownNotElapsed { ready_at: 1_100, now: 1_099 })
        ));
        let supply = s
            .settlement
            .set_outstanding_coin_supply(&s.engine, &s.accounting, &s.surplus_house, &s.debt_house, 1_100)
            .unwrap();
        assert_eq!(supply, Rad::from_integer(10));
        assert!(matches!(
            s.settlement
                .set_outstanding_coin_supply(&s.engine, &s.accounting, &s.surplus_house, &s.debt_house, 1_200),
            Err(Error::AlreadySet(_))
        ));

        let cash_price = s.settlement.calculate_cash_price(&s.eth).unwrap();
        assert_eq!(cash_price, Ray::from_integer(10));
        assert!(matches!(
            s.settlement.calculate_cash_price(&s.eth),
            Err(Error::AlreadySet(_))
        ));

        assert!(matches!(
            s.settlement
                .prepare_coins_for_redeeming(&alice, &mut s.engine, ae, Wad::from_integer(11)),
            Err(Error::InsufficientBalance { .. })
        ));
        s.settlement
            .prepare_coins_for_redeeming(&alice, &mut s.engine, ae, Wad::from_integer(10))
            .unwrap();
        let paid = s
            .settlement
            .redeem_collateral(&alice, &mut s.engine, &s.eth)
            .unwrap();
        assert_eq!(paid, Wad::from_integer(100));
        assert_eq!(s.engine.token_collateral(&s.eth, &alice), Wad::from_integer(100));
        assert!(matches!(
            s.settlement.redeem_collateral(&alice, &mut s.engine, &s.eth),
            Err(Error::NothingToRedeem(_))
        ));
    }
}
