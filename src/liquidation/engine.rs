//! Liquidation engine.
//!
//! This module handles the liquidation of undercollateralized safes:
//! - Detection of liquidatable safes at the liquidation price
//! - Confiscation of the whole safe through the safe engine
//! - Hand-off of the resulting bad debt to the accounting engine queue

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::accounting::AccountingEngine;
use crate::core::auth::Authority;
use crate::core::safe_engine::SafeEngine;
use crate::error::{Error, Result};
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{FixedPointValue, Rad, Wad};

/// Liquidation records kept in memory
const MAX_RECORDS: usize = 1_000;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Record of one liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    /// Collateral type of the safe
    pub collateral_type: CollateralTypeId,
    /// Owner of the liquidated safe
    pub safe: Address,
    /// Collateral moved to the receiver
    pub collateral_seized: Wad,
    /// Normalized debt removed from the safe
    pub debt_confiscated: Wad,
    /// Debt queued at the accounting engine
    pub bad_debt: Rad,
    /// When it happened
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating undercollateralized safes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEngine {
    address: Address,
    authority: Authority,
    /// Where seized collateral is credited
    collateral_receiver: Address,
    /// Recent liquidations, oldest first
    records: VecDeque<LiquidationRecord>,
    total_liquidations: u64,
    total_bad_debt: Rad,
}

impl LiquidationEngine {
    /// Create an engine crediting seized collateral to `collateral_receiver`
    pub fn new(address: Address, deployer: Address, collateral_receiver: Address) -> Self {
        Self {
            address,
            authority: Authority::new("LiquidationEngine", deployer),
            collateral_receiver,
            records: VecDeque::new(),
            total_liquidations: 0,
            total_bad_debt: Rad::ZERO,
        }
    }

    /// Authorize an account
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Whether the safe's collateral at the liquidation price no longer covers its debt
    pub fn is_liquidatable(&self, safe_engine: &SafeEngine, id: &CollateralTypeId, owner: &Address) -> Result<bool> {
        let kind = safe_engine.collateral_type(id)?;
        let safe = safe_engine.safe(id, owner);
        if kind.liquidation_price.is_zero() || safe.generated_debt.is_zero() {
            return Ok(false);
        }
        let collateral_value = Rad::from_product(safe.locked_collateral, kind.liquidation_price)?;
        let debt_value = Rad::from_product(safe.generated_debt, kind.accumulated_rate)?;
        Ok(collateral_value < debt_value)
    }

    /// Confiscate an unsafe safe. Anyone may call this.
    pub fn liquidate_safe(
        &mut self,
        safe_engine: &mut SafeEngine,
        accounting_engine: &mut AccountingEngine,
        id: &CollateralTypeId,
        owner: Address,
        now: u64,
    ) -> Result<LiquidationRecord> {
        self.authority.require_enabled()?;
        if !self.is_liquidatable(safe_engine, id, &owner)? {
            return Err(Error::SafeNotLiquidatable(format!("{} in {}", owner, id)));
        }
        safe_engine.authority().require_authorized(&self.address)?;
        accounting_engine.authority().require_authorized(&self.address)?;

        let safe = safe_engine.safe(id, &owner);
        let rate = safe_engine.collateral_type(id)?.accumulated_rate;
        let total_bad_debt = self
            .total_bad_debt
            .safe_add(Rad::from_product(safe.generated_debt, rate)?)?;
        let bad_debt = safe_engine.confiscate_safe_collateral_and_debt(
            &self.address,
            id,
            owner,
            self.collateral_receiver,
            accounting_engine.address(),
            safe.locked_collateral,
            safe.generated_debt,
        )?;
        accounting_engine.push_debt_to_queue(&self.address, bad_debt, now)?;

        let record = LiquidationRecord {
            collateral_type: id.clone(),
            safe: owner,
            collateral_seized: safe.locked_collateral,
            debt_confiscated: safe.generated_debt,
            bad_debt,
            timestamp: now,
        };
        self.total_liquidations += 1;
        self.total_bad_debt = total_bad_debt;
        if self.records.len() >= MAX_RECORDS {
            self.records.pop_front();
        }
        self.records.push_back(record.clone());

        tracing::info!(
            "liquidated safe {} in {}: {} collateral, {} bad debt",
            owner.short(),
            id,
            record.collateral_seized,
            bad_debt
        );
        Ok(record)
    }

    /// One-way disable, issued by global settlement
    pub fn disable_contract(&mut self, caller: &Address) -> Result<()> {
        if self.authority.disable(caller)? {
            tracing::info!("liquidation engine disabled");
        }
        Ok(())
    }

    /// Engine address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Whether liquidations are accepted
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// Receiver of seized collateral
    pub fn collateral_receiver(&self) -> Address {
        self.collateral_receiver
    }

    /// Recent liquidations, oldest first
    pub fn records(&self) -> impl Iterator<Item = &LiquidationRecord> {
        self.records.iter()
    }

    /// Liquidations performed
    pub fn total_liquidations(&self) -> u64 {
        self.total_liquidations
    }

    /// Bad debt handed to the accounting engine
    pub fn total_bad_debt(&self) -> Rad {
        self.total_bad_debt
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accounting::AccountingParams;
    use crate::core::safe_engine::{SafeEngineParameter, SafeModification};
    use crate::utils::math::{Delta, Ray};

    struct Fixture {
        gov: Address,
        alice: Address,
        eth: CollateralTypeId,
        engine: SafeEngine,
        accounting: AccountingEngine,
        liquidation: LiquidationEngine,
    }

    fn setup() -> Fixture {
        let gov = Address::derive("gov");
        let alice = Address::derive("alice");
        let le = Address::derive("liquidation_engine");
        let eth = CollateralTypeId::new("ETH-A");

        let mut engine = SafeEngine::new(Address::derive("safe_engine"), gov);
        engine.init_collateral_type(&gov, eth.clone()).unwrap();
        for param in [
            SafeEngineParameter::GlobalDebtCeiling(Rad::from_integer(1_000_000)),
            SafeEngineParameter::DebtCeiling(eth.clone(), Rad::from_integer(1_000_000)),
            SafeEngineParameter::SafetyPrice(eth.clone(), Ray::from_integer(100)),
            SafeEngineParameter::LiquidationPrice(eth.clone(), Ray::from_integer(100)),
        ] {
            engine.modify_parameters(&gov, param).unwrap();
        }
        engine.add_authorization(&gov, le).unwrap();
        engine
            .modify_collateral_balance(&gov, &eth, alice, Delta::Increase(Wad::from_integer(10)))
            .unwrap();
        engine
            .modify_safe_collateralization(
                &alice,
                SafeModification {
                    collateral_type: eth.clone(),
                    safe: alice,
                    collateral_source: alice,
                    debt_destination: alice,
                    delta_collateral: Delta::Increase(Wad::from_integer(2)),
                    delta_debt: Delta::Increase(Wad::from_integer(150)),
                },
            )
            .unwrap();

        let mut accounting = AccountingEngine::new(
            Address::derive("accounting_engine"),
            gov,
            AccountingParams {
                surplus_auction_delay: 0,
                pop_debt_delay: 0,
                surplus_auction_amount_to_sell: Rad::ZERO,
                debt_auction_bid_size: Rad::ONE,
                initial_debt_auction_minted_tokens: Wad::ONE,
                surplus_buffer: Rad::ZERO,
                disable_cooldown: 0,
            },
        );
        accounting.add_authorization(&gov, le).unwrap();

        let liquidation = LiquidationEngine::new(le, gov, Address::derive("collateral_receiver"));
        Fixture {
            gov,
            alice,
            eth,
            engine,
            accounting,
            liquidation,
        }
    }

    #[test]
    fn test_safe_not_liquidatable() {
        let mut f = setup();
        assert!(matches!(
            f.liquidation
                .liquidate_safe(&mut f.engine, &mut f.accounting, &f.eth, f.alice, 10),
            Err(Error::SafeNotLiquidatable(_))
        ));
    }

    #[test]
    fn test_liquidation_after_price_drop() {
        let mut f = setup();
        let gov = f.gov;
        f.engine
            .modify_parameters(&gov, SafeEngineParameter::LiquidationPrice(f.eth.clone(), Ray::from_integer(70)))
            .unwrap();
        assert!(f.liquidation.is_liquidatable(&f.engine, &f.eth, &f.alice).unwrap());

        let record = f
            .liquidation
            .liquidate_safe(&mut f.engine, &mut f.accounting, &f.eth, f.alice, 10)
            .unwrap();
        assert_eq!(record.collateral_seized, Wad::from_integer(2));
        assert_eq!(record.bad_debt, Rad::from_integer(150));

        assert!(f.engine.safe(&f.eth, &f.alice).is_empty());
        let receiver = f.liquidation.collateral_receiver();
        assert_eq!(f.engine.token_collateral(&f.eth, &receiver), Wad::from_integer(2));
        assert_eq!(f.accounting.debt_queue_at(10), Rad::from_integer(150));
        assert_eq!(f.engine.debt_balance(&f.accounting.address()), Rad::from_integer(150));
        assert_eq!(f.liquidation.total_liquidations(), 1);
        f.engine.check_invariants().unwrap();
    }

    #[test]
    fn test_bad_debt_overflow_leaves_safe_untouched() {
        let mut f = setup();
        let gov = f.gov;
        f.engine
            .modify_parameters(&gov, SafeEngineParameter::LiquidationPrice(f.eth.clone(), Ray::from_integer(70)))
            .unwrap();
        f.liquidation.total_bad_debt = Rad::from_raw(ethereum_types::U256::MAX);

        assert!(matches!(
            f.liquidation
                .liquidate_safe(&mut f.engine, &mut f.accounting, &f.eth, f.alice, 10),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(f.engine.safe(&f.eth, &f.alice).generated_debt, Wad::from_integer(150));
        assert_eq!(f.accounting.debt_queue(), Rad::ZERO);
        assert_eq!(f.liquidation.total_liquidations(), 0);
    }

    #[test]
    fn test_records_keep_most_recent() {
        let mut f = setup();
        let gov = f.gov;
        let stale = LiquidationRecord {
            collateral_type: f.eth.clone(),
            safe: Address::derive("stale"),
            collateral_seized: Wad::ZERO,
            debt_confiscated: Wad::ZERO,
            bad_debt: Rad::ZERO,
            timestamp: 0,
        };
        f.liquidation.records = std::iter::repeat(stale).take(MAX_RECORDS).collect();
        f.engine
            .modify_parameters(&gov, SafeEngineParameter::LiquidationPrice(f.eth.clone(), Ray::from_integer(70)))
            .unwrap();

        f.liquidation
            .liquidate_safe(&mut f.engine, &mut f.accounting, &f.eth, f.alice, 10)
            .unwrap();
        assert_eq!(f.liquidation.records().count(), MAX_RECORDS);
        assert_eq!(f.liquidation.records().last().unwrap().safe, f.alice);
        assert_eq!(f.liquidation.total_bad_debt(), Rad::from_integer(150));
    }

    #[test]
    fn test_disabled_engine_rejects_liquidations() {
        let mut f = setup();
        let gov = f.gov;
        f.engine
            .modify_parameters(&gov, SafeEngineParameter::LiquidationPrice(f.eth.clone(), Ray::ONE))
            .unwrap();
        f.liquidation.disable_contract(&gov).unwrap();
        assert!(matches!(
            f.liquidation
                .liquidate_safe(&mut f.engine, &mut f.accounting, &f.eth, f.alice, 10),
            Err(Error::ContractDisabled(_))
        ));
    }
}
