//! SafeEngine - the core ledger.
//!
//! Owns every safe (collateralized debt position), the free collateral
//! balances, the internal coin ledger and the unbacked-debt ledger. All other
//! modules move value exclusively through the operations defined here.
//!
//! Ledger identities maintained after every successful call:
//! - `global_debt == Σ_type debt_amount * accumulated_rate + global_unbacked_debt`
//! - `global_debt == Σ coin_balance`
//! - `global_unbacked_debt == Σ debt_balance`
//! - `debt_amount(type) == Σ generated_debt` over the type's safes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::auth::Authority;
use crate::error::{Error, Result};
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{Delta, FixedPointValue, Rad, Ray, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-collateral-type parameters and aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralType {
    /// Sum of nominal debt over all safes of this type
    pub debt_amount: Wad,
    /// Multiplier turning nominal debt into actual debt; never decreases
    pub accumulated_rate: Ray,
    /// Collateral price with the safety margin applied
    pub safety_price: Ray,
    /// Collateral price with the liquidation margin applied
    pub liquidation_price: Ray,
    /// Maximum actual debt for the type
    pub debt_ceiling: Rad,
    /// Minimum actual debt of a non-empty safe
    pub debt_floor: Rad,
}

impl CollateralType {
    fn new() -> Self {
        Self {
            debt_amount: Wad::ZERO,
            accumulated_rate: Ray::ONE,
            safety_price: Ray::ZERO,
            liquidation_price: Ray::ZERO,
            debt_ceiling: Rad::ZERO,
            debt_floor: Rad::ZERO,
        }
    }
}

/// A single position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safe {
    /// Collateral locked in the position
    pub locked_collateral: Wad,
    /// Nominal debt, before rate scaling
    pub generated_debt: Wad,
}

impl Safe {
    /// True when both fields are zero
    pub fn is_empty(&self) -> bool {
        self.locked_collateral.is_zero() && self.generated_debt.is_zero()
    }
}

/// Governance-settable ledger parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafeEngineParameter {
    /// System-wide debt ceiling
    GlobalDebtCeiling(Rad),
    /// Safety price of a collateral type
    SafetyPrice(CollateralTypeId, Ray),
    /// Liquidation price of a collateral type
    LiquidationPrice(CollateralTypeId, Ray),
    /// Debt ceiling of a collateral type
    DebtCeiling(CollateralTypeId, Rad),
    /// Debt floor of a collateral type
    DebtFloor(CollateralTypeId, Rad),
}

/// Arguments of [`SafeEngine::modify_safe_collateralization`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModification {
    /// Collateral type of the safe
    pub collateral_type: CollateralTypeId,
    /// Owner of the safe
    pub safe: Address,
    /// Account whose free collateral funds (or receives) the collateral change
    pub collateral_source: Address,
    /// Account whose coin balance receives (or pays) the debt change
    pub debt_destination: Address,
    /// Change of locked collateral
    pub delta_collateral: Delta<Wad>,
    /// Change of nominal debt
    pub delta_debt: Delta<Wad>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// The central accounting ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeEngine {
    address: Address,
    authority: Authority,
    collateral_types: BTreeMap<CollateralTypeId, CollateralType>,
    safes: BTreeMap<(CollateralTypeId, Address), Safe>,
    token_collateral: BTreeMap<(CollateralTypeId, Address), Wad>,
    coin_balance: BTreeMap<Address, Rad>,
    debt_balance: BTreeMap<Address, Rad>,
    /// (owner, delegate) pairs allowed to modify the owner's safes and balances
    safe_rights: BTreeSet<(Address, Address)>,
    global_debt: Rad,
    global_unbacked_debt: Rad,
    global_debt_ceiling: Rad,
}

impl SafeEngine {
    /// Create an empty ledger administered by `deployer`
    pub fn new(address: Address, deployer: Address) -> Self {
        Self {
            address,
            authority: Authority::new("SafeEngine", deployer),
            collateral_types: BTreeMap::new(),
            safes: BTreeMap::new(),
            token_collateral: BTreeMap::new(),
            coin_balance: BTreeMap::new(),
            debt_balance: BTreeMap::new(),
            safe_rights: BTreeSet::new(),
            global_debt: Rad::ZERO,
            global_unbacked_debt: Rad::ZERO,
            global_debt_ceiling: Rad::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Authorize a module or operator
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Revoke an authorization
    pub fn remove_authorization(&mut self, caller: &Address, account: &Address) -> Result<()> {
        self.authority.remove_authorization(caller, account)
    }

    /// Let `delegate` modify `owner`'s safes and balances
    pub fn approve_safe_modification(&mut self, owner: Address, delegate: Address) {
        self.safe_rights.insert((owner, delegate));
    }

    /// Withdraw a delegation
    pub fn deny_safe_modification(&mut self, owner: Address, delegate: Address) {
        self.safe_rights.remove(&(owner, delegate));
    }

    /// Register a new collateral type with a rate of one
    pub fn init_collateral_type(&mut self, caller: &Address, id: CollateralTypeId) -> Result<()> {
        self.authority.require_authorized(caller)?;
        if self.collateral_types.contains_key(&id) {
            return Err(Error::CollateralTypeExists(id.to_string()));
        }
        tracing::debug!("initialized collateral type {}", id);
        self.collateral_types.insert(id, CollateralType::new());
        Ok(())
    }

    /// Update a ledger parameter
    pub fn modify_parameters(&mut self, caller: &Address, parameter: SafeEngineParameter) -> Result<()> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        match parameter {
            SafeEngineParameter::GlobalDebtCeiling(value) => self.global_debt_ceiling = value,
            SafeEngineParameter::SafetyPrice(id, value) => self.collateral_type_mut(&id)?.safety_price = value,
            SafeEngineParameter::LiquidationPrice(id, value) => {
                self.collateral_type_mut(&id)?.liquidation_price = value
            }
            SafeEngineParameter::DebtCeiling(id, value) => self.collateral_type_mut(&id)?.debt_ceiling = value,
            SafeEngineParameter::DebtFloor(id, value) => self.collateral_type_mut(&id)?.debt_floor = value,
        }
        Ok(())
    }

    /// One-way disable, issued by global settlement. A second call is a no-op.
    pub fn disable_contract(&mut self, caller: &Address) -> Result<()> {
        if self.authority.disable(caller)? {
            tracing::info!("SafeEngine disabled");
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BALANCE MOVEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Join/exit hook of a collateral adapter (authorized)
    pub fn modify_collateral_balance(
        &mut self,
        caller: &Address,
        id: &CollateralTypeId,
        account: Address,
        delta: Delta<Wad>,
    ) -> Result<()> {
        self.authority.require_authorized(caller)?;
        self.collateral_type(id)?;
        let key = (id.clone(), account);
        let current = balance_of(&self.token_collateral, &key);
        let updated = apply_balance_delta(&format!("collateral {} of {}", id, account), delta, current)?;
        write_balance(&mut self.token_collateral, key, updated);
        Ok(())
    }

    /// Move free collateral between accounts
    pub fn transfer_collateral(
        &mut self,
        caller: &Address,
        id: &CollateralTypeId,
        src: Address,
        dst: Address,
        amount: Wad,
    ) -> Result<()> {
        self.require_can_modify(&src, caller)?;
        let src_key = (id.clone(), src);
        let dst_key = (id.clone(), dst);
        let new_src = debit(
            &format!("collateral {} of {}", id, src),
            balance_of(&self.token_collateral, &src_key),
            amount,
        )?;
        if src == dst {
            return Ok(());
        }
        let new_dst = balance_of(&self.token_collateral, &dst_key).safe_add(amount)?;

        write_balance(&mut self.token_collateral, src_key, new_src);
        write_balance(&mut self.token_collateral, dst_key, new_dst);
        Ok(())
    }

    /// Move internal coins between accounts
    pub fn transfer_internal_coins(
        &mut self,
        caller: &Address,
        src: Address,
        dst: Address,
        amount: Rad,
    ) -> Result<()> {
        self.require_can_modify(&src, caller)?;
        let new_src = debit(
            &format!("coins of {}", src),
            balance_of(&self.coin_balance, &src),
            amount,
        )?;
        if src == dst {
            return Ok(());
        }
        let new_dst = balance_of(&self.coin_balance, &dst).safe_add(amount)?;

        write_balance(&mut self.coin_balance, src, new_src);
        write_balance(&mut self.coin_balance, dst, new_dst);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SAFE MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lock/free collateral and generate/repay debt in one step.
    ///
    /// Checks run in this order: module enabled, caller rights, debt
    /// ceilings, collateralization, debt floor, counterparty balances.
    /// Nothing is written unless every check passes.
    pub fn modify_safe_collateralization(&mut self, caller: &Address, m: SafeModification) -> Result<()> {
        self.authority.require_enabled()?;
        let kind = self.collateral_type(&m.collateral_type)?.clone();
        let rate = kind.accumulated_rate;

        let risky = m.delta_debt.is_increase() || m.delta_collateral.is_decrease();
        if risky {
            self.require_can_modify(&m.safe, caller)?;
        }
        if m.delta_collateral.is_increase() {
            self.require_can_modify(&m.collateral_source, caller)?;
        }
        if m.delta_debt.is_decrease() {
            self.require_can_modify(&m.debt_destination, caller)?;
        }

        let safe_key = (m.collateral_type.clone(), m.safe);
        let safe = self.safes.get(&safe_key).copied().unwrap_or_default();
        let locked = apply_balance_delta(
            &format!("locked collateral of safe {}", m.safe),
            m.delta_collateral,
            safe.locked_collateral,
        )?;
        let debt = apply_balance_delta(
            &format!("debt of safe {}", m.safe),
            m.delta_debt,
            safe.generated_debt,
        )?;
        let type_debt = m.delta_debt.apply(kind.debt_amount)?;
        let delta_coins = m.delta_debt.map(|d| Rad::from_product(d, rate))?;
        let global_debt = delta_coins.apply(self.global_debt)?;
        let total_debt_issued = Rad::from_product(debt, rate)?;

        if m.delta_debt.is_increase() {
            let type_total = Rad::from_product(type_debt, rate)?;
            if type_total > kind.debt_ceiling {
                return Err(Error::CeilingExceeded {
                    scope: m.collateral_type.to_string(),
                    ceiling: kind.debt_ceiling.to_string(),
                    resulting: type_total.to_string(),
                });
            }
            if global_debt > self.global_debt_ceiling {
                return Err(Error::CeilingExceeded {
                    scope: "global".into(),
                    ceiling: self.global_debt_ceiling.to_string(),
                    resulting: global_debt.to_string(),
                });
            }
        }

        if risky {
            let collateral_value = Rad::from_product(locked, kind.safety_price)?;
            if total_debt_issued > collateral_value {
                return Err(Error::Undercollateralized {
                    debt: total_debt_issued.to_string(),
                    collateral_value: collateral_value.to_string(),
                });
            }
        }

        if !debt.is_zero() && total_debt_issued < kind.debt_floor {
            return Err(Error::DebtFloorViolated {
                debt: total_debt_issued.to_string(),
                floor: kind.debt_floor.to_string(),
            });
        }

        let source_key = (m.collateral_type.clone(), m.collateral_source);
        let source_balance = balance_of(&self.token_collateral, &source_key);
        let new_source = match m.delta_collateral {
            Delta::Increase(v) => debit(
                &format!("collateral {} of {}", m.collateral_type, m.collateral_source),
                source_balance,
                v,
            )?,
            Delta::Decrease(v) => source_balance.safe_add(v)?,
        };
        let destination_balance = balance_of(&self.coin_balance, &m.debt_destination);
        let new_destination = match delta_coins {
            Delta::Increase(v) => destination_balance.safe_add(v)?,
            Delta::Decrease(v) => debit(&format!("coins of {}", m.debt_destination), destination_balance, v)?,
        };

        // commit
        let new_safe = Safe {
            locked_collateral: locked,
            generated_debt: debt,
        };
        if new_safe.is_empty() {
            self.safes.remove(&safe_key);
        } else {
            self.safes.insert(safe_key, new_safe);
        }
        self.collateral_type_mut(&m.collateral_type)?.debt_amount = type_debt;
        self.global_debt = global_debt;
        write_balance(&mut self.token_collateral, source_key, new_source);
        write_balance(&mut self.coin_balance, m.debt_destination, new_destination);

        tracing::debug!(
            "safe {} {} modified: collateral {:?}, debt {:?}",
            m.collateral_type,
            m.safe.short(),
            m.delta_collateral,
            m.delta_debt
        );
        Ok(())
    }

    /// Remove collateral and debt from a safe (authorized; liquidation and settlement).
    ///
    /// The collateral is credited to `collateral_receiver`; the actual debt
    /// becomes unbacked debt of `debt_receiver`. Returns that actual debt.
    /// Remains available after the ledger is disabled.
    pub fn confiscate_safe_collateral_and_debt(
        &mut self,
        caller: &Address,
        id: &CollateralTypeId,
        safe: Address,
        collateral_receiver: Address,
        debt_receiver: Address,
        collateral: Wad,
        debt: Wad,
    ) -> Result<Rad> {
        self.authority.require_authorized(caller)?;
        let kind = self.collateral_type(id)?.clone();
        let safe_key = (id.clone(), safe);
        let current = self.safes.get(&safe_key).copied().unwrap_or_default();

        let locked = debit(
            &format!("locked collateral of safe {}", safe),
            current.locked_collateral,
            collateral,
        )?;
        let generated = debit(&format!("debt of safe {}", safe), current.generated_debt, debt)?;
        let type_debt = kind.debt_amount.safe_sub(debt)?;
        let debt_rad = Rad::from_product(debt, kind.accumulated_rate)?;

        let receiver_key = (id.clone(), collateral_receiver);
        let new_receiver = balance_of(&self.token_collateral, &receiver_key).safe_add(collateral)?;
        let new_debt_balance = balance_of(&self.debt_balance, &debt_receiver).safe_add(debt_rad)?;
        let unbacked = self.global_unbacked_debt.safe_add(debt_rad)?;

        let new_safe = Safe {
            locked_collateral: locked,
            generated_debt: generated,
        };
        if new_safe.is_empty() {
            self.safes.remove(&safe_key);
        } else {
            self.safes.insert(safe_key, new_safe);
        }
        self.collateral_type_mut(id)?.debt_amount = type_debt;
        write_balance(&mut self.token_collateral, receiver_key, new_receiver);
        write_balance(&mut self.debt_balance, debt_receiver, new_debt_balance);
        self.global_unbacked_debt = unbacked;
        Ok(debt_rad)
    }

    /// Cancel the caller's coins against an equal amount of the caller's unbacked debt
    pub fn settle_debt(&mut self, caller: &Address, amount: Rad) -> Result<()> {
        let new_debt = debit(
            &format!("unbacked debt of {}", caller),
            balance_of(&self.debt_balance, caller),
            amount,
        )?;
        let new_coins = debit(
            &format!("coins of {}", caller),
            balance_of(&self.coin_balance, caller),
            amount,
        )?;
        let unbacked = self.global_unbacked_debt.safe_sub(amount)?;
        let global = self.global_debt.safe_sub(amount)?;

        write_balance(&mut self.debt_balance, *caller, new_debt);
        write_balance(&mut self.coin_balance, *caller, new_coins);
        self.global_unbacked_debt = unbacked;
        self.global_debt = global;
        Ok(())
    }

    /// Mint coins against new unbacked debt (authorized)
    pub fn create_unbacked_debt(
        &mut self,
        caller: &Address,
        debt_destination: Address,
        coin_destination: Address,
        amount: Rad,
    ) -> Result<()> {
        self.authority.require_authorized(caller)?;
        let new_debt = balance_of(&self.debt_balance, &debt_destination).safe_add(amount)?;
        let new_coins = balance_of(&self.coin_balance, &coin_destination).safe_add(amount)?;
        let unbacked = self.global_unbacked_debt.safe_add(amount)?;
        let global = self.global_debt.safe_add(amount)?;

        write_balance(&mut self.debt_balance, debt_destination, new_debt);
        write_balance(&mut self.coin_balance, coin_destination, new_coins);
        self.global_unbacked_debt = unbacked;
        self.global_debt = global;
        Ok(())
    }

    /// Accrue interest: raise the type's rate and credit the new debt to `surplus_destination`
    pub fn update_accumulated_rate(
        &mut self,
        caller: &Address,
        id: &CollateralTypeId,
        surplus_destination: Address,
        rate_increase: Ray,
    ) -> Result<()> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        let kind = self.collateral_type(id)?.clone();
        let new_rate = kind.accumulated_rate.safe_add(rate_increase)?;
        let surplus = Rad::from_product(kind.debt_amount, rate_increase)?;
        let new_coins = balance_of(&self.coin_balance, &surplus_destination).safe_add(surplus)?;
        let global = self.global_debt.safe_add(surplus)?;

        self.collateral_type_mut(id)?.accumulated_rate = new_rate;
        write_balance(&mut self.coin_balance, surplus_destination, new_coins);
        self.global_debt = global;
        tracing::debug!("rate of {} raised to {}", id, new_rate);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ledger address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Whether mutating entry points are open
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// Parameters of a collateral type
    pub fn collateral_type(&self, id: &CollateralTypeId) -> Result<&CollateralType> {
        self.collateral_types
            .get(id)
            .ok_or_else(|| Error::CollateralTypeNotFound(id.to_string()))
    }

    /// All collateral types
    pub fn collateral_types(&self) -> impl Iterator<Item = (&CollateralTypeId, &CollateralType)> {
        self.collateral_types.iter()
    }

    /// A safe; empty if it does not exist
    pub fn safe(&self, id: &CollateralTypeId, owner: &Address) -> Safe {
        self.safes.get(&(id.clone(), *owner)).copied().unwrap_or_default()
    }

    /// All non-empty safes
    pub fn safes(&self) -> impl Iterator<Item = (&CollateralTypeId, &Address, &Safe)> {
        self.safes.iter().map(|((id, owner), safe)| (id, owner, safe))
    }

    /// Owners of non-empty safes of one type
    pub fn safe_owners(&self, id: &CollateralTypeId) -> Vec<Address> {
        self.safes
            .keys()
            .filter(|(type_id, _)| type_id == id)
            .map(|(_, owner)| *owner)
            .collect()
    }

    /// Free collateral of an account
    pub fn token_collateral(&self, id: &CollateralTypeId, account: &Address) -> Wad {
        balance_of(&self.token_collateral, &(id.clone(), *account))
    }

    /// Internal coin balance
    pub fn coin_balance(&self, account: &Address) -> Rad {
        balance_of(&self.coin_balance, account)
    }

    /// Unbacked debt balance
    pub fn debt_balance(&self, account: &Address) -> Rad {
        balance_of(&self.debt_balance, account)
    }

    /// Total coins in circulation
    pub fn global_debt(&self) -> Rad {
        self.global_debt
    }

    /// Total unbacked debt
    pub fn global_unbacked_debt(&self) -> Rad {
        self.global_unbacked_debt
    }

    /// System-wide debt ceiling
    pub fn global_debt_ceiling(&self) -> Rad {
        self.global_debt_ceiling
    }

    /// Whether `caller` may act for `owner`
    pub fn can_modify_safe(&self, owner: &Address, caller: &Address) -> bool {
        owner == caller || self.safe_rights.contains(&(*owner, *caller))
    }

    /// Verify every ledger identity
    pub fn check_invariants(&self) -> Result<()> {
        let mut backed = Rad::ZERO;
        for (id, kind) in &self.collateral_types {
            let nominal = self
                .safes
                .iter()
                .filter(|((type_id, _), _)| type_id == id)
                .try_fold(Wad::ZERO, |acc, (_, safe)| acc.safe_add(safe.generated_debt))?;
            if nominal != kind.debt_amount {
                return Err(Error::InvariantViolation(format!(
                    "debt amount of {} is {} but safes sum to {}",
                    id, kind.debt_amount, nominal
                )));
            }
            backed = backed.safe_add(Rad::from_product(kind.debt_amount, kind.accumulated_rate)?)?;
        }

        let expected = backed.safe_add(self.global_unbacked_debt)?;
        if expected != self.global_debt {
            return Err(Error::InvariantViolation(format!(
                "global debt {} != backed {} + unbacked {}",
                self.global_debt, backed, self.global_unbacked_debt
            )));
        }

        let coins = self.coin_balance.values().try_fold(Rad::ZERO, |acc, v| acc.safe_add(*v))?;
        if coins != self.global_debt {
            return Err(Error::InvariantViolation(format!(
                "coin balances sum to {} but global debt is {}",
                coins, self.global_debt
            )));
        }

        let unbacked = self.debt_balance.values().try_fold(Rad::ZERO, |acc, v| acc.safe_add(*v))?;
        if unbacked != self.global_unbacked_debt {
            return Err(Error::InvariantViolation(format!(
                "debt balances sum to {} but unbacked debt is {}",
                unbacked, self.global_unbacked_debt
            )));
        }
        Ok(())
    }

    fn collateral_type_mut(&mut self, id: &CollateralTypeId) -> Result<&mut CollateralType> {
        self.collateral_types
            .get_mut(id)
            .ok_or_else(|| Error::CollateralTypeNotFound(id.to_string()))
    }

    fn require_can_modify(&self, owner: &Address, caller: &Address) -> Result<()> {
        if self.can_modify_safe(owner, caller) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} cannot modify the safe or balances of {}",
                caller, owner
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn balance_of<K: Ord, T: FixedPointValue>(map: &BTreeMap<K, T>, key: &K) -> T {
    map.get(key).copied().unwrap_or_else(T::default)
}

fn write_balance<K: Ord, T: FixedPointValue>(map: &mut BTreeMap<K, T>, key: K, value: T) {
    if value.raw().is_zero() {
        map.remove(&key);
    } else {
        map.insert(key, value);
    }
}

fn debit<T: FixedPointValue>(account: &str, available: T, amount: T) -> Result<T> {
    if available < amount {
        return Err(Error::InsufficientBalance {
            account: account.to_string(),
            required: amount.to_string(),
            available: available.to_string(),
        });
    }
    available.safe_sub(amount)
}

fn apply_balance_delta<T: FixedPointValue>(account: &str, delta: Delta<T>, base: T) -> Result<T> {
    match delta {
        Delta::Increase(v) => base.safe_add(v),
        Delta::Decrease(v) => debit(account, base, v),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
