//! Oracle relayer.
//!
//! Turns externally reported collateral prices into the safety and
//! liquidation prices the safe engine checks positions against, and keeps
//! the last reported price for global settlement to freeze.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::auth::Authority;
use crate::core::safe_engine::{SafeEngine, SafeEngineParameter};
use crate::error::{Error, Result};
use crate::utils::address::{Address, CollateralTypeId};
use crate::utils::math::{Ray, Wad};

/// Per-collateral price settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPriceConfig {
    /// Collateralization ratio new debt must respect
    pub safety_c_ratio: Ray,
    /// Collateralization ratio below which safes are liquidated
    pub liquidation_c_ratio: Ray,
    /// Last externally reported price, in coins per unit of collateral
    pub oracle_price: Wad,
}

/// Relayer parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleRelayerParameter {
    /// Target value of one coin
    RedemptionPrice(Ray),
    /// Safety ratio of a collateral type
    SafetyCRatio(CollateralTypeId, Ray),
    /// Liquidation ratio of a collateral type
    LiquidationCRatio(CollateralTypeId, Ray),
}

/// Price relay between the external feed and the safe engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRelayer {
    address: Address,
    authority: Authority,
    redemption_price: Ray,
    collaterals: BTreeMap<CollateralTypeId, CollateralPriceConfig>,
}

impl OracleRelayer {
    /// Create a relayer with a redemption price of one
    pub fn new(address: Address, deployer: Address) -> Self {
        Self {
            address,
            authority: Authority::new("OracleRelayer", deployer),
            redemption_price: Ray::ONE,
            collaterals: BTreeMap::new(),
        }
    }

    /// Authorize an account
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Update a parameter (authorized)
    pub fn modify_parameters(&mut self, caller: &Address, parameter: OracleRelayerParameter) -> Result<()> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        match parameter {
            OracleRelayerParameter::RedemptionPrice(price) => {
                if price.is_zero() {
                    return Err(Error::InvalidParameter {
                        name: "redemption_price".into(),
                        reason: "must be positive".into(),
                    });
                }
                self.redemption_price = price;
            }
            OracleRelayerParameter::SafetyCRatio(id, ratio) => {
                let config = self.collaterals.entry(id).or_default();
                check_ratios(ratio, config.liquidation_c_ratio)?;
                config.safety_c_ratio = ratio;
            }
            OracleRelayerParameter::LiquidationCRatio(id, ratio) => {
                let config = self.collaterals.entry(id).or_default();
                let safety = if config.safety_c_ratio.is_zero() {
                    ratio
                } else {
                    config.safety_c_ratio
                };
                check_ratios(safety, ratio)?;
                config.liquidation_c_ratio = ratio;
            }
        }
        Ok(())
    }

    /// Record a fresh feed price and push the derived prices into the safe engine
    pub fn update_collateral_price(
        &mut self,
        caller: &Address,
        safe_engine: &mut SafeEngine,
        id: &CollateralTypeId,
        price: Wad,
    ) -> Result<(Ray, Ray)> {
        self.authority.require_authorized(caller)?;
        self.authority.require_enabled()?;
        let config = self
            .collaterals
            .get(id)
            .ok_or_else(|| Error::CollateralTypeNotFound(id.to_string()))?;
        if config.safety_c_ratio.is_zero() || config.liquidation_c_ratio.is_zero() {
            return Err(Error::InvalidParameter {
                name: "c_ratio".into(),
                reason: format!("ratios of {} are not configured", id),
            });
        }
        safe_engine.collateral_type(id)?;
        safe_engine.authority().require_authorized(&self.address)?;
        safe_engine.authority().require_enabled()?;

        let scaled = price.to_ray()?.rdiv(self.redemption_price)?;
        let safety_price = scaled.rdiv(config.safety_c_ratio)?;
        let liquidation_price = scaled.rdiv(config.liquidation_c_ratio)?;

        safe_engine.modify_parameters(
            &self.address,
            SafeEngineParameter::SafetyPrice(id.clone(), safety_price),
        )?;
        safe_engine.modify_parameters(
            &self.address,
            SafeEngineParameter::LiquidationPrice(id.clone(), liquidation_price),
        )?;
        if let Some(config) = self.collaterals.get_mut(id) {
            config.oracle_price = price;
        }

        tracing::debug!(
            "{} price {}: safety {}, liquidation {}",
            id,
            price,
            safety_price,
            liquidation_price
        );
        Ok((safety_price, liquidation_price))
    }

    /// One-way disable, issued by global settlement
    pub fn disable_contract(&mut self, caller: &Address) -> Result<()> {
        if self.authority.disable(caller)? {
            tracing::info!("oracle relayer disabled");
        }
        Ok(())
    }

    /// Relayer address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Authorization gate
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Whether prices are still relayed
    pub fn contract_enabled(&self) -> bool {
        self.authority.contract_enabled()
    }

    /// Target value of one coin
    pub fn redemption_price(&self) -> Ray {
        self.redemption_price
    }

    /// Last reported price; zero when none was reported
    pub fn oracle_price(&self, id: &CollateralTypeId) -> Wad {
        self.collaterals
            .get(id)
            .map(|c| c.oracle_price)
            .unwrap_or(Wad::ZERO)
    }

    /// Price settings of a collateral type
    pub fn collateral(&self, id: &CollateralTypeId) -> Option<&CollateralPriceConfig> {
        self.collaterals.get(id)
    }
}

fn check_ratios(safety: Ray, liquidation: Ray) -> Result<()> {
    if safety < Ray::ONE || (!liquidation.is_zero() && liquidation < Ray::ONE) {
        return Err(Error::InvalidParameter {
            name: "c_ratio".into(),
            reason: "ratios must be at least 1".into(),
        });
    }
    if !liquidation.is_zero() && liquidation > safety {
        return Err(Error::InvalidParameter {
            name: "liquidation_c_ratio".into(),
            reason: format!("{} exceeds safety ratio {}", liquidation, safety),
        });
    }
    Ok(())
}
