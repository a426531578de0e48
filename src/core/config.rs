//! System configuration.
//!
//! Human-facing amounts are exact decimals in the configuration file and are
//! converted into the fixed-point kinds each module expects. Durations are
//! seconds of the injected clock.
//!
//! Sources, in increasing precedence: defaults, a JSON file, `GEB_*`
//! environment variables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::auction::house::AuctionParams;
use crate::core::accounting::AccountingParams;
use crate::error::{Error, Result};
use crate::utils::address::CollateralTypeId;
use crate::utils::constants::*;
use crate::utils::math::{Rad, Ray, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// SECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// System-wide debt ceiling in coins
    pub global_debt_ceiling: Decimal,
}

/// Settings of one auction house
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Minimum bid multiplier, e.g. 1.05
    pub bid_increase: Decimal,
    /// Seconds a bid stays live
    pub bid_duration: u64,
    /// Seconds an auction stays open
    pub total_auction_length: u64,
    /// Optional cap on live auctions
    #[serde(default)]
    pub max_active_auctions: Option<usize>,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            bid_increase: DEFAULT_BID_INCREASE,
            bid_duration: DEFAULT_BID_DURATION,
            total_auction_length: DEFAULT_TOTAL_AUCTION_LENGTH,
            max_active_auctions: None,
        }
    }
}

/// Accounting engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingConfig {
    /// Seconds between surplus auctions
    pub surplus_auction_delay: u64,
    /// Seconds queued debt waits before it may be auctioned
    pub pop_debt_delay: u64,
    /// Coins per surplus auction
    pub surplus_auction_amount_to_sell: Decimal,
    /// Coins raised per debt auction
    pub debt_auction_bid_size: Decimal,
    /// Protocol tokens initially offered per debt auction
    pub initial_debt_auction_minted_tokens: Decimal,
    /// Coins held back from surplus auctions
    pub surplus_buffer: Decimal,
    /// Seconds after shutdown before late surplus may be drained
    pub disable_cooldown: u64,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            surplus_auction_delay: DEFAULT_SURPLUS_AUCTION_DELAY,
            pop_debt_delay: DEFAULT_POP_DEBT_DELAY,
            surplus_auction_amount_to_sell: DEFAULT_SURPLUS_AUCTION_AMOUNT,
            debt_auction_bid_size: DEFAULT_DEBT_AUCTION_BID_SIZE,
            initial_debt_auction_minted_tokens: DEFAULT_DEBT_AUCTION_MINTED_TOKENS,
            surplus_buffer: DEFAULT_SURPLUS_BUFFER,
            disable_cooldown: DEFAULT_DISABLE_COOLDOWN,
        }
    }
}

/// Emergency shutdown settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsmConfig {
    /// Protocol tokens needed to trigger shutdown
    pub trigger_threshold: Decimal,
}

/// Global settlement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Seconds between shutdown and the coin supply snapshot
    pub shutdown_cooldown: u64,
}

/// Oracle relayer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Target value of one coin
    pub redemption_price: Decimal,
}

/// Settings of one collateral type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Collateral type name, e.g. `ETH-A`
    pub name: String,
    /// Ratio new debt must respect
    pub safety_c_ratio: Decimal,
    /// Ratio below which safes are liquidated
    pub liquidation_c_ratio: Decimal,
    /// Maximum debt of the type
    pub debt_ceiling: Decimal,
    /// Minimum debt of a non-empty safe
    pub debt_floor: Decimal,
}

impl CollateralConfig {
    /// Typed id
    pub fn id(&self) -> CollateralTypeId {
        CollateralTypeId::new(self.name.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete deployment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Safe engine
    pub safe_engine: LedgerConfig,
    /// Surplus auction house
    pub surplus_auction: AuctionConfig,
    /// Debt auction house
    pub debt_auction: AuctionConfig,
    /// Post-settlement surplus auction house
    pub post_settlement_auction: AuctionConfig,
    /// Accounting engine
    pub accounting: AccountingConfig,
    /// Emergency shutdown module
    pub esm: EsmConfig,
    /// Global settlement
    pub settlement: SettlementConfig,
    /// Oracle relayer
    pub oracle: OracleConfig,
    /// Collateral types registered at deployment
    pub collaterals: Vec<CollateralConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            safe_engine: LedgerConfig {
                global_debt_ceiling: DEFAULT_GLOBAL_DEBT_CEILING,
            },
            surplus_auction: AuctionConfig::default(),
            debt_auction: AuctionConfig::default(),
            post_settlement_auction: AuctionConfig::default(),
            accounting: AccountingConfig::default(),
            esm: EsmConfig {
                trigger_threshold: DEFAULT_ESM_THRESHOLD,
            },
            settlement: SettlementConfig {
                shutdown_cooldown: DEFAULT_SHUTDOWN_COOLDOWN,
            },
            oracle: OracleConfig {
                redemption_price: DEFAULT_REDEMPTION_PRICE,
            },
            collaterals: vec![CollateralConfig {
                name: "ETH-A".into(),
                safety_c_ratio: DEFAULT_SAFETY_C_RATIO,
                liquidation_c_ratio: DEFAULT_LIQUIDATION_C_RATIO,
                debt_ceiling: DEFAULT_COLLATERAL_DEBT_CEILING,
                debt_floor: Decimal::ZERO,
            }],
        }
    }
}

impl SystemConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Defaults overridden by `GEB_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `GEB_*` environment variables. Unparsable values
    /// are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Some(secs) = env_value("SHUTDOWN_COOLDOWN") {
            self.settlement.shutdown_cooldown = secs;
        }
        if let Some(threshold) = env_value("ESM_THRESHOLD") {
            self.esm.trigger_threshold = threshold;
        }
        if let Some(ceiling) = env_value("GLOBAL_DEBT_CEILING") {
            self.safe_engine.global_debt_ceiling = ceiling;
        }
        if let Some(secs) = env_value::<u64>("BID_DURATION") {
            self.surplus_auction.bid_duration = secs;
            self.debt_auction.bid_duration = secs;
            self.post_settlement_auction.bid_duration = secs;
        }
        if let Some(secs) = env_value("SURPLUS_AUCTION_DELAY") {
            self.accounting.surplus_auction_delay = secs;
        }
        if let Some(secs) = env_value("POP_DEBT_DELAY") {
            self.accounting.pop_debt_delay = secs;
        }
        if let Some(amount) = env_value("SURPLUS_AUCTION_AMOUNT") {
            self.accounting.surplus_auction_amount_to_sell = amount;
        }
    }

    /// Reject inconsistent parameters
    pub fn validate(&self) -> Result<()> {
        for (name, auction) in [
            ("surplus_auction", &self.surplus_auction),
            ("debt_auction", &self.debt_auction),
            ("post_settlement_auction", &self.post_settlement_auction),
        ] {
            if auction.bid_increase <= Decimal::ONE {
                return Err(Error::Config(format!("{}.bid_increase must exceed 1", name)));
            }
            if auction.bid_duration == 0 || auction.total_auction_length == 0 {
                return Err(Error::Config(format!("{} durations must be positive", name)));
            }
            if auction.total_auction_length < auction.bid_duration {
                return Err(Error::Config(format!(
                    "{}.total_auction_length is shorter than bid_duration",
                    name
                )));
            }
            if auction.max_active_auctions == Some(0) {
                return Err(Error::Config(format!("{}.max_active_auctions must be positive", name)));
            }
        }

        if self.esm.trigger_threshold <= Decimal::ZERO {
            return Err(Error::Config("esm.trigger_threshold must be positive".into()));
        }
        if self.oracle.redemption_price <= Decimal::ZERO {
            return Err(Error::Config("oracle.redemption_price must be positive".into()));
        }
        if self.accounting.debt_auction_bid_size <= Decimal::ZERO {
            return Err(Error::Config("accounting.debt_auction_bid_size must be positive".into()));
        }
        for (name, value) in [
            ("safe_engine.global_debt_ceiling", self.safe_engine.global_debt_ceiling),
            (
                "accounting.surplus_auction_amount_to_sell",
                self.accounting.surplus_auction_amount_to_sell,
            ),
            (
                "accounting.initial_debt_auction_minted_tokens",
                self.accounting.initial_debt_auction_minted_tokens,
            ),
            ("accounting.surplus_buffer", self.accounting.surplus_buffer),
        ] {
            if value.is_sign_negative() {
                return Err(Error::Config(format!("{} must not be negative", name)));
            }
        }

        let mut names = BTreeSet::new();
        for collateral in &self.collaterals {
            if !names.insert(collateral.name.as_str()) {
                return Err(Error::Config(format!("duplicate collateral type {}", collateral.name)));
            }
            if collateral.safety_c_ratio < Decimal::ONE || collateral.liquidation_c_ratio < Decimal::ONE {
                return Err(Error::Config(format!("{} ratios must be at least 1", collateral.name)));
            }
            if collateral.liquidation_c_ratio > collateral.safety_c_ratio {
                return Err(Error::Config(format!(
                    "{} liquidation ratio exceeds safety ratio",
                    collateral.name
                )));
            }
            if collateral.debt_ceiling.is_sign_negative() || collateral.debt_floor.is_sign_negative() {
                return Err(Error::Config(format!("{} debt limits must not be negative", collateral.name)));
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TYPED PARAMETERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Auction house parameters from one section
    pub fn build_auction_params(auction: &AuctionConfig) -> Result<AuctionParams> {
        Ok(AuctionParams {
            bid_increase: Wad::from_decimal(auction.bid_increase)?,
            bid_duration: auction.bid_duration,
            total_auction_length: auction.total_auction_length,
            max_active_auctions: auction.max_active_auctions,
        })
    }

    /// Accounting engine parameters
    pub fn build_accounting_params(&self) -> Result<AccountingParams> {
        let accounting = &self.accounting;
        Ok(AccountingParams {
            surplus_auction_delay: accounting.surplus_auction_delay,
            pop_debt_delay: accounting.pop_debt_delay,
            surplus_auction_amount_to_sell: Rad::from_decimal(accounting.surplus_auction_amount_to_sell)?,
            debt_auction_bid_size: Rad::from_decimal(accounting.debt_auction_bid_size)?,
            initial_debt_auction_minted_tokens: Wad::from_decimal(accounting.initial_debt_auction_minted_tokens)?,
            surplus_buffer: Rad::from_decimal(accounting.surplus_buffer)?,
            disable_cooldown: accounting.disable_cooldown,
        })
    }

    /// System-wide debt ceiling
    pub fn build_global_debt_ceiling(&self) -> Result<Rad> {
        Rad::from_decimal(self.safe_engine.global_debt_ceiling)
    }

    /// Emergency shutdown stake
    pub fn build_trigger_threshold(&self) -> Result<Wad> {
        Wad::from_decimal(self.esm.trigger_threshold)
    }

    /// Initial redemption price
    pub fn build_redemption_price(&self) -> Result<Ray> {
        Ray::from_decimal(self.oracle.redemption_price)
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let key = format!("{}{}", ENV_PREFIX, name);
    let raw = std::env::var(&key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring unparsable {}={}", key, raw);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
