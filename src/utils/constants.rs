//! Protocol constants and default parameters.
//!
//! Durations are in seconds. Amount defaults are exact decimals converted
//! into the right fixed-point kind by the configuration layer.

use rust_decimal::Decimal;

const fn dec(mantissa: u32, scale: u32) -> Decimal {
    Decimal::from_parts(mantissa, 0, 0, false, scale)
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum bid increase multiplier (5%)
pub const DEFAULT_BID_INCREASE: Decimal = dec(105, 2);

/// Time a bid stays live before the auction can settle (3 hours)
pub const DEFAULT_BID_DURATION: u64 = 3 * 60 * 60;

/// Hard cap on an auction's lifetime (2 days)
pub const DEFAULT_TOTAL_AUCTION_LENGTH: u64 = 2 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNTING DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum gap between surplus auctions
pub const DEFAULT_SURPLUS_AUCTION_DELAY: u64 = 60 * 60;

/// Delay before queued debt may be auctioned
pub const DEFAULT_POP_DEBT_DELAY: u64 = 60 * 60;

/// Delay after shutdown before late surplus is forwarded to the drain
pub const DEFAULT_DISABLE_COOLDOWN: u64 = 60 * 60;

/// Coins sold per surplus auction
pub const DEFAULT_SURPLUS_AUCTION_AMOUNT: Decimal = dec(100, 0);

/// Coins raised per debt auction
pub const DEFAULT_DEBT_AUCTION_BID_SIZE: Decimal = dec(100, 0);

/// Protocol tokens offered at the start of a debt auction
pub const DEFAULT_DEBT_AUCTION_MINTED_TOKENS: Decimal = dec(1000, 0);

/// Surplus kept by the accounting engine before auctioning
pub const DEFAULT_SURPLUS_BUFFER: Decimal = dec(0, 0);

// ═══════════════════════════════════════════════════════════════════════════════
// SHUTDOWN DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol tokens needed to trigger emergency shutdown
pub const DEFAULT_ESM_THRESHOLD: Decimal = dec(100, 0);

/// Wait between shutdown and fixing the outstanding coin supply (2 days)
pub const DEFAULT_SHUTDOWN_COOLDOWN: u64 = 2 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// System-wide debt ceiling in coins
pub const DEFAULT_GLOBAL_DEBT_CEILING: Decimal = dec(10000000, 0);

/// Initial redemption price
pub const DEFAULT_REDEMPTION_PRICE: Decimal = dec(1, 0);

/// Safety collateralization ratio of the default collateral type
pub const DEFAULT_SAFETY_C_RATIO: Decimal = dec(150, 2);

/// Liquidation collateralization ratio of the default collateral type
pub const DEFAULT_LIQUIDATION_C_RATIO: Decimal = dec(135, 2);

/// Debt ceiling of the default collateral type
pub const DEFAULT_COLLATERAL_DEBT_CEILING: Decimal = dec(1_000_000, 0);

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "GEB_";
