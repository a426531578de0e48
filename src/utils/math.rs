//! Fixed-point arithmetic over 256-bit integers.
//!
//! Three scalar kinds share a `U256` backing store and differ only in scale:
//! [`Wad`] (10^18), [`Ray`] (10^27) and [`Rad`] (10^45). Values of different
//! kinds never mix implicitly; every cross-kind operation is a named method
//! with a fixed truncation rule:
//!
//! | operation              | result | rounding              |
//! |------------------------|--------|-----------------------|
//! | `Wad::to_ray/to_rad`   | exact  | none                  |
//! | `Ray::to_rad`          | exact  | none                  |
//! | `Ray::to_wad`          | Wad    | truncates toward zero |
//! | `Rad::to_ray/to_wad`   |        | truncates toward zero |
//! | `x.checked_mul(y)`     | same   | truncates             |
//! | `Wad::rmul(Ray)`       | Wad    | `x*y/RAY`, truncates  |
//! | `Rad::from_product`    | Rad    | exact `Wad*Ray`       |

use ethereum_types::U256;
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// SCALES
// ═══════════════════════════════════════════════════════════════════════════════

/// 10^18
pub const WAD_SCALE: U256 = U256([0x0de0_b6b3_a764_0000, 0, 0, 0]);

/// 10^27
pub const RAY_SCALE: U256 = U256([0x9fd0_803c_e800_0000, 0x033b_2e3c, 0, 0]);

/// 10^45
pub const RAD_SCALE: U256 = U256([0x0b22_a000_0000_0000, 0xe086_b93c_e2f7_68a0, 0x002c_d76f, 0]);

/// 10^9, the gap between Wad and Ray
const WAD_TO_RAY: U256 = U256([1_000_000_000, 0, 0, 0]);

/// Computes `a * b / denominator`, truncating, failing on overflow or a zero divisor
pub fn mul_div(a: U256, b: U256, denominator: U256, operation: &str) -> Result<U256> {
    if denominator.is_zero() {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: format!("division by zero in {}", operation),
        });
    }
    let product = a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: operation.to_string(),
    })?;
    Ok(product / denominator)
}

fn scale_up(value: U256, factor: U256, operation: &str) -> Result<U256> {
    value.checked_mul(factor).ok_or_else(|| Error::Overflow {
        operation: operation.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Behaviour shared by the three fixed-point kinds
pub trait FixedPointValue:
    Copy
    + Ord
    + Default
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Number of decimal places
    const DECIMALS: u32;

    /// Short unit name used in messages
    const UNIT: &'static str;

    /// Wrap a raw scaled integer
    fn from_raw(raw: U256) -> Self;

    /// Raw scaled integer
    fn raw(&self) -> U256;

    /// Tagged copy for heterogeneous event payloads
    fn into_amount(self) -> Amount;

    /// Checked addition returning a protocol error
    fn safe_add(self, other: Self) -> Result<Self> {
        self.raw()
            .checked_add(other.raw())
            .map(Self::from_raw)
            .ok_or_else(|| Error::Overflow {
                operation: format!("{} {} + {}", Self::UNIT, self, other),
            })
    }

    /// Checked subtraction returning a protocol error
    fn safe_sub(self, other: Self) -> Result<Self> {
        self.raw()
            .checked_sub(other.raw())
            .map(Self::from_raw)
            .ok_or_else(|| Error::Underflow {
                operation: format!("{} {} - {}", Self::UNIT, self, other),
            })
    }

    /// Multiply by a Wad factor (`x * m / WAD`), truncating
    fn mul_wad(self, multiplier: Wad) -> Result<Self> {
        mul_div(self.raw(), multiplier.raw(), WAD_SCALE, "mul_wad").map(Self::from_raw)
    }
}

/// A fixed-point value tagged with its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value")]
pub enum Amount {
    /// 18 decimals
    Wad(Wad),
    /// 27 decimals
    Ray(Ray),
    /// 45 decimals
    Rad(Rad),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Wad(v) => write!(f, "{} wad", v),
            Amount::Ray(v) => write!(f, "{} ray", v),
            Amount::Rad(v) => write!(f, "{} rad", v),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT KINDS
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! fixed_point {
    ($(#[$meta:meta])* $name:ident, $decimals:literal, $scale:expr, $unit:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(U256);

        impl $name {
            /// Zero value
            pub const ZERO: Self = Self(U256([0, 0, 0, 0]));

            /// One whole unit
            pub const ONE: Self = Self($scale);

            /// Number of decimal places
            pub const DECIMALS: u32 = $decimals;

            /// Create from a raw scaled integer
            pub const fn from_raw(raw: U256) -> Self {
                Self(raw)
            }

            /// Create from a raw scaled integer that fits in 128 bits
            pub fn from_raw_u128(raw: u128) -> Self {
                Self(U256::from(raw))
            }

            /// Get the raw scaled integer
            pub fn raw(&self) -> U256 {
                self.0
            }

            /// Create from a whole number of units
            pub fn from_integer(value: u64) -> Self {
                // u64::MAX * 10^45 stays below 2^256
                Self(U256::from(value) * $scale)
            }

            /// Create from a decimal, truncating digits beyond the kind's precision
            pub fn from_decimal(value: Decimal) -> Result<Self> {
                if value.is_sign_negative() && !value.is_zero() {
                    return Err(Error::InvalidParameter {
                        name: $unit.into(),
                        reason: format!("negative value {}", value),
                    });
                }
                let mantissa = U256::from(value.mantissa().unsigned_abs());
                let scale = value.scale();
                let raw = if scale <= $decimals {
                    scale_up(
                        mantissa,
                        U256::exp10(($decimals - scale) as usize),
                        concat!($unit, " from_decimal"),
                    )?
                } else {
                    mantissa / U256::exp10((scale - $decimals) as usize)
                };
                Ok(Self(raw))
            }

            /// Check if value is zero
            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            /// Checked addition
            pub fn checked_add(self, other: Self) -> Option<Self> {
                self.0.checked_add(other.0).map(Self)
            }

            /// Checked subtraction
            pub fn checked_sub(self, other: Self) -> Option<Self> {
                self.0.checked_sub(other.0).map(Self)
            }

            /// Saturating subtraction
            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }

            /// Same-kind product, truncated to the kind's base unit
            pub fn checked_mul(self, other: Self) -> Option<Self> {
                self.0.checked_mul(other.0).map(|p| Self(p / $scale))
            }

            /// Same-kind quotient, truncated to the kind's base unit
            pub fn checked_div(self, other: Self) -> Option<Self> {
                if other.0.is_zero() {
                    return None;
                }
                self.0.checked_mul($scale).map(|n| Self(n / other.0))
            }

            /// Minimum of two values
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            /// Maximum of two values
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl FixedPointValue for $name {
            const DECIMALS: u32 = $decimals;
            const UNIT: &'static str = $unit;

            fn from_raw(raw: U256) -> Self {
                Self(raw)
            }

            fn raw(&self) -> U256 {
                self.0
            }

            fn into_amount(self) -> Amount {
                Amount::$name(self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let whole = self.0 / $scale;
                let fraction = (self.0 % $scale).to_string();
                write!(f, "{}.{:0>width$}", whole, fraction, width = $decimals as usize)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let value = Decimal::from_str(s).map_err(|e| Error::InvalidParameter {
                    name: $unit.into(),
                    reason: e.to_string(),
                })?;
                Self::from_decimal(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                U256::from_dec_str(&raw)
                    .map(Self)
                    .map_err(|e| de::Error::custom(format!("invalid {} {:?}: {:?}", $unit, raw, e)))
            }
        }
    };
}

fixed_point!(
    /// 18-decimal quantity: collateral, nominal debt, governance tokens
    Wad, 18, WAD_SCALE, "wad"
);

fixed_point!(
    /// 27-decimal ratio: rates and prices
    Ray, 27, RAY_SCALE, "ray"
);

fixed_point!(
    /// 45-decimal internal coin amount (Wad times Ray)
    Rad, 45, RAD_SCALE, "rad"
);

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl Wad {
    /// Exact upward conversion
    pub fn to_ray(self) -> Result<Ray> {
        scale_up(self.0, WAD_TO_RAY, "wad to ray").map(Ray)
    }

    /// Exact upward conversion
    pub fn to_rad(self) -> Result<Rad> {
        scale_up(self.0, RAY_SCALE, "wad to rad").map(Rad)
    }

    /// `self * ray / RAY`, truncating
    pub fn rmul(self, ray: Ray) -> Result<Wad> {
        mul_div(self.0, ray.0, RAY_SCALE, "wad rmul").map(Wad)
    }

    /// `self * RAY / other`, truncating
    pub fn rdiv(self, other: Wad) -> Result<Ray> {
        mul_div(self.0, RAY_SCALE, other.0, "wad rdiv").map(Ray)
    }
}

impl Ray {
    /// Truncating downward conversion
    pub fn to_wad(self) -> Wad {
        Wad(self.0 / WAD_TO_RAY)
    }

    /// Exact upward conversion
    pub fn to_rad(self) -> Result<Rad> {
        scale_up(self.0, WAD_SCALE, "ray to rad").map(Rad)
    }

    /// `self * other / RAY`, truncating
    pub fn rmul(self, other: Ray) -> Result<Ray> {
        mul_div(self.0, other.0, RAY_SCALE, "ray rmul").map(Ray)
    }

    /// `self * RAY / other`, truncating
    pub fn rdiv(self, other: Ray) -> Result<Ray> {
        mul_div(self.0, RAY_SCALE, other.0, "ray rdiv").map(Ray)
    }
}

impl Rad {
    /// Exact product of a quantity and a rate
    pub fn from_product(wad: Wad, ray: Ray) -> Result<Rad> {
        wad.0.checked_mul(ray.0).map(Rad).ok_or_else(|| Error::Overflow {
            operation: format!("rad {} * {}", wad, ray),
        })
    }

    /// Truncating downward conversion
    pub fn to_ray(self) -> Ray {
        Ray(self.0 / WAD_SCALE)
    }

    /// Truncating downward conversion
    pub fn to_wad(self) -> Wad {
        Wad(self.0 / RAY_SCALE)
    }

    /// `self / ray` as a quantity, truncating
    pub fn div_ray(self, ray: Ray) -> Result<Wad> {
        if ray.is_zero() {
            return Err(Error::InvalidParameter {
                name: "ray".into(),
                reason: "division by zero".into(),
            });
        }
        Ok(Wad(self.0 / ray.0))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNED DELTAS
// ═══════════════════════════════════════════════════════════════════════════════

/// Signed change applied to an unsigned fixed-point balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta<T> {
    /// Add to the balance
    Increase(T),
    /// Remove from the balance
    Decrease(T),
}

impl<T: FixedPointValue> Delta<T> {
    /// No change
    pub fn zero() -> Self {
        Delta::Increase(T::from_raw(U256::zero()))
    }

    /// Absolute size of the change
    pub fn magnitude(&self) -> T {
        match self {
            Delta::Increase(v) | Delta::Decrease(v) => *v,
        }
    }

    /// True for a non-zero increase
    pub fn is_increase(&self) -> bool {
        matches!(self, Delta::Increase(v) if !v.raw().is_zero())
    }

    /// True for a non-zero decrease
    pub fn is_decrease(&self) -> bool {
        matches!(self, Delta::Decrease(v) if !v.raw().is_zero())
    }

    /// True if the delta changes nothing
    pub fn is_zero(&self) -> bool {
        self.magnitude().raw().is_zero()
    }

    /// Apply the delta to `base`
    pub fn apply(&self, base: T) -> Result<T> {
        match self {
            Delta::Increase(v) => base.safe_add(*v),
            Delta::Decrease(v) => base.safe_sub(*v),
        }
    }

    /// The same change scaled into another kind
    pub fn map<U, F>(&self, f: F) -> Result<Delta<U>>
    where
        F: FnOnce(T) -> Result<U>,
    {
        Ok(match self {
            Delta::Increase(v) => Delta::Increase(f(*v)?),
            Delta::Decrease(v) => Delta::Decrease(f(*v)?),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn ray(s: &str) -> Ray {
        s.parse().unwrap()
    }

    #[test]
    fn test_scale_constants() {
        assert_eq!(WAD_SCALE, U256::exp10(18));
        assert_eq!(RAY_SCALE, U256::exp10(27));
        assert_eq!(RAD_SCALE, U256::exp10(45));
    }

    #[test]
    fn test_upward_conversions_exact() {
        let w = Wad::from_raw_u128(1_234_567_890_123_456_789);
        assert_eq!(w.to_ray().unwrap().raw(), w.raw() * U256::exp10(9));
        assert_eq!(w.to_rad().unwrap().raw(), w.raw() * U256::exp10(27));
        assert_eq!(w.to_ray().unwrap().to_wad(), w);
    }

    #[test]
    fn test_downward_conversion_truncates() {
        let r = Ray::from_raw_u128(1_999_999_999);
        assert_eq!(r.to_wad(), Wad::from_raw_u128(1));

        let rad = Rad::from_raw(U256::exp10(27) * 3 - 1);
        assert_eq!(rad.to_wad(), Wad::from_raw_u128(2));
        assert_eq!(rad.to_ray(), Ray::from_raw(U256::exp10(9) * 3 - 1));
    }

    #[test]
    fn test_same_kind_mul_truncates() {
        let a = Wad::from_raw_u128(3);
        let b = Wad::from_str("0.5").unwrap();
        // 3e-18 * 0.5 = 1.5e-18, truncated to 1e-18
        assert_eq!(a.checked_mul(b), Some(Wad::from_raw_u128(1)));
        assert_eq!(
            Wad::from_integer(2).checked_mul(Wad::from_integer(3)),
            Some(Wad::from_integer(6))
        );
        assert_eq!(Wad::ONE.checked_div(Wad::ZERO), None);
    }

    #[test]
    fn test_cross_kind_products() {
        let debt = Wad::from_integer(10);
        let rate = ray("1.05");
        assert_eq!(debt.rmul(rate).unwrap(), Wad::from_str("10.5").unwrap());
        assert_eq!(
            Rad::from_product(debt, rate).unwrap(),
            Wad::from_str("10.5").unwrap().to_rad().unwrap()
        );
        assert_eq!(
            Rad::from_product(debt, rate).unwrap().div_ray(rate).unwrap(),
            debt
        );
    }

    #[test]
    fn test_rdiv_truncates() {
        let price = Ray::from_integer(200);
        let fcpcp = price.rdiv(ray("1.05")).unwrap();
        assert_eq!(fcpcp.raw(), U256::from_dec_str("190476190476190476190476190476").unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(Wad::from_str("1.05").unwrap().to_string(), "1.050000000000000000");
        assert_eq!(Wad::ZERO.to_string(), "0.000000000000000000");
        assert_eq!(format!("{:?}", Ray::ONE), format!("Ray(1.{})", "0".repeat(27)));
    }

    #[test]
    fn test_from_decimal_rejects_negative() {
        assert!(Wad::from_decimal(Decimal::new(-1, 0)).is_err());
        assert_eq!(Wad::from_decimal(Decimal::new(25, 1)).unwrap(), Wad::from_str("2.5").unwrap());
    }

    #[test]
    fn test_safe_arithmetic_errors() {
        assert!(matches!(
            Wad::ZERO.safe_sub(Wad::ONE),
            Err(Error::Underflow { .. })
        ));
        let max = Rad::from_raw(U256::MAX);
        assert!(matches!(max.safe_add(Rad::from_raw_u128(1)), Err(Error::Overflow { .. })));
        assert!(Wad::from_raw(U256::MAX).to_rad().is_err());
    }

    #[test]
    fn test_delta_apply() {
        let base = Wad::from_integer(5);
        assert_eq!(Delta::Increase(Wad::ONE).apply(base).unwrap(), Wad::from_integer(6));
        assert_eq!(Delta::Decrease(Wad::ONE).apply(base).unwrap(), Wad::from_integer(4));
        assert!(Delta::Decrease(Wad::from_integer(6)).apply(base).is_err());
        assert!(Delta::<Wad>::zero().is_zero());
        assert!(!Delta::Increase(Wad::ZERO).is_increase());
    }

    #[test]
    fn test_serde_decimal_string() {
        let w = Wad::from_str("2.5").unwrap();
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"2500000000000000000\"");
        let back: Wad = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
