//! Liquidation of undercollateralized safes.

pub mod engine;

pub use engine::*;
