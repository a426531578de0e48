//! Utility modules for the GEB core.
//!
//! This module contains shared utilities used across the protocol:
//! - Fixed-point arithmetic
//! - Account and collateral identifiers
//! - Constants

pub mod address;
pub mod constants;
pub mod math;

pub use address::*;
pub use constants::*;
pub use math::*;
