//! Core modules of the GEB ledger.
//!
//! This module contains the fundamental building blocks:
//! - Authorization and the one-way enable flag
//! - The safe engine (collateral, debt and coin ledger)
//! - The accounting engine (surplus and bad debt)
//! - The protocol token
//! - System configuration

pub mod accounting;
pub mod auth;
pub mod config;
pub mod safe_engine;
pub mod token;

pub use accounting::*;
pub use auth::*;
pub use config::*;
pub use safe_engine::*;
pub use token::*;
