//! # GEB Core
//!
//! A multi-collateral debt ledger with English auctions and an ordered,
//! irreversible emergency shutdown.
//!
//! ## Architecture
//!
//! The system consists of several modules:
//!
//! - **Core**: Fixed-point amounts, the safe engine, the accounting engine,
//!   the protocol token and configuration
//! - **Auction**: One generic English auction house serving the surplus,
//!   debt and post-settlement surplus auctions
//! - **Liquidation**: Confiscation of unsafe safes
//! - **Oracle**: Relay of feed prices into the ledger
//! - **Shutdown**: Emergency shutdown module, global settlement and the
//!   settlement surplus auctioneer
//! - **Protocol**: The state machine applying operations atomically
//!
//! ## Example
//!
//! ```rust,ignore
//! use geb_core::prelude::*;
//!
//! let mut machine = ProtocolStateMachine::new(&SystemConfig::default())?;
//! machine.begin_block(1, 1_700_000_000)?;
//! let receipt = machine.execute(ProtocolOperation::TriggerShutdown { caller })?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod auction;
pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod shutdown;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auction::house::{
        AuctionHouse, AuctionParams, AuctionStatus, Bid, DebtAuctionHouse,
        PostSettlementSurplusAuctionHouse, SurplusAuctionHouse,
    };
    pub use crate::core::{
        accounting::{AccountingEngine, AccountingParams, AuctionAttempt, SkipReason},
        config::SystemConfig,
        safe_engine::{CollateralType, Safe, SafeEngine, SafeModification},
        token::ProtocolToken,
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::liquidation::engine::{LiquidationEngine, LiquidationRecord};
    pub use crate::oracle::relayer::OracleRelayer;
    pub use crate::protocol::{
        events::{EventKind, EventLog, ProtocolEvent},
        operations::{AuctionHouseId, ChainError, OperationResult, ProtocolOperation, Receipt},
        shared::SharedProtocol,
        state_machine::{GebSystem, ProtocolStateMachine, SystemAddresses},
    };
    pub use crate::shutdown::{
        esm::Esm,
        global_settlement::{GlobalSettlement, ProcessedSafe},
        surplus_auctioneer::SettlementSurplusAuctioneer,
    };
    pub use crate::utils::{
        address::{Address, CollateralTypeId},
        math::{Amount, Delta, FixedPointValue, Rad, Ray, Wad},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "GEB";
