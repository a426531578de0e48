//! Emergency shutdown and global settlement.
//!
//! - `esm`: the one-shot trigger
//! - `global_settlement`: the settlement state machine
//! - `surplus_auctioneer`: sells coins left over after shutdown

pub mod esm;
pub mod global_settlement;
pub mod surplus_auctioneer;

pub use esm::*;
pub use global_settlement::*;
pub use surplus_auctioneer::*;
