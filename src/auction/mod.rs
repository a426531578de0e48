//! Auction houses.
//!
//! - `house`: the generic English auction state machine and its variants
//! - `ledgers`: fund movements for surplus-style and debt auctions

pub mod house;
pub mod ledgers;

pub use house::*;
pub use ledgers::*;
