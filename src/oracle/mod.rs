//! Price relay from the external collateral feed into the ledger.

pub mod relayer;

pub use relayer::*;
