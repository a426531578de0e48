//! Protocol module - state machine and submit/read surface.
//!
//! This module provides the central state machine that applies every
//! operation atomically against an injected clock, plus the event log and
//! the shared handle used by concurrent callers.

pub mod events;
pub mod operations;
pub mod shared;
pub mod state_machine;

pub use events::*;
pub use operations::*;
pub use shared::*;
pub use state_machine::*;
