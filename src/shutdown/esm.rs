//! Emergency shutdown module.
//!
//! Protocol token holders stake `trigger_threshold` tokens to start global
//! settlement. The stake is sent to the token burner and the module can
//! fire only once.

use serde::{Deserialize, Serialize};

use crate::core::auth::Authority;
use crate::core::token::ProtocolToken;
use crate::error::{Error, Result};
use crate::shutdown::global_settlement::{GlobalSettlement, ShutdownCascade};
use crate::utils::address::Address;
use crate::utils::math::Wad;

/// One-shot shutdown trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Esm {
    address: Address,
    authority: Authority,
    /// Receives the staked tokens
    token_burner: Address,
    /// Stake needed to fire
    trigger_threshold: Wad,
    settled: bool,
}

impl Esm {
    /// Create an armed module
    pub fn new(address: Address, deployer: Address, token_burner: Address, trigger_threshold: Wad) -> Self {
        Self {
            address,
            authority: Authority::new("ESM", deployer),
            token_burner,
            trigger_threshold,
            settled: false,
        }
    }

    /// Change the stake needed to fire (authorized, before triggering)
    pub fn modify_threshold(&mut self, caller: &Address, trigger_threshold: Wad) -> Result<()> {
        self.authority.require_authorized(caller)?;
        if self.settled {
            return Err(Error::AlreadyTriggered);
        }
        if trigger_threshold.is_zero() {
            return Err(Error::ZeroAmount);
        }
        self.trigger_threshold = trigger_threshold;
        Ok(())
    }

    /// Burn the caller's stake and shut the system down.
    ///
    /// The caller needs `trigger_threshold` tokens and an allowance of at
    /// least as much to this module.
    pub fn trigger(
        &mut self,
        caller: &Address,
        token: &mut ProtocolToken,
        global_settlement: &mut GlobalSettlement,
        cascade: ShutdownCascade<'_>,
        now: u64,
    ) -> Result<()> {
        if self.settled {
            return Err(Error::AlreadyTriggered);
        }
        let available = token
            .balance_of(caller)
            .min(token.allowance(caller, &self.address));
        if available < self.trigger_threshold {
            return Err(Error::BelowThreshold {
                required: self.trigger_threshold.to_string(),
                available: available.to_string(),
            });
        }

        global_settlement.shutdown_system(&self.address, cascade, now)?;
        token.transfer_from(&self.address, *caller, self.token_burner, self.trigger_threshold)?;
        self.settled = true;

        tracing::warn!(
            "emergency shutdown triggered by {} at {}",
            caller,
            now
        );
        Ok(())
    }

    /// Module address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether the module already fired
    pub fn settled(&self) -> bool {
        self.settled
    }

    /// Stake needed to fire
    pub fn trigger_threshold(&self) -> Wad {
        self.trigger_threshold
    }

    /// Receiver of staked tokens
    pub fn token_burner(&self) -> Address {
        self.token_burner
    }
}
