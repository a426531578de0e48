//! Authorized-account set plus the one-way enable flag every module carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::utils::address::Address;

/// Capability gate shared by all modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// Module name used in error messages
    module: String,
    /// Accounts allowed to call privileged operations
    authorized_accounts: BTreeSet<Address>,
    /// Cleared once by the shutdown cascade
    contract_enabled: bool,
}

impl Authority {
    /// New enabled gate with `deployer` as the only authorized account
    pub fn new(module: &str, deployer: Address) -> Self {
        let mut authorized_accounts = BTreeSet::new();
        authorized_accounts.insert(deployer);
        Self {
            module: module.to_string(),
            authorized_accounts,
            contract_enabled: true,
        }
    }

    /// Module name
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether the module still accepts mutating calls
    pub fn contract_enabled(&self) -> bool {
        self.contract_enabled
    }

    /// Whether `account` is authorized
    pub fn is_authorized(&self, account: &Address) -> bool {
        self.authorized_accounts.contains(account)
    }

    /// Fail with `Unauthorized` unless `caller` is authorized
    pub fn require_authorized(&self, caller: &Address) -> Result<()> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} is not authorized on {}",
                caller, self.module
            )))
        }
    }

    /// Fail with `ContractDisabled` once the module is disabled
    pub fn require_enabled(&self) -> Result<()> {
        if self.contract_enabled {
            Ok(())
        } else {
            Err(Error::ContractDisabled(self.module.clone()))
        }
    }

    /// Fail with `StillEnabled` while the module is enabled
    pub fn require_disabled(&self) -> Result<()> {
        if self.contract_enabled {
            Err(Error::StillEnabled(self.module.clone()))
        } else {
            Ok(())
        }
    }

    /// Authorize `account`
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.require_authorized(caller)?;
        self.authorized_accounts.insert(account);
        Ok(())
    }

    /// Revoke `account`
    pub fn remove_authorization(&mut self, caller: &Address, account: &Address) -> Result<()> {
        self.require_authorized(caller)?;
        self.authorized_accounts.remove(account);
        Ok(())
    }

    /// One-way disable. Returns `true` if this call flipped the flag.
    pub fn disable(&mut self, caller: &Address) -> Result<bool> {
        self.require_authorized(caller)?;
        let was_enabled = self.contract_enabled;
        self.contract_enabled = false;
        Ok(was_enabled)
    }
}
