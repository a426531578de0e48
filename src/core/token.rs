//! Protocol (governance) token ledger.
//!
//! This module implements the token that:
//! - Bidders pay into surplus auctions (burned on settlement)
//! - Debt auctions mint to cover bad debt
//! - Emergency shutdown consumes as the trigger stake

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::auth::Authority;
use crate::error::{Error, Result};
use crate::utils::address::Address;
use crate::utils::math::{FixedPointValue, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// Governance token with balances, allowances and authorized minting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolToken {
    /// Token symbol
    pub symbol: String,
    /// Mint authority
    authority: Authority,
    /// Total supply
    total_supply: Wad,
    /// Balances by account
    balances: BTreeMap<Address, Wad>,
    /// Allowances by (owner, spender)
    allowances: BTreeMap<(Address, Address), Wad>,
}

impl ProtocolToken {
    /// Create a token whose only minter is `deployer`
    pub fn new(symbol: &str, deployer: Address) -> Self {
        Self {
            symbol: symbol.to_string(),
            authority: Authority::new("ProtocolToken", deployer),
            total_supply: Wad::ZERO,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    /// Mint authority
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Authorize a new minter
    pub fn add_authorization(&mut self, caller: &Address, account: Address) -> Result<()> {
        self.authority.add_authorization(caller, account)
    }

    /// Total supply
    pub fn total_supply(&self) -> Wad {
        self.total_supply
    }

    /// Balance of an account
    pub fn balance_of(&self, owner: &Address) -> Wad {
        self.balances.get(owner).copied().unwrap_or(Wad::ZERO)
    }

    /// Remaining allowance `owner` granted to `spender`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Wad {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(Wad::ZERO)
    }

    /// Mint new tokens (authorized only)
    pub fn mint(&mut self, caller: &Address, to: Address, amount: Wad) -> Result<()> {
        self.authority.require_authorized(caller)?;
        let new_supply = self.total_supply.safe_add(amount)?;
        let new_balance = self.balance_of(&to).safe_add(amount)?;

        self.balances.insert(to, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Burn tokens from the caller's own balance
    pub fn burn(&mut self, owner: &Address, amount: Wad) -> Result<()> {
        let new_balance = self.debited_balance(owner, amount)?;
        let new_supply = self.total_supply.safe_sub(amount)?;

        self.set_balance(*owner, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Set the allowance `owner` grants to `spender`
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Wad) {
        if amount.is_zero() {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Move tokens out of `from`'s own balance
    pub fn transfer(&mut self, from: &Address, to: Address, amount: Wad) -> Result<()> {
        if *from == to || amount.is_zero() {
            // still surface a short balance
            self.debited_balance(from, amount)?;
            return Ok(());
        }
        let new_from = self.debited_balance(from, amount)?;
        let new_to = self.balance_of(&to).safe_add(amount)?;

        self.set_balance(*from, new_from);
        self.set_balance(to, new_to);
        Ok(())
    }

    /// Move tokens on behalf of `from`, consuming `spender`'s allowance
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: Address,
        to: Address,
        amount: Wad,
    ) -> Result<()> {
        let remaining = if *spender == from {
            None
        } else {
            let allowed = self.allowance(&from, spender);
            if allowed < amount {
                return Err(Error::InsufficientBalance {
                    account: format!("{} allowance {} -> {}", self.symbol, from, spender),
                    required: amount.to_string(),
                    available: allowed.to_string(),
                });
            }
            Some(allowed.safe_sub(amount)?)
        };

        self.transfer(&from, to, amount)?;
        if let Some(remaining) = remaining {
            self.approve(from, *spender, remaining);
        }
        Ok(())
    }

    fn debited_balance(&self, owner: &Address, amount: Wad) -> Result<Wad> {
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                account: format!("{} balance {}", self.symbol, owner),
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }
        balance.safe_sub(amount)
    }

    fn set_balance(&mut self, owner: Address, balance: Wad) {
        if balance.is_zero() {
            self.balances.remove(&owner);
        } else {
            self.balances.insert(owner, balance);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ProtocolToken, Address, Address, Address) {
        let gov = Address::derive("gov");
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        let mut token = ProtocolToken::new("PROT", gov);
        token.mint(&gov, alice, Wad::from_integer(100)).unwrap();
        (token, gov, alice, bob)
    }

    #[test]
    fn test_mint_requires_authorization() {
        let (mut token, _, alice, bob) = setup();
        assert!(matches!(
            token.mint(&alice, bob, Wad::ONE),
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(token.total_supply(), Wad::from_integer(100));
    }

    #[test]
    fn test_transfer_and_burn() {
        let (mut token, _, alice, bob) = setup();
        token.transfer(&alice, bob, Wad::from_integer(30)).unwrap();
        assert_eq!(token.balance_of(&alice), Wad::from_integer(70));
        assert_eq!(token.balance_of(&bob), Wad::from_integer(30));

        token.burn(&bob, Wad::from_integer(10)).unwrap();
        assert_eq!(token.total_supply(), Wad::from_integer(90));
        assert!(token.burn(&bob, Wad::from_integer(21)).is_err());
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let (mut token, _, alice, bob) = setup();
        let house = Address::derive("house");

        assert!(token.transfer_from(&house, alice, house, Wad::ONE).is_err());

        token.approve(alice, house, Wad::from_integer(5));
        token.transfer_from(&house, alice, house, Wad::from_integer(3)).unwrap();
        assert_eq!(token.allowance(&alice, &house), Wad::from_integer(2));
        assert_eq!(token.balance_of(&house), Wad::from_integer(3));

        let err = token.transfer_from(&house, alice, bob, Wad::from_integer(3)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        // failed transfer leaves balances untouched
        assert_eq!(token.balance_of(&alice), Wad::from_integer(97));
    }
}
