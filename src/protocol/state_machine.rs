//! Protocol State Machine - Core orchestration engine.
//!
//! The state machine owns one instance of every component, wires their
//! addresses and authorizations at deployment, and applies operations one at
//! a time against an injected block clock. Each operation either commits in
//! full or leaves the system untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auction::house::{
    AuctionKind, Bid, DebtAuctionHouse, PostSettlementSurplusAuctionHouse, SurplusAuctionHouse,
};
use crate::auction::ledgers::{DebtLedger, SurplusLedger};
use crate::core::accounting::{AccountingEngine, AuctionAttempt};
use crate::core::config::SystemConfig;
use crate::core::safe_engine::{SafeEngine, SafeEngineParameter};
use crate::core::token::ProtocolToken;
use crate::error::{Error, Result};
use crate::liquidation::engine::LiquidationEngine;
use crate::oracle::relayer::{OracleRelayer, OracleRelayerParameter};
use crate::protocol::events::{EventKind, EventLog, ProtocolEvent};
use crate::protocol::operations::{AuctionHouseId, BidSnapshot, OperationResult, ProtocolOperation, Receipt};
use crate::shutdown::esm::Esm;
use crate::shutdown::global_settlement::{GlobalSettlement, ShutdownCascade};
use crate::shutdown::surplus_auctioneer::SettlementSurplusAuctioneer;
use crate::utils::address::Address;
use crate::utils::math::{FixedPointValue, Rad, Ray};

/// Symbol of the governance token
pub const PROTOCOL_TOKEN_SYMBOL: &str = "PROT";

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Addresses of every deployed module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAddresses {
    /// Deployer and administrator of all modules
    pub governance: Address,
    /// Central ledger
    pub safe_engine: Address,
    /// Liquidation engine
    pub liquidation_engine: Address,
    /// Accounting engine
    pub accounting_engine: Address,
    /// Surplus auction house
    pub surplus_house: Address,
    /// Debt auction house
    pub debt_house: Address,
    /// Post-settlement surplus auction house
    pub post_settlement_house: Address,
    /// Oracle relayer
    pub oracle_relayer: Address,
    /// Emergency shutdown module
    pub esm: Address,
    /// Global settlement
    pub global_settlement: Address,
    /// Settlement surplus auctioneer
    pub surplus_auctioneer: Address,
    /// Receives tokens staked in the ESM
    pub token_burner: Address,
    /// Receives collateral seized by liquidations
    pub collateral_receiver: Address,
}

impl SystemAddresses {
    /// Derive all module addresses under `namespace`
    pub fn derive(namespace: &str) -> Self {
        let at = |name: &str| Address::derive(&format!("{}.{}", namespace, name));
        Self {
            governance: at("governance"),
            safe_engine: at("safe_engine"),
            liquidation_engine: at("liquidation_engine"),
            accounting_engine: at("accounting_engine"),
            surplus_house: at("surplus_auction_house"),
            debt_house: at("debt_auction_house"),
            post_settlement_house: at("post_settlement_surplus_auction_house"),
            oracle_relayer: at("oracle_relayer"),
            esm: at("esm"),
            global_settlement: at("global_settlement"),
            surplus_auctioneer: at("settlement_surplus_auctioneer"),
            token_burner: at("token_burner"),
            collateral_receiver: at("collateral_auction_house"),
        }
    }
}

impl Default for SystemAddresses {
    fn default() -> Self {
        Self::derive("geb")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

/// Every deployed component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GebSystem {
    /// Module addresses
    pub addresses: SystemAddresses,
    /// Central ledger
    pub safe_engine: SafeEngine,
    /// Liquidation engine
    pub liquidation_engine: LiquidationEngine,
    /// Accounting engine
    pub accounting_engine: AccountingEngine,
    /// Surplus auction house
    pub surplus_house: SurplusAuctionHouse,
    /// Debt auction house
    pub debt_house: DebtAuctionHouse,
    /// Post-settlement surplus auction house
    pub post_settlement_house: PostSettlementSurplusAuctionHouse,
    /// Oracle relayer
    pub oracle_relayer: OracleRelayer,
    /// Governance token
    pub protocol_token: ProtocolToken,
    /// Emergency shutdown module
    pub esm: Esm,
    /// Global settlement
    pub global_settlement: GlobalSettlement,
    /// Settlement surplus auctioneer
    pub surplus_auctioneer: SettlementSurplusAuctioneer,
}

impl GebSystem {
    /// Deploy and wire all components from a validated configuration
    pub fn deploy(config: &SystemConfig, addresses: SystemAddresses) -> Result<Self> {
        config.validate()?;
        let gov = addresses.governance;

        let mut safe_engine = SafeEngine::new(addresses.safe_engine, gov);
        for account in [
            addresses.liquidation_engine,
            addresses.global_settlement,
            addresses.oracle_relayer,
            addresses.debt_house,
        ] {
            safe_engine.add_authorization(&gov, account)?;
        }
        safe_engine.modify_parameters(
            &gov,
            SafeEngineParameter::GlobalDebtCeiling(config.build_global_debt_ceiling()?),
        )?;

        let mut oracle_relayer = OracleRelayer::new(addresses.oracle_relayer, gov);
        oracle_relayer.add_authorization(&gov, addresses.global_settlement)?;
        oracle_relayer.modify_parameters(
            &gov,
            OracleRelayerParameter::RedemptionPrice(config.build_redemption_price()?),
        )?;

        for collateral in &config.collaterals {
            let id = collateral.id();
            safe_engine.init_collateral_type(&gov, id.clone())?;
            safe_engine.modify_parameters(
                &gov,
                SafeEngineParameter::DebtCeiling(id.clone(), Rad::from_decimal(collateral.debt_ceiling)?),
            )?;
            safe_engine.modify_parameters(
                &gov,
                SafeEngineParameter::DebtFloor(id.clone(), Rad::from_decimal(collateral.debt_floor)?),
            )?;
            oracle_relayer.modify_parameters(
                &gov,
                OracleRelayerParameter::SafetyCRatio(id.clone(), Ray::from_decimal(collateral.safety_c_ratio)?),
            )?;
            oracle_relayer.modify_parameters(
                &gov,
                OracleRelayerParameter::LiquidationCRatio(id, Ray::from_decimal(collateral.liquidation_c_ratio)?),
            )?;
        }

        let mut accounting_engine =
            AccountingEngine::new(addresses.accounting_engine, gov, config.build_accounting_params()?);
        accounting_engine.add_authorization(&gov, addresses.liquidation_engine)?;
        accounting_engine.add_authorization(&gov, addresses.global_settlement)?;
        accounting_engine.set_post_settlement_surplus_drain(&gov, addresses.surplus_auctioneer)?;

        let surplus_house = SurplusAuctionHouse::new(
            addresses.surplus_house,
            addresses.accounting_engine,
            SystemConfig::build_auction_params(&config.surplus_auction)?,
        )?;
        let debt_house = DebtAuctionHouse::new(
            addresses.debt_house,
            addresses.accounting_engine,
            SystemConfig::build_auction_params(&config.debt_auction)?,
        )?;
        let post_settlement_house = PostSettlementSurplusAuctionHouse::new(
            addresses.post_settlement_house,
            addresses.surplus_auctioneer,
            SystemConfig::build_auction_params(&config.post_settlement_auction)?,
        )?;

        let mut protocol_token = ProtocolToken::new(PROTOCOL_TOKEN_SYMBOL, gov);
        protocol_token.add_authorization(&gov, addresses.debt_house)?;

        let mut liquidation_engine =
            LiquidationEngine::new(addresses.liquidation_engine, gov, addresses.collateral_receiver);
        liquidation_engine.add_authorization(&gov, addresses.global_settlement)?;

        let mut global_settlement = GlobalSettlement::new(
            addresses.global_settlement,
            gov,
            config.settlement.shutdown_cooldown,
        );
        global_settlement.add_authorization(&gov, addresses.esm)?;

        let esm = Esm::new(
            addresses.esm,
            gov,
            addresses.token_burner,
            config.build_trigger_threshold()?,
        );
        let surplus_auctioneer = SettlementSurplusAuctioneer::new(
            addresses.surplus_auctioneer,
            addresses.accounting_engine,
            addresses.safe_engine,
        );

        info!(
            "deployed GEB system with {} collateral type(s)",
            config.collaterals.len()
        );
        Ok(Self {
            addresses,
            safe_engine,
            liquidation_engine,
            accounting_engine,
            surplus_house,
            debt_house,
            post_settlement_house,
            oracle_relayer,
            protocol_token,
            esm,
            global_settlement,
            surplus_auctioneer,
        })
    }

    fn cascade(&mut self) -> (&mut Esm, &mut ProtocolToken, &mut GlobalSettlement, ShutdownCascade<'_>) {
        (
            &mut self.esm,
            &mut self.protocol_token,
            &mut self.global_settlement,
            ShutdownCascade {
                safe_engine: &mut self.safe_engine,
                liquidation_engine: &mut self.liquidation_engine,
                accounting_engine: &mut self.accounting_engine,
                surplus_house: &mut self.surplus_house,
                debt_house: &mut self.debt_house,
                oracle_relayer: &mut self.oracle_relayer,
            },
        )
    }

    fn auction_snapshot(&self, house: AuctionHouseId, id: u64) -> Option<BidSnapshot> {
        match house {
            AuctionHouseId::Surplus => self.surplus_house.bids(id).map(|b| BidSnapshot::from_bid(house, b)),
            AuctionHouseId::Debt => self.debt_house.bids(id).map(|b| BidSnapshot::from_bid(house, b)),
            AuctionHouseId::PostSettlementSurplus => self
                .post_settlement_house
                .bids(id)
                .map(|b| BidSnapshot::from_bid(house, b)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol state machine - orchestrates all operations
#[derive(Debug, Clone)]
pub struct ProtocolStateMachine {
    system: GebSystem,
    /// Current block height
    block_height: u64,
    /// Current timestamp
    timestamp: u64,
    /// Events of the current block
    event_log: EventLog,
    /// Committed operations since deployment
    operations_executed: u64,
}

/// Committed state handed to the durable log
#[derive(Serialize, Deserialize)]
struct Snapshot {
    block_height: u64,
    timestamp: u64,
    operations_executed: u64,
    system: GebSystem,
}

impl ProtocolStateMachine {
    /// Deploy a fresh system under the default addresses
    pub fn new(config: &SystemConfig) -> Result<Self> {
        Self::with_addresses(config, SystemAddresses::default())
    }

    /// Deploy a fresh system under explicit addresses
    pub fn with_addresses(config: &SystemConfig, addresses: SystemAddresses) -> Result<Self> {
        Ok(Self {
            system: GebSystem::deploy(config, addresses)?,
            block_height: 0,
            timestamp: 0,
            event_log: EventLog::new(),
            operations_executed: 0,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance the injected clock; neither height nor time may go backwards
    pub fn begin_block(&mut self, block_height: u64, timestamp: u64) -> Result<()> {
        if timestamp < self.timestamp {
            return Err(Error::ClockRegression {
                current: self.timestamp,
                requested: timestamp,
            });
        }
        if block_height < self.block_height {
            return Err(Error::InvalidParameter {
                name: "block_height".into(),
                reason: format!("{} is below current height {}", block_height, self.block_height),
            });
        }
        self.block_height = block_height;
        self.timestamp = timestamp;
        self.event_log.clear();
        debug!("block {} at {}", block_height, timestamp);
        Ok(())
    }

    /// Close the current block and hand out its events
    pub fn end_block(&mut self) -> EventLog {
        std::mem::take(&mut self.event_log)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply one operation atomically.
    ///
    /// On any error, including a ledger identity failing after the
    /// operation, the system is restored to its state before the call.
    pub fn execute(&mut self, operation: ProtocolOperation) -> Result<Receipt> {
        let checkpoint = self.system.clone();
        let mut emitter = Emitter::new(self.block_height, self.timestamp);

        let outcome = self
            .apply(&operation, &mut emitter)
            .and_then(|result| self.system.safe_engine.check_invariants().map(|_| result));

        match outcome {
            Ok(result) => {
                self.operations_executed += 1;
                self.event_log.extend(emitter.events.iter().cloned());
                Ok(Receipt {
                    operation: operation.operation_type().to_string(),
                    result,
                    events: emitter.events,
                    block_height: self.block_height,
                    timestamp: self.timestamp,
                })
            }
            Err(error) => {
                self.system = checkpoint;
                warn!(
                    "{} by {} reverted ({}): {}",
                    operation.operation_type(),
                    operation.caller().short(),
                    error.code(),
                    error
                );
                Err(error)
            }
        }
    }

    fn apply(&mut self, operation: &ProtocolOperation, out: &mut Emitter) -> Result<OperationResult> {
        let now = self.timestamp;
        let s = &mut self.system;

        match operation.clone() {
            // ─── Ledger ───
            ProtocolOperation::ModifyCollateralBalance {
                caller,
                collateral_type,
                account,
                delta,
            } => {
                s.safe_engine
                    .modify_collateral_balance(&caller, &collateral_type, account, delta)?;
                out.emit(EventKind::CollateralBalanceModified {
                    collateral_type,
                    account,
                    delta,
                });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::ApproveSafeModification { owner, delegate } => {
                s.safe_engine.approve_safe_modification(owner, delegate);
                out.emit(EventKind::SafeRightsChanged {
                    owner,
                    delegate,
                    granted: true,
                });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::DenySafeModification { owner, delegate } => {
                s.safe_engine.deny_safe_modification(owner, delegate);
                out.emit(EventKind::SafeRightsChanged {
                    owner,
                    delegate,
                    granted: false,
                });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::ModifySafeCollateralization { caller, modification } => {
                let collateral_type = modification.collateral_type.clone();
                let safe = modification.safe;
                let delta_collateral = modification.delta_collateral;
                let delta_debt = modification.delta_debt;
                s.safe_engine.modify_safe_collateralization(&caller, modification)?;
                out.emit(EventKind::SafeModified {
                    collateral_type: collateral_type.clone(),
                    safe,
                    delta_collateral,
                    delta_debt,
                });
                Ok(OperationResult::Safe(s.safe_engine.safe(&collateral_type, &safe)))
            }
            ProtocolOperation::TransferCollateral {
                caller,
                collateral_type,
                src,
                dst,
                amount,
            } => {
                s.safe_engine
                    .transfer_collateral(&caller, &collateral_type, src, dst, amount)?;
                out.emit(EventKind::CollateralTransferred {
                    collateral_type,
                    src,
                    dst,
                    amount,
                });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::TransferInternalCoins { caller, src, dst, amount } => {
                s.safe_engine.transfer_internal_coins(&caller, src, dst, amount)?;
                out.emit(EventKind::CoinsTransferred { src, dst, amount });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::UpdateAccumulatedRate {
                caller,
                collateral_type,
                rate_increase,
            } => {
                let surplus_destination = s.addresses.accounting_engine;
                s.safe_engine.update_accumulated_rate(
                    &caller,
                    &collateral_type,
                    surplus_destination,
                    rate_increase,
                )?;
                let accumulated_rate = s.safe_engine.collateral_type(&collateral_type)?.accumulated_rate;
                out.emit(EventKind::RateUpdated {
                    collateral_type,
                    accumulated_rate,
                });
                Ok(OperationResult::Price(accumulated_rate))
            }

            // ─── Oracle ───
            ProtocolOperation::UpdateCollateralPrice {
                caller,
                collateral_type,
                price,
            } => {
                let (safety_price, liquidation_price) = s.oracle_relayer.update_collateral_price(
                    &caller,
                    &mut s.safe_engine,
                    &collateral_type,
                    price,
                )?;
                out.emit(EventKind::PriceUpdated {
                    collateral_type,
                    price,
                    safety_price,
                    liquidation_price,
                });
                Ok(OperationResult::Prices {
                    safety_price,
                    liquidation_price,
                })
            }

            // ─── Protocol token ───
            ProtocolOperation::MintProtocolToken { caller, to, amount } => {
                s.protocol_token.mint(&caller, to, amount)?;
                out.emit(EventKind::ProtocolTokenMinted { to, amount });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::ApproveProtocolToken { owner, spender, amount } => {
                s.protocol_token.approve(owner, spender, amount);
                out.emit(EventKind::ProtocolTokenApproved { owner, spender, amount });
                Ok(OperationResult::Applied)
            }

            // ─── Liquidation and accounting ───
            ProtocolOperation::LiquidateSafe {
                collateral_type, safe, ..
            } => {
                let record = s.liquidation_engine.liquidate_safe(
                    &mut s.safe_engine,
                    &mut s.accounting_engine,
                    &collateral_type,
                    safe,
                    now,
                )?;
                out.emit(EventKind::SafeLiquidated(record.clone()));
                Ok(OperationResult::Liquidated(record))
            }
            ProtocolOperation::PopDebtFromQueue { queued_at, .. } => {
                let amount = s.accounting_engine.pop_debt_from_queue(queued_at, now)?;
                out.emit(EventKind::DebtPopped { queued_at, amount });
                Ok(OperationResult::Amount(amount.into_amount()))
            }
            ProtocolOperation::SettleDebt { amount, .. } => {
                s.accounting_engine.settle_debt(&mut s.safe_engine, amount)?;
                out.emit(EventKind::DebtSettled { amount });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::AuctionSurplus { .. } => {
                let attempt = s
                    .accounting_engine
                    .auction_surplus(&mut s.safe_engine, &mut s.surplus_house, now)?;
                emit_attempt(s, out, AuctionHouseId::Surplus, attempt);
                Ok(OperationResult::Auction(attempt))
            }
            ProtocolOperation::AuctionDebt { .. } => {
                let attempt = s
                    .accounting_engine
                    .auction_debt(&mut s.safe_engine, &mut s.debt_house, now)?;
                emit_attempt(s, out, AuctionHouseId::Debt, attempt);
                Ok(OperationResult::Auction(attempt))
            }
            ProtocolOperation::TransferPostSettlementSurplus { .. } => {
                let amount = s
                    .accounting_engine
                    .transfer_post_settlement_surplus(&mut s.safe_engine, now)?;
                out.emit(EventKind::PostSettlementSurplusTransferred { amount });
                Ok(OperationResult::Amount(amount.into_amount()))
            }

            // ─── Auctions ───
            ProtocolOperation::IncreaseBidSize {
                bidder,
                house,
                id,
                amount_to_sell,
                bid,
            } => {
                let mut ledger = SurplusLedger {
                    safe_engine: &mut s.safe_engine,
                    token: &mut s.protocol_token,
                };
                let record = match house {
                    AuctionHouseId::Surplus => BidSnapshot::from_bid(
                        house,
                        &s.surplus_house
                            .increase_bid_size(&mut ledger, bidder, id, amount_to_sell, bid, now)?,
                    ),
                    AuctionHouseId::PostSettlementSurplus => BidSnapshot::from_bid(
                        house,
                        &s.post_settlement_house
                            .increase_bid_size(&mut ledger, bidder, id, amount_to_sell, bid, now)?,
                    ),
                    AuctionHouseId::Debt => {
                        return Err(Error::InvalidParameter {
                            name: "house".into(),
                            reason: "debt auctions take decrease_sold_amount".into(),
                        })
                    }
                };
                out.emit(bid_placed(bidder, &record));
                Ok(OperationResult::Bid(record))
            }
            ProtocolOperation::DecreaseSoldAmount {
                bidder,
                id,
                amount_to_sell,
                bid,
            } => {
                let mut ledger = DebtLedger {
                    safe_engine: &mut s.safe_engine,
                    token: &mut s.protocol_token,
                    accounting_engine: &mut s.accounting_engine,
                };
                let record = s
                    .debt_house
                    .decrease_sold_amount(&mut ledger, bidder, id, amount_to_sell, bid, now)?;
                let record = BidSnapshot::from_bid(AuctionHouseId::Debt, &record);
                out.emit(bid_placed(bidder, &record));
                Ok(OperationResult::Bid(record))
            }
            ProtocolOperation::SettleAuction { house, id, .. } => {
                let record = match house {
                    AuctionHouseId::Surplus => {
                        let mut ledger = SurplusLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                        };
                        snapshot(house, s.surplus_house.settle_auction(&mut ledger, id, now)?)
                    }
                    AuctionHouseId::PostSettlementSurplus => {
                        let mut ledger = SurplusLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                        };
                        snapshot(house, s.post_settlement_house.settle_auction(&mut ledger, id, now)?)
                    }
                    AuctionHouseId::Debt => {
                        let mut ledger = DebtLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                            accounting_engine: &mut s.accounting_engine,
                        };
                        snapshot(house, s.debt_house.settle_auction(&mut ledger, id, now)?)
                    }
                };
                out.emit(EventKind::AuctionSettled {
                    house,
                    id,
                    winner: record.high_bidder,
                    bid: record.bid_amount,
                    amount_to_sell: record.amount_to_sell,
                });
                Ok(OperationResult::Bid(record))
            }
            ProtocolOperation::RestartAuction { house, id, .. } => {
                let record = match house {
                    AuctionHouseId::Surplus => snapshot(house, s.surplus_house.restart_auction(id, now)?),
                    AuctionHouseId::Debt => snapshot(house, s.debt_house.restart_auction(id, now)?),
                    AuctionHouseId::PostSettlementSurplus => {
                        snapshot(house, s.post_settlement_house.restart_auction(id, now)?)
                    }
                };
                out.emit(EventKind::AuctionRestarted {
                    house,
                    id,
                    auction_deadline: record.auction_deadline,
                });
                Ok(OperationResult::Bid(record))
            }
            ProtocolOperation::TerminateAuctionPrematurely { house, id, .. } => {
                let (record, originator) = match house {
                    AuctionHouseId::Surplus => {
                        let mut ledger = SurplusLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                        };
                        terminated(house, s.surplus_house.terminate_auction_prematurely(&mut ledger, id)?)
                    }
                    AuctionHouseId::PostSettlementSurplus => {
                        let mut ledger = SurplusLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                        };
                        terminated(
                            house,
                            s.post_settlement_house
                                .terminate_auction_prematurely(&mut ledger, id)?,
                        )
                    }
                    AuctionHouseId::Debt => {
                        let mut ledger = DebtLedger {
                            safe_engine: &mut s.safe_engine,
                            token: &mut s.protocol_token,
                            accounting_engine: &mut s.accounting_engine,
                        };
                        terminated(house, s.debt_house.terminate_auction_prematurely(&mut ledger, id)?)
                    }
                };
                out.emit(EventKind::AuctionTerminated {
                    house,
                    id,
                    refunded_bidder: record.high_bidder,
                    refunded_bid: record.bid_amount,
                    lot_returned: record.amount_to_sell,
                });
                debug!("auction {} of {} returned to {}", id, house.as_str(), originator.short());
                Ok(OperationResult::Bid(record))
            }

            // ─── Shutdown ───
            ProtocolOperation::TriggerShutdown { caller } => {
                let (esm, token, global_settlement, cascade) = s.cascade();
                let staked = esm.trigger_threshold();
                esm.trigger(&caller, token, global_settlement, cascade, now)?;
                out.emit(EventKind::ShutdownTriggered { caller, staked });
                Ok(OperationResult::Applied)
            }
            ProtocolOperation::FreezeCollateralType { collateral_type, .. } => {
                let final_price = s.global_settlement.freeze_collateral_type(
                    &s.safe_engine,
                    &s.oracle_relayer,
                    &collateral_type,
                )?;
                out.emit(EventKind::CollateralTypeFrozen {
                    collateral_type,
                    final_coin_per_collateral_price: final_price,
                });
                Ok(OperationResult::Price(final_price))
            }
            ProtocolOperation::ProcessSafe {
                collateral_type, safe, ..
            } => {
                let accounting_engine = s.addresses.accounting_engine;
                let outcome = s.global_settlement.process_safe(
                    &mut s.safe_engine,
                    accounting_engine,
                    &collateral_type,
                    safe,
                )?;
                out.emit(EventKind::SafeProcessed {
                    collateral_type,
                    safe,
                    outcome,
                });
                Ok(OperationResult::SafeProcessed(outcome))
            }
            ProtocolOperation::FreeCollateral { caller, collateral_type } => {
                let accounting_engine = s.addresses.accounting_engine;
                let amount = s.global_settlement.free_collateral(
                    &caller,
                    &mut s.safe_engine,
                    accounting_engine,
                    &collateral_type,
                )?;
                out.emit(EventKind::CollateralFreed {
                    collateral_type,
                    owner: caller,
                    amount,
                });
                Ok(OperationResult::Amount(amount.into_amount()))
            }
            ProtocolOperation::SetOutstandingCoinSupply { .. } => {
                let supply = s.global_settlement.set_outstanding_coin_supply(
                    &s.safe_engine,
                    &s.accounting_engine,
                    &s.surplus_house,
                    &s.debt_house,
                    now,
                )?;
                out.emit(EventKind::OutstandingCoinSupplySet { supply });
                Ok(OperationResult::Amount(supply.into_amount()))
            }
            ProtocolOperation::CalculateCashPrice { collateral_type, .. } => {
                let cash_price = s.global_settlement.calculate_cash_price(&collateral_type)?;
                out.emit(EventKind::CashPriceCalculated {
                    collateral_type,
                    cash_price,
                });
                Ok(OperationResult::Price(cash_price))
            }
            ProtocolOperation::PrepareCoinsForRedeeming { caller, amount } => {
                let accounting_engine = s.addresses.accounting_engine;
                let bag = s.global_settlement.prepare_coins_for_redeeming(
                    &caller,
                    &mut s.safe_engine,
                    accounting_engine,
                    amount,
                )?;
                out.emit(EventKind::CoinsPrepared {
                    owner: caller,
                    amount,
                    bag,
                });
                Ok(OperationResult::Amount(bag.into_amount()))
            }
            ProtocolOperation::RedeemCollateral { caller, collateral_type } => {
                let collateral = s
                    .global_settlement
                    .redeem_collateral(&caller, &mut s.safe_engine, &collateral_type)?;
                out.emit(EventKind::CollateralRedeemed {
                    collateral_type,
                    owner: caller,
                    collateral,
                });
                Ok(OperationResult::Amount(collateral.into_amount()))
            }
            ProtocolOperation::AuctionPostSettlementSurplus { .. } => {
                let attempt = s.surplus_auctioneer.auction_surplus(
                    &mut s.safe_engine,
                    &s.accounting_engine,
                    &mut s.post_settlement_house,
                    now,
                )?;
                emit_attempt(s, out, AuctionHouseId::PostSettlementSurplus, attempt);
                Ok(OperationResult::Auction(attempt))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READ ACCESS
    // ═══════════════════════════════════════════════════════════════════════════

    /// All components, as last committed
    pub fn system(&self) -> &GebSystem {
        &self.system
    }

    /// Module addresses
    pub fn addresses(&self) -> &SystemAddresses {
        &self.system.addresses
    }

    /// Central ledger
    pub fn safe_engine(&self) -> &SafeEngine {
        &self.system.safe_engine
    }

    /// Accounting engine
    pub fn accounting_engine(&self) -> &AccountingEngine {
        &self.system.accounting_engine
    }

    /// Global settlement
    pub fn global_settlement(&self) -> &GlobalSettlement {
        &self.system.global_settlement
    }

    /// Governance token
    pub fn protocol_token(&self) -> &ProtocolToken {
        &self.system.protocol_token
    }

    /// Bid record of any auction
    pub fn auction(&self, house: AuctionHouseId, id: u64) -> Option<BidSnapshot> {
        self.system.auction_snapshot(house, id)
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Events of the current block
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Committed operations since deployment
    pub fn operations_executed(&self) -> u64 {
        self.operations_executed
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Encode the committed state
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            block_height: self.block_height,
            timestamp: self.timestamp,
            operations_executed: self.operations_executed,
            system: self.system.clone(),
        };
        bincode::serialize(&snapshot).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore a committed state
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot =
            bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
        snapshot.system.safe_engine.check_invariants()?;
        Ok(Self {
            system: snapshot.system,
            block_height: snapshot.block_height,
            timestamp: snapshot.timestamp,
            event_log: EventLog::new(),
            operations_executed: snapshot.operations_executed,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

struct Emitter {
    block_height: u64,
    timestamp: u64,
    events: Vec<ProtocolEvent>,
}

impl Emitter {
    fn new(block_height: u64, timestamp: u64) -> Self {
        Self {
            block_height,
            timestamp,
            events: Vec::new(),
        }
    }

    fn emit(&mut self, kind: EventKind) {
        self.events
            .push(ProtocolEvent::new(self.block_height, self.timestamp, kind));
    }
}

fn snapshot<K: AuctionKind>(house: AuctionHouseId, bid: Bid<K>) -> BidSnapshot {
    BidSnapshot::from_bid(house, &bid)
}

/// Snapshot of a terminated auction; the refunded party is the originator when nobody bid
fn terminated<K: AuctionKind>(house: AuctionHouseId, bid: Bid<K>) -> (BidSnapshot, Address) {
    let originator = bid.originator;
    let mut record = BidSnapshot::from_bid(house, &bid);
    if !bid.has_bids() {
        record.high_bidder = originator;
    }
    (record, originator)
}

fn bid_placed(bidder: Address, record: &BidSnapshot) -> EventKind {
    EventKind::BidPlaced {
        house: record.house,
        id: record.id,
        bidder,
        bid: record.bid_amount,
        amount_to_sell: record.amount_to_sell,
        bid_expiry: record.bid_expiry,
    }
}

fn emit_attempt(system: &GebSystem, out: &mut Emitter, house: AuctionHouseId, attempt: AuctionAttempt) {
    match attempt {
        AuctionAttempt::Started(id) => {
            if let Some(record) = system.auction_snapshot(house, id) {
                out.emit(EventKind::AuctionStarted {
                    house,
                    id,
                    amount_to_sell: record.amount_to_sell,
                    initial_bid: record.bid_amount,
                });
            }
        }
        AuctionAttempt::Skipped(reason) => out.emit(EventKind::AuctionSkipped { house, reason }),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::safe_engine::SafeModification;
    use crate::utils::address::CollateralTypeId;
    use crate::utils::math::{Delta, Wad};

    fn eth() -> CollateralTypeId {
        CollateralTypeId::new("ETH-A")
    }

    fn machine() -> ProtocolStateMachine {
        let mut machine = ProtocolStateMachine::new(&SystemConfig::default()).unwrap();
        machine.begin_block(1, 1_000).unwrap();
        machine
    }

    fn open_safe(machine: &mut ProtocolStateMachine, owner: Address, collateral: u64, debt: u64) {
        let gov = machine.addresses().governance;
        machine
            .execute(ProtocolOperation::ModifyCollateralBalance {
                caller: gov,
                collateral_type: eth(),
                account: owner,
                delta: Delta::Increase(Wad::from_integer(collateral)),
            })
            .unwrap();
        machine
            .execute(ProtocolOperation::ModifySafeCollateralization {
                caller: owner,
                modification: SafeModification {
                    collateral_type: eth(),
                    safe: owner,
                    collateral_source: owner,
                    debt_destination: owner,
                    delta_collateral: Delta::Increase(Wad::from_integer(collateral)),
                    delta_debt: Delta::Increase(Wad::from_integer(debt)),
                },
            })
            .unwrap();
    }

    #[test]
    fn test_deployment_wiring() {
        let machine = machine();
        let addresses = *machine.addresses();
        let system = machine.system();

        assert!(system.safe_engine.authority().is_authorized(&addresses.global_settlement));
        assert!(system.safe_engine.authority().is_authorized(&addresses.liquidation_engine));
        assert!(system.accounting_engine.authority().is_authorized(&addresses.global_settlement));
        assert!(system.surplus_house.authority().is_authorized(&addresses.accounting_engine));
        assert!(system.global_settlement.authority().is_authorized(&addresses.esm));
        assert_eq!(
            system.accounting_engine.post_settlement_surplus_drain(),
            Some(addresses.surplus_auctioneer)
        );
        assert!(system.safe_engine.collateral_type(&eth()).is_ok());
    }

    #[test]
    fn test_clock_regression_rejected() {
        let mut machine = machine();
        assert!(matches!(
            machine.begin_block(2, 999),
            Err(Error::ClockRegression { current: 1_000, requested: 999 })
        ));
        machine.begin_block(2, 1_000).unwrap();
    }

    #[test]
    fn test_failed_operation_leaves_no_trace() {
        let mut machine = machine();
        let gov = machine.addresses().governance;
        let alice = Address::derive("alice");
        machine
            .execute(ProtocolOperation::UpdateCollateralPrice {
                caller: gov,
                collateral_type: eth(),
                price: Wad::from_integer(200),
            })
            .unwrap();
        open_safe(&mut machine, alice, 10, 1_000);

        let before = machine.to_bytes().unwrap();
        let executed = machine.operations_executed();
        let events = machine.event_log().len();

        // more coins than alice owns
        let result = machine.execute(ProtocolOperation::TransferInternalCoins {
            caller: alice,
            src: alice,
            dst: gov,
            amount: Rad::from_integer(5_000),
        });
        assert!(result.is_err());
        assert_eq!(machine.to_bytes().unwrap(), before);
        assert_eq!(machine.operations_executed(), executed);
        assert_eq!(machine.event_log().len(), events);
    }

    #[test]
    fn test_receipt_carries_events() {
        let mut machine = machine();
        let gov = machine.addresses().governance;
        let receipt = machine
            .execute(ProtocolOperation::UpdateCollateralPrice {
                caller: gov,
                collateral_type: eth(),
                price: Wad::from_integer(150),
            })
            .unwrap();

        assert_eq!(receipt.operation, "update_collateral_price");
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].event_type(), "price_updated");
        assert_eq!(receipt.block_height, 1);
        assert_eq!(receipt.timestamp, 1_000);
        match receipt.result {
            OperationResult::Prices {
                safety_price,
                liquidation_price,
            } => {
                // 150 / 1.5
                assert_eq!(safety_price, Ray::from_integer(100));
                assert!(liquidation_price > safety_price);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(machine.end_block().len(), 1);
        assert!(machine.event_log().is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_state() {
        let mut machine = machine();
        let gov = machine.addresses().governance;
        let alice = Address::derive("alice");
        machine
            .execute(ProtocolOperation::UpdateCollateralPrice {
                caller: gov,
                collateral_type: eth(),
                price: Wad::from_integer(200),
            })
            .unwrap();
        open_safe(&mut machine, alice, 10, 500);

        let restored = ProtocolStateMachine::from_bytes(&machine.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.timestamp(), machine.timestamp());
        assert_eq!(restored.safe_engine().safe(&eth(), &alice), machine.safe_engine().safe(&eth(), &alice));
        assert_eq!(restored.safe_engine().global_debt(), Rad::from_integer(500));
    }

    #[test]
    fn test_debt_house_rejects_increase_bid() {
        let mut machine = machine();
        let result = machine.execute(ProtocolOperation::IncreaseBidSize {
            bidder: Address::derive("alice"),
            house: AuctionHouseId::Debt,
            id: 1,
            amount_to_sell: Rad::from_integer(1),
            bid: Wad::from_integer(1),
        });
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }
}
