//! GEB shutdown simulation
//!
//! Deploys a system from configuration, runs a deterministic lifecycle from
//! normal operation through emergency shutdown to redemption, and prints a
//! JSON summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use geb_core::prelude::*;

const HOUR: u64 = 60 * 60;

/// Deterministic GEB lifecycle simulation
#[derive(Parser)]
#[command(name = "geb-sim")]
#[command(version = geb_core::VERSION)]
#[command(about = "Run a deterministic shutdown simulation of the GEB ledger", long_about = None)]
struct Cli {
    /// Path to a JSON system configuration; defaults plus GEB_* overrides when absent
    #[arg(short, long, env = "GEB_CONFIG")]
    config: Option<PathBuf>,

    /// Collateral type used by the scenario (must exist in the configuration)
    #[arg(long, default_value = "ETH-A")]
    collateral: String,

    /// Unix timestamp of the first block
    #[arg(long, default_value_t = 1_700_000_000)]
    start_time: u64,

    /// Pretty-print the summary
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Summary {
    protocol: &'static str,
    version: &'static str,
    collateral_type: String,
    shutdown_time: Option<u64>,
    final_coin_per_collateral_price: String,
    collateral_total_debt: String,
    collateral_shortfall: String,
    outstanding_coin_supply: Option<String>,
    cash_price: String,
    redeemed_collateral: String,
    freed_collateral: String,
    post_settlement_auction: Option<u64>,
    operations: u64,
    events: usize,
    event_digest: String,
}

struct Sim {
    machine: ProtocolStateMachine,
    height: u64,
    now: u64,
    events: EventLog,
}

impl Sim {
    fn advance(&mut self, seconds: u64) -> Result<()> {
        self.events.merge(self.machine.end_block());
        self.height += 1;
        self.now += seconds;
        self.machine.begin_block(self.height, self.now)?;
        Ok(())
    }

    fn run(&mut self, operation: ProtocolOperation) -> Result<OperationResult> {
        let name = operation.operation_type();
        let receipt = self
            .machine
            .execute(operation)
            .with_context(|| format!("{} failed", name))?;
        Ok(receipt.result)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SystemConfig> {
    match path {
        Some(path) => SystemConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(SystemConfig::from_env()),
    }
}

fn wad(value: u64) -> Wad {
    Wad::from_integer(value)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let machine = ProtocolStateMachine::new(&config).context("deploying system")?;
    let addresses = *machine.addresses();
    let collateral = CollateralTypeId::new(cli.collateral.clone());
    machine
        .safe_engine()
        .collateral_type(&collateral)
        .with_context(|| format!("collateral type {} is not configured", collateral))?;

    let mut sim = Sim {
        machine,
        height: 1,
        now: cli.start_time,
        events: EventLog::new(),
    };
    sim.machine.begin_block(sim.height, sim.now)?;

    let gov = addresses.governance;
    let alice = Address::derive("sim.alice");
    let bob = Address::derive("sim.bob");
    let erin = Address::derive("sim.erin");
    let carol = Address::derive("sim.carol");
    let dave = Address::derive("sim.dave");

    // ─── Normal operation ───
    info!("opening safes");
    sim.run(ProtocolOperation::UpdateCollateralPrice {
        caller: gov,
        collateral_type: collateral.clone(),
        price: wad(220),
    })?;
    for (owner, locked, debt) in [(alice, 10, 1_000), (bob, 10, 500), (erin, 5, 0)] {
        sim.run(ProtocolOperation::ModifyCollateralBalance {
            caller: gov,
            collateral_type: collateral.clone(),
            account: owner,
            delta: Delta::Increase(wad(locked)),
        })?;
        sim.run(ProtocolOperation::ModifySafeCollateralization {
            caller: owner,
            modification: SafeModification {
                collateral_type: collateral.clone(),
                safe: owner,
                collateral_source: owner,
                debt_destination: owner,
                delta_collateral: Delta::Increase(wad(locked)),
                delta_debt: Delta::Increase(wad(debt)),
            },
        })?;
    }
    sim.run(ProtocolOperation::UpdateAccumulatedRate {
        caller: gov,
        collateral_type: collateral.clone(),
        rate_increase: Ray::from_decimal("0.1".parse()?)?,
    })?;

    info!("auctioning surplus");
    let surplus_id = sim
        .run(ProtocolOperation::AuctionSurplus { caller: gov })?
        .auction_id();
    for (holder, amount, spender) in [
        (carol, 500, addresses.surplus_house),
        (dave, 100, addresses.esm),
    ] {
        sim.run(ProtocolOperation::MintProtocolToken {
            caller: gov,
            to: holder,
            amount: wad(amount),
        })?;
        sim.run(ProtocolOperation::ApproveProtocolToken {
            owner: holder,
            spender,
            amount: wad(amount),
        })?;
    }
    if let Some(id) = surplus_id {
        let lot = config.build_accounting_params()?.surplus_auction_amount_to_sell;
        sim.run(ProtocolOperation::IncreaseBidSize {
            bidder: carol,
            house: AuctionHouseId::Surplus,
            id,
            amount_to_sell: lot,
            bid: wad(10),
        })?;
    }

    // ─── Shutdown ───
    sim.advance(HOUR / 2)?;
    info!("triggering emergency shutdown");
    sim.run(ProtocolOperation::TriggerShutdown { caller: dave })?;
    if let Some(id) = surplus_id {
        sim.run(ProtocolOperation::TerminateAuctionPrematurely {
            caller: carol,
            house: AuctionHouseId::Surplus,
            id,
        })?;
    }
    sim.run(ProtocolOperation::FreezeCollateralType {
        caller: gov,
        collateral_type: collateral.clone(),
    })?;
    let owners = sim.machine.safe_engine().safe_owners(&collateral);
    for owner in owners {
        sim.run(ProtocolOperation::ProcessSafe {
            caller: gov,
            collateral_type: collateral.clone(),
            safe: owner,
        })?;
    }
    let freed = sim
        .run(ProtocolOperation::FreeCollateral {
            caller: erin,
            collateral_type: collateral.clone(),
        })?
        .amount();

    sim.advance(config.accounting.disable_cooldown)?;
    sim.run(ProtocolOperation::TransferPostSettlementSurplus { caller: gov })?;

    sim.advance(config.settlement.shutdown_cooldown)?;
    sim.run(ProtocolOperation::SetOutstandingCoinSupply { caller: gov })?;
    sim.run(ProtocolOperation::CalculateCashPrice {
        caller: gov,
        collateral_type: collateral.clone(),
    })?;

    info!("redeeming coins");
    let coins = sim.machine.safe_engine().coin_balance(&alice).to_wad();
    sim.run(ProtocolOperation::PrepareCoinsForRedeeming {
        caller: alice,
        amount: coins,
    })?;
    let redeemed = sim
        .run(ProtocolOperation::RedeemCollateral {
            caller: alice,
            collateral_type: collateral.clone(),
        })?
        .amount();

    let post_settlement = sim
        .run(ProtocolOperation::AuctionPostSettlementSurplus { caller: gov })?
        .auction_id();
    sim.events.merge(sim.machine.end_block());

    let settlement = sim.machine.global_settlement();
    let summary = Summary {
        protocol: geb_core::PROTOCOL_NAME,
        version: geb_core::VERSION,
        collateral_type: collateral.to_string(),
        shutdown_time: settlement.shutdown_time(),
        final_coin_per_collateral_price: settlement.final_coin_per_collateral_price(&collateral).to_string(),
        collateral_total_debt: settlement.collateral_total_debt(&collateral).to_string(),
        collateral_shortfall: settlement.collateral_shortfall(&collateral).to_string(),
        outstanding_coin_supply: settlement.outstanding_coin_supply().map(|s| s.to_string()),
        cash_price: settlement.collateral_cash_price(&collateral).to_string(),
        redeemed_collateral: redeemed.map(|a| a.to_string()).unwrap_or_default(),
        freed_collateral: freed.map(|a| a.to_string()).unwrap_or_default(),
        post_settlement_auction: post_settlement,
        operations: sim.machine.operations_executed(),
        events: sim.events.len(),
        event_digest: hex::encode(sim.events.digest()),
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{}", output);
    Ok(())
}
