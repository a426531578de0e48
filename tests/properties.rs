//! Property tests for ledger identities and settlement arithmetic.

use ethereum_types::U256;
use geb_core::prelude::*;
use proptest::prelude::*;

const START: u64 = 1_700_000_000;

fn eth() -> CollateralTypeId {
    CollateralTypeId::new("ETH-A")
}

fn wad(value: u64) -> Wad {
    Wad::from_integer(value)
}

fn deployed(price: u64) -> (ProtocolStateMachine, Address) {
    let mut machine = ProtocolStateMachine::new(&SystemConfig::default()).unwrap();
    machine.begin_block(1, START).unwrap();
    let gov = machine.addresses().governance;
    machine
        .execute(ProtocolOperation::UpdateCollateralPrice {
            caller: gov,
            collateral_type: eth(),
            price: wad(price),
        })
        .unwrap();
    (machine, gov)
}

#[derive(Debug, Clone)]
enum Step {
    Deposit { who: usize, amount: u64 },
    Draw { who: usize, collateral: u64, debt: u64 },
    Repay { who: usize, debt: u64 },
    Withdraw { who: usize, collateral: u64 },
    Transfer { from: usize, to: usize, coins: u64 },
    Accrue { basis_points: u64 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..3usize, 1..50u64).prop_map(|(who, amount)| Step::Deposit { who, amount }),
        (0..3usize, 0..20u64, 0..3_000u64)
            .prop_map(|(who, collateral, debt)| Step::Draw { who, collateral, debt }),
        (0..3usize, 1..1_000u64).prop_map(|(who, debt)| Step::Repay { who, debt }),
        (0..3usize, 1..20u64).prop_map(|(who, collateral)| Step::Withdraw { who, collateral }),
        (0..3usize, 0..3usize, 1..500u64).prop_map(|(from, to, coins)| Step::Transfer { from, to, coins }),
        (1..500u64).prop_map(|basis_points| Step::Accrue { basis_points }),
    ]
}

fn operation(step: &Step, users: &[Address], gov: Address) -> ProtocolOperation {
    let modify = |who: usize, collateral: Delta<Wad>, debt: Delta<Wad>| {
        ProtocolOperation::ModifySafeCollateralization {
            caller: users[who],
            modification: SafeModification {
                collateral_type: eth(),
                safe: users[who],
                collateral_source: users[who],
                debt_destination: users[who],
                delta_collateral: collateral,
                delta_debt: debt,
            },
        }
    };
    match *step {
        Step::Deposit { who, amount } => ProtocolOperation::ModifyCollateralBalance {
            caller: gov,
            collateral_type: eth(),
            account: users[who],
            delta: Delta::Increase(wad(amount)),
        },
        Step::Draw { who, collateral, debt } => modify(
            who,
            Delta::Increase(wad(collateral)),
            Delta::Increase(wad(debt)),
        ),
        Step::Repay { who, debt } => modify(who, Delta::zero(), Delta::Decrease(wad(debt))),
        Step::Withdraw { who, collateral } => {
            modify(who, Delta::Decrease(wad(collateral)), Delta::zero())
        }
        Step::Transfer { from, to, coins } => ProtocolOperation::TransferInternalCoins {
            caller: users[from],
            src: users[from],
            dst: users[to],
            amount: Rad::from_integer(coins),
        },
        Step::Accrue { basis_points } => ProtocolOperation::UpdateAccumulatedRate {
            caller: gov,
            collateral_type: eth(),
            rate_increase: Ray::from_raw(
                Ray::ONE.raw() * U256::from(basis_points)
                    / U256::from(10_000u64),
            ),
        },
    }
}

fn raw(amount: Amount) -> U256 {
    match amount {
        Amount::Wad(v) => v.raw(),
        Amount::Ray(v) => v.raw(),
        Amount::Rad(v) => v.raw(),
    }
}

fn open_safe(machine: &mut ProtocolStateMachine, gov: Address, owner: Address, locked: u64, debt: u64) {
    machine
        .execute(ProtocolOperation::ModifyCollateralBalance {
            caller: gov,
            collateral_type: eth(),
            account: owner,
            delta: Delta::Increase(wad(locked)),
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
                delta_collateral: Delta::Increase(wad(locked)),
                delta_debt: Delta::Increase(wad(debt)),
            },
        })
        .unwrap();
}

/// Surplus auction 1 selling 100 coins, with two funded bidders
fn surplus_auction() -> (ProtocolStateMachine, [Address; 2]) {
    let (mut machine, gov) = deployed(220);
    open_safe(&mut machine, gov, Address::derive("alice"), 10, 1_000);
    machine
        .execute(ProtocolOperation::UpdateAccumulatedRate {
            caller: gov,
            collateral_type: eth(),
            rate_increase: "0.2".parse().unwrap(),
        })
        .unwrap();
    machine.execute(ProtocolOperation::AuctionSurplus { caller: gov }).unwrap();

    let house = machine.addresses().surplus_house;
    let bidders = [Address::derive("carol"), Address::derive("dave")];
    for bidder in bidders {
        machine
            .execute(ProtocolOperation::MintProtocolToken { caller: gov, to: bidder, amount: wad(10_000) })
            .unwrap();
        machine
            .execute(ProtocolOperation::ApproveProtocolToken { owner: bidder, spender: house, amount: wad(10_000) })
            .unwrap();
    }
    (machine, bidders)
}

/// Debt auction 1 minting 1000 tokens for 100 coins, with a funded bidder
fn debt_auction() -> (ProtocolStateMachine, Address) {
    let (mut machine, gov) = deployed(220);
    let alice = Address::derive("alice");
    let bob = Address::derive("bob");
    open_safe(&mut machine, gov, alice, 10, 1_000);
    open_safe(&mut machine, gov, bob, 10, 500);
    machine
        .execute(ProtocolOperation::UpdateCollateralPrice { caller: gov, collateral_type: eth(), price: wad(100) })
        .unwrap();
    machine
        .execute(ProtocolOperation::LiquidateSafe { caller: bob, collateral_type: eth(), safe: alice })
        .unwrap();

    machine.begin_block(2, START + 3_600).unwrap();
    machine
        .execute(ProtocolOperation::PopDebtFromQueue { caller: gov, queued_at: START })
        .unwrap();
    machine.execute(ProtocolOperation::AuctionDebt { caller: gov }).unwrap();
    let house = machine.addresses().debt_house;
    machine
        .execute(ProtocolOperation::ApproveSafeModification { owner: bob, delegate: house })
        .unwrap();
    (machine, bob)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_identities_hold_after_any_sequence(steps in prop::collection::vec(step(), 1..40)) {
        let (mut machine, gov) = deployed(200);
        let users = [
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        ];

        for step in &steps {
            let before = machine.to_bytes().unwrap();
            if machine.execute(operation(step, &users, gov)).is_err() {
                prop_assert_eq!(machine.to_bytes().unwrap(), before);
            }
            prop_assert!(machine.safe_engine().check_invariants().is_ok());
        }

        let engine = machine.safe_engine();
        let kind = engine.collateral_type(&eth()).unwrap();
        let mut normalized = Wad::ZERO;
        for owner in engine.safe_owners(&eth()) {
            normalized = normalized.safe_add(engine.safe(&eth(), &owner).generated_debt).unwrap();
        }
        prop_assert_eq!(normalized, kind.debt_amount);
    }

    #[test]
    fn process_safe_is_idempotent(
        locked in 1..100u64,
        debt_fraction in 0..100u64,
        price in 50..5_000u64,
        basis_points in 0..2_000u64,
    ) {
        let (mut machine, gov) = deployed(price);
        let alice = Address::derive("alice");
        let debt = locked * price * debt_fraction / 200;

        machine.execute(ProtocolOperation::ModifyCollateralBalance {
            caller: gov,
            collateral_type: eth(),
            account: alice,
            delta: Delta::Increase(wad(locked)),
        }).unwrap();
        machine.execute(ProtocolOperation::ModifySafeCollateralization {
            caller: alice,
            modification: SafeModification {
                collateral_type: eth(),
                safe: alice,
                collateral_source: alice,
                debt_destination: alice,
                delta_collateral: Delta::Increase(wad(locked)),
                delta_debt: Delta::Increase(wad(debt)),
            },
        }).unwrap();
        if basis_points > 0 {
            machine.execute(ProtocolOperation::UpdateAccumulatedRate {
                caller: gov,
                collateral_type: eth(),
                rate_increase: Ray::from_raw(
                    Ray::ONE.raw() * U256::from(basis_points)
                        / U256::from(10_000u64),
                ),
            }).unwrap();
        }

        let dave = Address::derive("dave");
        let esm = machine.addresses().esm;
        machine.execute(ProtocolOperation::MintProtocolToken { caller: gov, to: dave, amount: wad(100) }).unwrap();
        machine.execute(ProtocolOperation::ApproveProtocolToken { owner: dave, spender: esm, amount: wad(100) }).unwrap();
        machine.execute(ProtocolOperation::TriggerShutdown { caller: dave }).unwrap();
        machine.execute(ProtocolOperation::FreezeCollateralType { caller: gov, collateral_type: eth() }).unwrap();

        let process = ProtocolOperation::ProcessSafe { caller: gov, collateral_type: eth(), safe: alice };
        let first = match machine.execute(process.clone()).unwrap().result {
            OperationResult::SafeProcessed(processed) => processed,
            other => panic!("unexpected result {:?}", other),
        };
        prop_assert_eq!(first.seized, first.owed.min(wad(locked)));
        prop_assert_eq!(first.shortfall, first.owed.safe_sub(first.seized).unwrap());
        prop_assert_eq!(machine.safe_engine().safe(&eth(), &alice).generated_debt, Wad::ZERO);

        let shortfall = machine.global_settlement().collateral_shortfall(&eth());
        let second = match machine.execute(process).unwrap().result {
            OperationResult::SafeProcessed(processed) => processed,
            other => panic!("unexpected result {:?}", other),
        };
        prop_assert!(second.owed.is_zero() && second.seized.is_zero());
        prop_assert_eq!(machine.global_settlement().collateral_shortfall(&eth()), shortfall);
    }

    #[test]
    fn esm_triggers_exactly_at_threshold(stake in 0u128..200_000_000_000_000_000_000u128) {
        let (mut machine, gov) = deployed(200);
        let dave = Address::derive("dave");
        let esm = machine.addresses().esm;
        let amount = Wad::from_raw_u128(stake);

        if !amount.is_zero() {
            machine.execute(ProtocolOperation::MintProtocolToken { caller: gov, to: dave, amount }).unwrap();
        }
        machine.execute(ProtocolOperation::ApproveProtocolToken { owner: dave, spender: esm, amount }).unwrap();
        let result = machine.execute(ProtocolOperation::TriggerShutdown { caller: dave });

        prop_assert_eq!(result.is_ok(), amount >= wad(100));
        prop_assert_eq!(machine.global_settlement().shutdown_time().is_some(), amount >= wad(100));
    }

    #[test]
    fn rmul_is_monotonic(a in 0u64..1_000_000, b in 0u64..1_000_000, rate in 1u64..100_000) {
        let (low, high) = (wad(a.min(b)), wad(a.max(b)));
        let ray = Ray::from_raw(
            Ray::ONE.raw() * U256::from(rate) / U256::from(1_000u64),
        );
        prop_assert!(low.rmul(ray).unwrap() <= high.rmul(ray).unwrap());
        prop_assert!(
            Rad::from_product(low, ray).unwrap().to_wad() <= Rad::from_product(high, ray).unwrap().to_wad()
        );
    }

    #[test]
    fn conversions_round_trip_upward(raw_wad in any::<u128>()) {
        let w = Wad::from_raw_u128(raw_wad);
        prop_assert_eq!(w.to_ray().unwrap().to_wad(), w);
        prop_assert_eq!(w.to_rad().unwrap().to_wad(), w);
        let r = Ray::from_raw_u128(raw_wad);
        prop_assert_eq!(r.to_rad().unwrap().to_ray(), r);
    }

    #[test]
    fn rad_to_ray_truncates(raw_rad in any::<u128>(), scale in 0u32..30) {
        let rad = Rad::from_raw(U256::from(raw_rad) * U256::exp10(scale as usize));
        let back = rad.to_ray().to_rad().unwrap();
        prop_assert!(back <= rad);
        let exact = (rad.raw() % U256::exp10(18)).is_zero();
        prop_assert_eq!(back == rad, exact);
    }

    #[test]
    fn safes_stay_collateralized_without_accrual(
        steps in prop::collection::vec(
            step().prop_filter("no rate accrual", |s| !matches!(s, Step::Accrue { .. })),
            1..40,
        )
    ) {
        let (mut machine, gov) = deployed(200);
        let users = [
            Address::derive("alice"),
            Address::derive("bob"),
            Address::derive("carol"),
        ];

        for step in &steps {
            if machine.execute(operation(step, &users, gov)).is_err() {
                continue;
            }
            let engine = machine.safe_engine();
            let kind = engine.collateral_type(&eth()).unwrap();
            for owner in engine.safe_owners(&eth()) {
                let safe = engine.safe(&eth(), &owner);
                let backing = Rad::from_product(safe.locked_collateral, kind.safety_price).unwrap();
                let owed = Rad::from_product(safe.generated_debt, kind.accumulated_rate).unwrap();
                prop_assert!(backing >= owed, "{:?} undercollateralized after {:?}", owner, step);
            }
        }
    }

    #[test]
    fn surplus_bids_increase_by_minimum_step(bids in prop::collection::vec(1..2_000u64, 1..20)) {
        let (mut machine, bidders) = surplus_auction();

        for (i, bid) in bids.into_iter().enumerate() {
            let previous = raw(machine.auction(AuctionHouseId::Surplus, 1).unwrap().bid_amount);
            let offered = wad(bid).raw();
            let allowed = offered > previous && offered * 100 >= previous * 105;

            let result = machine.execute(ProtocolOperation::IncreaseBidSize {
                bidder: bidders[i % 2],
                house: AuctionHouseId::Surplus,
                id: 1,
                amount_to_sell: Rad::from_integer(100),
                bid: wad(bid),
            });
            prop_assert_eq!(result.is_ok(), allowed);

            let current = raw(machine.auction(AuctionHouseId::Surplus, 1).unwrap().bid_amount);
            prop_assert_eq!(current, if allowed { offered } else { previous });
        }
    }

    #[test]
    fn debt_lots_decrease_by_minimum_step(lots in prop::collection::vec(1..1_000u64, 1..20)) {
        let (mut machine, bob) = debt_auction();

        for lot in lots {
            let previous = raw(machine.auction(AuctionHouseId::Debt, 1).unwrap().amount_to_sell);
            let offered = wad(lot).raw();
            let allowed = offered < previous && offered * 105 <= previous * 100;

            let result = machine.execute(ProtocolOperation::DecreaseSoldAmount {
                bidder: bob,
                id: 1,
                amount_to_sell: wad(lot),
                bid: Rad::from_integer(100),
            });
            prop_assert_eq!(result.is_ok(), allowed);

            let current = raw(machine.auction(AuctionHouseId::Debt, 1).unwrap().amount_to_sell);
            prop_assert_eq!(current, if allowed { offered } else { previous });
        }
    }
}
