//! Carousel markets: queued deposits, relayer mints and rollovers across
//! consecutive epochs.

mod common;

use carousel_backend::protocol::{
    bps_of, mul_div_down, mul_div_up, Address, Amount, AuthContext, ProtocolError, ProtocolEvent,
    WAD,
};
use common::{ether, World, DEPOSIT_FEE_BPS, RELAYER_FEE};
use proptest::prelude::*;

#[test]
fn test_queued_deposits_roll_into_next_epoch() {
    let world = World::new();
    let market = world.carousel_market();
    let (first, _, first_end) = world.epoch(&market, 1, 3);
    let (second, _, _) = world.epoch(&market, 5, 8);
    let relayer = AuthContext::new(Address::derive("relayer"));

    let hedger = world.user("hedger", &market, ether(2));
    let alice = world.user("alice", &market, ether(10));
    let bob = world.user("bob", &market, ether(10));

    // Deposits wait in the queue until a relayer mints them.
    world
        .protocol
        .deposit(&hedger, market.premium, first, ether(2), hedger.caller)
        .unwrap();
    for user in [&alice, &bob] {
        let receipt = world
            .protocol
            .deposit(user, market.collateral, first, ether(10), user.caller)
            .unwrap();
        assert_eq!(receipt.shares_minted, 0);
        assert!(receipt.queue_seq.is_some());
    }
    assert_eq!(world.protocol.get_deposit_queue_length(market.collateral).unwrap(), 2);
    assert_eq!(world.protocol.balance_of(market.collateral, alice.caller, first).unwrap(), 0);
    assert_eq!(
        world
            .protocol
            .get_epoch_deposit_fee(market.collateral, first, ether(10))
            .unwrap(),
        (ether(10) / 200, ether(10) - ether(10) / 200)
    );

    world
        .protocol
        .mint_deposit_in_queue(&relayer, market.premium, first, 1)
        .unwrap();
    let minted = world
        .protocol
        .mint_deposit_in_queue(&relayer, market.collateral, first, 2)
        .unwrap();
    assert_eq!(minted.minted.len(), 2);
    assert_eq!(minted.remaining, 0);
    let shares = ether(10) - ether(10) / 200;
    assert_eq!(world.protocol.balance_of(market.collateral, alice.caller, first).unwrap(), shares);
    assert_eq!(world.weth(world.treasury), ether(22) / 200);
    assert_eq!(world.weth(relayer.caller), 0);

    // Both sellers ask to roll 8 of their shares.
    for user in [&alice, &bob] {
        world
            .protocol
            .enlist_in_rollover(user, market.collateral, first, ether(8), user.caller)
            .unwrap();
    }
    assert_eq!(world.protocol.get_rollover_queue_length(market.collateral).unwrap(), 2);
    assert_eq!(world.protocol.get_rollover_index(market.collateral, bob.caller).unwrap(), 1);

    world.clock.advance_to(first_end);
    let tvl = world.protocol.trigger_end_epoch(market.market_id, first).unwrap();
    let premium_fee = tvl.premium_final / 200;
    assert_eq!(tvl.collateral_final, 2 * shares);
    assert_eq!(tvl.collateral_claim, 2 * shares + tvl.premium_final - premium_fee);

    // Enlisted shares cannot be withdrawn; the rest can.
    assert_eq!(
        world
            .protocol
            .withdraw(&alice, market.collateral, first, shares, alice.caller, alice.caller)
            .unwrap_err(),
        ProtocolError::AlreadyRollingOver
    );
    let spare = shares - ether(8);
    let receipt = world
        .protocol
        .withdraw(&alice, market.collateral, first, spare, alice.caller, alice.caller)
        .unwrap();
    assert_eq!(
        receipt.assets,
        mul_div_down(spare, tvl.collateral_claim, tvl.collateral_final).unwrap()
    );

    let rolled = world
        .protocol
        .mint_rollovers(&relayer, market.collateral, second, 2)
        .unwrap();
    assert_eq!(rolled.executions.len(), 2);
    assert_eq!(rolled.relayer_fees, 2 * RELAYER_FEE);
    assert_eq!(world.weth(relayer.caller), 2 * RELAYER_FEE);
    assert_eq!(world.protocol.rollover_accounting(market.collateral, second).unwrap(), 2);

    let burned = mul_div_up(ether(8), tvl.collateral_final, tvl.collateral_claim).unwrap();
    for user in [&alice, &bob] {
        assert_eq!(
            world.protocol.balance_of(market.collateral, user.caller, second).unwrap(),
            ether(8) - RELAYER_FEE
        );
    }
    assert_eq!(
        world.protocol.balance_of(market.collateral, bob.caller, first).unwrap(),
        shares - burned
    );
    assert_eq!(
        world.protocol.balance_of(market.collateral, alice.caller, first).unwrap(),
        ether(8) - burned
    );

    // The queue is exhausted for this epoch.
    assert!(matches!(
        world.protocol.mint_rollovers(&relayer, market.collateral, second, 1),
        Err(ProtocolError::InvalidCount { .. })
    ));

    // Delisting leaves a tombstone until an admin cleans it up.
    world.protocol.delist_in_rollover(&bob, market.collateral, bob.caller).unwrap();
    assert_eq!(world.protocol.get_rollover_queue_length(market.collateral).unwrap(), 2);
    assert!(!world
        .protocol
        .is_enlisted_in_rollover_queue(market.collateral, bob.caller)
        .unwrap());
    assert!(world
        .protocol
        .is_enlisted_in_rollover_queue(market.collateral, alice.caller)
        .unwrap());
    // The tombstone keeps its slot.
    assert_eq!(world.protocol.get_rollover_index(market.collateral, bob.caller).unwrap(), 1);

    let removed = world
        .protocol
        .cleanup_rollover_queue(&world.owner, market.collateral, &[bob.caller, alice.caller])
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(world.protocol.get_rollover_queue_length(market.collateral).unwrap(), 1);
    assert_eq!(world.protocol.get_rollover_index(market.collateral, alice.caller).unwrap(), 0);
    assert!(matches!(
        world.protocol.get_rollover_index(market.collateral, bob.caller),
        Err(ProtocolError::NotEnlisted(_))
    ));
}

#[test]
fn test_rollover_waits_for_previous_epoch() {
    let world = World::new();
    let market = world.carousel_market();
    let (first, _, _) = world.epoch(&market, 1, 3);
    let (second, _, _) = world.epoch(&market, 5, 8);
    let relayer = AuthContext::new(Address::derive("relayer"));
    let alice = world.user("alice", &market, ether(5));
    world
        .protocol
        .deposit(&alice, market.collateral, first, ether(5), alice.caller)
        .unwrap();
    world
        .protocol
        .mint_deposit_in_queue(&relayer, market.collateral, first, 1)
        .unwrap();
    world
        .protocol
        .enlist_in_rollover(&alice, market.collateral, first, ether(2), alice.caller)
        .unwrap();

    assert_eq!(
        world
            .protocol
            .mint_rollovers(&relayer, market.collateral, second, 1)
            .unwrap_err(),
        ProtocolError::EpochNotResolved
    );
    assert!(matches!(
        world.protocol.mint_rollovers(&relayer, market.collateral, first, 1),
        Err(ProtocolError::InvalidEpochId { .. })
    ));
    assert_eq!(world.protocol.rollover_accounting(market.collateral, second).unwrap(), 0);
}

#[test]
fn test_queue_minimums_and_events() {
    let world = World::new();
    let market = world.carousel_market();
    let (epoch, _, _) = world.epoch(&market, 1, 3);
    let relayer = AuthContext::new(Address::derive("relayer"));
    let alice = world.user("alice", &market, ether(5));

    assert!(matches!(
        world
            .protocol
            .deposit(&alice, market.premium, epoch, ether(1) / 2, alice.caller),
        Err(ProtocolError::InvalidAmount { .. })
    ));
    world
        .protocol
        .deposit(&alice, market.premium, epoch, ether(3), alice.caller)
        .unwrap();
    assert_eq!(
        world.protocol.get_deposit_queue_length_for(market.premium, epoch).unwrap(),
        1
    );
    world
        .protocol
        .mint_deposit_in_queue(&relayer, market.premium, epoch, 1)
        .unwrap();
    assert!(matches!(
        world
            .protocol
            .enlist_in_rollover(&alice, market.premium, epoch, ether(1) / 2, alice.caller),
        Err(ProtocolError::InvalidAmount { .. })
    ));

    let kinds: Vec<&str> = world
        .protocol
        .recent_events(3)
        .iter()
        .map(|r| r.event.kind())
        .collect();
    assert_eq!(kinds, vec!["DepositInQueue", "Deposit", "RelayerMinted"]);
    let last = world.protocol.recent_events(1).remove(0);
    assert!(matches!(
        last.event,
        ProtocolEvent::RelayerMinted { operations: 1, deposit_fees, .. } if deposit_fees == ether(3) / 200
    ));
}

#[test]
fn test_long_queues_drain_in_small_batches() {
    const SELLERS: usize = 40;
    let world = World::new();
    let market = world.carousel_market();
    let (first, _, first_end) = world.epoch(&market, 1, 3);
    let (second, _, _) = world.epoch(&market, 5, 8);
    let relayer = AuthContext::new(Address::derive("relayer"));

    let hedger = world.user("hedger", &market, ether(4));
    world
        .protocol
        .deposit(&hedger, market.premium, first, ether(4), hedger.caller)
        .unwrap();
    world
        .protocol
        .mint_deposit_in_queue(&relayer, market.premium, first, 1)
        .unwrap();

    let sellers: Vec<AuthContext> = (0..SELLERS)
        .map(|i| world.user(&format!("seller-{i}"), &market, ether(2)))
        .collect();
    for seller in &sellers {
        world
            .protocol
            .deposit(seller, market.collateral, first, ether(2), seller.caller)
            .unwrap();
    }

    let mut minted = 0;
    while minted < SELLERS {
        let count = 3usize.min(SELLERS - minted);
        let receipt = world
            .protocol
            .mint_deposit_in_queue(&relayer, market.collateral, first, count)
            .unwrap();
        minted += count;
        assert_eq!(receipt.remaining, SELLERS - minted);
        assert_eq!(
            world
                .protocol
                .get_deposit_queue_length_for(market.collateral, first)
                .unwrap(),
            SELLERS - minted
        );
        // FIFO: the batch ends with the latest depositor minted so far.
        assert_eq!(receipt.minted.last().unwrap().depositor, sellers[minted - 1].caller);
    }

    let shares = ether(2) - bps_of(ether(2), DEPOSIT_FEE_BPS);
    for seller in &sellers {
        world
            .protocol
            .enlist_in_rollover(seller, market.collateral, first, shares, seller.caller)
            .unwrap();
    }
    world.clock.advance_to(first_end);
    world.protocol.trigger_end_epoch(market.market_id, first).unwrap();

    let mut executed = 0;
    while executed < SELLERS {
        let count = 7usize.min(SELLERS - executed);
        let receipt = world
            .protocol
            .mint_rollovers(&relayer, market.collateral, second, count)
            .unwrap();
        executed += count;
        assert_eq!(receipt.executions.len(), count);
        assert_eq!(receipt.cursor, executed);
        assert_eq!(
            world.protocol.rollover_accounting(market.collateral, second).unwrap(),
            executed
        );
    }

    assert_eq!(world.weth(relayer.caller), SELLERS as Amount * RELAYER_FEE);
    for seller in &sellers {
        assert_eq!(
            world.protocol.balance_of(market.collateral, seller.caller, second).unwrap(),
            shares - RELAYER_FEE
        );
    }
    assert_eq!(
        world.protocol.total_assets(market.collateral, second).unwrap(),
        SELLERS as Amount * (shares - RELAYER_FEE)
    );
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

    /// After the queue is drained, shares equal deposits less deposit fees,
    /// the fees sit with the treasury and the vault holds exactly the rest.
    #[test]
    fn queued_deposits_conserve_value(
        amounts in proptest::collection::vec(WAD..50 * WAD, 1..20),
        batches in proptest::collection::vec(1usize..6, 1..12),
    ) {
        let world = World::new();
        let market = world.carousel_market();
        let (epoch, _, _) = world.epoch(&market, 1, 3);
        let relayer = AuthContext::new(Address::derive("relayer"));

        let mut depositors = Vec::with_capacity(amounts.len());
        for (i, amount) in amounts.iter().enumerate() {
            let user = world.user(&format!("depositor-{i}"), &market, *amount);
            world
                .protocol
                .deposit(&user, market.collateral, epoch, *amount, user.caller)
                .unwrap();
            depositors.push(user.caller);
        }

        for batch in batches {
            let pending = world
                .protocol
                .get_deposit_queue_length_for(market.collateral, epoch)
                .unwrap();
            world
                .protocol
                .mint_deposit_in_queue(&relayer, market.collateral, epoch, batch.min(pending))
                .unwrap();
        }
        let pending = world
            .protocol
            .get_deposit_queue_length_for(market.collateral, epoch)
            .unwrap();
        world
            .protocol
            .mint_deposit_in_queue(&relayer, market.collateral, epoch, pending)
            .unwrap();

        let deposited: Amount = amounts.iter().sum();
        let fees: Amount = amounts.iter().map(|a| bps_of(*a, DEPOSIT_FEE_BPS)).sum();
        let shares: Amount = depositors
            .iter()
            .map(|d| world.protocol.balance_of(market.collateral, *d, epoch).unwrap())
            .sum();

        prop_assert_eq!(world.protocol.get_deposit_queue_length(market.collateral).unwrap(), 0);
        prop_assert_eq!(shares, deposited - fees);
        prop_assert_eq!(world.protocol.total_assets(market.collateral, epoch).unwrap(), shares);
        prop_assert_eq!(world.weth(world.treasury), fees);
        prop_assert_eq!(world.weth(market.collateral), shares);
    }
}
