//! Factory tests: market and epoch registry, controller whitelist and the
//! time-locked setters.

use crate::protocol::access::AuthContext;
use crate::protocol::errors::ProtocolError;
use crate::protocol::events::ProtocolEvent;
use crate::protocol::ids;
use crate::protocol::test_support::{ether, Fixture, RELAYER_FEE, WITHDRAWAL_FEE_BPS};
use crate::protocol::types::{Address, VaultSide, SECONDS_PER_DAY, WAD};

#[test]
fn test_create_carousel_market_registers_vault_pair() {
    let fx = Fixture::new();
    let config = fx.carousel_config();
    let expected_id = fx
        .protocol
        .get_market_id(fx.token, config.market.strike, fx.weth);
    assert_eq!(fx.protocol.market_id_to_vaults(expected_id, 0).unwrap(), Address::ZERO);

    let created = fx.carousel_market();
    assert_eq!(created.market_id, expected_id);
    assert_eq!(created.premium, ids::vault_address(expected_id, VaultSide::Premium));
    assert_eq!(fx.protocol.market_id_to_vaults(expected_id, 0).unwrap(), created.premium);
    assert_eq!(fx.protocol.market_id_to_vaults(expected_id, 1).unwrap(), created.collateral);
    assert!(matches!(
        fx.protocol.market_id_to_vaults(expected_id, 2),
        Err(ProtocolError::InvalidVaultIndex { index: 2 })
    ));

    let info = fx.protocol.get_market_info(created.market_id).unwrap();
    assert!(info.carousel);
    assert_eq!(info.controller, fx.controller);
    assert!(info.epochs.is_empty());

    let vault = fx.protocol.vault(created.collateral).unwrap();
    assert!(vault.supports_queueing());
    assert_eq!(vault.side(), VaultSide::Collateral);
    assert_eq!(vault.carousel_params().unwrap().relayer_fee, RELAYER_FEE);

    let created_event = fx
        .protocol
        .recent_events(10)
        .into_iter()
        .rev()
        .find(|r| r.event.kind() == "MarketCreated")
        .unwrap();
    assert!(matches!(
        created_event.event,
        ProtocolEvent::MarketCreated { carousel: true, .. }
    ));
}

#[test]
fn test_duplicate_market_is_rejected() {
    let fx = Fixture::new();
    let created = fx.plain_market();
    let err = fx
        .protocol
        .create_new_market(&fx.owner, fx.market_config())
        .unwrap_err();
    assert_eq!(err, ProtocolError::MarketAlreadyExists(created.market_id));
    assert_eq!(fx.protocol.market_count(), 1);
}

#[test]
fn test_market_creation_validation() {
    let fx = Fixture::new();

    let stranger = AuthContext::new(Address::derive("stranger"));
    assert!(matches!(
        fx.protocol.create_new_market(&stranger, fx.market_config()),
        Err(ProtocolError::NotAuthorized { .. })
    ));

    let mut config = fx.market_config();
    config.oracle = Address::ZERO;
    assert!(matches!(
        fx.protocol.create_new_market(&fx.owner, config),
        Err(ProtocolError::AddressZero { field: "oracle" })
    ));

    let mut config = fx.market_config();
    config.underlying_asset = Address::derive("unregistered");
    assert!(matches!(
        fx.protocol.create_new_market(&fx.owner, config),
        Err(ProtocolError::UnknownToken(_))
    ));

    let mut config = fx.market_config();
    config.controller = Address::derive("rogue-controller");
    assert!(matches!(
        fx.protocol.create_new_market(&fx.owner, config),
        Err(ProtocolError::ControllerNotSet(_))
    ));

    let mut config = fx.carousel_config();
    config.deposit_fee_bps = 251;
    assert!(matches!(
        fx.protocol.create_new_carousel_market(&fx.owner, config),
        Err(ProtocolError::InvalidDepositFee { fee: 251, max: 250 })
    ));

    let mut config = fx.carousel_config();
    config.relayer_fee = 9_999;
    assert!(matches!(
        fx.protocol.create_new_carousel_market(&fx.owner, config),
        Err(ProtocolError::InvalidRelayerFee { .. })
    ));

    let mut config = fx.carousel_config();
    config.min_queue_deposit = config.relayer_fee;
    assert!(matches!(
        fx.protocol.create_new_carousel_market(&fx.owner, config),
        Err(ProtocolError::InvalidMinQueueDeposit { .. })
    ));

    assert_eq!(fx.protocol.market_count(), 0);
}

#[test]
fn test_create_epoch_appends_to_market_and_vaults() {
    let fx = Fixture::new();
    let market = fx.carousel_market();
    let (first, begin, end) = fx.epoch(&market, 5, 8);
    let (second, _, _) = fx.epoch(&market, 10, 11);

    assert_eq!(first, fx.protocol.get_epoch_id(market.market_id, begin, end));
    assert_eq!(
        fx.protocol.get_epochs_by_market_id(market.market_id).unwrap(),
        vec![first, second]
    );
    assert_eq!(fx.protocol.get_epoch_fee(first).unwrap(), WITHDRAWAL_FEE_BPS);
    for vault in [market.premium, market.collateral] {
        let config = fx.protocol.get_epoch_config(vault, first).unwrap();
        assert_eq!((config.begin, config.end), (begin, end));
        assert_eq!(fx.protocol.vault(vault).unwrap().latest_epoch(), Some(second));
    }

    let err = fx
        .protocol
        .create_epoch(&fx.owner, market.market_id, begin, end, WITHDRAWAL_FEE_BPS)
        .unwrap_err();
    assert_eq!(err, ProtocolError::EpochAlreadyExists(first));
}

#[test]
fn test_create_epoch_validation() {
    let fx = Fixture::new();
    let market = fx.plain_market();
    let now = fx.protocol.now();
    let (begin, end) = (now + SECONDS_PER_DAY, now + 3 * SECONDS_PER_DAY);

    let missing = fx.protocol.get_market_id(Address::derive("dai"), WAD, fx.weth);
    assert_eq!(
        fx.protocol.create_epoch(&fx.owner, missing, begin, end, 50).unwrap_err(),
        ProtocolError::MarketDoesNotExist(missing)
    );
    assert_eq!(
        fx.protocol.create_epoch(&fx.owner, market.market_id, begin, end, 0).unwrap_err(),
        ProtocolError::FeeCannotBe0
    );
    assert!(matches!(
        fx.protocol.create_epoch(&fx.owner, market.market_id, begin, end, 10_001),
        Err(ProtocolError::InvalidWithdrawalFee { .. })
    ));
    assert!(matches!(
        fx.protocol.create_epoch(&fx.owner, market.market_id, end, begin, 50),
        Err(ProtocolError::InvalidEpochWindow { .. })
    ));
    assert!(matches!(
        fx.protocol.create_epoch(&fx.owner, market.market_id, now - 1, end, 50),
        Err(ProtocolError::EpochBeginInPast { .. })
    ));
    assert!(fx.protocol.get_epochs_by_market_id(market.market_id).unwrap().is_empty());
}

#[test]
fn test_create_epoch_with_emissions_pulls_from_treasury() {
    let fx = Fixture::new();
    let market = fx.carousel_market();
    let now = fx.protocol.now();
    let treasury_before = fx.protocol.token_balance(fx.emissions, fx.treasury);

    let epoch = fx
        .protocol
        .create_epoch_with_emissions(
            &fx.owner,
            market.market_id,
            now + 5 * SECONDS_PER_DAY,
            now + 8 * SECONDS_PER_DAY,
            50,
            ether(1_000),
            ether(100),
        )
        .unwrap();

    assert_eq!(fx.protocol.emissions(market.premium, epoch).unwrap(), ether(1_000));
    assert_eq!(fx.protocol.emissions(market.collateral, epoch).unwrap(), ether(100));
    assert_eq!(fx.protocol.token_balance(fx.emissions, market.premium), ether(1_000));
    assert_eq!(
        fx.protocol.token_balance(fx.emissions, fx.treasury),
        treasury_before - ether(1_100)
    );
}

#[test]
fn test_create_epoch_with_emissions_reverts_without_allowance() {
    let fx = Fixture::new();
    let market = fx.plain_market();
    let treasury = AuthContext::new(fx.treasury);
    fx.protocol
        .approve(&treasury, fx.emissions, fx.protocol.factory_address(), ether(10))
        .unwrap();
    let now = fx.protocol.now();

    let err = fx
        .protocol
        .create_epoch_with_emissions(
            &fx.owner,
            market.market_id,
            now + SECONDS_PER_DAY,
            now + 2 * SECONDS_PER_DAY,
            50,
            ether(8),
            ether(8),
        )
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InsufficientAllowance { .. }));
    // The epoch was not created either.
    assert!(fx.protocol.get_epochs_by_market_id(market.market_id).unwrap().is_empty());
    assert_eq!(fx.protocol.token_balance(fx.emissions, market.premium), 0);
}

#[test]
fn test_whitelist_toggles_and_requires_admin() {
    let fx = Fixture::new();
    let second = fx.protocol.deploy_controller(&fx.owner, None).unwrap();
    assert_ne!(second, fx.controller);
    assert!(!fx.protocol.controllers(second));

    let stranger = AuthContext::new(Address::derive("stranger"));
    assert!(matches!(
        fx.protocol.whitelist_controller(&stranger, second),
        Err(ProtocolError::NotAuthorized { .. })
    ));
    assert!(fx.protocol.whitelist_controller(&fx.time_locker, second).unwrap());
    assert!(fx.protocol.controllers(second));
    assert!(!fx.protocol.whitelist_controller(&fx.owner, second).unwrap());
    assert!(!fx.protocol.controllers(second));

    assert!(matches!(
        fx.protocol.whitelist_controller(&fx.owner, Address::derive("never-deployed")),
        Err(ProtocolError::ControllerNotSet(_))
    ));
}

#[test]
fn test_change_controller_is_time_locked() {
    let fx = Fixture::new();
    let market = fx.carousel_market();
    let second = fx.protocol.deploy_controller(&fx.owner, None).unwrap();

    assert!(matches!(
        fx.protocol.change_controller(&fx.owner, market.market_id, second),
        Err(ProtocolError::NotTimeLocker { .. })
    ));
    assert!(matches!(
        fx.protocol.change_controller(&fx.time_locker, market.market_id, second),
        Err(ProtocolError::ControllerNotSet(_))
    ));

    fx.protocol.whitelist_controller(&fx.owner, second).unwrap();
    fx.protocol
        .change_controller(&fx.time_locker, market.market_id, second)
        .unwrap();
    assert_eq!(fx.protocol.get_market_info(market.market_id).unwrap().controller, second);
    assert_eq!(fx.protocol.vault(market.premium).unwrap().controller(), second);
    assert_eq!(fx.protocol.vault(market.collateral).unwrap().controller(), second);
}

#[test]
fn test_time_locked_setters() {
    let fx = Fixture::new();
    let market = fx.carousel_market();

    let new_treasury = Address::derive("new-treasury");
    assert!(matches!(
        fx.protocol.change_treasury(&fx.owner, new_treasury),
        Err(ProtocolError::NotTimeLocker { .. })
    ));
    fx.protocol.change_treasury(&fx.time_locker, new_treasury).unwrap();
    assert_eq!(fx.protocol.treasury(), new_treasury);

    let new_oracle = Address::derive("new-oracle");
    fx.protocol
        .change_oracle(&fx.time_locker, market.market_id, new_oracle)
        .unwrap();
    assert_eq!(fx.protocol.get_market_info(market.market_id).unwrap().oracle, new_oracle);

    assert!(matches!(
        fx.protocol.change_deposit_fee(&fx.time_locker, market.market_id, 2, 10),
        Err(ProtocolError::InvalidVaultIndex { index: 2 })
    ));
    assert!(matches!(
        fx.protocol.change_deposit_fee(&fx.time_locker, market.market_id, 0, 300),
        Err(ProtocolError::InvalidDepositFee { .. })
    ));
    fx.protocol
        .change_deposit_fee(&fx.time_locker, market.market_id, 1, 100)
        .unwrap();
    let collateral = fx.protocol.vault(market.collateral).unwrap();
    assert_eq!(collateral.carousel_params().unwrap().deposit_fee_bps, 100);
    let premium = fx.protocol.vault(market.premium).unwrap();
    assert_eq!(premium.carousel_params().unwrap().deposit_fee_bps, 50);

    assert!(matches!(
        fx.protocol.change_relayer_fee(&fx.time_locker, market.market_id, 1),
        Err(ProtocolError::InvalidRelayerFee { .. })
    ));
    fx.protocol
        .change_relayer_fee(&fx.time_locker, market.market_id, 3 * RELAYER_FEE)
        .unwrap();
    for vault in [market.premium, market.collateral] {
        let params = fx.protocol.vault(vault).unwrap().carousel_params().unwrap();
        assert_eq!(params.relayer_fee, 3 * RELAYER_FEE);
    }
}

#[test]
fn test_change_deposit_fee_refused_with_pending_deposits() {
    let fx = Fixture::new();
    let market = fx.carousel_market();
    let (epoch, _, _) = fx.epoch(&market, 5, 8);
    let alice = fx.user("alice", &market, ether(10));
    fx.protocol
        .deposit(&alice, market.premium, epoch, ether(2), alice.caller)
        .unwrap();

    assert_eq!(
        fx.protocol
            .change_deposit_fee(&fx.time_locker, market.market_id, 0, 10)
            .unwrap_err(),
        ProtocolError::QueueNotEmpty
    );
    // The other vault has no pending deposits.
    fx.protocol
        .change_deposit_fee(&fx.time_locker, market.market_id, 1, 10)
        .unwrap();
}
