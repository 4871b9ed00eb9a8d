//! End-to-end staking flow: admission, time advancement, delegation
//! capacity, rewards, and historical validator-set reconstruction.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use platform_ledger::block::ProposalBlock;
use platform_ledger::codec::tx_bytes;
use platform_ledger::config::{Config, RewardParams};
use platform_ledger::crypto::addr_from_pubkey;
use platform_ledger::state::{ChainState, MemStore, StateView};
use platform_ledger::txs::{
    AddDelegatorTx, AddValidatorTx, AdvanceTimeTx, RewardValidatorTx, SignedTx, Tx, TxError,
};
use platform_ledger::types::{
    Address, Credential, NodeId, OutputOwners, TransferInput, TransferOutput, TxId, Utxo, UtxoId,
    PRIMARY_NETWORK_ID, STAKING_ASSET_ID,
};

const FEE: u64 = 10;

fn test_cfg() -> Config {
    Config {
        min_validator_stake: 2_000,
        min_delegator_stake: 25,
        min_stake_duration: 1,
        max_stake_duration: 1_000_000,
        max_validator_weight_factor: 5,
        max_stake_cap: None,
        max_future_start_window: 1_000_000,
        add_staker_tx_fee: FEE,
        create_subnet_tx_fee: 100,
        create_chain_tx_fee: 100,
        // 1.25x the formula's 10_000 * seconds-per-year denominator, so
        // potential_reward(w, d) = w * d * 5 / 4: (3000, 80) -> 300_000
        // and (2000, 90) -> 225_000
        reward: RewardParams { annual_rate_bps: 394_200_000_000 },
    }
}

fn keypair() -> (SigningKey, Address) {
    let sk = SigningKey::generate(&mut OsRng);
    let addr = addr_from_pubkey(&sk.verifying_key().to_bytes());
    (sk, addr)
}

fn fund(state: &mut ChainState, addr: Address, amount: u64, seed: u8) -> UtxoId {
    let id = UtxoId { tx_id: TxId([seed; 32]), output_index: 0 };
    state
        .add_genesis_utxo(Utxo {
            id,
            asset_id: STAKING_ASSET_ID,
            amount,
            owners: OutputOwners::single(addr),
        })
        .unwrap();
    id
}

fn sign(tx: Tx, keys: &[&SigningKey]) -> SignedTx {
    let msg = tx_bytes(&tx);
    let creds = keys
        .iter()
        .map(|sk| Credential {
            signatures: vec![(sk.verifying_key().to_bytes(), sk.sign(&msg).to_bytes())],
        })
        .collect();
    SignedTx::new(tx, creds)
}

fn input(utxo_id: UtxoId, amount: u64) -> TransferInput {
    TransferInput { utxo_id, amount, sig_indices: vec![0] }
}

fn stake_out(amount: u64, addr: Address) -> TransferOutput {
    TransferOutput { amount, owners: OutputOwners::single(addr) }
}

/// Verify and accept (commit branch) a block wrapping `stx`.
fn accept_block(cfg: &Config, state: &mut ChainState, stx: SignedTx) -> ProposalBlock {
    let mut block = ProposalBlock::new([state.height() as u8; 32], stx);
    block.verify(cfg, state, &[]).unwrap();
    block.accept(state).unwrap();
    block
}

fn expect_tx_error(cfg: &Config, state: &ChainState, stx: SignedTx) -> TxError {
    match platform_ledger::executor::execute(cfg, state, &stx) {
        Err(e) => e,
        Ok(_) => panic!("execution unexpectedly succeeded"),
    }
}

#[test]
fn full_lifecycle_with_rewards_and_history() {
    let cfg = test_cfg();
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let (val_key, val_addr) = keypair();
    let (del_key, del_addr) = keypair();
    let node = NodeId([0xAA; 20]);

    // --- admission ---
    let u1 = fund(&mut state, val_addr, 2_000 + FEE, 1);
    let add_validator = Tx::AddValidator(AddValidatorTx {
        node_id: node,
        start_time: 10,
        end_time: 100,
        weight: 2_000,
        shares: 500_000, // 50% delegation fee
        rewards_owner: OutputOwners::single(val_addr),
        ins: vec![input(u1, 2_000 + FEE)],
        outs: vec![],
        stake_outs: vec![stake_out(2_000, val_addr)],
    });
    let stx = sign(add_validator, &[&val_key]);
    let val_tx_id = stx.id();
    accept_block(&cfg, &mut state, stx);

    assert!(state.get_utxo(&u1).is_none(), "stake funding consumed");
    assert!(state.pending_stakers().validator(PRIMARY_NETWORK_ID, node).is_some());
    assert!(state.current_stakers().validator(PRIMARY_NETWORK_ID, node).is_none());

    // --- time advancement (scenario B) ---
    // proposing a time past the pending validator's start promotes it
    accept_block(&cfg, &mut state, sign(Tx::AdvanceTime(AdvanceTimeTx { time: 10 }), &[]));
    assert_eq!(state.timestamp(), 10);
    assert!(state.pending_stakers().is_empty());
    let v = state.current_stakers().validator(PRIMARY_NETWORK_ID, node).unwrap();
    assert_eq!(v.weight, 2_000);
    assert_eq!(state.validator_set(PRIMARY_NETWORK_ID).get(&node), Some(&2_000));

    // going backwards is invalid
    let err = expect_tx_error(&cfg, &state, sign(Tx::AdvanceTime(AdvanceTimeTx { time: 5 }), &[]));
    assert!(matches!(err, TxError::TimeNotMonotonic { .. }));
    // skipping past the validator's scheduled exit is invalid
    let err = expect_tx_error(&cfg, &state, sign(Tx::AdvanceTime(AdvanceTimeTx { time: 150 }), &[]));
    assert!(matches!(err, TxError::TimeBeyondNextChange { next_change: 100, .. }));

    // --- delegation (scenario A) ---
    let u2 = fund(&mut state, del_addr, 3_000 + FEE, 2);
    let add_d1 = Tx::AddDelegator(AddDelegatorTx {
        node_id: node,
        start_time: 20,
        end_time: 100,
        weight: 3_000,
        rewards_owner: OutputOwners::single(del_addr),
        ins: vec![input(u2, 3_000 + FEE)],
        outs: vec![],
        stake_outs: vec![stake_out(3_000, del_addr)],
    });
    let stx = sign(add_d1, &[&del_key]);
    let d1_tx_id = stx.id();
    accept_block(&cfg, &mut state, stx);

    // a second, heavier delegation overlapping the first must exceed
    // 5 * 2000: 2000 + 3000 + 6000 = 11000 > 10000
    let u3 = fund(&mut state, del_addr, 6_000 + FEE, 3);
    let add_d2 = Tx::AddDelegator(AddDelegatorTx {
        node_id: node,
        start_time: 30,
        end_time: 90,
        weight: 6_000,
        rewards_owner: OutputOwners::single(del_addr),
        ins: vec![input(u3, 6_000 + FEE)],
        outs: vec![],
        stake_outs: vec![stake_out(6_000, del_addr)],
    });
    assert_eq!(expect_tx_error(&cfg, &state, sign(add_d2, &[&del_key])), TxError::OverDelegated);

    // subset-interval boundaries: equal interval is allowed, one second
    // outside either end is not
    let u4 = fund(&mut state, del_addr, 100 + FEE, 4);
    let mut subset = AddDelegatorTx {
        node_id: node,
        start_time: 10,
        end_time: 100,
        weight: 100,
        rewards_owner: OutputOwners::single(del_addr),
        ins: vec![input(u4, 100 + FEE)],
        outs: vec![],
        stake_outs: vec![stake_out(100, del_addr)],
    };
    // [10,100) == validator interval; only fails because 10 <= chain time
    subset.start_time = 10;
    let err = expect_tx_error(&cfg, &state, sign(Tx::AddDelegator(subset.clone()), &[&del_key]));
    assert!(matches!(err, TxError::StartsTooSoon { .. }));
    subset.start_time = 11;
    subset.end_time = 101;
    let err = expect_tx_error(&cfg, &state, sign(Tx::AddDelegator(subset.clone()), &[&del_key]));
    assert_eq!(err, TxError::DelegatorSubset);
    subset.end_time = 100;
    assert!(platform_ledger::executor::execute(&cfg, &state, &sign(Tx::AddDelegator(subset), &[&del_key])).is_ok());

    // --- promotion of the delegator ---
    accept_block(&cfg, &mut state, sign(Tx::AdvanceTime(AdvanceTimeTx { time: 20 }), &[]));
    assert_eq!(state.validator_set(PRIMARY_NETWORK_ID).get(&node), Some(&5_000));

    // --- rewards (scenario D) ---
    // not due yet: chain time 20, delegator ends at 100
    let err = expect_tx_error(
        &cfg,
        &state,
        sign(Tx::RewardValidator(RewardValidatorTx { staker_tx_id: d1_tx_id }), &[]),
    );
    assert!(matches!(err, TxError::RewardNotDue { chain_time: 20, end_time: 100 }));

    accept_block(&cfg, &mut state, sign(Tx::AdvanceTime(AdvanceTimeTx { time: 100 }), &[]));

    // the delegator drains before the validator; rewarding the validator
    // first names the wrong staker
    let err = expect_tx_error(
        &cfg,
        &state,
        sign(Tx::RewardValidator(RewardValidatorTx { staker_tx_id: val_tx_id }), &[]),
    );
    assert!(matches!(err, TxError::WrongRewardedStaker { .. }));

    let stx = sign(Tx::RewardValidator(RewardValidatorTx { staker_tx_id: d1_tx_id }), &[]);
    let d1_reward_id = stx.id();
    accept_block(&cfg, &mut state, stx);

    // stake returned, reward split 50/50 per the validator's shares
    let returned = state.get_utxo(&UtxoId { tx_id: d1_reward_id, output_index: 0 }).unwrap();
    assert_eq!(returned.amount, 3_000);
    assert_eq!(returned.owners.addresses, vec![del_addr]);
    let del_cut = state.get_utxo(&UtxoId { tx_id: d1_reward_id, output_index: 1 }).unwrap();
    let val_cut = state.get_utxo(&UtxoId { tx_id: d1_reward_id, output_index: 2 }).unwrap();
    assert_eq!(del_cut.amount, 150_000);
    assert_eq!(del_cut.owners.addresses, vec![del_addr]);
    assert_eq!(val_cut.amount, 150_000);
    assert_eq!(val_cut.owners.addresses, vec![val_addr]);
    assert_eq!(state.validator_set(PRIMARY_NETWORK_ID).get(&node), Some(&2_000));

    let stx = sign(Tx::RewardValidator(RewardValidatorTx { staker_tx_id: val_tx_id }), &[]);
    let val_reward_id = stx.id();
    accept_block(&cfg, &mut state, stx);

    let returned = state.get_utxo(&UtxoId { tx_id: val_reward_id, output_index: 0 }).unwrap();
    assert_eq!(returned.amount, 2_000);
    // potential_reward(2000, 90) under the test rate
    let reward = state.get_utxo(&UtxoId { tx_id: val_reward_id, output_index: 1 }).unwrap();
    assert_eq!(reward.amount, 225_000);
    assert!(state.validator_set(PRIMARY_NETWORK_ID).is_empty());
    assert!(state.current_stakers().is_empty());

    // --- historical validator sets (weight-diff replay) ---
    // heights: 1 add-validator, 2 advance(10), 3 add-delegator,
    // 4 advance(20), 5 advance(100), 6 reward-delegator, 7 reward-validator
    assert_eq!(state.height(), 7);
    let at = |h: u64| state.validator_set_at(h, PRIMARY_NETWORK_ID).unwrap();
    assert!(at(7).is_empty());
    assert_eq!(at(6).get(&node), Some(&2_000));
    assert_eq!(at(5).get(&node), Some(&5_000));
    assert_eq!(at(4).get(&node), Some(&5_000));
    assert_eq!(at(3).get(&node), Some(&2_000));
    assert_eq!(at(2).get(&node), Some(&2_000));
    assert!(at(1).is_empty());
    assert!(at(0).is_empty());
}

#[test]
fn abort_refunds_stake_but_not_fee() {
    let cfg = test_cfg();
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let (sk, addr) = keypair();
    let node = NodeId([0xBB; 20]);

    let u1 = fund(&mut state, addr, 2_000 + FEE, 1);
    let stx = sign(
        Tx::AddValidator(AddValidatorTx {
            node_id: node,
            start_time: 10,
            end_time: 100,
            weight: 2_000,
            shares: 0,
            rewards_owner: OutputOwners::single(addr),
            ins: vec![input(u1, 2_000 + FEE)],
            outs: vec![],
            stake_outs: vec![stake_out(2_000, addr)],
        }),
        &[&sk],
    );
    let tx_id = stx.id();

    let mut block = ProposalBlock::new([0; 32], stx);
    block.verify(&cfg, &state, &[]).unwrap();
    block.accept_abort(&mut state).unwrap();

    assert!(state.get_utxo(&u1).is_none(), "inputs consumed on abort too");
    assert!(state.pending_stakers().is_empty(), "no staker admitted");
    let refund = state.get_utxo(&UtxoId { tx_id, output_index: 0 }).unwrap();
    assert_eq!(refund.amount, 2_000);
}

#[test]
fn duplicate_validator_rejected() {
    let cfg = test_cfg();
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let (sk, addr) = keypair();
    let node = NodeId([0xCC; 20]);

    let u1 = fund(&mut state, addr, 2_000 + FEE, 1);
    let build = |utxo: UtxoId, end: u64| {
        sign(
            Tx::AddValidator(AddValidatorTx {
                node_id: node,
                start_time: 10,
                end_time: end,
                weight: 2_000,
                shares: 0,
                rewards_owner: OutputOwners::single(addr),
                ins: vec![input(utxo, 2_000 + FEE)],
                outs: vec![],
                stake_outs: vec![stake_out(2_000, addr)],
            }),
            &[&sk],
        )
    };
    accept_block(&cfg, &mut state, build(u1, 100));

    let u2 = fund(&mut state, addr, 2_000 + FEE, 2);
    let err = expect_tx_error(&cfg, &state, build(u2, 200));
    assert!(matches!(err, TxError::DuplicateStaker { .. }));
}

#[test]
fn start_beyond_scheduling_window_rejected() {
    let cfg = Config { max_future_start_window: 50, ..test_cfg() };
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let (sk, addr) = keypair();
    let u1 = fund(&mut state, addr, 2_000 + FEE, 1);
    let build = |start: u64| {
        sign(
            Tx::AddValidator(AddValidatorTx {
                node_id: NodeId([0xEE; 20]),
                start_time: start,
                end_time: start + 100,
                weight: 2_000,
                shares: 0,
                rewards_owner: OutputOwners::single(addr),
                ins: vec![input(u1, 2_000 + FEE)],
                outs: vec![],
                stake_outs: vec![stake_out(2_000, addr)],
            }),
            &[&sk],
        )
    };

    let err = expect_tx_error(&cfg, &state, build(51));
    assert_eq!(err, TxError::StartsTooLate { start: 51, limit: 50 });
    // the bound is inclusive: scheduling exactly at the limit is fine
    assert!(platform_ledger::executor::execute(&cfg, &state, &build(50)).is_ok());
}

#[test]
fn absolute_cap_binds_below_the_factor_bound() {
    let cfg = Config { max_stake_cap: Some(4_000), ..test_cfg() };
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let (val_key, val_addr) = keypair();
    let (del_key, del_addr) = keypair();
    let node = NodeId([0xFE; 20]);

    let u1 = fund(&mut state, val_addr, 2_000 + FEE, 1);
    accept_block(
        &cfg,
        &mut state,
        sign(
            Tx::AddValidator(AddValidatorTx {
                node_id: node,
                start_time: 10,
                end_time: 100,
                weight: 2_000,
                shares: 0,
                rewards_owner: OutputOwners::single(val_addr),
                ins: vec![input(u1, 2_000 + FEE)],
                outs: vec![],
                stake_outs: vec![stake_out(2_000, val_addr)],
            }),
            &[&val_key],
        ),
    );

    let delegate = |utxo: UtxoId, weight: u64| {
        sign(
            Tx::AddDelegator(AddDelegatorTx {
                node_id: node,
                start_time: 20,
                end_time: 100,
                weight,
                rewards_owner: OutputOwners::single(del_addr),
                ins: vec![input(utxo, weight + FEE)],
                outs: vec![],
                stake_outs: vec![stake_out(weight, del_addr)],
            }),
            &[&del_key],
        )
    };

    // the factor bound alone would allow 5 * 2000; the cap rejects first
    let u2 = fund(&mut state, del_addr, 3_000 + FEE, 2);
    let err = expect_tx_error(&cfg, &state, delegate(u2, 3_000));
    assert_eq!(err, TxError::OverDelegated);

    // 2000 + 1500 stays under the cap
    let u3 = fund(&mut state, del_addr, 1_500 + FEE, 3);
    assert!(platform_ledger::executor::execute(&cfg, &state, &delegate(u3, 1_500)).is_ok());
}

#[test]
fn decision_is_single_use() {
    let cfg = test_cfg();
    let mut state = ChainState::new(Box::new(MemStore::default()), 0);
    let stx = sign(Tx::AdvanceTime(AdvanceTimeTx { time: 10 }), &[]);

    // accepting requires a prior verify
    let mut unverified = ProposalBlock::new([0; 32], stx.clone());
    // seed a staker change so AdvanceTime has something to promote toward
    let (sk, addr) = keypair();
    let u1 = fund(&mut state, addr, 2_000 + FEE, 1);
    accept_block(
        &cfg,
        &mut state,
        sign(
            Tx::AddValidator(AddValidatorTx {
                node_id: NodeId([0xDD; 20]),
                start_time: 10,
                end_time: 100,
                weight: 2_000,
                shares: 0,
                rewards_owner: OutputOwners::single(addr),
                ins: vec![input(u1, 2_000 + FEE)],
                outs: vec![],
                stake_outs: vec![stake_out(2_000, addr)],
            }),
            &[&sk],
        ),
    );
    assert!(unverified.accept(&mut state).is_err());

    let mut block = ProposalBlock::new([1; 32], stx);
    block.verify(&cfg, &state, &[]).unwrap();
    block.accept(&mut state).unwrap();
    assert!(block.accept(&mut state).is_err(), "second accept must fail");
    assert!(block.reject().is_err(), "reject after accept must fail");
}
