// src/executor.rs

use tracing::debug;

use crate::config::{split_reward, Config};
use crate::crypto::verify_threshold;
use crate::stakers::{Staker, StakerKind};
use crate::state::{next_staker_change_time, Diff, StateError, StateView, VersionedState};
use crate::txs::{
    AddDelegatorTx, AddSubnetValidatorTx, AddValidatorTx, AdvanceTimeTx, CreateChainTx,
    CreateSubnetTx, RewardValidatorTx, SignedTx, Tx, TxError,
};
use crate::types::{ChainRecord, OutputOwners, Subnet, SubnetId, TransferOutput, TxId, PRIMARY_NETWORK_ID};
use crate::utxo::{consume, produce, sum_outputs, verify_spend};

/// The two independent branches produced by executing one transaction.
/// Whichever one consensus settles on is applied with a single
/// `Diff::apply`; the other is dropped.
#[derive(Debug)]
pub struct TxOutcome {
    pub on_commit: Diff,
    pub on_abort: Diff,
}

/// Run the state-transition rule for `stx` against `parent`. Pure: no
/// state outside the returned diffs is touched.
pub fn execute(cfg: &Config, parent: &dyn StateView, stx: &SignedTx) -> Result<TxOutcome, TxError> {
    stx.tx.verify_syntax(cfg)?;
    let outcome = match &stx.tx {
        Tx::AddValidator(t) => add_validator(cfg, parent, stx, t),
        Tx::AddSubnetValidator(t) => add_subnet_validator(cfg, parent, stx, t),
        Tx::AddDelegator(t) => add_delegator(cfg, parent, stx, t),
        Tx::AdvanceTime(t) => advance_time(parent, t),
        Tx::RewardValidator(t) => reward_validator(parent, stx, t),
        Tx::CreateSubnet(t) => create_subnet(cfg, parent, stx, t),
        Tx::CreateChain(t) => create_chain(cfg, parent, stx, t),
    }?;
    debug!(tx = %stx.id(), "executed staking tx");
    Ok(outcome)
}

/// Start-time window shared by every staker admission: strictly in the
/// future, not further out than the scheduling window allows.
fn check_start_window(cfg: &Config, now: u64, start: u64) -> Result<(), TxError> {
    if start <= now {
        return Err(TxError::StartsTooSoon { chain_time: now, start });
    }
    let limit = now.saturating_add(cfg.max_future_start_window);
    if start > limit {
        return Err(TxError::StartsTooLate { start, limit });
    }
    Ok(())
}

fn add_validator(
    cfg: &Config,
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &AddValidatorTx,
) -> Result<TxOutcome, TxError> {
    let now = parent.timestamp();
    check_start_window(cfg, now, t.start_time)?;

    if parent.current_stakers().validator(PRIMARY_NETWORK_ID, t.node_id).is_some()
        || parent.pending_stakers().validator(PRIMARY_NETWORK_ID, t.node_id).is_some()
    {
        return Err(TxError::DuplicateStaker {
            subnet_id: PRIMARY_NETWORK_ID,
            node_id: t.node_id,
        });
    }

    let msg = stx.signing_bytes();
    let change = sum_outputs(&t.outs)?;
    let produced = change.checked_add(t.weight).ok_or(TxError::Overflow)?;
    verify_spend(parent, &t.ins, &stx.creds, produced, cfg.add_staker_tx_fee, &msg)?;

    let staker = Staker {
        tx_id: stx.id(),
        node_id: t.node_id,
        subnet_id: PRIMARY_NETWORK_ID,
        start_time: t.start_time,
        end_time: t.end_time,
        weight: t.weight,
        potential_reward: cfg.reward.potential_reward(t.weight, t.end_time - t.start_time),
        rewards_owner: t.rewards_owner.clone(),
        stake: t.stake_outs.clone(),
        kind: StakerKind::Validator { shares: t.shares },
    };

    Ok(admit_staker(parent, stx, staker, &t.outs, &t.stake_outs))
}

fn add_subnet_validator(
    cfg: &Config,
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &AddSubnetValidatorTx,
) -> Result<TxOutcome, TxError> {
    let now = parent.timestamp();
    check_start_window(cfg, now, t.start_time)?;

    let subnet = parent
        .get_subnet(&t.subnet_id)
        .ok_or(TxError::UnknownSubnet(t.subnet_id))?;
    let msg = stx.signing_bytes();
    if !verify_threshold(&subnet.owner, &t.subnet_auth.sig_indices, &t.subnet_auth.cred, &msg) {
        return Err(TxError::BadSubnetAuth(t.subnet_id));
    }

    // The node must validate the primary network for at least the whole
    // subnet validation period.
    let primary = parent
        .current_stakers()
        .validator(PRIMARY_NETWORK_ID, t.node_id)
        .or_else(|| parent.pending_stakers().validator(PRIMARY_NETWORK_ID, t.node_id))
        .ok_or(TxError::ValidatorNotFound(t.node_id))?;
    if t.start_time < primary.start_time || t.end_time > primary.end_time {
        return Err(TxError::ValidatorSubset);
    }

    if parent.current_stakers().validator(t.subnet_id, t.node_id).is_some()
        || parent.pending_stakers().validator(t.subnet_id, t.node_id).is_some()
    {
        return Err(TxError::DuplicateStaker { subnet_id: t.subnet_id, node_id: t.node_id });
    }

    // Subnet weight is declarative, not token-funded: the spend covers
    // the fee only.
    let change = sum_outputs(&t.outs)?;
    verify_spend(parent, &t.ins, &stx.creds, change, cfg.add_staker_tx_fee, &msg)?;

    let staker = Staker {
        tx_id: stx.id(),
        node_id: t.node_id,
        subnet_id: t.subnet_id,
        start_time: t.start_time,
        end_time: t.end_time,
        weight: t.weight,
        potential_reward: 0,
        rewards_owner: OutputOwners { locktime: 0, threshold: 0, addresses: vec![] },
        stake: vec![],
        kind: StakerKind::Validator { shares: 0 },
    };

    Ok(admit_staker(parent, stx, staker, &t.outs, &[]))
}

fn add_delegator(
    cfg: &Config,
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &AddDelegatorTx,
) -> Result<TxOutcome, TxError> {
    let now = parent.timestamp();
    check_start_window(cfg, now, t.start_time)?;

    let current = parent.current_stakers();
    let pending = parent.pending_stakers();
    let (validator, validator_is_current) =
        match current.validator(PRIMARY_NETWORK_ID, t.node_id) {
            Some(v) => (v, true),
            None => (
                pending
                    .validator(PRIMARY_NETWORK_ID, t.node_id)
                    .ok_or(TxError::ValidatorNotFound(t.node_id))?,
                false,
            ),
        };

    if t.start_time < validator.start_time || t.end_time > validator.end_time {
        return Err(TxError::DelegatorSubset);
    }

    let factor_bound = cfg
        .max_validator_weight_factor
        .checked_mul(validator.weight)
        .unwrap_or(u64::MAX);
    let maximum_weight = match cfg.max_stake_cap {
        Some(cap) => factor_bound.min(cap),
        None => factor_bound,
    };

    let (current_delegators, current_stake) = if validator_is_current {
        let dels = current.delegators_of(t.node_id);
        let mut stake = validator.weight;
        let mut ends: Vec<(u64, u64)> = Vec::with_capacity(dels.len());
        for d in &dels {
            stake = stake.checked_add(d.weight).ok_or(TxError::Overflow)?;
            ends.push((d.end_time, d.weight));
        }
        (ends, stake)
    } else {
        (Vec::new(), validator.weight)
    };

    let pending_delegators: Vec<(u64, u64, u64)> = pending
        .delegators_of(t.node_id)
        .iter()
        .map(|d| (d.start_time, d.end_time, d.weight))
        .collect();

    let max_weight = crate::stakers::capacity::max_weight_over_window(
        current_stake,
        &current_delegators,
        &pending_delegators,
        t.start_time,
        t.end_time,
    )
    .ok_or(TxError::Overflow)?;
    let total = max_weight.checked_add(t.weight).ok_or(TxError::Overflow)?;
    if total > maximum_weight {
        return Err(TxError::OverDelegated);
    }

    let msg = stx.signing_bytes();
    let change = sum_outputs(&t.outs)?;
    let produced = change.checked_add(t.weight).ok_or(TxError::Overflow)?;
    verify_spend(parent, &t.ins, &stx.creds, produced, cfg.add_staker_tx_fee, &msg)?;

    let staker = Staker {
        tx_id: stx.id(),
        node_id: t.node_id,
        subnet_id: PRIMARY_NETWORK_ID,
        start_time: t.start_time,
        end_time: t.end_time,
        weight: t.weight,
        potential_reward: cfg.reward.potential_reward(t.weight, t.end_time - t.start_time),
        rewards_owner: t.rewards_owner.clone(),
        stake: t.stake_outs.clone(),
        kind: StakerKind::Delegator,
    };

    Ok(admit_staker(parent, stx, staker, &t.outs, &t.stake_outs))
}

/// Build the commit/abort pair of a staker admission: commit consumes the
/// inputs, produces the change, and queues the staker; abort consumes the
/// inputs and produces change plus the refunded stake (the fee is paid
/// either way).
fn admit_staker(
    parent: &dyn StateView,
    stx: &SignedTx,
    staker: Staker,
    outs: &[TransferOutput],
    stake_outs: &[TransferOutput],
) -> TxOutcome {
    let tx_id = stx.id();
    let ins = stx.tx.inputs();

    let mut commit = VersionedState::new(parent);
    consume(&mut commit, ins);
    produce(&mut commit, tx_id, 0, outs);
    commit.set_pending_stakers(parent.pending_stakers().with_staker(staker));

    let mut abort = VersionedState::new(parent);
    consume(&mut abort, ins);
    let next = produce(&mut abort, tx_id, 0, outs);
    produce(&mut abort, tx_id, next, stake_outs);

    TxOutcome { on_commit: commit.into_diff(), on_abort: abort.into_diff() }
}

fn advance_time(parent: &dyn StateView, t: &AdvanceTimeTx) -> Result<TxOutcome, TxError> {
    let now = parent.timestamp();
    if t.time <= now {
        return Err(TxError::TimeNotMonotonic { chain_time: now, proposed: t.time });
    }
    if let Some(next_change) = next_staker_change_time(parent) {
        if t.time > next_change {
            return Err(TxError::TimeBeyondNextChange {
                proposed: t.time,
                next_change,
            });
        }
    }

    let mut commit = VersionedState::new(parent);
    commit.set_timestamp(t.time);

    // Promote every pending staker whose start time has arrived, in start
    // order, recording the weight gain for historical set reconstruction.
    let mut current = parent.current_stakers().clone();
    let mut pending = parent.pending_stakers().clone();
    let mut promoted = 0usize;
    while let Some(next) = pending.next_to_start() {
        if next.start_time > t.time {
            break;
        }
        let (staker, rest) = match pending.without_next() {
            Some(x) => x,
            None => break,
        };
        pending = rest;
        commit.record_weight_change(staker.subnet_id, staker.node_id, staker.weight as i128);
        current = current.with_staker(staker);
        promoted += 1;
    }
    if promoted > 0 {
        commit.set_current_stakers(current);
        commit.set_pending_stakers(pending);
    }
    debug!(new_time = t.time, promoted, "advance time");

    // Aborting a time change leaves the state exactly as it was.
    let abort = VersionedState::new(parent);
    Ok(TxOutcome { on_commit: commit.into_diff(), on_abort: abort.into_diff() })
}

fn reward_validator(
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &RewardValidatorTx,
) -> Result<TxOutcome, TxError> {
    let now = parent.timestamp();
    let head = parent.current_stakers().next_to_expire();
    let head = match head {
        Some(h) => h,
        None => {
            return Err(TxError::WrongRewardedStaker { expected: None, got: t.staker_tx_id })
        }
    };
    if head.tx_id != t.staker_tx_id {
        return Err(TxError::WrongRewardedStaker {
            expected: Some(head.tx_id),
            got: t.staker_tx_id,
        });
    }
    if head.end_time != now {
        return Err(TxError::RewardNotDue { chain_time: now, end_time: head.end_time });
    }

    let (staker, remaining) = parent
        .current_stakers()
        .without_next()
        .ok_or(TxError::WrongRewardedStaker { expected: None, got: t.staker_tx_id })?;

    // Both branches retire the staker and return the stake; only the
    // commit branch mints rewards.
    let reward_tx_id = stx.id();

    let mut commit = VersionedState::new(parent);
    commit.set_current_stakers(remaining.clone());
    commit.record_weight_change(staker.subnet_id, staker.node_id, -(staker.weight as i128));
    let next = produce(&mut commit, reward_tx_id, 0, &staker.stake);
    mint_rewards(&mut commit, reward_tx_id, next, &staker, &remaining)?;

    let mut abort = VersionedState::new(parent);
    abort.set_current_stakers(remaining);
    abort.record_weight_change(staker.subnet_id, staker.node_id, -(staker.weight as i128));
    produce(&mut abort, reward_tx_id, 0, &staker.stake);

    Ok(TxOutcome { on_commit: commit.into_diff(), on_abort: abort.into_diff() })
}

fn mint_rewards(
    commit: &mut VersionedState<'_>,
    reward_tx_id: TxId,
    base_index: u32,
    staker: &Staker,
    remaining: &crate::stakers::CurrentStakers,
) -> Result<(), TxError> {
    if staker.potential_reward == 0 {
        return Ok(());
    }
    match staker.kind {
        StakerKind::Validator { .. } => {
            produce(
                commit,
                reward_tx_id,
                base_index,
                &[TransferOutput {
                    amount: staker.potential_reward,
                    owners: staker.rewards_owner.clone(),
                }],
            );
        }
        StakerKind::Delegator => {
            // Delegators drain before validators at equal end times, so
            // the target must still be present; a miss means the staker
            // sets lost the subset invariant.
            let validator = remaining
                .validator(PRIMARY_NETWORK_ID, staker.node_id)
                .ok_or(TxError::State(StateError::MissingStaker(staker.tx_id)))?;
            let shares = match validator.kind {
                StakerKind::Validator { shares } => shares,
                StakerKind::Delegator => 0,
            };
            let (delegator_cut, validator_cut) = split_reward(staker.potential_reward, shares);
            let mut outs = Vec::with_capacity(2);
            if delegator_cut > 0 {
                outs.push(TransferOutput {
                    amount: delegator_cut,
                    owners: staker.rewards_owner.clone(),
                });
            }
            if validator_cut > 0 {
                outs.push(TransferOutput {
                    amount: validator_cut,
                    owners: validator.rewards_owner.clone(),
                });
            }
            produce(commit, reward_tx_id, base_index, &outs);
        }
    }
    Ok(())
}

fn create_subnet(
    cfg: &Config,
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &CreateSubnetTx,
) -> Result<TxOutcome, TxError> {
    let msg = stx.signing_bytes();
    let change = sum_outputs(&t.outs)?;
    verify_spend(parent, &t.ins, &stx.creds, change, cfg.create_subnet_tx_fee, &msg)?;

    let tx_id = stx.id();
    let mut commit = VersionedState::new(parent);
    consume(&mut commit, &t.ins);
    produce(&mut commit, tx_id, 0, &t.outs);
    commit.add_subnet(Subnet { id: SubnetId(tx_id.0), owner: t.owner.clone() });

    let mut abort = VersionedState::new(parent);
    consume(&mut abort, &t.ins);
    produce(&mut abort, tx_id, 0, &t.outs);

    Ok(TxOutcome { on_commit: commit.into_diff(), on_abort: abort.into_diff() })
}

fn create_chain(
    cfg: &Config,
    parent: &dyn StateView,
    stx: &SignedTx,
    t: &CreateChainTx,
) -> Result<TxOutcome, TxError> {
    let subnet = parent
        .get_subnet(&t.subnet_id)
        .ok_or(TxError::UnknownSubnet(t.subnet_id))?;
    let msg = stx.signing_bytes();
    if !verify_threshold(&subnet.owner, &t.subnet_auth.sig_indices, &t.subnet_auth.cred, &msg) {
        return Err(TxError::BadSubnetAuth(t.subnet_id));
    }

    let change = sum_outputs(&t.outs)?;
    verify_spend(parent, &t.ins, &stx.creds, change, cfg.create_chain_tx_fee, &msg)?;

    let tx_id = stx.id();
    let mut commit = VersionedState::new(parent);
    consume(&mut commit, &t.ins);
    produce(&mut commit, tx_id, 0, &t.outs);
    commit.add_chain(ChainRecord {
        id: tx_id,
        subnet_id: t.subnet_id,
        name: t.name.clone(),
        vm_id: t.vm_id,
        genesis_bytes: t.genesis_bytes.clone(),
    });

    let mut abort = VersionedState::new(parent);
    consume(&mut abort, &t.ins);
    produce(&mut abort, tx_id, 0, &t.outs);

    Ok(TxOutcome { on_commit: commit.into_diff(), on_abort: abort.into_diff() })
}
