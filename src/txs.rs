// src/txs.rs

use std::fmt;

use crate::codec::tx_bytes;
use crate::config::{Config, PERCENT_DENOMINATOR};
use crate::crypto::hash_bytes_sha256;
use crate::state::StateError;
use crate::types::{
    Credential, Hash, NodeId, OutputOwners, SubnetId, TransferInput, TransferOutput, TxId,
    PRIMARY_NETWORK_ID,
};
use crate::utxo::{sum_outputs, SpendError};

pub const MAX_CHAIN_NAME_LEN: usize = 128;

/// The closed set of platform-chain transactions. The executor matches
/// this exhaustively; adding a variant is a compile error everywhere it
/// matters.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Tx {
    AddValidator(AddValidatorTx),
    AddSubnetValidator(AddSubnetValidatorTx),
    AddDelegator(AddDelegatorTx),
    AdvanceTime(AdvanceTimeTx),
    RewardValidator(RewardValidatorTx),
    CreateSubnet(CreateSubnetTx),
    CreateChain(CreateChainTx),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddValidatorTx {
    pub node_id: NodeId,
    pub start_time: u64,
    pub end_time: u64,
    pub weight: u64,
    /// Delegation fee taken from delegator rewards, parts per million.
    pub shares: u32,
    pub rewards_owner: OutputOwners,
    pub ins: Vec<TransferInput>,
    /// Change outputs, produced on both branches.
    pub outs: Vec<TransferOutput>,
    /// The staked amount; produced only if the admission aborts, and
    /// reproduced when the stake is returned at reward time.
    pub stake_outs: Vec<TransferOutput>,
}

/// Authorization by a subnet's registered owner, detached from any UTXO.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SubnetAuth {
    pub sig_indices: Vec<u32>,
    pub cred: Credential,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddSubnetValidatorTx {
    pub node_id: NodeId,
    pub subnet_id: SubnetId,
    pub start_time: u64,
    pub end_time: u64,
    pub weight: u64,
    pub ins: Vec<TransferInput>,
    pub outs: Vec<TransferOutput>,
    pub subnet_auth: SubnetAuth,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddDelegatorTx {
    pub node_id: NodeId,
    pub start_time: u64,
    pub end_time: u64,
    pub weight: u64,
    pub rewards_owner: OutputOwners,
    pub ins: Vec<TransferInput>,
    pub outs: Vec<TransferOutput>,
    pub stake_outs: Vec<TransferOutput>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AdvanceTimeTx {
    /// Proposed new chain time, unix seconds.
    pub time: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RewardValidatorTx {
    /// The staker being retired; must be the next to expire.
    pub staker_tx_id: TxId,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CreateSubnetTx {
    pub owner: OutputOwners,
    pub ins: Vec<TransferInput>,
    pub outs: Vec<TransferOutput>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CreateChainTx {
    pub subnet_id: SubnetId,
    pub name: String,
    pub vm_id: Hash,
    pub genesis_bytes: Vec<u8>,
    pub ins: Vec<TransferInput>,
    pub outs: Vec<TransferOutput>,
    pub subnet_auth: SubnetAuth,
}

/// A transaction plus the credentials unlocking its inputs, one per input
/// in order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignedTx {
    pub tx: Tx,
    pub creds: Vec<Credential>,
}

impl SignedTx {
    pub fn new(tx: Tx, creds: Vec<Credential>) -> Self {
        Self { tx, creds }
    }

    /// Canonical bytes signed by input credentials.
    pub fn signing_bytes(&self) -> Vec<u8> {
        tx_bytes(&self.tx)
    }

    pub fn id(&self) -> TxId {
        TxId(hash_bytes_sha256(&tx_bytes(&self.tx)))
    }
}

/// Everything an executor can reject a transaction for. The first block
/// of variants is syntactic (state-independent, never becomes valid); the
/// second is semantic (checked against a specific parent state, may
/// succeed later against another); `State` failures are fatal integrity
/// errors.
#[derive(Debug, PartialEq, Eq)]
pub enum TxError {
    // syntactic
    BadInterval { start: u64, end: u64 },
    DurationOutOfRange { duration: u64, min: u64, max: u64 },
    StakeTooSmall { weight: u64, min: u64 },
    TooManyShares(u32),
    MalformedOwners,
    ZeroOutput,
    StakeMismatch { declared: u64, staked: u64 },
    BadChainName,
    SubnetNotAllowed(SubnetId),
    // semantic
    StartsTooSoon { chain_time: u64, start: u64 },
    StartsTooLate { start: u64, limit: u64 },
    DuplicateStaker { subnet_id: SubnetId, node_id: NodeId },
    ValidatorNotFound(NodeId),
    DelegatorSubset,
    OverDelegated,
    ValidatorSubset,
    UnknownSubnet(SubnetId),
    BadSubnetAuth(SubnetId),
    TimeNotMonotonic { chain_time: u64, proposed: u64 },
    TimeBeyondNextChange { proposed: u64, next_change: u64 },
    WrongRewardedStaker { expected: Option<TxId>, got: TxId },
    RewardNotDue { chain_time: u64, end_time: u64 },
    Spend(SpendError),
    Overflow,
    // fatal
    State(StateError),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::BadInterval { start, end } => {
                write!(f, "staker interval [{}, {}) is empty or reversed", start, end)
            }
            TxError::DurationOutOfRange { duration, min, max } => {
                write!(f, "staking duration {} outside [{}, {}]", duration, min, max)
            }
            TxError::StakeTooSmall { weight, min } => {
                write!(f, "stake {} below minimum {}", weight, min)
            }
            TxError::TooManyShares(s) => write!(f, "shares {} exceed 100%", s),
            TxError::MalformedOwners => write!(f, "malformed output owners"),
            TxError::ZeroOutput => write!(f, "zero-amount output"),
            TxError::StakeMismatch { declared, staked } => {
                write!(f, "declared weight {} but staked outputs sum to {}", declared, staked)
            }
            TxError::BadChainName => write!(f, "chain name empty or too long"),
            TxError::SubnetNotAllowed(id) => {
                write!(f, "operation not valid for subnet {}", id)
            }
            TxError::StartsTooSoon { chain_time, start } => {
                write!(f, "start time {} not after chain time {}", start, chain_time)
            }
            TxError::StartsTooLate { start, limit } => {
                write!(f, "start time {} beyond scheduling window ending {}", start, limit)
            }
            TxError::DuplicateStaker { subnet_id, node_id } => {
                write!(f, "node {} already staked on subnet {}", node_id, subnet_id)
            }
            TxError::ValidatorNotFound(n) => write!(f, "no validator for node {}", n),
            TxError::DelegatorSubset => {
                write!(f, "delegation period not inside the validator's period")
            }
            TxError::OverDelegated => write!(f, "delegation would exceed maximum validator weight"),
            TxError::ValidatorSubset => {
                write!(f, "subnet validation period not inside the primary validation period")
            }
            TxError::UnknownSubnet(id) => write!(f, "unknown subnet {}", id),
            TxError::BadSubnetAuth(id) => write!(f, "subnet {} owner authorization invalid", id),
            TxError::TimeNotMonotonic { chain_time, proposed } => {
                write!(f, "proposed time {} not after chain time {}", proposed, chain_time)
            }
            TxError::TimeBeyondNextChange { proposed, next_change } => {
                write!(f, "proposed time {} skips staker change at {}", proposed, next_change)
            }
            TxError::WrongRewardedStaker { expected, got } => match expected {
                Some(e) => write!(f, "reward names staker {} but {} expires next", got, e),
                None => write!(f, "reward names staker {} but none is due", got),
            },
            TxError::RewardNotDue { chain_time, end_time } => {
                write!(f, "staker ends at {} but chain time is {}", end_time, chain_time)
            }
            TxError::Spend(e) => write!(f, "{}", e),
            TxError::Overflow => write!(f, "weight arithmetic overflow"),
            TxError::State(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TxError {}

impl From<SpendError> for TxError {
    fn from(e: SpendError) -> Self {
        TxError::Spend(e)
    }
}

impl From<StateError> for TxError {
    fn from(e: StateError) -> Self {
        TxError::State(e)
    }
}

impl Tx {
    /// State-independent validity. Anything failing here is permanently
    /// invalid and never admitted.
    pub fn verify_syntax(&self, cfg: &Config) -> Result<(), TxError> {
        match self {
            Tx::AddValidator(t) => {
                check_interval(t.start_time, t.end_time, cfg)?;
                if t.weight < cfg.min_validator_stake {
                    return Err(TxError::StakeTooSmall {
                        weight: t.weight,
                        min: cfg.min_validator_stake,
                    });
                }
                if t.shares > PERCENT_DENOMINATOR {
                    return Err(TxError::TooManyShares(t.shares));
                }
                check_owners(&t.rewards_owner)?;
                check_outputs(&t.outs)?;
                check_outputs(&t.stake_outs)?;
                check_stake_total(t.weight, &t.stake_outs)
            }
            Tx::AddSubnetValidator(t) => {
                check_interval(t.start_time, t.end_time, cfg)?;
                if t.weight == 0 {
                    return Err(TxError::StakeTooSmall { weight: 0, min: 1 });
                }
                if t.subnet_id == PRIMARY_NETWORK_ID {
                    return Err(TxError::SubnetNotAllowed(t.subnet_id));
                }
                check_outputs(&t.outs)
            }
            Tx::AddDelegator(t) => {
                check_interval(t.start_time, t.end_time, cfg)?;
                if t.weight < cfg.min_delegator_stake {
                    return Err(TxError::StakeTooSmall {
                        weight: t.weight,
                        min: cfg.min_delegator_stake,
                    });
                }
                check_owners(&t.rewards_owner)?;
                check_outputs(&t.outs)?;
                check_outputs(&t.stake_outs)?;
                check_stake_total(t.weight, &t.stake_outs)
            }
            Tx::AdvanceTime(_) => Ok(()),
            Tx::RewardValidator(_) => Ok(()),
            Tx::CreateSubnet(t) => {
                check_owners(&t.owner)?;
                check_outputs(&t.outs)
            }
            Tx::CreateChain(t) => {
                if t.name.is_empty() || t.name.len() > MAX_CHAIN_NAME_LEN {
                    return Err(TxError::BadChainName);
                }
                if t.subnet_id == PRIMARY_NETWORK_ID {
                    return Err(TxError::SubnetNotAllowed(t.subnet_id));
                }
                check_outputs(&t.outs)
            }
        }
    }

    pub fn inputs(&self) -> &[TransferInput] {
        match self {
            Tx::AddValidator(t) => &t.ins,
            Tx::AddSubnetValidator(t) => &t.ins,
            Tx::AddDelegator(t) => &t.ins,
            Tx::AdvanceTime(_) | Tx::RewardValidator(_) => &[],
            Tx::CreateSubnet(t) => &t.ins,
            Tx::CreateChain(t) => &t.ins,
        }
    }
}

fn check_interval(start: u64, end: u64, cfg: &Config) -> Result<(), TxError> {
    if start >= end {
        return Err(TxError::BadInterval { start, end });
    }
    let duration = end - start;
    if duration < cfg.min_stake_duration || duration > cfg.max_stake_duration {
        return Err(TxError::DurationOutOfRange {
            duration,
            min: cfg.min_stake_duration,
            max: cfg.max_stake_duration,
        });
    }
    Ok(())
}

fn check_owners(o: &OutputOwners) -> Result<(), TxError> {
    if o.is_well_formed() {
        Ok(())
    } else {
        Err(TxError::MalformedOwners)
    }
}

fn check_outputs(outs: &[TransferOutput]) -> Result<(), TxError> {
    for o in outs {
        if o.amount == 0 {
            return Err(TxError::ZeroOutput);
        }
        check_owners(&o.owners)?;
    }
    Ok(())
}

fn check_stake_total(weight: u64, stake_outs: &[TransferOutput]) -> Result<(), TxError> {
    let staked = sum_outputs(stake_outs).map_err(|_| TxError::Overflow)?;
    if staked != weight {
        return Err(TxError::StakeMismatch { declared: weight, staked });
    }
    Ok(())
}
