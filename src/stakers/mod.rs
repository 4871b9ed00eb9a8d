// src/stakers/mod.rs

pub mod capacity;
pub mod current;
pub mod pending;

pub use current::CurrentStakers;
pub use pending::PendingStakers;

use crate::types::{NodeId, OutputOwners, SubnetId, TransferOutput, TxId};

/// An admission record for a validator or delegator. Immutable once built;
/// the staker sets replace whole values instead of mutating entries.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Staker {
    pub tx_id: TxId,
    pub node_id: NodeId,
    pub subnet_id: SubnetId,
    pub start_time: u64,
    pub end_time: u64,
    pub weight: u64,
    /// Reward owed at end_time, fixed when the staker was admitted.
    pub potential_reward: u64,
    pub rewards_owner: OutputOwners,
    /// The staked outputs, reproduced when the stake is returned.
    pub stake: Vec<TransferOutput>,
    pub kind: StakerKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StakerKind {
    Validator { shares: u32 },
    Delegator,
}

impl Staker {
    pub fn is_validator(&self) -> bool {
        matches!(self.kind, StakerKind::Validator { .. })
    }

    /// Promotion order at equal start times: validators before their
    /// delegators, so a delegator never activates without its target.
    pub(crate) fn start_priority(&self) -> u8 {
        if self.is_validator() {
            0
        } else {
            1
        }
    }

    /// Removal order at equal end times: delegators before validators, so
    /// a delegator's reward can still see its validator's shares.
    pub(crate) fn stop_priority(&self) -> u8 {
        if self.is_validator() {
            1
        } else {
            0
        }
    }
}
