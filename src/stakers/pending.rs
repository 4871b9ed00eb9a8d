// src/stakers/pending.rs

use std::collections::{BTreeMap, HashMap};

use super::Staker;
use crate::types::{NodeId, SubnetId, TxId, PRIMARY_NETWORK_ID};

/// Stakers scheduled for the future, ordered by start time. Same
/// pure-functional discipline as `CurrentStakers`.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct PendingStakers {
    // key: (start_time, start_priority, tx_id) — validators promote before
    // their delegators at equal start times.
    by_start: BTreeMap<(u64, u8, TxId), Staker>,
    validators: HashMap<(SubnetId, NodeId), (u64, u8, TxId)>,
}

impl PendingStakers {
    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// The staker whose start_time is due next.
    pub fn next_to_start(&self) -> Option<&Staker> {
        self.by_start.values().next()
    }

    pub fn validator(&self, subnet_id: SubnetId, node_id: NodeId) -> Option<&Staker> {
        let key = self.validators.get(&(subnet_id, node_id))?;
        self.by_start.get(key)
    }

    /// Queued primary-network delegators targeting `node_id`, in
    /// increasing start-time order (the capacity walk depends on this).
    pub fn delegators_of(&self, node_id: NodeId) -> Vec<&Staker> {
        self.by_start
            .values()
            .filter(|s| !s.is_validator() && s.node_id == node_id && s.subnet_id == PRIMARY_NETWORK_ID)
            .collect()
    }

    pub fn stakers(&self) -> impl Iterator<Item = &Staker> {
        self.by_start.values()
    }

    pub fn with_staker(&self, s: Staker) -> Self {
        let mut next = self.clone();
        let key = (s.start_time, s.start_priority(), s.tx_id);
        if s.is_validator() {
            next.validators.insert((s.subnet_id, s.node_id), key);
        }
        next.by_start.insert(key, s);
        next
    }

    pub fn without_next(&self) -> Option<(Staker, Self)> {
        let key = *self.by_start.keys().next()?;
        let mut next = self.clone();
        let staker = next.by_start.remove(&key)?;
        if staker.is_validator() {
            next.validators.remove(&(staker.subnet_id, staker.node_id));
        }
        Some((staker, next))
    }
}
