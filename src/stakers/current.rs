// src/stakers/current.rs

use std::collections::{BTreeMap, HashMap};

use super::Staker;
use crate::types::{NodeId, SubnetId, TxId, PRIMARY_NETWORK_ID};

/// Stakers whose start_time has been reached, ordered by stop time.
/// All operations that change the set return a new value; a parent state
/// holding the old value is never disturbed (overlay composition relies
/// on this).
#[derive(Clone, Default, PartialEq, Debug)]
pub struct CurrentStakers {
    // key: (end_time, stop_priority, tx_id) — delegators drain before
    // validators at equal end times.
    by_stop: BTreeMap<(u64, u8, TxId), Staker>,
    validators: HashMap<(SubnetId, NodeId), (u64, u8, TxId)>,
}

impl CurrentStakers {
    pub fn len(&self) -> usize {
        self.by_stop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stop.is_empty()
    }

    /// The staker whose end_time is due next.
    pub fn next_to_expire(&self) -> Option<&Staker> {
        self.by_stop.values().next()
    }

    /// The current validator for (subnet, node), if admitted.
    pub fn validator(&self, subnet_id: SubnetId, node_id: NodeId) -> Option<&Staker> {
        let key = self.validators.get(&(subnet_id, node_id))?;
        self.by_stop.get(key)
    }

    /// Active primary-network delegators targeting `node_id`.
    pub fn delegators_of(&self, node_id: NodeId) -> Vec<&Staker> {
        self.by_stop
            .values()
            .filter(|s| !s.is_validator() && s.node_id == node_id && s.subnet_id == PRIMARY_NETWORK_ID)
            .collect()
    }

    pub fn stakers(&self) -> impl Iterator<Item = &Staker> {
        self.by_stop.values()
    }

    /// A copy of this set with `s` admitted.
    pub fn with_staker(&self, s: Staker) -> Self {
        let mut next = self.clone();
        let key = (s.end_time, s.stop_priority(), s.tx_id);
        if s.is_validator() {
            next.validators.insert((s.subnet_id, s.node_id), key);
        }
        next.by_stop.insert(key, s);
        next
    }

    /// A copy of this set with the next-to-expire staker removed, plus the
    /// removed staker itself.
    pub fn without_next(&self) -> Option<(Staker, Self)> {
        let key = *self.by_stop.keys().next()?;
        let mut next = self.clone();
        let staker = next.by_stop.remove(&key)?;
        if staker.is_validator() {
            next.validators.remove(&(staker.subnet_id, staker.node_id));
        }
        Some((staker, next))
    }
}
