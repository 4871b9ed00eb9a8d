// src/state/versioned.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{Batch, ChainState, StateError, StateView};
use crate::codec;
use crate::stakers::{CurrentStakers, PendingStakers, Staker};
use crate::types::{ChainRecord, NodeId, Subnet, SubnetId, TxId, Utxo, UtxoId};

/// Copy-on-write overlay over any state view. Reads check the local diff
/// and fall through to the parent; writes only ever touch the diff, so a
/// discarded overlay has zero effect on anything beneath it. Overlays
/// nest: the parent may itself be a `VersionedState`.
pub struct VersionedState<'a> {
    parent: &'a dyn StateView,
    diff: Diff,
}

/// The buffered write set of an overlay, detachable from the parent
/// borrow so a block can own its commit/abort branches. Applying consumes
/// the diff: a second apply of the same value is unrepresentable.
#[derive(Clone, Default, Debug)]
pub struct Diff {
    pub timestamp: Option<u64>,
    pub added_utxos: Vec<Utxo>,
    pub removed_utxos: BTreeSet<UtxoId>,
    pub current: Option<CurrentStakers>,
    pub pending: Option<PendingStakers>,
    pub added_subnets: Vec<Subnet>,
    pub added_chains: Vec<ChainRecord>,
    pub weight_diffs: BTreeMap<(SubnetId, NodeId), i128>,
}

impl<'a> VersionedState<'a> {
    pub fn new(parent: &'a dyn StateView) -> Self {
        Self { parent, diff: Diff::default() }
    }

    /// Layer an already-built diff over `parent` (a chain of pending
    /// blocks is a stack of these).
    pub fn over(parent: &'a dyn StateView, diff: Diff) -> Self {
        Self { parent, diff }
    }

    pub fn set_timestamp(&mut self, t: u64) {
        self.diff.timestamp = Some(t);
    }

    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.diff.added_utxos.push(utxo);
    }

    pub fn remove_utxo(&mut self, id: UtxoId) {
        self.diff.removed_utxos.insert(id);
    }

    pub fn set_current_stakers(&mut self, c: CurrentStakers) {
        self.diff.current = Some(c);
    }

    pub fn set_pending_stakers(&mut self, p: PendingStakers) {
        self.diff.pending = Some(p);
    }

    pub fn add_subnet(&mut self, s: Subnet) {
        self.diff.added_subnets.push(s);
    }

    pub fn add_chain(&mut self, c: ChainRecord) {
        self.diff.added_chains.push(c);
    }

    pub fn record_weight_change(&mut self, subnet: SubnetId, node: NodeId, delta: i128) {
        *self.diff.weight_diffs.entry((subnet, node)).or_insert(0) += delta;
    }

    pub fn into_diff(self) -> Diff {
        self.diff
    }
}

impl StateView for VersionedState<'_> {
    fn timestamp(&self) -> u64 {
        self.diff.timestamp.unwrap_or_else(|| self.parent.timestamp())
    }

    fn get_utxo(&self, id: &UtxoId) -> Option<Utxo> {
        if self.diff.removed_utxos.contains(id) {
            return None;
        }
        if let Some(u) = self.diff.added_utxos.iter().find(|u| u.id == *id) {
            return Some(u.clone());
        }
        self.parent.get_utxo(id)
    }

    fn current_stakers(&self) -> &CurrentStakers {
        match &self.diff.current {
            Some(c) => c,
            None => self.parent.current_stakers(),
        }
    }

    fn pending_stakers(&self) -> &PendingStakers {
        match &self.diff.pending {
            Some(p) => p,
            None => self.parent.pending_stakers(),
        }
    }

    fn get_subnet(&self, id: &SubnetId) -> Option<&Subnet> {
        if let Some(s) = self.diff.added_subnets.iter().find(|s| s.id == *id) {
            return Some(s);
        }
        self.parent.get_subnet(id)
    }

    fn get_chain(&self, id: &TxId) -> Option<&ChainRecord> {
        if let Some(c) = self.diff.added_chains.iter().find(|c| c.id == *id) {
            return Some(c);
        }
        self.parent.get_chain(id)
    }
}

impl Diff {
    /// Flush this diff into the persisted state as one logical unit: the
    /// whole write set goes to the store in a single atomic batch, and
    /// only after the store accepts it is the in-memory state updated.
    /// Consumes the diff; it cannot be applied twice.
    pub fn apply(self, target: &mut ChainState) -> Result<(), StateError> {
        let mut batch = Batch::default();

        // Every removal must still exist; a miss means the store or a
        // sibling apply corrupted the invariant and we must not continue.
        for id in &self.removed_utxos {
            if target.get_utxo(id).is_none() {
                return Err(StateError::MissingUtxo(*id));
            }
            batch.delete(codec::utxo_key(id));
        }
        for u in &self.added_utxos {
            batch.put(codec::utxo_key(&u.id), codec::utxo_value(u));
        }

        if let Some(new_current) = &self.current {
            stage_staker_records(
                &mut batch,
                true,
                target.current_stakers().stakers(),
                new_current.stakers(),
            );
        }
        if let Some(new_pending) = &self.pending {
            stage_staker_records(
                &mut batch,
                false,
                target.pending_stakers().stakers(),
                new_pending.stakers(),
            );
        }

        if let Some(t) = self.timestamp {
            batch.put(codec::timestamp_key(), t.to_le_bytes().to_vec());
        }
        let new_height = target.height() + 1;
        batch.put(codec::height_key(), new_height.to_le_bytes().to_vec());
        for ((subnet, node), delta) in &self.weight_diffs {
            batch.put(
                codec::weight_diff_key(new_height, subnet, node),
                delta.to_le_bytes().to_vec(),
            );
        }

        target.commit_batch(batch)?;
        target.apply_in_memory(
            self.timestamp,
            self.added_utxos,
            self.removed_utxos.into_iter().collect(),
            self.current,
            self.pending,
            self.added_subnets,
            self.added_chains,
            self.weight_diffs,
        );
        Ok(())
    }
}

/// Stage store puts/deletes for the stakers that differ between the old
/// and new snapshot of one set.
fn stage_staker_records<'a, 'b>(
    batch: &mut Batch,
    current: bool,
    old: impl Iterator<Item = &'a Staker>,
    new: impl Iterator<Item = &'b Staker>,
) {
    let old_ids: HashMap<TxId, &Staker> = old.map(|s| (s.tx_id, s)).collect();
    let mut seen: BTreeSet<TxId> = BTreeSet::new();
    for s in new {
        seen.insert(s.tx_id);
        if !old_ids.contains_key(&s.tx_id) {
            batch.put(codec::staker_key(current, s), codec::staker_value(s));
        }
    }
    for (id, s) in old_ids {
        if !seen.contains(&id) {
            batch.delete(codec::staker_key(current, s));
        }
    }
}
