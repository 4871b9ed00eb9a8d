// src/state/mod.rs

pub mod versioned;

pub use versioned::{Diff, VersionedState};

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::codec;
use crate::stakers::{CurrentStakers, PendingStakers, Staker};
use crate::types::{ChainRecord, NodeId, Subnet, SubnetId, TxId, Utxo, UtxoId};

/// Read surface shared by the persisted state and every overlay above it.
/// Overlay getters check their local diff first and fall through here.
pub trait StateView {
    fn timestamp(&self) -> u64;
    fn get_utxo(&self, id: &UtxoId) -> Option<Utxo>;
    fn current_stakers(&self) -> &CurrentStakers;
    fn pending_stakers(&self) -> &PendingStakers;
    fn get_subnet(&self, id: &SubnetId) -> Option<&Subnet>;
    fn get_chain(&self, id: &TxId) -> Option<&ChainRecord>;
}

/// The next scheduled staker-set transition visible from `view`: the
/// earlier of the next pending activation and the next current expiry.
/// `AdvanceTimeTx` may not move the clock past this.
pub fn next_staker_change_time(view: &dyn StateView) -> Option<u64> {
    let next_start = view.pending_stakers().next_to_start().map(|s| s.start_time);
    let next_stop = view.current_stakers().next_to_expire().map(|s| s.end_time);
    match (next_start, next_stop) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Integrity failures. All of these are fatal: once the persisted state or
/// a diff is suspect, applying anything further could break the
/// stake/transfer consistency guarantee, so the caller should halt.
#[derive(Debug, PartialEq, Eq)]
pub enum StateError {
    MissingUtxo(UtxoId),
    MissingStaker(TxId),
    CorruptWeightDiff { height: u64, node_id: NodeId },
    Store(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::MissingUtxo(id) => write!(f, "utxo {} missing from persisted state", id),
            StateError::MissingStaker(id) => write!(f, "staker {} missing from persisted state", id),
            StateError::CorruptWeightDiff { height, node_id } => {
                write!(f, "weight diff at height {} for node {} does not replay", height, node_id)
            }
            StateError::Store(e) => write!(f, "store failure: {}", e),
        }
    }
}

impl std::error::Error for StateError {}

// --- external keyed store ---

#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

pub enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A write set committed atomically by the store.
#[derive(Default)]
pub struct Batch {
    pub ops: Vec<Op>,
}

impl Batch {
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(Op::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(Op::Delete(key));
    }
}

/// Persistent keyed store with atomic batch commit. The ledger only ever
/// writes through it; reading records back at startup is the embedder's
/// concern. The real thing lives outside this crate; `MemStore` stands in
/// for tests.
pub trait Store {
    fn commit(&mut self, batch: Batch) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemStore {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }
}

impl Store for MemStore {
    fn commit(&mut self, batch: Batch) -> Result<(), StoreError> {
        for op in batch.ops {
            match op {
                Op::Put(k, v) => {
                    self.map.insert(k, v);
                }
                Op::Delete(k) => {
                    self.map.remove(&k);
                }
            }
        }
        Ok(())
    }
}

// --- persisted chain state ---

/// The accepted ledger state: UTXO set, staker sets, registries, and the
/// per-height validator-weight-diff ledger. Mutated only by
/// `Diff::apply`, once per accepted block.
pub struct ChainState {
    store: Box<dyn Store>,
    height: u64,
    timestamp: u64,
    utxos: HashMap<UtxoId, Utxo>,
    current: CurrentStakers,
    pending: PendingStakers,
    subnets: HashMap<SubnetId, Subnet>,
    chains: HashMap<TxId, ChainRecord>,
    // height -> (subnet, node) -> signed weight change applied at that height
    weight_diffs: BTreeMap<u64, BTreeMap<(SubnetId, NodeId), i128>>,
}

impl ChainState {
    pub fn new(store: Box<dyn Store>, genesis_time: u64) -> Self {
        Self {
            store,
            height: 0,
            timestamp: genesis_time,
            utxos: HashMap::new(),
            current: CurrentStakers::default(),
            pending: PendingStakers::default(),
            subnets: HashMap::new(),
            chains: HashMap::new(),
            weight_diffs: BTreeMap::new(),
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Seed a genesis UTXO, bypassing the executor path.
    pub fn add_genesis_utxo(&mut self, utxo: Utxo) -> Result<(), StateError> {
        let mut batch = Batch::default();
        batch.put(codec::utxo_key(&utxo.id), codec::utxo_value(&utxo));
        self.store.commit(batch).map_err(|e| StateError::Store(e.0))?;
        self.utxos.insert(utxo.id, utxo);
        Ok(())
    }

    /// Seed a genesis staker into the set its start time puts it in.
    pub fn add_genesis_staker(&mut self, s: Staker) -> Result<(), StateError> {
        let mut batch = Batch::default();
        let current = s.start_time <= self.timestamp;
        batch.put(codec::staker_key(current, &s), codec::staker_value(&s));
        self.store.commit(batch).map_err(|e| StateError::Store(e.0))?;
        if current {
            self.current = self.current.with_staker(s);
        } else {
            self.pending = self.pending.with_staker(s);
        }
        Ok(())
    }

    pub(crate) fn commit_batch(&mut self, batch: Batch) -> Result<(), StateError> {
        self.store.commit(batch).map_err(|e| StateError::Store(e.0))
    }

    pub(crate) fn apply_in_memory(
        &mut self,
        timestamp: Option<u64>,
        added_utxos: Vec<Utxo>,
        removed_utxos: Vec<UtxoId>,
        current: Option<CurrentStakers>,
        pending: Option<PendingStakers>,
        added_subnets: Vec<Subnet>,
        added_chains: Vec<ChainRecord>,
        weight_diffs: BTreeMap<(SubnetId, NodeId), i128>,
    ) {
        self.height += 1;
        if let Some(t) = timestamp {
            self.timestamp = t;
        }
        for id in removed_utxos {
            self.utxos.remove(&id);
        }
        for u in added_utxos {
            self.utxos.insert(u.id, u);
        }
        if let Some(c) = current {
            self.current = c;
        }
        if let Some(p) = pending {
            self.pending = p;
        }
        for s in added_subnets {
            self.subnets.insert(s.id, s);
        }
        for c in added_chains {
            self.chains.insert(c.id, c);
        }
        if !weight_diffs.is_empty() {
            self.weight_diffs.insert(self.height, weight_diffs);
        }
    }

    /// Validator weights per node for `subnet` in the current state.
    /// Delegator weight counts toward its target node.
    pub fn validator_set(&self, subnet: SubnetId) -> HashMap<NodeId, u64> {
        let mut set: HashMap<NodeId, u64> = HashMap::new();
        for s in self.current.stakers() {
            if s.subnet_id == subnet {
                *set.entry(s.node_id).or_insert(0) += s.weight;
            }
        }
        set
    }

    /// The validator set in force at a historical `height`, reconstructed
    /// by replaying the weight diffs backward from the current height.
    /// A `height` at or beyond the tip has no diffs to replay and yields
    /// the current set.
    pub fn validator_set_at(
        &self,
        height: u64,
        subnet: SubnetId,
    ) -> Result<HashMap<NodeId, u64>, StateError> {
        let mut set: HashMap<NodeId, i128> = self
            .validator_set(subnet)
            .into_iter()
            .map(|(n, w)| (n, w as i128))
            .collect();

        for h in ((height + 1)..=self.height).rev() {
            let diffs = match self.weight_diffs.get(&h) {
                Some(d) => d,
                None => continue,
            };
            for ((s, node), delta) in diffs {
                if *s != subnet {
                    continue;
                }
                let w = set.entry(*node).or_insert(0);
                *w -= delta;
                if *w < 0 {
                    return Err(StateError::CorruptWeightDiff { height: h, node_id: *node });
                }
                if *w == 0 {
                    set.remove(node);
                }
            }
        }

        Ok(set.into_iter().map(|(n, w)| (n, w as u64)).collect())
    }
}

impl StateView for ChainState {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn get_utxo(&self, id: &UtxoId) -> Option<Utxo> {
        self.utxos.get(id).cloned()
    }

    fn current_stakers(&self) -> &CurrentStakers {
        &self.current
    }

    fn pending_stakers(&self) -> &PendingStakers {
        &self.pending
    }

    fn get_subnet(&self, id: &SubnetId) -> Option<&Subnet> {
        self.subnets.get(id)
    }

    fn get_chain(&self, id: &TxId) -> Option<&ChainRecord> {
        self.chains.get(id)
    }
}
