// src/block.rs

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info};

use crate::codec::block_id_bytes;
use crate::config::Config;
use crate::crypto::hash_bytes_sha256;
use crate::executor::{execute, TxOutcome};
use crate::state::{ChainState, StateError, StateView};
use crate::txs::{SignedTx, Tx, TxError};
use crate::types::{Hash, NodeId, SubnetId, UtxoId, PRIMARY_NETWORK_ID};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Processing,
    Accepted,
    Rejected,
}

#[derive(Debug)]
pub enum BlockError {
    /// Verify was called twice, or accept/reject hit a terminal status.
    AlreadyDecided(Status),
    /// Accept called before a successful verify.
    NotVerified,
    /// A sibling block verified on the same parent already consumes one of
    /// this block's inputs or admits the same staker.
    ConflictingParentTxs,
    Tx(TxError),
    State(StateError),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::AlreadyDecided(s) => write!(f, "block already decided: {:?}", s),
            BlockError::NotVerified => write!(f, "block was never verified"),
            BlockError::ConflictingParentTxs => {
                write!(f, "conflicts with a sibling block on the same parent")
            }
            BlockError::Tx(e) => write!(f, "{}", e),
            BlockError::State(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BlockError {}

impl From<TxError> for BlockError {
    fn from(e: TxError) -> Self {
        BlockError::Tx(e)
    }
}

impl From<StateError> for BlockError {
    fn from(e: StateError) -> Self {
        BlockError::State(e)
    }
}

/// Wraps one staking transaction for the external consensus engine.
/// `verify` runs the executor and caches both branches; `accept` applies
/// the commit branch to the persisted state; `reject` discards both. The
/// engine calls each at most once, under its chain-wide lock — the
/// wrapper enforces the once-ness, not the locking.
pub struct ProposalBlock {
    id: Hash,
    parent: Hash,
    stx: SignedTx,
    status: Status,
    outcome: Option<TxOutcome>,
    consumed: BTreeSet<UtxoId>,
    admitted: Vec<(SubnetId, NodeId)>,
}

impl ProposalBlock {
    pub fn new(parent: Hash, stx: SignedTx) -> Self {
        let id = hash_bytes_sha256(&block_id_bytes(&parent, &stx.id()));
        Self {
            id,
            parent,
            stx,
            status: Status::Processing,
            outcome: None,
            consumed: BTreeSet::new(),
            admitted: Vec::new(),
        }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn parent(&self) -> Hash {
        self.parent
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn tx(&self) -> &SignedTx {
        &self.stx
    }

    fn conflicts_with(&self, sibling: &ProposalBlock) -> bool {
        if sibling.parent != self.parent || sibling.status != Status::Processing {
            return false;
        }
        if sibling.outcome.is_none() {
            return false;
        }
        if self.consumed.iter().any(|id| sibling.consumed.contains(id)) {
            return true;
        }
        self.admitted.iter().any(|key| sibling.admitted.contains(key))
    }

    /// Execute the wrapped transaction against `parent_state` and cache
    /// the commit/abort branches. `siblings` are the blocks already
    /// verified on the same parent; overlapping inputs or staker
    /// admissions make this block fail with `ConflictingParentTxs`.
    pub fn verify(
        &mut self,
        cfg: &Config,
        parent_state: &dyn StateView,
        siblings: &[&ProposalBlock],
    ) -> Result<(), BlockError> {
        if self.status != Status::Processing {
            return Err(BlockError::AlreadyDecided(self.status));
        }
        if self.outcome.is_some() {
            return Err(BlockError::AlreadyDecided(self.status));
        }

        self.consumed = self.stx.tx.inputs().iter().map(|i| i.utxo_id).collect();
        self.admitted = match &self.stx.tx {
            Tx::AddValidator(t) => vec![(PRIMARY_NETWORK_ID, t.node_id)],
            Tx::AddSubnetValidator(t) => vec![(t.subnet_id, t.node_id)],
            _ => vec![],
        };

        for sibling in siblings {
            if self.conflicts_with(sibling) {
                debug!(block = %hex::encode(self.id), "conflicting sibling proposal");
                return Err(BlockError::ConflictingParentTxs);
            }
        }

        let outcome = execute(cfg, parent_state, &self.stx)?;
        self.outcome = Some(outcome);
        debug!(block = %hex::encode(self.id), "block verified");
        Ok(())
    }

    /// Consensus accepted the commit option: flush the commit branch into
    /// the persisted state. The UTXO spend and the staker-set diff land
    /// in one atomic store batch.
    pub fn accept(&mut self, state: &mut ChainState) -> Result<(), BlockError> {
        self.decide(state, true)
    }

    /// Consensus accepted the abort option: the transaction's containing
    /// block stands, but its effect is the abort branch.
    pub fn accept_abort(&mut self, state: &mut ChainState) -> Result<(), BlockError> {
        self.decide(state, false)
    }

    fn decide(&mut self, state: &mut ChainState, commit: bool) -> Result<(), BlockError> {
        if self.status != Status::Processing {
            return Err(BlockError::AlreadyDecided(self.status));
        }
        let outcome = self.outcome.take().ok_or(BlockError::NotVerified)?;
        let diff = if commit { outcome.on_commit } else { outcome.on_abort };
        diff.apply(state)?;
        self.status = Status::Accepted;
        info!(
            block = %hex::encode(self.id),
            height = state.height(),
            commit,
            "block accepted"
        );
        Ok(())
    }

    /// Consensus rejected the block: drop both branches. The wrapped
    /// transaction goes back to the mempool at a higher layer.
    pub fn reject(&mut self) -> Result<(), BlockError> {
        if self.status != Status::Processing {
            return Err(BlockError::AlreadyDecided(self.status));
        }
        self.outcome = None;
        self.status = Status::Rejected;
        info!(block = %hex::encode(self.id), "block rejected");
        Ok(())
    }
}
