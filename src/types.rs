// src/types.rs

use std::fmt;

pub type Hash = [u8; 32];

/// Id of a transaction: SHA-256 over its canonical codec bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TxId(pub Hash);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Short id of a staking node (derived from its staking key, externally).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub [u8; 20]);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SubnetId(pub Hash);

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// The primary network is the subnet every validator must join first.
pub const PRIMARY_NETWORK_ID: SubnetId = SubnetId([0u8; 32]);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AssetId(pub Hash);

/// The staking/fee asset of the platform chain.
pub const STAKING_ASSET_ID: AssetId = AssetId([0x01; 32]);

/// Truncated SHA-256 of an ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A UTXO is named by the transaction that produced it and the output slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct UtxoId {
    pub tx_id: TxId,
    pub output_index: u32,
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.output_index)
    }
}

/// Threshold-of-addresses locking condition on an output.
/// `addresses` must be sorted and unique; `threshold` of them must sign.
/// The output is unspendable before `locktime` (unix seconds).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OutputOwners {
    pub locktime: u64,
    pub threshold: u32,
    pub addresses: Vec<Address>,
}

impl OutputOwners {
    pub fn single(addr: Address) -> Self {
        Self { locktime: 0, threshold: 1, addresses: vec![addr] }
    }

    /// Structural sanity: threshold satisfiable, addresses sorted + unique.
    pub fn is_well_formed(&self) -> bool {
        if self.threshold as usize > self.addresses.len() {
            return false;
        }
        if self.threshold == 0 && !self.addresses.is_empty() {
            return false;
        }
        self.addresses.windows(2).all(|w| w[0] < w[1])
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Utxo {
    pub id: UtxoId,
    pub asset_id: AssetId,
    pub amount: u64,
    pub owners: OutputOwners,
}

/// A new output declared by a transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransferOutput {
    pub amount: u64,
    pub owners: OutputOwners,
}

/// A reference to a UTXO being consumed, with the declared amount and the
/// indices (into the owner address list) of the signers unlocking it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransferInput {
    pub utxo_id: UtxoId,
    pub amount: u64,
    pub sig_indices: Vec<u32>,
}

/// Unlocking data for one input: (pubkey, signature) pairs aligned with the
/// input's `sig_indices`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Credential {
    pub signatures: Vec<([u8; 32], [u8; 64])>,
}

/// Immutable subnet registry entry, created by a CreateSubnetTx.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Subnet {
    pub id: SubnetId,
    pub owner: OutputOwners,
}

/// Immutable chain registry entry, created by a CreateChainTx.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChainRecord {
    pub id: TxId,
    pub subnet_id: SubnetId,
    pub name: String,
    pub vm_id: Hash,
    pub genesis_bytes: Vec<u8>,
}
