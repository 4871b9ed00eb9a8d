// src/codec.rs

use crate::stakers::Staker;
use crate::types::{
    Hash, OutputOwners, TransferInput, TransferOutput, TxId, Utxo, UtxoId,
};
use crate::txs::{
    AddDelegatorTx, AddSubnetValidatorTx, AddValidatorTx, AdvanceTimeTx, CreateChainTx,
    CreateSubnetTx, RewardValidatorTx, Tx,
};

pub const CODEC_VERSION: u8 = 1;
pub const DOM_TX: &[u8] = b"PTX";
pub const DOM_BLK: &[u8] = b"PBLK";

const TAG_ADD_VALIDATOR: u8 = 0;
const TAG_ADD_SUBNET_VALIDATOR: u8 = 1;
const TAG_ADD_DELEGATOR: u8 = 2;
const TAG_ADVANCE_TIME: u8 = 3;
const TAG_REWARD_VALIDATOR: u8 = 4;
const TAG_CREATE_SUBNET: u8 = 5;
const TAG_CREATE_CHAIN: u8 = 6;

// --- helpers: write primitives deterministically ---

// append a u64 to a Vec<u8> in little-endian.
pub fn put_u64(dst: &mut Vec<u8>, x: u64) {
    dst.extend_from_slice(&x.to_le_bytes());
}

pub fn put_u32(dst: &mut Vec<u8>, x: u32) {
    dst.extend_from_slice(&x.to_le_bytes());
}

// append a byte string as length (u32 LE) + bytes.
fn put_bytes(dst: &mut Vec<u8>, b: &[u8]) {
    put_u32(dst, b.len() as u32);
    dst.extend_from_slice(b);
}

fn put_owners(dst: &mut Vec<u8>, o: &OutputOwners) {
    put_u64(dst, o.locktime);
    put_u32(dst, o.threshold);
    put_u32(dst, o.addresses.len() as u32);
    for a in &o.addresses {
        dst.extend_from_slice(&a.0);
    }
}

fn put_input(dst: &mut Vec<u8>, i: &TransferInput) {
    dst.extend_from_slice(&i.utxo_id.tx_id.0);
    put_u32(dst, i.utxo_id.output_index);
    put_u64(dst, i.amount);
    put_u32(dst, i.sig_indices.len() as u32);
    for s in &i.sig_indices {
        put_u32(dst, *s);
    }
}

fn put_output(dst: &mut Vec<u8>, o: &TransferOutput) {
    put_u64(dst, o.amount);
    put_owners(dst, &o.owners);
}

fn put_inputs(dst: &mut Vec<u8>, ins: &[TransferInput]) {
    put_u32(dst, ins.len() as u32);
    for i in ins {
        put_input(dst, i);
    }
}

fn put_outputs(dst: &mut Vec<u8>, outs: &[TransferOutput]) {
    put_u32(dst, outs.len() as u32);
    for o in outs {
        put_output(dst, o);
    }
}

// --- public encoders used for hashing ---

/// Canonical bytes of a transaction. Used both as the signing preimage for
/// input credentials and as the preimage of the tx id.
pub fn tx_bytes(tx: &Tx) -> Vec<u8> {
    let mut v = vec![CODEC_VERSION];
    v.extend_from_slice(DOM_TX);
    match tx {
        Tx::AddValidator(t) => {
            v.push(TAG_ADD_VALIDATOR);
            add_validator_bytes(&mut v, t);
        }
        Tx::AddSubnetValidator(t) => {
            v.push(TAG_ADD_SUBNET_VALIDATOR);
            add_subnet_validator_bytes(&mut v, t);
        }
        Tx::AddDelegator(t) => {
            v.push(TAG_ADD_DELEGATOR);
            add_delegator_bytes(&mut v, t);
        }
        Tx::AdvanceTime(t) => {
            v.push(TAG_ADVANCE_TIME);
            advance_time_bytes(&mut v, t);
        }
        Tx::RewardValidator(t) => {
            v.push(TAG_REWARD_VALIDATOR);
            reward_validator_bytes(&mut v, t);
        }
        Tx::CreateSubnet(t) => {
            v.push(TAG_CREATE_SUBNET);
            create_subnet_bytes(&mut v, t);
        }
        Tx::CreateChain(t) => {
            v.push(TAG_CREATE_CHAIN);
            create_chain_bytes(&mut v, t);
        }
    }
    v
}

fn add_validator_bytes(v: &mut Vec<u8>, t: &AddValidatorTx) {
    v.extend_from_slice(&t.node_id.0);
    put_u64(v, t.start_time);
    put_u64(v, t.end_time);
    put_u64(v, t.weight);
    put_u32(v, t.shares);
    put_owners(v, &t.rewards_owner);
    put_inputs(v, &t.ins);
    put_outputs(v, &t.outs);
    put_outputs(v, &t.stake_outs);
}

fn add_subnet_validator_bytes(v: &mut Vec<u8>, t: &AddSubnetValidatorTx) {
    v.extend_from_slice(&t.node_id.0);
    v.extend_from_slice(&t.subnet_id.0);
    put_u64(v, t.start_time);
    put_u64(v, t.end_time);
    put_u64(v, t.weight);
    put_inputs(v, &t.ins);
    put_outputs(v, &t.outs);
    put_u32(v, t.subnet_auth.sig_indices.len() as u32);
    for s in &t.subnet_auth.sig_indices {
        put_u32(v, *s);
    }
}

fn add_delegator_bytes(v: &mut Vec<u8>, t: &AddDelegatorTx) {
    v.extend_from_slice(&t.node_id.0);
    put_u64(v, t.start_time);
    put_u64(v, t.end_time);
    put_u64(v, t.weight);
    put_owners(v, &t.rewards_owner);
    put_inputs(v, &t.ins);
    put_outputs(v, &t.outs);
    put_outputs(v, &t.stake_outs);
}

fn advance_time_bytes(v: &mut Vec<u8>, t: &AdvanceTimeTx) {
    put_u64(v, t.time);
}

fn reward_validator_bytes(v: &mut Vec<u8>, t: &RewardValidatorTx) {
    v.extend_from_slice(&t.staker_tx_id.0);
}

fn create_subnet_bytes(v: &mut Vec<u8>, t: &CreateSubnetTx) {
    put_owners(v, &t.owner);
    put_inputs(v, &t.ins);
    put_outputs(v, &t.outs);
}

fn create_chain_bytes(v: &mut Vec<u8>, t: &CreateChainTx) {
    v.extend_from_slice(&t.subnet_id.0);
    put_bytes(v, t.name.as_bytes());
    v.extend_from_slice(&t.vm_id);
    put_bytes(v, &t.genesis_bytes);
    put_inputs(v, &t.ins);
    put_outputs(v, &t.outs);
    put_u32(v, t.subnet_auth.sig_indices.len() as u32);
    for s in &t.subnet_auth.sig_indices {
        put_u32(v, *s);
    }
}

/// Id preimage of a proposal block: parent id + wrapped tx id.
pub fn block_id_bytes(parent: &Hash, tx_id: &TxId) -> Vec<u8> {
    let mut v = vec![CODEC_VERSION];
    v.extend_from_slice(DOM_BLK);
    v.extend_from_slice(parent);
    v.extend_from_slice(&tx_id.0);
    v
}

// --- store record encodings ---

pub fn utxo_key(id: &UtxoId) -> Vec<u8> {
    let mut k = b"utxo/".to_vec();
    k.extend_from_slice(&id.tx_id.0);
    put_u32(&mut k, id.output_index);
    k
}

pub fn utxo_value(u: &Utxo) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&u.asset_id.0);
    put_u64(&mut v, u.amount);
    put_owners(&mut v, &u.owners);
    v
}

pub fn staker_key(current: bool, s: &Staker) -> Vec<u8> {
    let mut k = if current { b"staker/current/".to_vec() } else { b"staker/pending/".to_vec() };
    k.extend_from_slice(&s.subnet_id.0);
    k.extend_from_slice(&s.node_id.0);
    k.extend_from_slice(&s.tx_id.0);
    k
}

pub fn staker_value(s: &Staker) -> Vec<u8> {
    let mut v = Vec::new();
    put_u64(&mut v, s.start_time);
    put_u64(&mut v, s.end_time);
    put_u64(&mut v, s.weight);
    put_u64(&mut v, s.potential_reward);
    v
}

pub fn weight_diff_key(height: u64, subnet: &crate::types::SubnetId, node: &crate::types::NodeId) -> Vec<u8> {
    let mut k = b"weightdiff/".to_vec();
    put_u64(&mut k, height);
    k.extend_from_slice(&subnet.0);
    k.extend_from_slice(&node.0);
    k
}

pub fn timestamp_key() -> Vec<u8> {
    b"chain/timestamp".to_vec()
}

pub fn height_key() -> Vec<u8> {
    b"chain/height".to_vec()
}
