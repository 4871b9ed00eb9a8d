// src/crypto.rs

use sha2::{Digest, Sha256};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::types::{Address, Credential, Hash, OutputOwners, TransferInput};

pub fn verify_ed25519(pubkey: &[u8; 32], sig_bytes: &[u8; 64], msg: &[u8]) -> bool {
    // VerifyingKey is fallible
    let pk = match VerifyingKey::from_bytes(pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    // Signature::from_bytes is infallible in v2 (takes [u8; 64])
    let sig = Signature::from_bytes(sig_bytes);

    pk.verify(msg, &sig).is_ok()
}

pub fn hash_bytes_sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut h = [0u8; 32];
    h.copy_from_slice(&out);
    h
}

/// Address = first 20 bytes of SHA-256(pubkey).
pub fn addr_from_pubkey(pubkey: &[u8; 32]) -> Address {
    let h = hash_bytes_sha256(pubkey);
    let mut a = [0u8; 20];
    a.copy_from_slice(&h[..20]);
    Address(a)
}

/// Check that `cred` satisfies the threshold ownership proof of `owners`
/// for the given input, over `msg` (the tx signing bytes).
///
/// The input's `sig_indices` name which owner addresses are signing; the
/// credential carries the matching (pubkey, signature) pairs in the same
/// order. Indices must be strictly increasing (canonical form, no reuse).
pub fn verify_ownership(
    owners: &OutputOwners,
    input: &TransferInput,
    cred: &Credential,
    msg: &[u8],
) -> bool {
    verify_threshold(owners, &input.sig_indices, cred, msg)
}

/// Same proof, for authorizations not tied to a UTXO input (subnet owner
/// signing off on a subnet-scoped transaction).
pub fn verify_threshold(
    owners: &OutputOwners,
    sig_indices: &[u32],
    cred: &Credential,
    msg: &[u8],
) -> bool {
    if sig_indices.len() != cred.signatures.len() {
        return false;
    }
    if sig_indices.len() != owners.threshold as usize {
        return false;
    }

    let mut prev: Option<u32> = None;
    for (idx, (pubkey, sig)) in sig_indices.iter().zip(&cred.signatures) {
        if let Some(p) = prev {
            if *idx <= p {
                return false;
            }
        }
        prev = Some(*idx);

        let addr = match owners.addresses.get(*idx as usize) {
            Some(a) => *a,
            None => return false,
        };
        if addr_from_pubkey(pubkey) != addr {
            return false;
        }
        if !verify_ed25519(pubkey, sig, msg) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UtxoId;
    use crate::types::TxId;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn input_with_indices(indices: Vec<u32>) -> TransferInput {
        TransferInput {
            utxo_id: UtxoId { tx_id: TxId([0u8; 32]), output_index: 0 },
            amount: 1,
            sig_indices: indices,
        }
    }

    #[test]
    fn single_owner_roundtrip() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key().to_bytes();
        let addr = addr_from_pubkey(&pk);
        let owners = OutputOwners::single(addr);

        let msg = b"spend it";
        let sig = sk.sign(msg).to_bytes();
        let cred = Credential { signatures: vec![(pk, sig)] };
        let input = input_with_indices(vec![0]);

        assert!(verify_ownership(&owners, &input, &cred, msg));
        assert!(!verify_ownership(&owners, &input, &cred, b"other msg"));
    }

    #[test]
    fn threshold_needs_exact_count() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key().to_bytes();
        let a0 = addr_from_pubkey(&pk);
        let sk2 = SigningKey::generate(&mut OsRng);
        let pk2 = sk2.verifying_key().to_bytes();
        let a1 = addr_from_pubkey(&pk2);

        let mut addrs = vec![a0, a1];
        addrs.sort();
        let owners = OutputOwners { locktime: 0, threshold: 2, addresses: addrs.clone() };

        let msg = b"multisig";
        // Only one signature for a threshold of two.
        let cred = Credential { signatures: vec![(pk, sk.sign(msg).to_bytes())] };
        let input = input_with_indices(vec![0]);
        assert!(!verify_ownership(&owners, &input, &cred, msg));

        // Both signatures, indices aligned with the sorted address list.
        let keys = if addrs[0] == a0 { [(&sk, pk), (&sk2, pk2)] } else { [(&sk2, pk2), (&sk, pk)] };
        let cred = Credential {
            signatures: vec![
                (keys[0].1, keys[0].0.sign(msg).to_bytes()),
                (keys[1].1, keys[1].0.sign(msg).to_bytes()),
            ],
        };
        let input = input_with_indices(vec![0, 1]);
        assert!(verify_ownership(&owners, &input, &cred, msg));
    }

    #[test]
    fn repeated_index_rejected() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key().to_bytes();
        let addr = addr_from_pubkey(&pk);
        let owners = OutputOwners { locktime: 0, threshold: 2, addresses: vec![addr] };

        let msg = b"no double counting";
        let sig = sk.sign(msg).to_bytes();
        let cred = Credential { signatures: vec![(pk, sig), (pk, sig)] };
        let input = input_with_indices(vec![0, 0]);
        assert!(!verify_ownership(&owners, &input, &cred, msg));
    }
}
