// src/utxo.rs

use std::fmt;

use crate::crypto::verify_ownership;
use crate::state::{StateView, VersionedState};
use crate::types::{
    Credential, TransferInput, TransferOutput, TxId, Utxo, UtxoId, STAKING_ASSET_ID,
};

/// All spend failures are permanent for the state they were checked
/// against; none are retryable as-is.
#[derive(Debug, PartialEq, Eq)]
pub enum SpendError {
    UnknownUtxo(UtxoId),
    BadCredential(UtxoId),
    InsufficientFunds { consumed: u64, needed: u64 },
    Overflow,
    Locked { utxo: UtxoId, until: u64 },
    CredentialCount { want: usize, got: usize },
    AmountMismatch { utxo: UtxoId, declared: u64, actual: u64 },
    WrongAsset(UtxoId),
}

impl fmt::Display for SpendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendError::UnknownUtxo(id) => write!(f, "unknown or already spent utxo {}", id),
            SpendError::BadCredential(id) => write!(f, "credential does not unlock utxo {}", id),
            SpendError::InsufficientFunds { consumed, needed } => {
                write!(f, "inputs provide {} but {} is required", consumed, needed)
            }
            SpendError::Overflow => write!(f, "amount arithmetic overflow"),
            SpendError::Locked { utxo, until } => {
                write!(f, "utxo {} is locked until {}", utxo, until)
            }
            SpendError::CredentialCount { want, got } => {
                write!(f, "expected {} credentials, got {}", want, got)
            }
            SpendError::AmountMismatch { utxo, declared, actual } => {
                write!(f, "input declares {} for utxo {} holding {}", declared, utxo, actual)
            }
            SpendError::WrongAsset(id) => write!(f, "utxo {} is not the staking asset", id),
        }
    }
}

impl std::error::Error for SpendError {}

/// Overflow-checked sum of output amounts.
pub fn sum_outputs(outs: &[TransferOutput]) -> Result<u64, SpendError> {
    let mut total: u64 = 0;
    for o in outs {
        total = total.checked_add(o.amount).ok_or(SpendError::Overflow)?;
    }
    Ok(total)
}

/// Verify that `ins` exist unspent in `view`, that each credential
/// satisfies its UTXO's threshold locking condition over `msg`, and that
/// amounts balance exactly: Σ(inputs) = produced_total + fee.
///
/// Read-only; consuming/producing happens separately against an overlay.
pub fn verify_spend(
    view: &dyn StateView,
    ins: &[TransferInput],
    creds: &[Credential],
    produced_total: u64,
    fee: u64,
    msg: &[u8],
) -> Result<(), SpendError> {
    if ins.len() != creds.len() {
        return Err(SpendError::CredentialCount { want: ins.len(), got: creds.len() });
    }

    let now = view.timestamp();
    let mut consumed: u64 = 0;
    for (input, cred) in ins.iter().zip(creds) {
        let utxo = view
            .get_utxo(&input.utxo_id)
            .ok_or(SpendError::UnknownUtxo(input.utxo_id))?;
        if utxo.asset_id != STAKING_ASSET_ID {
            return Err(SpendError::WrongAsset(utxo.id));
        }
        if utxo.owners.locktime > now {
            return Err(SpendError::Locked { utxo: utxo.id, until: utxo.owners.locktime });
        }
        if input.amount != utxo.amount {
            return Err(SpendError::AmountMismatch {
                utxo: utxo.id,
                declared: input.amount,
                actual: utxo.amount,
            });
        }
        if !verify_ownership(&utxo.owners, input, cred, msg) {
            return Err(SpendError::BadCredential(utxo.id));
        }
        consumed = consumed.checked_add(input.amount).ok_or(SpendError::Overflow)?;
    }

    let needed = produced_total.checked_add(fee).ok_or(SpendError::Overflow)?;
    if consumed != needed {
        return Err(SpendError::InsufficientFunds { consumed, needed });
    }
    Ok(())
}

/// Remove every consumed UTXO from the overlay.
pub fn consume(vs: &mut VersionedState<'_>, ins: &[TransferInput]) {
    for input in ins {
        vs.remove_utxo(input.utxo_id);
    }
}

/// Add `outs` to the overlay as UTXOs of `tx_id`, numbering output slots
/// from `base_index`. Returns the next free index so a caller can chain
/// output groups (change, then stake refund, then rewards).
pub fn produce(
    vs: &mut VersionedState<'_>,
    tx_id: TxId,
    base_index: u32,
    outs: &[TransferOutput],
) -> u32 {
    let mut index = base_index;
    for o in outs {
        vs.add_utxo(Utxo {
            id: UtxoId { tx_id, output_index: index },
            asset_id: STAKING_ASSET_ID,
            amount: o.amount,
            owners: o.owners.clone(),
        });
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::addr_from_pubkey;
    use crate::state::{ChainState, MemStore};
    use crate::types::OutputOwners;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn funded_state(amount: u64, locktime: u64) -> (ChainState, SigningKey, UtxoId) {
        let sk = SigningKey::generate(&mut OsRng);
        let addr = addr_from_pubkey(&sk.verifying_key().to_bytes());
        let id = UtxoId { tx_id: TxId([9u8; 32]), output_index: 0 };
        let mut state = ChainState::new(Box::new(MemStore::default()), 1_000);
        state
            .add_genesis_utxo(Utxo {
                id,
                asset_id: STAKING_ASSET_ID,
                amount,
                owners: OutputOwners { locktime, threshold: 1, addresses: vec![addr] },
            })
            .unwrap();
        (state, sk, id)
    }

    fn signed_input(sk: &SigningKey, id: UtxoId, amount: u64, msg: &[u8]) -> (TransferInput, Credential) {
        let input = TransferInput { utxo_id: id, amount, sig_indices: vec![0] };
        let cred = Credential {
            signatures: vec![(sk.verifying_key().to_bytes(), sk.sign(msg).to_bytes())],
        };
        (input, cred)
    }

    #[test]
    fn balanced_spend_passes() {
        let (state, sk, id) = funded_state(500, 0);
        let msg = b"tx";
        let (input, cred) = signed_input(&sk, id, 500, msg);
        assert!(verify_spend(&state, &[input], &[cred], 490, 10, msg).is_ok());
    }

    #[test]
    fn unknown_utxo() {
        let (state, sk, _) = funded_state(500, 0);
        let msg = b"tx";
        let missing = UtxoId { tx_id: TxId([8u8; 32]), output_index: 3 };
        let (input, cred) = signed_input(&sk, missing, 500, msg);
        assert_eq!(
            verify_spend(&state, &[input], &[cred], 490, 10, msg),
            Err(SpendError::UnknownUtxo(missing))
        );
    }

    #[test]
    fn unbalanced_spend_fails() {
        let (state, sk, id) = funded_state(500, 0);
        let msg = b"tx";
        let (input, cred) = signed_input(&sk, id, 500, msg);
        assert_eq!(
            verify_spend(&state, &[input], &[cred], 500, 10, msg),
            Err(SpendError::InsufficientFunds { consumed: 500, needed: 510 })
        );
    }

    #[test]
    fn locked_utxo_fails_until_locktime() {
        let (state, sk, id) = funded_state(500, 2_000);
        let msg = b"tx";
        let (input, cred) = signed_input(&sk, id, 500, msg);
        assert_eq!(
            verify_spend(&state, &[input], &[cred], 490, 10, msg),
            Err(SpendError::Locked { utxo: id, until: 2_000 })
        );
    }

    #[test]
    fn wrong_signer_is_bad_credential() {
        let (state, _, id) = funded_state(500, 0);
        let other = SigningKey::generate(&mut OsRng);
        let msg = b"tx";
        let (input, cred) = signed_input(&other, id, 500, msg);
        assert_eq!(
            verify_spend(&state, &[input], &[cred], 490, 10, msg),
            Err(SpendError::BadCredential(id))
        );
    }

    #[test]
    fn overlay_consume_produce_shadows_parent() {
        let (state, _, id) = funded_state(500, 0);
        let mut vs = VersionedState::new(&state);
        consume(&mut vs, &[TransferInput { utxo_id: id, amount: 500, sig_indices: vec![0] }]);
        let next = produce(
            &mut vs,
            TxId([7u8; 32]),
            0,
            &[TransferOutput {
                amount: 490,
                owners: OutputOwners { locktime: 0, threshold: 0, addresses: vec![] },
            }],
        );
        assert_eq!(next, 1);
        assert!(vs.get_utxo(&id).is_none());
        let new_id = UtxoId { tx_id: TxId([7u8; 32]), output_index: 0 };
        assert_eq!(vs.get_utxo(&new_id).unwrap().amount, 490);
        // parent untouched
        assert!(state.get_utxo(&id).is_some());
    }
}
