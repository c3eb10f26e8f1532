//! Context-free transaction checks and transaction identity

use crate::amount::money_range;
use crate::constants::*;
use crate::encode::{encode_transaction, serialize};
use crate::error::{RejectReason, Result};
use crate::hashes::sha256d;
use crate::script::is_pay_to_cold_staking;
use crate::types::*;
use std::collections::HashSet;

/// CheckTransaction: 𝒯𝒳 × 𝔹 → {valid, invalid}
///
/// A transaction tx = (v, type, t, ins, outs, lt, payload, wit) is valid iff:
/// 1. |ins| > 0 ∧ |outs| > 0, unless type = QuorumCommitment
/// 2. |tx|ₙₒ_ᵥᵥᵢₜ × 4 ≤ W_max and |payload| ≤ P_max
/// 3. ∀o ∈ outs: o is not the empty output unless tx is coinbase or coinstake
/// 4. ∀o ∈ outs: o.value and o.asset are explicit, 0 ≤ o.value ≤ M_max,
///    Σ o.value ≤ M_max, and cold-staking outputs carry at least C_min
/// 5. ins contains no duplicate prevouts (when `check_duplicate_inputs`)
/// 6. coinbase: |scriptSig| ∈ [min_cb, 100]; otherwise no prevout is null
pub fn check_transaction(tx: &Transaction, check_duplicate_inputs: bool) -> Result<ValidationResult> {
    Ok(check_transaction_inner(tx, check_duplicate_inputs).into())
}

pub(crate) fn check_transaction_inner(tx: &Transaction, check_duplicate_inputs: bool) -> std::result::Result<(), RejectReason> {
    // Quorum commitments carry their data in the payload only
    let allow_empty = tx.tx_type == TxType::QuorumCommitment as u16;
    if !allow_empty {
        if tx.inputs.is_empty() {
            return Err(RejectReason::VinEmpty);
        }
        if tx.outputs.is_empty() {
            return Err(RejectReason::VoutEmpty);
        }
    }

    if base_size(tx) * WITNESS_SCALE_FACTOR > MAX_BLOCK_WEIGHT {
        return Err(RejectReason::Oversize);
    }
    if tx.extra_payload.len() > MAX_TX_EXTRA_PAYLOAD {
        return Err(RejectReason::PayloadOversize);
    }

    let coinbase = is_coinbase(tx);
    let coinstake = is_coinstake(tx);
    let mut total_out: Amount = 0;
    for output in &tx.outputs {
        if (output.is_empty() && !coinbase && !coinstake) || !output.value.is_valid() {
            return Err(RejectReason::VoutEmptyOrInvalid);
        }
        let value = output.value.explicit().ok_or(RejectReason::VoutNotExplicitValue)?;
        if value < 0 {
            return Err(RejectReason::VoutNegative);
        }
        if value > MAX_MONEY {
            return Err(RejectReason::VoutTooLarge);
        }
        total_out += value;
        if !money_range(total_out) {
            return Err(RejectReason::TxOutTotalTooLarge);
        }
        if is_pay_to_cold_staking(&output.script_pubkey) && value < MIN_COLD_STAKING_AMOUNT {
            return Err(RejectReason::ColdStakeValue);
        }
        if !output.asset.is_explicit() {
            return Err(RejectReason::VoutNotExplicitAsset);
        }
    }

    // Block-level callers that already know the merkle tree is not malleated
    // may skip this
    if check_duplicate_inputs {
        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !seen.insert(input.prevout) {
                return Err(RejectReason::InputsDuplicate);
            }
        }
    }

    if coinbase {
        let min_size = if tx.tx_type == TxType::Coinbase as u16 { 1 } else { 2 };
        let len = tx.inputs[0].script_sig.len();
        if len < min_size || len > MAX_COINBASE_SCRIPT_SIZE {
            return Err(RejectReason::CoinbaseLength);
        }
    } else if tx.inputs.iter().any(|input| input.prevout.is_null()) {
        return Err(RejectReason::PrevoutNull);
    }

    Ok(())
}

/// Check if transaction is coinbase
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].prevout.is_null()
}

/// A coinstake spends at least one real coin and marks itself with an empty
/// first output followed by at least one paying output.
pub fn is_coinstake(tx: &Transaction) -> bool {
    !tx.inputs.is_empty()
        && !tx.inputs[0].prevout.is_null()
        && tx.outputs.len() >= 2
        && tx.outputs[0].is_empty()
}

/// Transaction id: SHA256d of the serialization without witness
pub fn txid(tx: &Transaction) -> Hash {
    let mut buf = Vec::new();
    encode_transaction(tx, false, &mut buf);
    sha256d(&buf)
}

/// Witness transaction id; equal to the txid when the witness is empty
pub fn wtxid(tx: &Transaction) -> Hash {
    sha256d(&serialize(tx))
}

/// Serialized size without witness
pub fn base_size(tx: &Transaction) -> usize {
    let mut buf = Vec::new();
    encode_transaction(tx, false, &mut buf);
    buf.len()
}

/// Serialized size including witness
pub fn total_size(tx: &Transaction) -> usize {
    serialize(tx).len()
}

/// Weight = base × (scale - 1) + total
pub fn weight(tx: &Transaction) -> usize {
    base_size(tx) * (WITNESS_SCALE_FACTOR - 1) + total_size(tx)
}
