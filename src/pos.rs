//! Proof of stake: stake modifier, kernel and block signature
//!
//! A stake block is admitted when the kernel hash of its coinstake's first
//! input is below the difficulty target scaled by the coin-day weight of the
//! staked coin. The stake modifier mixed into the kernel is taken from a block
//! about one selection interval after the staked coin's block, so the owner
//! cannot precompute kernels when the coin is created.

use crate::block::{block_hash, block_signature_hash};
use crate::chain::{BlockId, BlockStore, BlockTree, CoinView};
use crate::constants::*;
use crate::error::{ConsensusError, RejectReason, Result};
use crate::hashes::{hash160, sha256d};
use crate::params::ChainParams;
use crate::pow::U256;
use crate::script::{extract_cold_staking_keys, extract_key_hash};
use crate::transaction::{is_coinstake, txid};
use crate::types::*;
use log::{debug, trace, warn};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use std::collections::HashSet;

/// Length of selection round `section` in seconds; later rounds are longer
///
/// # Panics
///
/// Panics if `section` is not below [`MODIFIER_SELECTION_ROUNDS`].
pub fn selection_interval_section(params: &ChainParams, section: usize) -> i64 {
    assert!(section < MODIFIER_SELECTION_ROUNDS);
    let section = section as i64;
    params.modifier_interval * 63 / (63 + (63 - section) * (MODIFIER_INTERVAL_RATIO - 1))
}

/// Total length of the stake modifier selection window in seconds
pub fn selection_interval(params: &ChainParams) -> i64 {
    (0..MODIFIER_SELECTION_ROUNDS).map(|section| selection_interval_section(params, section)).sum()
}

/// Most recent generated modifier at or before `id`, with its block time
fn last_stake_modifier(tree: &BlockTree, id: BlockId) -> Option<(u64, i64)> {
    let mut current = id;
    loop {
        let index = tree.get(current);
        if index.generated_stake_modifier {
            return Some((index.stake_modifier, index.time as i64));
        }
        current = index.prev?;
    }
}

fn select_block_from_candidates(
    tree: &BlockTree,
    sorted_by_time: &[(i64, BlockId)],
    selected: &HashSet<BlockId>,
    selection_stop: i64,
    modifier_prev: u64,
) -> Option<BlockId> {
    let mut best: Option<(U256, BlockId)> = None;
    for &(time, id) in sorted_by_time {
        if best.is_some() && time > selection_stop {
            break;
        }
        if selected.contains(&id) {
            continue;
        }
        let index = tree.get(id);
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&index.selection_proof());
        buf.extend_from_slice(&modifier_prev.to_le_bytes());
        let mut selection = U256::from(&sha256d(&buf));
        // Stake blocks always win against work blocks
        if index.proof_of_stake {
            selection = selection.shr(32);
        }
        match best {
            Some((best_hash, _)) if selection >= best_hash => {}
            _ => best = Some((selection, id)),
        }
    }
    best.map(|(_, id)| id)
}

/// ComputeNextStakeModifier: BlockIndex? → ℕ₆₄ × 𝔹
///
/// Returns the modifier for a block on top of `prev` and whether it was
/// freshly generated. A new modifier is generated once per modifier interval
/// by selecting one block per round from the candidates inside the selection
/// window and concatenating their entropy bits.
pub fn compute_next_stake_modifier(
    tree: &BlockTree,
    prev: Option<BlockId>,
    params: &ChainParams,
) -> Result<(u64, bool)> {
    let prev = match prev {
        Some(prev) => prev,
        // Genesis modifier is zero
        None => return Ok((0, true)),
    };

    let (modifier, modifier_time) = last_stake_modifier(tree, prev)
        .ok_or_else(|| ConsensusError::BlockIndexMissing("no stake modifier generated at genesis".to_string()))?;
    let prev_time = tree.get(prev).time as i64;
    if modifier_time / params.modifier_interval >= prev_time / params.modifier_interval {
        return Ok((modifier, false));
    }

    let window = selection_interval(params);
    let selection_start = (prev_time / params.modifier_interval) * params.modifier_interval - window;
    let mut candidates: Vec<(i64, BlockId)> = Vec::new();
    let mut current = Some(prev);
    while let Some(id) = current {
        let index = tree.get(id);
        if (index.time as i64) < selection_start {
            break;
        }
        candidates.push((index.time as i64, id));
        current = index.prev;
    }
    candidates.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| U256::from(&tree.get(a.1).hash).cmp(&U256::from(&tree.get(b.1).hash)))
    });

    let mut new_modifier = 0u64;
    let mut selection_stop = selection_start;
    let mut selected = HashSet::new();
    let rounds = MODIFIER_SELECTION_ROUNDS.min(candidates.len());
    for round in 0..rounds {
        selection_stop += selection_interval_section(params, round);
        let id = select_block_from_candidates(tree, &candidates, &selected, selection_stop, modifier)
            .ok_or_else(|| ConsensusError::BlockIndexMissing(format!("no modifier candidate at round {}", round)))?;
        new_modifier |= (tree.get(id).stake_entropy_bit as u64) << round;
        selected.insert(id);
    }

    trace!("new stake modifier {:016x} at height {}", new_modifier, tree.get(prev).height + 1);
    Ok((new_modifier, true))
}

/// Compute and store the stake modifier of block `id`
pub fn update_stake_modifier(tree: &mut BlockTree, id: BlockId, params: &ChainParams) -> Result<()> {
    let prev = tree.get(id).prev;
    let (modifier, generated) = compute_next_stake_modifier(tree, prev, params)?;
    let index = tree.get_mut(id);
    index.stake_modifier = modifier;
    index.generated_stake_modifier = generated;
    Ok(())
}

/// Stake modifier for a kernel whose coin was confirmed in block `from`.
///
/// Walks forward from `from` along the chain ending at `prev` until a
/// modifier generated at least one selection interval after `from` is found.
/// `None` when the chain does not reach that far yet.
pub fn get_kernel_stake_modifier(
    tree: &BlockTree,
    prev: BlockId,
    from: BlockId,
    params: &ChainParams,
) -> Option<u64> {
    let from_index = tree.get(from);
    let target_time = from_index.time as i64 + selection_interval(params);

    // Successors of `from` on this branch, oldest first
    let mut successors = Vec::new();
    let mut current = prev;
    while tree.get(current).height > from_index.height {
        successors.push(current);
        current = tree.get(current).prev?;
    }
    if current != from {
        return None;
    }
    successors.reverse();

    let mut modifier_time = from_index.time as i64;
    let mut chosen = from;
    let mut walk = successors.into_iter();
    while modifier_time < target_time {
        chosen = match walk.next() {
            Some(id) => id,
            None => {
                debug!("kernel stake modifier: reached tip at height {}", tree.get(prev).height);
                return None;
            }
        };
        let index = tree.get(chosen);
        if index.generated_stake_modifier {
            modifier_time = index.time as i64;
        }
    }
    Some(tree.get(chosen).stake_modifier)
}

/// Entropy bit contributed by a block: top bit of the last byte of
/// hash160(block signature)
pub fn stake_entropy_bit(block_sig: &[u8]) -> u8 {
    hash160(block_sig)[19] >> 7
}

/// Time weight: min(t_tx - t_prev - age_min, age_max), floored at zero
pub fn stake_time_weight(params: &ChainParams, time_tx: u32, time_prev: u32) -> i64 {
    let weight = time_tx as i64 - time_prev as i64 - params.stake_min_age;
    weight.min(params.stake_max_age).max(0)
}

/// Coin-day weight: value × time_weight / COIN / 86400
pub fn coin_day_weight(value: Amount, time_weight: i64) -> u64 {
    let product = value.max(0) as u128 * time_weight.max(0) as u128;
    (product / COIN as u128 / SECONDS_PER_DAY as u128) as u64
}

/// target(bits) × coin-day weight; `None` when the product exceeds 256 bits
pub fn weighted_stake_target(bits: u32, coin_day_weight: u64) -> Option<U256> {
    let (target, _, _) = U256::from_compact(bits);
    target.checked_mul_u64(coin_day_weight)
}

/// hash_proof = SHA256d(modifier ‖ t_prev ‖ prevout.hash ‖ prevout.n ‖ t_tx)
pub fn stake_kernel_hash(modifier: u64, time_prev: u32, prevout: &OutPoint, time_tx: u32) -> Hash {
    let mut buf = Vec::with_capacity(8 + 4 + 32 + 4 + 4);
    buf.extend_from_slice(&modifier.to_le_bytes());
    buf.extend_from_slice(&time_prev.to_le_bytes());
    buf.extend_from_slice(&prevout.hash);
    buf.extend_from_slice(&prevout.index.to_le_bytes());
    buf.extend_from_slice(&time_tx.to_le_bytes());
    sha256d(&buf)
}

/// CheckStakeKernelHash: ℕ₃₂ × BlockIndex × ℋ × 𝒯𝒳 × 𝒪 × ℕ → ℍ
///
/// For staked coin prevout of tx_prev (confirmed in block_from) spent at t_tx:
/// 1. t_tx ≥ tx_prev.time
/// 2. block_from.time + age_min ≤ t_tx
/// 3. w = coin_day_weight(value, stake_time_weight(t_tx, tx_prev.time))
/// 4. hash_proof = stake_kernel_hash(modifier(block_from), ...)
/// 5. hash_proof ≤ w × target(bits)
///
/// Returns the kernel hash on success.
#[allow(clippy::too_many_arguments)]
pub fn check_stake_kernel_hash(
    tree: &BlockTree,
    prev: BlockId,
    bits: u32,
    block_from: &BlockHeader,
    tx_prev: &Transaction,
    prevout: &OutPoint,
    time_tx: u32,
    params: &ChainParams,
) -> std::result::Result<Hash, RejectReason> {
    if time_tx < tx_prev.time {
        debug!("kernel: nTime violation {} < {}", time_tx, tx_prev.time);
        return Err(RejectReason::StakeTimeViolation);
    }
    if block_from.time as i64 + params.stake_min_age > time_tx as i64 {
        debug!("kernel: min age violation, coin from {} spent at {}", block_from.time, time_tx);
        return Err(RejectReason::StakeMinAge);
    }

    let value = tx_prev
        .outputs
        .get(prevout.index as usize)
        .ok_or(RejectReason::StakePrevoutMissing)?
        .value
        .explicit()
        .ok_or(RejectReason::StakeValueNotExplicit)?;

    let (target, negative, overflow) = U256::from_compact(bits);
    if negative || overflow || target.is_zero() {
        return Err(RejectReason::BadDiffBits);
    }
    let weight = coin_day_weight(value, stake_time_weight(params, time_tx, tx_prev.time));

    let from = tree.lookup(&block_hash(block_from)).ok_or(RejectReason::StakeModifierUnavailable)?;
    let modifier =
        get_kernel_stake_modifier(tree, prev, from, params).ok_or(RejectReason::StakeModifierUnavailable)?;

    let hash_proof = stake_kernel_hash(modifier, tx_prev.time, prevout, time_tx);
    if let Some(weighted) = target.checked_mul_u64(weight) {
        if U256::from(&hash_proof) > weighted {
            debug!(
                "kernel: hash {} above target {} at height {}",
                U256::from(&hash_proof),
                weighted,
                tree.get(prev).height
            );
            return Err(RejectReason::KernelHashAboveTarget);
        }
    }
    trace!("kernel: modifier {:016x} hash {}", modifier, U256::from(&hash_proof));
    Ok(hash_proof)
}

/// CheckProofOfStake: BlockIndex × 𝒯𝒳 × ℕ₃₂ × CoinView → {valid, invalid} × ℍ
///
/// Resolves the staked coin and the transaction that created it through the
/// transaction index, then checks the kernel. Missing index data is an
/// operational error, not a rejection.
pub fn check_proof_of_stake(
    tree: &BlockTree,
    prev: BlockId,
    tx: &Transaction,
    bits: u32,
    coins: &dyn CoinView,
    store: &dyn BlockStore,
    params: &ChainParams,
) -> Result<(ValidationResult, Option<Hash>)> {
    if !is_coinstake(tx) {
        return Ok((ValidationResult::Invalid(RejectReason::NotCoinstake), None));
    }

    let prevout = tx.inputs[0].prevout;
    if coins.get_coin(&prevout).is_none() {
        return Ok((ValidationResult::Invalid(RejectReason::StakePrevoutMissing), None));
    }

    let pos = store
        .read_tx_index(&prevout.hash)?
        .ok_or_else(|| ConsensusError::TxIndexEntryMissing(hex::encode(prevout.hash)))?;
    let (header, tx_prev) = store.read_block_tx(&pos)?;
    if txid(&tx_prev) != prevout.hash {
        warn!("tx index returned the wrong transaction for {}", hex::encode(prevout.hash));
        return Err(ConsensusError::TxMismatch(hex::encode(prevout.hash)));
    }

    match check_stake_kernel_hash(tree, prev, bits, &header, &tx_prev, &prevout, tx.time, params) {
        Ok(hash_proof) => Ok((ValidationResult::Valid, Some(hash_proof))),
        Err(reason) => Ok((ValidationResult::Invalid(reason), None)),
    }
}

/// Coinstake time must equal the block time
pub fn check_coinstake_timestamp(block_time: u32, tx_time: u32) -> bool {
    block_time == tx_time
}

/// Check the stake block signature against the staked coin's script.
///
/// The key is recovered from the compact signature over the header hash
/// without signature, trying every recovery id with both key encodings.
/// P2PKH and P2WPKH coins sign with their own key, cold-staked coins with
/// the staker key. Work blocks must carry no signature.
pub fn check_block_signature(header: &BlockHeader, script_pubkey: &[u8]) -> bool {
    if header.is_proof_of_work() {
        return header.block_sig.is_empty();
    }

    let key_hash = match extract_key_hash(script_pubkey)
        .or_else(|| extract_cold_staking_keys(script_pubkey).map(|(staker, _)| staker))
    {
        Some(hash) => hash,
        None => {
            debug!("block signature: staked script is not key-hash");
            return false;
        }
    };

    let compact = match header.block_sig.len() {
        65 => &header.block_sig[1..],
        64 => &header.block_sig[..],
        _ => return false,
    };
    let message = match Message::from_digest_slice(&block_signature_hash(header)) {
        Ok(message) => message,
        Err(_) => return false,
    };

    let secp = Secp256k1::verification_only();
    for recid in 0..4 {
        let recovered = RecoveryId::from_i32(recid)
            .and_then(|id| RecoverableSignature::from_compact(compact, id))
            .and_then(|sig| secp.recover_ecdsa(&message, &sig));
        let key = match recovered {
            Ok(key) => key,
            Err(_) => continue,
        };
        if hash160(&key.serialize()) == key_hash || hash160(&key.serialize_uncompressed()) == key_hash {
            return true;
        }
    }
    debug!("block signature: no recovered key matches the staked coin");
    false
}
