//! Block-level validation: identity, structure and amount connection

use crate::amount::{money_range, AmountMap};
use crate::chain::CoinView;
use crate::checkqueue::CheckQueue;
use crate::confidential_validation::{get_fee_map, has_valid_fee, verify_coinbase_amount, AmountVerifier};
use crate::constants::*;
use crate::encode::{compact_size_len, encode_header_core, serialize};
use crate::error::{AmountError, RejectReason, Result};
use crate::hashes::{merkle_root, sha256d};
use crate::params::ChainParams;
use crate::pos::check_coinstake_timestamp;
use crate::transaction::{base_size, check_transaction_inner, is_coinbase, is_coinstake, total_size, txid};
use crate::types::*;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// Block hash: SHA256d over the header fields without stake data
pub fn block_hash(header: &BlockHeader) -> Hash {
    let mut buf = Vec::with_capacity(84);
    encode_header_core(header, &mut buf);
    sha256d(&buf)
}

/// Hash signed by the staker: header fields plus the staked prevout
pub fn block_signature_hash(header: &BlockHeader) -> Hash {
    let mut buf = Vec::with_capacity(120);
    encode_header_core(header, &mut buf);
    buf.extend_from_slice(&serialize(&header.prevout_stake));
    sha256d(&buf)
}

/// Merkle root over the txids of `block`, with the mutation flag
pub fn block_merkle_root(block: &Block) -> (Hash, bool) {
    let leaves: Vec<Hash> = block.transactions.iter().map(txid).collect();
    merkle_root(&leaves)
}

/// Block weight: stripped size × 3 + total size
pub fn block_weight(block: &Block) -> usize {
    let header = serialize(&block.header).len() + compact_size_len(block.transactions.len() as u64);
    let stripped: usize = header + block.transactions.iter().map(base_size).sum::<usize>();
    let total: usize = header + block.transactions.iter().map(total_size).sum::<usize>();
    stripped * (WITNESS_SCALE_FACTOR - 1) + total
}

/// CheckBlock: ℬ → {valid, invalid}
///
/// For block b = (h, txs):
/// 1. txs ≠ ∅ and weight(b) ≤ W_max
/// 2. txs[0] is the only coinbase
/// 3. proof of stake: txs[1] is the only coinstake and txs[1].time = h.time;
///    proof of work: no coinstake
/// 4. h.merkle_root = MerkleRoot(txids) and the tree is not mutated
/// 5. ∀tx ∈ txs: CheckTransaction(tx)
/// 6. proof of work only up to h.height ≤ last_pow_block
/// 7. with a mandatory destination D: ∀o ∈ txs[0].outs: o.value = 0 ∨ o.script = D
pub fn check_block(block: &Block, params: &ChainParams) -> Result<ValidationResult> {
    Ok(check_block_inner(block, params).into())
}

fn check_block_inner(block: &Block, params: &ChainParams) -> std::result::Result<(), RejectReason> {
    let txs = &block.transactions;
    if txs.is_empty() || txs.len() * WITNESS_SCALE_FACTOR > MAX_BLOCK_WEIGHT || block_weight(block) > MAX_BLOCK_WEIGHT {
        return Err(RejectReason::BlockLength);
    }

    if block.header.is_proof_of_work() && block.header.height > params.last_pow_block {
        debug!("work block at height {} after {}", block.header.height, params.last_pow_block);
        return Err(RejectReason::PowPeriodEnded);
    }

    if !is_coinbase(&txs[0]) {
        return Err(RejectReason::CoinbaseMissing);
    }
    if txs[1..].iter().any(is_coinbase) {
        return Err(RejectReason::CoinbaseMultiple);
    }
    if !pays_mandatory_destination(&txs[0], &params.mandatory_coinbase_destination) {
        return Err(RejectReason::CoinbaseDestination);
    }

    if block.is_proof_of_stake() {
        let coinstake = txs.get(1).filter(|tx| is_coinstake(tx)).ok_or(RejectReason::CoinstakeMissing)?;
        if coinstake.inputs[0].prevout != block.header.prevout_stake {
            debug!("coinstake does not spend the header's staked prevout");
            return Err(RejectReason::CoinstakeMissing);
        }
        if !check_coinstake_timestamp(block.header.time, coinstake.time) {
            return Err(RejectReason::CoinstakeTimestamp);
        }
        if txs[2..].iter().any(is_coinstake) {
            return Err(RejectReason::CoinstakeMultiple);
        }
    } else if txs[1..].iter().any(is_coinstake) {
        return Err(RejectReason::CoinstakeMultiple);
    }

    let (root, mutated) = block_merkle_root(block);
    if root != block.header.merkle_root || mutated {
        return Err(RejectReason::MerkleRoot);
    }

    for (i, tx) in txs.iter().enumerate() {
        check_transaction_inner(tx, true).map_err(|reason| {
            debug!("transaction {} of block failed structural checks: {}", i, reason);
            reason
        })?;
    }
    Ok(())
}

/// Every valued coinbase output goes to `destination`; an empty destination
/// allows any script.
fn pays_mandatory_destination(coinbase: &Transaction, destination: &[u8]) -> bool {
    destination.is_empty()
        || coinbase
            .outputs
            .iter()
            .all(|o| o.script_pubkey == destination || o.value.explicit() == Some(0))
}

/// Outputs of `tx` are allowed to exceed its inputs by at most `reward`.
///
/// Coinstakes are fully explicit; the empty marker output is ignored.
pub fn verify_coinstake_amount(
    spent: &[TransactionOutput],
    tx: &Transaction,
    reward: &AmountMap,
) -> std::result::Result<(), AmountError> {
    let mut remaining = reward.clone();
    for (i, prev) in spent.iter().enumerate() {
        match (prev.asset.explicit(), prev.value.explicit()) {
            (Some(asset), Some(value)) if money_range(value) => remaining.add_amount(asset, value),
            _ => return Err(AmountError::CoinstakeNotExplicit(i)),
        }
    }
    for (i, output) in tx.outputs.iter().enumerate().skip(1) {
        match (output.asset.explicit(), output.value.explicit()) {
            (Some(asset), Some(value)) if money_range(value) => remaining.add_amount(asset, -value),
            _ => return Err(AmountError::CoinstakeNotExplicit(i)),
        }
    }
    if !remaining.money_range() {
        trace!("coinstake pays more than inputs and reward: remaining {}", remaining);
        return Err(AmountError::CoinstakeExceedsAllowance);
    }
    Ok(())
}

/// Resolve the outputs spent by `tx`, seeing outputs created earlier in the
/// same block and rejecting double spends inside it. Fee outputs are never
/// spendable.
fn resolve_spent(
    tx: &Transaction,
    coins: &dyn CoinView,
    created: &HashMap<OutPoint, TransactionOutput>,
    spent_in_block: &mut HashSet<OutPoint>,
) -> std::result::Result<Vec<TransactionOutput>, RejectReason> {
    let mut spent = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !spent_in_block.insert(input.prevout) {
            return Err(RejectReason::InputsMissingOrSpent);
        }
        let output = match created.get(&input.prevout) {
            Some(output) => output.clone(),
            None => coins.get_coin(&input.prevout).ok_or(RejectReason::InputsMissingOrSpent)?.output,
        };
        if output.is_fee() {
            debug!("input spends a fee output");
            return Err(RejectReason::InputsMissingOrSpent);
        }
        spent.push(output);
    }
    Ok(spent)
}

/// ConnectBlockAmounts: ℬ × CoinView × AmountMap → {valid, invalid} × AmountMap
///
/// For block b = (h, txs) with block reward r:
/// 1. ∀tx ∈ txs \ {coinbase, coinstake}: VerifyAmounts(spent(tx), tx) with
///    proof checks on one shared queue, and valid fee outputs
/// 2. drain the queue; every deferred check must pass
/// 3. fees = Σ GetFeeMap(tx), in money range
/// 4. proof of stake: coinstake out ≤ in + r and coinbase out ≤ fees;
///    proof of work: coinbase out ≤ fees + r
///
/// Returns the fee map on success. Call after [`check_block`].
pub fn connect_block_amounts(
    block: &Block,
    coins: &dyn CoinView,
    reward: &AmountMap,
    verifier: &AmountVerifier,
) -> Result<(ValidationResult, AmountMap)> {
    match connect_block_amounts_inner(block, coins, reward, verifier) {
        Ok(fees) => Ok((ValidationResult::Valid, fees)),
        Err(reason) => Ok((ValidationResult::Invalid(reason), AmountMap::new())),
    }
}

fn connect_block_amounts_inner(
    block: &Block,
    coins: &dyn CoinView,
    reward: &AmountMap,
    verifier: &AmountVerifier,
) -> std::result::Result<AmountMap, RejectReason> {
    let coinbase = block.transactions.first().ok_or(RejectReason::CoinbaseMissing)?;
    let mut created: HashMap<OutPoint, TransactionOutput> = HashMap::new();
    let mut spent_in_block = HashSet::new();
    let mut queue = CheckQueue::new();
    let mut fees = AmountMap::new();
    let mut coinstake_allowance: Option<std::result::Result<(), AmountError>> = None;

    for (i, tx) in block.transactions.iter().enumerate() {
        let id = txid(tx);
        if i > 0 {
            let spent = resolve_spent(tx, coins, &created, &mut spent_in_block)?;
            if i == 1 && block.is_proof_of_stake() {
                coinstake_allowance = Some(verify_coinstake_amount(&spent, tx, reward));
            } else {
                verifier.verify_amounts(&spent, tx, Some(&mut queue), true).map_err(RejectReason::Amounts)?;
                if !has_valid_fee(tx) {
                    return Err(RejectReason::FeeOutOfRange);
                }
                fees += &get_fee_map(tx);
                if !fees.money_range() {
                    return Err(RejectReason::FeeOutOfRange);
                }
            }
        }
        // Newly minted rewards mature later and fee outputs are claimed by the coinbase
        let minted = i == 0 || (i == 1 && block.is_proof_of_stake());
        if minted {
            continue;
        }
        for (n, output) in tx.outputs.iter().enumerate() {
            if !output.is_fee() {
                created.insert(OutPoint::new(id, n as u32), output.clone());
            }
        }
    }

    debug!("connecting block at height {}: {} deferred checks", block.header.height, queue.len());
    queue.drain(verifier).map_err(RejectReason::Amounts)?;

    let allowance = match coinstake_allowance {
        Some(result) => {
            result.map_err(RejectReason::CoinstakeAmount)?;
            fees.clone()
        }
        None => fees.clone() + reward.clone(),
    };
    verify_coinbase_amount(coinbase, &allowance).map_err(RejectReason::CoinbaseAmount)?;
    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidential::AssetId;

    fn asset() -> AssetId {
        AssetId([0x0c; 32])
    }

    fn pay(value: Amount) -> TransactionOutput {
        TransactionOutput::explicit(asset(), value, vec![0x51])
    }

    fn fee(value: Amount) -> TransactionOutput {
        TransactionOutput::explicit(asset(), value, vec![])
    }

    fn burn() -> TransactionOutput {
        TransactionOutput::explicit(asset(), 0, vec![OP_RETURN])
    }

    fn coinbase(outputs: Vec<TransactionOutput>) -> Transaction {
        let mut input = TransactionInput::new(OutPoint::null());
        input.script_sig = vec![0x01, 0x02];
        Transaction { inputs: vec![input], outputs, ..Transaction::default() }
    }

    fn spend(prevout: OutPoint, outputs: Vec<TransactionOutput>) -> Transaction {
        Transaction { inputs: vec![TransactionInput::new(prevout)], outputs, ..Transaction::default() }
    }

    fn block(transactions: Vec<Transaction>) -> Block {
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                prev_block_hash: [0; 32],
                merkle_root: [0; 32],
                time: 1_000,
                height: 5,
                bits: 0x207fffff,
                nonce: 0,
                prevout_stake: OutPoint::null(),
                block_sig: vec![],
            },
            transactions,
        };
        block.header.merkle_root = block_merkle_root(&block).0;
        block
    }

    fn reason(block: &Block) -> Option<String> {
        check_block(block, &ChainParams::regtest()).unwrap().reject_reason().map(|r| r.to_string())
    }

    #[test]
    fn test_block_hash_ignores_signature() {
        let mut b = block(vec![coinbase(vec![pay(1)])]);
        let hash = block_hash(&b.header);
        let sig_hash = block_signature_hash(&b.header);
        b.header.block_sig = vec![1, 2, 3];
        assert_eq!(block_hash(&b.header), hash);
        b.header.prevout_stake = OutPoint::new([1; 32], 0);
        assert_eq!(block_hash(&b.header), hash);
        assert_ne!(block_signature_hash(&b.header), sig_hash);
    }

    #[test]
    fn test_check_block_valid() {
        let b = block(vec![coinbase(vec![pay(1)]), spend(OutPoint::new([1; 32], 0), vec![pay(1)])]);
        assert_eq!(check_block(&b, &ChainParams::regtest()).unwrap(), ValidationResult::Valid);
    }

    #[test]
    fn test_check_block_empty() {
        assert_eq!(reason(&block(vec![])).as_deref(), Some("bad-blk-length"));
    }

    #[test]
    fn test_check_block_coinbase_placement() {
        let b = block(vec![spend(OutPoint::new([1; 32], 0), vec![pay(1)])]);
        assert_eq!(reason(&b).as_deref(), Some("bad-cb-missing"));

        let b = block(vec![coinbase(vec![pay(1)]), coinbase(vec![pay(2)])]);
        assert_eq!(reason(&b).as_deref(), Some("bad-cb-multiple"));
    }

    #[test]
    fn test_check_block_merkle_root() {
        let mut b = block(vec![coinbase(vec![pay(1)])]);
        b.header.merkle_root = [7; 32];
        assert_eq!(reason(&b).as_deref(), Some("bad-txnmrklroot"));
    }

    #[test]
    fn test_check_block_bad_transaction() {
        let b = block(vec![coinbase(vec![pay(1)]), spend(OutPoint::new([1; 32], 0), vec![pay(-1)])]);
        assert_eq!(reason(&b).as_deref(), Some("bad-txns-vout-negative"));
    }

    #[test]
    fn test_check_block_coinstake_rules() {
        let staked = OutPoint::new([4; 32], 0);
        let mut coinstake = spend(staked, vec![fee(0), pay(10)]);
        coinstake.time = 1_000;

        let mut b = block(vec![coinbase(vec![fee(0)]), coinstake.clone()]);
        b.header.prevout_stake = staked;
        assert!(check_block(&b, &ChainParams::regtest()).unwrap().is_valid());

        // Work blocks may not contain one
        let b = block(vec![coinbase(vec![fee(0)]), coinstake.clone()]);
        assert_eq!(reason(&b).as_deref(), Some("bad-cs-multiple"));

        let mut late = coinstake.clone();
        late.time = 1_001;
        let mut b = block(vec![coinbase(vec![fee(0)]), late]);
        b.header.prevout_stake = staked;
        assert_eq!(reason(&b).as_deref(), Some("bad-cs-timestamp"));

        let mut b = block(vec![coinbase(vec![fee(0)]), spend(staked, vec![pay(10)])]);
        b.header.prevout_stake = staked;
        assert_eq!(reason(&b).as_deref(), Some("bad-cs-missing"));
    }

    #[test]
    fn test_check_block_after_last_pow_block() {
        let params = ChainParams::regtest();
        let mut b = block(vec![coinbase(vec![pay(1)])]);
        b.header.height = params.last_pow_block;
        assert!(check_block(&b, &params).unwrap().is_valid());

        b.header.height = params.last_pow_block + 1;
        assert_eq!(reason(&b).as_deref(), Some("pow-period-ended"));
    }

    #[test]
    fn test_check_block_mandatory_coinbase_destination() {
        let mut params = ChainParams::regtest();
        params.mandatory_coinbase_destination = vec![0x51];
        let check = |b: &Block| check_block(b, &params).unwrap();

        assert!(check(&block(vec![coinbase(vec![pay(5), burn()])])).is_valid());

        let elsewhere = TransactionOutput::explicit(asset(), 5, vec![0x52]);
        assert_eq!(
            check(&block(vec![coinbase(vec![pay(5), elsewhere])])),
            ValidationResult::Invalid(RejectReason::CoinbaseDestination)
        );
    }

    #[test]
    fn test_connect_block_amounts_fees() {
        let prevout = OutPoint::new([1; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let reward = AmountMap::single(asset(), 50);
        let verifier = AmountVerifier::new();

        let tx = spend(prevout, vec![pay(990), fee(10)]);
        let b = block(vec![coinbase(vec![pay(60)]), tx.clone()]);
        let (result, fees) = connect_block_amounts(&b, &coins, &reward, &verifier).unwrap();
        assert!(result.is_valid());
        assert_eq!(fees, AmountMap::single(asset(), 10));

        let greedy = block(vec![coinbase(vec![pay(61)]), tx]);
        let (result, _) = connect_block_amounts(&greedy, &coins, &reward, &verifier).unwrap();
        assert_eq!(result.reject_reason().map(|r| r.to_string()).as_deref(), Some("bad-cb-amount"));
    }

    #[test]
    fn test_connect_block_amounts_missing_and_double_spend() {
        let prevout = OutPoint::new([1; 32], 0);
        let reward = AmountMap::new();
        let verifier = AmountVerifier::new();

        let b = block(vec![coinbase(vec![burn()]), spend(prevout, vec![pay(1_000)])]);
        let (result, _) = connect_block_amounts(&b, &UtxoSet::new(), &reward, &verifier).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));

        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let b = block(vec![
            coinbase(vec![burn()]),
            spend(prevout, vec![pay(1_000)]),
            spend(prevout, vec![pay(1_000)]),
        ]);
        let (result, _) = connect_block_amounts(&b, &coins, &reward, &verifier).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));
    }

    #[test]
    fn test_connect_block_amounts_chained_spend() {
        let prevout = OutPoint::new([1; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let first = spend(prevout, vec![pay(1_000)]);
        let second = spend(OutPoint::new(txid(&first), 0), vec![pay(999), fee(1)]);
        let b = block(vec![coinbase(vec![pay(1)]), first, second]);
        let (result, fees) = connect_block_amounts(&b, &coins, &AmountMap::new(), &AmountVerifier::new()).unwrap();
        assert!(result.is_valid());
        assert_eq!(fees.get(&asset()), 1);
    }

    #[test]
    fn test_connect_block_amounts_fee_not_spendable() {
        let prevout = OutPoint::new([1; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let reward = AmountMap::single(asset(), 50);
        let first = spend(prevout, vec![pay(990), fee(10)]);
        let second = spend(OutPoint::new(txid(&first), 1), vec![pay(10)]);
        let b = block(vec![coinbase(vec![pay(60)]), first, second]);
        let (result, fees) = connect_block_amounts(&b, &coins, &reward, &AmountVerifier::new()).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));
        assert!(fees.is_empty());

        // Nor from the coin view
        let stored = OutPoint::new([2; 32], 0);
        coins.insert(stored, Coin::new(fee(10), 1));
        let b = block(vec![coinbase(vec![burn()]), spend(stored, vec![pay(10)])]);
        let (result, _) = connect_block_amounts(&b, &coins, &AmountMap::new(), &AmountVerifier::new()).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));
    }

    #[test]
    fn test_connect_block_amounts_reward_not_spendable_in_block() {
        let prevout = OutPoint::new([1; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let reward = AmountMap::single(asset(), 50);
        let cb = coinbase(vec![pay(50)]);
        let respend = spend(OutPoint::new(txid(&cb), 0), vec![pay(50)]);
        let b = block(vec![cb, respend]);
        let (result, _) = connect_block_amounts(&b, &coins, &reward, &AmountVerifier::new()).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));

        let staked = OutPoint::new([4; 32], 0);
        coins.insert(staked, Coin::new(pay(1_000), 1));
        let mut coinstake = spend(staked, vec![fee(0), pay(1_050)]);
        coinstake.time = 1_000;
        let respend = spend(OutPoint::new(txid(&coinstake), 1), vec![pay(1_050)]);
        let mut b = block(vec![coinbase(vec![burn()]), coinstake, respend]);
        b.header.prevout_stake = staked;
        let (result, _) = connect_block_amounts(&b, &coins, &reward, &AmountVerifier::new()).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::InputsMissingOrSpent));
    }

    #[test]
    fn test_connect_block_amounts_unbalanced() {
        let prevout = OutPoint::new([1; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(prevout, Coin::new(pay(1_000), 1));
        let b = block(vec![coinbase(vec![burn()]), spend(prevout, vec![pay(1_001)])]);
        let (result, _) = connect_block_amounts(&b, &coins, &AmountMap::new(), &AmountVerifier::new()).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::Amounts(AmountError::BalanceCheckFailed)));
    }

    #[test]
    fn test_coinstake_amount_allowance() {
        let reward = AmountMap::single(asset(), 5);
        let spent = vec![pay(100)];
        let ok = spend(OutPoint::new([1; 32], 0), vec![fee(0), pay(105)]);
        assert_eq!(verify_coinstake_amount(&spent, &ok, &reward), Ok(()));

        let over = spend(OutPoint::new([1; 32], 0), vec![fee(0), pay(106)]);
        assert_eq!(verify_coinstake_amount(&spent, &over, &reward), Err(AmountError::CoinstakeExceedsAllowance));
    }

    #[test]
    fn test_connect_stake_block() {
        let staked = OutPoint::new([4; 32], 0);
        let mut coins = UtxoSet::new();
        coins.insert(staked, Coin::new(pay(1_000), 1));
        let reward = AmountMap::single(asset(), 20);
        let mut coinstake = spend(staked, vec![fee(0), pay(1_020)]);
        coinstake.time = 1_000;

        let mut b = block(vec![coinbase(vec![burn()]), coinstake]);
        b.header.prevout_stake = staked;
        let (result, _) = connect_block_amounts(&b, &coins, &reward, &AmountVerifier::new()).unwrap();
        assert!(result.is_valid());

        // The reward goes to the coinstake, not the coinbase
        let mut coinstake = spend(staked, vec![fee(0), pay(1_000)]);
        coinstake.time = 1_000;
        let mut b = block(vec![coinbase(vec![pay(20)]), coinstake]);
        b.header.prevout_stake = staked;
        let (result, _) = connect_block_amounts(&b, &coins, &reward, &AmountVerifier::new()).unwrap();
        assert_eq!(result.reject_reason().map(|r| r.to_string()).as_deref(), Some("bad-cb-amount"));
    }
}
