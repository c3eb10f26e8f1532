//! Confidential transaction amount verification
//!
//! [`AmountVerifier::verify_amounts`] rebuilds a Pedersen commitment and an
//! asset generator for every input, issuance pseudo-input and output, checks
//! that the commitments balance, then verifies range proofs on blinded values
//! and surjection proofs on blinded assets. Proof verification can be
//! deferred to a [`CheckQueue`] and drained in parallel.

use crate::amount::{money_range, AmountMap};
use crate::checkqueue::{queue_check, CheckQueue, CheckResult, ProofCache};
use crate::confidential::{AssetId, ConfidentialAsset, ConfidentialValue};
use crate::error::AmountError;
use crate::issuance::{calculate_asset, calculate_reissuance_token, generate_asset_entropy};
use crate::script::is_unspendable;
use crate::types::*;
use log::{debug, trace};
use secp256k1_zkp::{
    verify_commitments_sum_to_equal, All, Generator, PedersenCommitment, RangeProof, Secp256k1,
    SurjectionProof, Tag, Tweak,
};

/// Default number of verified proofs remembered by the cache
pub const DEFAULT_PROOF_CACHE_SIZE: usize = 100_000;

const CACHE_TAG_RANGEPROOF: u8 = 1;
const CACHE_TAG_SURJECTION: u8 = 2;

/// Verification context for confidential amounts.
///
/// Owns the curve context and the proof cache; construct once and share by
/// reference. The verifier is `Sync`, so queued checks may run on any thread.
pub struct AmountVerifier {
    secp: Secp256k1<All>,
    cache: ProofCache,
}

impl Default for AmountVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AmountVerifier {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_PROOF_CACHE_SIZE)
    }

    pub fn with_cache_size(capacity: usize) -> Self {
        AmountVerifier { secp: Secp256k1::new(), cache: ProofCache::new(capacity) }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub fn cache(&self) -> &ProofCache {
        &self.cache
    }

    /// Generator for an explicit asset id
    pub fn asset_generator(&self, asset: &AssetId) -> Generator {
        Generator::new_unblinded(&self.secp, Tag::from(asset.0))
    }

    /// VerifyAmounts: 𝒯* × 𝒯𝒳 × Queue? × 𝔹 → {ok, AmountError}
    ///
    /// `spent` holds the resolved previous output of every input, in input
    /// order. When `queue` is supplied, range and surjection proof checks are
    /// pushed onto it and the caller must drain it before accepting; otherwise
    /// they run inline and the first failure is returned. The balance check
    /// always runs inline. With `store_result`, successful proof
    /// verifications are remembered in the proof cache.
    ///
    /// # Panics
    ///
    /// Panics if called on a coinbase transaction.
    pub fn verify_amounts(
        &self,
        spent: &[TransactionOutput],
        tx: &Transaction,
        mut queue: Option<&mut CheckQueue>,
        store_result: bool,
    ) -> CheckResult {
        assert!(!crate::transaction::is_coinbase(tx), "verify_amounts called on coinbase");
        if spent.len() != tx.inputs.len() {
            return Err(AmountError::SpentOutputCount { inputs: tx.inputs.len(), spent: spent.len() });
        }

        let mut inputs_commits: Vec<PedersenCommitment> = Vec::with_capacity(tx.inputs.len());
        let mut outputs_commits: Vec<PedersenCommitment> = Vec::with_capacity(tx.outputs.len());
        // Surjection domain: each input, then its issuance asset, then its token
        let mut target_generators: Vec<Generator> = Vec::with_capacity(tx.inputs.len());

        for (i, (input, prev)) in tx.inputs.iter().zip(spent).enumerate() {
            let gen = match &prev.asset {
                ConfidentialAsset::Explicit(asset) => self.asset_generator(asset),
                ConfidentialAsset::Confidential(c) => Generator::from_slice(c.as_bytes())
                    .map_err(|_| reject(AmountError::InputAssetCommitment(i)))?,
                ConfidentialAsset::Null => return Err(reject(AmountError::NullInput(i))),
            };
            let commit = match &prev.value {
                ConfidentialValue::Explicit(amount) => {
                    if !money_range(*amount) || *amount == 0 {
                        return Err(reject(AmountError::InputValueOutOfRange(i)));
                    }
                    PedersenCommitment::new_unblinded(&self.secp, *amount as u64, gen)
                }
                ConfidentialValue::Confidential(c) => PedersenCommitment::from_slice(c.as_bytes())
                    .map_err(|_| reject(AmountError::InputValueCommitment(i)))?,
                ConfidentialValue::Null => return Err(reject(AmountError::NullInput(i))),
            };
            target_generators.push(gen);
            inputs_commits.push(commit);

            let issuance = &input.asset_issuance;
            if issuance.is_null() {
                continue;
            }

            let (asset_id, token_id) = if !issuance.is_reissuance() {
                let entropy = generate_asset_entropy(&input.prevout, &issuance.asset_entropy);
                (
                    calculate_asset(&entropy),
                    calculate_reissuance_token(&entropy, issuance.amount.is_commitment()),
                )
            } else {
                // Stored entropy is used directly on reissuance
                let token_id =
                    calculate_reissuance_token(&issuance.asset_entropy, issuance.amount.is_commitment());
                let blinding = Tweak::from_slice(&issuance.asset_blinding_nonce)
                    .map_err(|_| reject(AmountError::ReissuanceTokenMismatch(i)))?;
                let derived = Generator::new_blinded(&self.secp, Tag::from(token_id.0), blinding);
                // The spent output must carry exactly this blinded token commitment
                let matches = match &prev.asset {
                    ConfidentialAsset::Confidential(c) => c.as_bytes()[..] == derived.serialize()[..],
                    _ => false,
                };
                if !matches {
                    return Err(reject(AmountError::ReissuanceTokenMismatch(i)));
                }
                (calculate_asset(&issuance.asset_entropy), token_id)
            };

            let witness = tx.input_witness(i);
            if !issuance.amount.is_null() {
                let witness = witness.ok_or_else(|| reject(AmountError::MissingIssuanceWitness(i)))?;
                let (gen, commit) = self.issuance_commitment(
                    i,
                    &asset_id,
                    &issuance.amount,
                    &witness.issuance_amount_rangeproof,
                    &mut queue,
                    store_result,
                )?;
                target_generators.push(gen);
                inputs_commits.push(commit);
            }

            if !issuance.inflation_keys.is_null() {
                if issuance.is_reissuance() {
                    return Err(reject(AmountError::InflationKeysOnReissuance(i)));
                }
                let witness = witness.ok_or_else(|| reject(AmountError::MissingIssuanceWitness(i)))?;
                let (gen, commit) = self.issuance_commitment(
                    i,
                    &token_id,
                    &issuance.inflation_keys,
                    &witness.inflation_keys_rangeproof,
                    &mut queue,
                    store_result,
                )?;
                target_generators.push(gen);
                inputs_commits.push(commit);
            }
        }

        // Output generators are kept for the range proof pass
        let mut output_generators: Vec<Generator> = Vec::with_capacity(tx.outputs.len());
        for (i, output) in tx.outputs.iter().enumerate() {
            if !output.asset.is_valid() || !output.value.is_valid() || !output.nonce.is_valid() {
                return Err(reject(AmountError::InvalidOutput(i)));
            }
            let gen = match &output.asset {
                ConfidentialAsset::Explicit(asset) => self.asset_generator(asset),
                ConfidentialAsset::Confidential(c) => Generator::from_slice(c.as_bytes())
                    .map_err(|_| reject(AmountError::OutputAssetCommitment(i)))?,
                ConfidentialAsset::Null => return Err(reject(AmountError::InvalidOutput(i))),
            };
            output_generators.push(gen);
            let commit = match &output.value {
                ConfidentialValue::Explicit(amount) => {
                    if !money_range(*amount) {
                        return Err(reject(AmountError::OutputValueOutOfRange(i)));
                    }
                    if *amount == 0 {
                        if is_unspendable(&output.script_pubkey) {
                            continue;
                        }
                        return Err(reject(AmountError::SpendableZeroValue(i)));
                    }
                    PedersenCommitment::new_unblinded(&self.secp, *amount as u64, gen)
                }
                ConfidentialValue::Confidential(c) => PedersenCommitment::from_slice(c.as_bytes())
                    .map_err(|_| reject(AmountError::OutputValueCommitment(i)))?,
                ConfidentialValue::Null => return Err(reject(AmountError::InvalidOutput(i))),
            };
            outputs_commits.push(commit);
        }

        if !verify_commitments_sum_to_equal(&self.secp, &inputs_commits, &outputs_commits) {
            return Err(reject(AmountError::BalanceCheckFailed));
        }

        for (i, output) in tx.outputs.iter().enumerate() {
            let witness = tx.output_witness(i);
            let commitment = match &output.value {
                ConfidentialValue::Confidential(c) => *c,
                _ => {
                    if witness.map_or(false, |w| !w.rangeproof.is_empty()) {
                        return Err(reject(AmountError::RangeproofForbidden(i)));
                    }
                    continue;
                }
            };
            let proof = match witness {
                Some(w) if !w.rangeproof.is_empty() => w.rangeproof.clone(),
                _ => return Err(reject(AmountError::MissingRangeproof(i))),
            };
            let gen = output_generators[i];
            let script = output.script_pubkey.clone();
            queue_check(
                &mut queue,
                self,
                Box::new(move |verifier: &AmountVerifier| {
                    verifier.check_rangeproof(&proof, commitment.as_bytes(), gen, &script, store_result, i)
                }),
            )
            .map_err(reject)?;
        }

        for (i, output) in tx.outputs.iter().enumerate() {
            let witness = tx.output_witness(i);
            let commitment = match &output.asset {
                ConfidentialAsset::Confidential(c) => *c,
                _ => {
                    if witness.map_or(false, |w| !w.surjection_proof.is_empty()) {
                        return Err(reject(AmountError::SurjectionProofForbidden(i)));
                    }
                    continue;
                }
            };
            let raw = match witness {
                Some(w) if !w.surjection_proof.is_empty() => w.surjection_proof.clone(),
                _ => return Err(reject(AmountError::MissingSurjectionProof(i))),
            };
            let gen = Generator::from_slice(commitment.as_bytes())
                .map_err(|_| reject(AmountError::OutputAssetCommitment(i)))?;
            let proof =
                SurjectionProof::from_slice(&raw).map_err(|_| reject(AmountError::SurjectionProof(i)))?;
            let domain = target_generators.clone();
            queue_check(
                &mut queue,
                self,
                Box::new(move |verifier: &AmountVerifier| {
                    verifier.check_surjection_proof(&proof, &raw, gen, &domain, store_result, i)
                }),
            )
            .map_err(reject)?;
        }

        Ok(())
    }

    /// Generator and commitment contributed by an issuance amount field.
    ///
    /// Explicit amounts must be in range, non-zero and carry no rangeproof.
    /// Committed amounts require a rangeproof against the issued asset with an
    /// empty script.
    fn issuance_commitment(
        &self,
        input: usize,
        asset: &AssetId,
        value: &ConfidentialValue,
        rangeproof: &[u8],
        queue: &mut Option<&mut CheckQueue>,
        store_result: bool,
    ) -> std::result::Result<(Generator, PedersenCommitment), AmountError> {
        let gen = self.asset_generator(asset);
        let commit = match value {
            ConfidentialValue::Explicit(amount) => {
                if !money_range(*amount) || *amount == 0 {
                    return Err(reject(AmountError::IssuanceAmountOutOfRange(input)));
                }
                if !rangeproof.is_empty() {
                    return Err(reject(AmountError::IssuanceRangeproofForbidden(input)));
                }
                PedersenCommitment::new_unblinded(&self.secp, *amount as u64, gen)
            }
            ConfidentialValue::Confidential(c) => {
                let commitment = *c;
                let proof = rangeproof.to_vec();
                queue_check(
                    queue,
                    self,
                    Box::new(move |verifier: &AmountVerifier| {
                        verifier
                            .check_rangeproof(&proof, commitment.as_bytes(), gen, &[], store_result, input)
                            .map_err(|_| AmountError::IssuanceRangeproof(input))
                    }),
                )
                .map_err(reject)?;
                PedersenCommitment::from_slice(c.as_bytes())
                    .map_err(|_| reject(AmountError::IssuanceCommitment(input)))?
            }
            ConfidentialValue::Null => return Err(reject(AmountError::IssuanceCommitment(input))),
        };
        Ok((gen, commit))
    }

    /// Verify a rangeproof on a value commitment, binding the output script
    fn check_rangeproof(
        &self,
        proof: &[u8],
        commitment: &[u8],
        gen: Generator,
        script: &[u8],
        store_result: bool,
        output: usize,
    ) -> CheckResult {
        let gen_bytes = gen.serialize();
        let key = ProofCache::key(CACHE_TAG_RANGEPROOF, &[proof, commitment, &gen_bytes, script]);
        if self.cache.contains(&key) {
            return Ok(());
        }

        let commit = PedersenCommitment::from_slice(commitment).map_err(|_| AmountError::Rangeproof(output))?;
        let proof = RangeProof::from_slice(proof).map_err(|_| AmountError::Rangeproof(output))?;
        proof
            .verify(&self.secp, commit, script, gen)
            .map_err(|_| AmountError::Rangeproof(output))?;

        if store_result {
            self.cache.insert(key);
        }
        Ok(())
    }

    fn check_surjection_proof(
        &self,
        proof: &SurjectionProof,
        raw: &[u8],
        gen: Generator,
        domain: &[Generator],
        store_result: bool,
        output: usize,
    ) -> CheckResult {
        let gen_bytes = gen.serialize();
        let domain_bytes: Vec<u8> = domain.iter().flat_map(|g| g.serialize()).collect();
        let key = ProofCache::key(CACHE_TAG_SURJECTION, &[raw, &gen_bytes, &domain_bytes]);
        if self.cache.contains(&key) {
            return Ok(());
        }

        if !proof.verify(&self.secp, gen, domain) {
            return Err(AmountError::SurjectionProof(output));
        }

        if store_result {
            self.cache.insert(key);
        }
        Ok(())
    }
}

fn reject(err: AmountError) -> AmountError {
    debug!("verify_amounts: {}", err);
    err
}

/// VerifyCoinbaseAmount: 𝒯𝒳 × AmountMap → {ok, AmountError}
///
/// Coinbase outputs carry no witness, are fully explicit and in range, pay
/// zero only to unspendable scripts, and never exceed `allowance` per asset.
///
/// # Panics
///
/// Panics if `tx` is not a coinbase.
pub fn verify_coinbase_amount(tx: &Transaction, allowance: &AmountMap) -> CheckResult {
    assert!(crate::transaction::is_coinbase(tx), "verify_coinbase_amount called on non-coinbase");

    if tx.witness.outputs.iter().any(|w| !w.is_null()) {
        return Err(reject(AmountError::CoinbaseWitness));
    }

    let mut remaining = allowance.clone();
    for (i, output) in tx.outputs.iter().enumerate() {
        let (asset, amount) = match (output.asset.explicit(), output.value.explicit()) {
            (Some(asset), Some(amount)) => (asset, amount),
            _ => return Err(reject(AmountError::CoinbaseNotExplicit(i))),
        };
        if !money_range(amount) {
            return Err(reject(AmountError::CoinbaseNotExplicit(i)));
        }
        if amount == 0 && !is_unspendable(&output.script_pubkey) {
            return Err(reject(AmountError::SpendableZeroValue(i)));
        }
        remaining.add_amount(asset, -amount);
    }

    if !remaining.money_range() {
        trace!("coinbase pays more than allowed: remaining {}", remaining);
        return Err(reject(AmountError::CoinbaseExceedsAllowance));
    }
    Ok(())
}

/// HasValidFee: 𝒯𝒳 → 𝔹
///
/// Every fee output is non-zero and in range, and the per-asset fee totals
/// stay in range.
pub fn has_valid_fee(tx: &Transaction) -> bool {
    let mut total = AmountMap::new();
    for output in tx.outputs.iter().filter(|o| o.is_fee()) {
        let fee = output.value.amount();
        if fee == 0 || !money_range(fee) {
            return false;
        }
        total.add_amount(output.asset.asset(), fee);
        if !total.money_range() {
            return false;
        }
    }
    true
}

/// GetFeeMap: 𝒯𝒳 → AmountMap
///
/// Sum of the explicit fee outputs per asset.
pub fn get_fee_map(tx: &Transaction) -> AmountMap {
    tx.outputs
        .iter()
        .filter(|o| o.is_fee())
        .map(|o| (o.asset.asset(), o.value.amount()))
        .collect()
}
