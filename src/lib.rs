//! # Confidential-Consensus
//!
//! Consensus core for a UTXO chain with confidential (blinded) amounts,
//! native asset issuance, proof-of-stake block admission and masternode
//! payments.
//!
//! The crate provides deterministic validation functions; storage, the
//! masternode list and governance state are supplied by the caller through
//! traits. The only long-lived state is the verification context and proof
//! cache held by [`ConsensusEngine`].
//!
//! ## Layers
//!
//! - Primitives: confidential values and assets, asset issuance, amount maps
//! - Confidential verifier: Pedersen balance, range and surjection proofs
//! - Structural checks: transactions and blocks
//! - Stake kernel and stake modifier, difficulty retarget
//! - Masternode and superblock payments
//!
//! ## Usage
//!
//! ```rust
//! use confidential_consensus::ConsensusEngine;
//! use confidential_consensus::confidential::AssetId;
//! use confidential_consensus::types::*;
//!
//! let engine = ConsensusEngine::default();
//! let tx = Transaction {
//!     inputs: vec![TransactionInput::new(OutPoint::new([1; 32], 0))],
//!     outputs: vec![TransactionOutput::explicit(AssetId([2; 32]), 1000, vec![0x51])],
//!     ..Transaction::default()
//! };
//! assert_eq!(engine.validate_transaction(&tx).unwrap(), ValidationResult::Valid);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod encode;
pub mod hashes;
pub mod confidential;
pub mod issuance;
pub mod amount;
pub mod checkqueue;
pub mod confidential_validation;
pub mod script;
pub mod transaction;
pub mod chain;
pub mod params;
pub mod pow;
pub mod pos;
pub mod masternode;
pub mod block;
pub mod index;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{AmountError, ConsensusError, RejectReason, Result};
pub use amount::AmountMap;
pub use chain::{BlockId, BlockIndex, BlockStore, BlockTree, CoinView};
pub use checkqueue::CheckQueue;
pub use confidential_validation::AmountVerifier;
pub use params::ChainParams;

use masternode::{Governance, MasternodeListSource};

/// Consensus validation entry point
///
/// Holds the chain parameters and the confidential verification context.
/// The engine is `Sync`; share one instance across validation threads.
///
/// # Examples
///
/// ```
/// use confidential_consensus::{ChainParams, ConsensusEngine};
///
/// let engine = ConsensusEngine::new(ChainParams::regtest());
/// assert_eq!(engine.params().network, "regtest");
/// ```
pub struct ConsensusEngine {
    params: ChainParams,
    verifier: AmountVerifier,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ChainParams::main())
    }
}

impl ConsensusEngine {
    pub fn new(params: ChainParams) -> Self {
        ConsensusEngine { params, verifier: AmountVerifier::new() }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn verifier(&self) -> &AmountVerifier {
        &self.verifier
    }

    /// Context-free transaction checks
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<ValidationResult> {
        transaction::check_transaction(tx, true)
    }

    /// Verify the confidential amounts of a non-coinbase transaction.
    ///
    /// With a queue, proof checks are deferred and the caller must drain it
    /// with [`ConsensusEngine::drain`] before accepting.
    pub fn verify_amounts(
        &self,
        spent: &[TransactionOutput],
        tx: &Transaction,
        queue: Option<&mut CheckQueue>,
    ) -> Result<ValidationResult> {
        Ok(self.verifier.verify_amounts(spent, tx, queue, true).map_err(RejectReason::Amounts).into())
    }

    /// Run every deferred check in `queue`
    pub fn drain(&self, queue: &mut CheckQueue) -> Result<ValidationResult> {
        Ok(queue.drain(&self.verifier).map_err(RejectReason::Amounts).into())
    }

    /// Coinbase outputs against the fees and reward it may claim
    pub fn verify_coinbase_amount(&self, tx: &Transaction, allowance: &AmountMap) -> Result<ValidationResult> {
        Ok(confidential_validation::verify_coinbase_amount(tx, allowance)
            .map_err(RejectReason::CoinbaseAmount)
            .into())
    }

    /// Block checks needing only the chain parameters
    pub fn validate_block(&self, block: &Block) -> Result<ValidationResult> {
        block::check_block(block, &self.params)
    }

    /// Structural checks followed by amount connection against `coins`.
    ///
    /// Returns the block's fee map when valid.
    pub fn connect_block(
        &self,
        block: &Block,
        coins: &dyn CoinView,
        reward: &AmountMap,
    ) -> Result<(ValidationResult, AmountMap)> {
        let structure = block::check_block(block, &self.params)?;
        if !structure.is_valid() {
            return Ok((structure, AmountMap::new()));
        }
        block::connect_block_amounts(block, coins, reward, &self.verifier)
    }

    /// Kernel check of a coinstake on top of `prev`
    pub fn check_proof_of_stake(
        &self,
        tree: &BlockTree,
        prev: BlockId,
        tx: &Transaction,
        bits: u32,
        coins: &dyn CoinView,
        store: &dyn BlockStore,
    ) -> Result<(ValidationResult, Option<Hash>)> {
        pos::check_proof_of_stake(tree, prev, tx, bits, coins, store, &self.params)
    }

    /// Stake block signature against the staked coin's script
    pub fn check_block_signature(&self, header: &BlockHeader, script_pubkey: &[u8]) -> Result<ValidationResult> {
        if pos::check_block_signature(header, script_pubkey) {
            Ok(ValidationResult::Valid)
        } else {
            Ok(ValidationResult::Invalid(RejectReason::BlockSignature))
        }
    }

    /// Compact target for the next block of the requested type after `last`
    pub fn get_next_work_required(&self, tree: &BlockTree, last: Option<BlockId>, proof_of_stake: bool) -> u32 {
        pow::get_next_work_required(tree, last, &self.params, proof_of_stake)
    }

    /// Header hash against its own compact target
    pub fn check_proof_of_work(&self, header: &BlockHeader) -> Result<ValidationResult> {
        let hash = block::block_hash(header);
        if pow::check_proof_of_work(&hash, header.bits, &self.params, false) {
            Ok(ValidationResult::Valid)
        } else {
            Ok(ValidationResult::Invalid(RejectReason::HighHash))
        }
    }

    pub fn is_block_value_valid(
        &self,
        block: &Block,
        height: u32,
        reward: &AmountMap,
        governance: &dyn Governance,
    ) -> Result<ValidationResult> {
        masternode::is_block_value_valid(block, height, reward, &self.params, governance)
    }

    pub fn is_block_payee_valid(
        &self,
        tx: &Transaction,
        height: u32,
        reward: &AmountMap,
        masternodes: &dyn MasternodeListSource,
        governance: &dyn Governance,
    ) -> Result<ValidationResult> {
        masternode::is_block_payee_valid(tx, height, reward, &self.params, masternodes, governance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidential::AssetId;

    fn asset() -> AssetId {
        AssetId([0x0c; 32])
    }

    #[test]
    fn test_engine_is_sync() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<ConsensusEngine>();
    }

    #[test]
    fn test_validate_transaction() {
        let engine = ConsensusEngine::default();
        let tx = Transaction {
            inputs: vec![TransactionInput::new(OutPoint::new([1; 32], 0))],
            outputs: vec![TransactionOutput::explicit(asset(), -1, vec![0x51])],
            ..Transaction::default()
        };
        let result = engine.validate_transaction(&tx).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::VoutNegative));
    }

    #[test]
    fn test_verify_amounts_with_queue() {
        let engine = ConsensusEngine::new(ChainParams::regtest());
        let spent = vec![TransactionOutput::explicit(asset(), 100, vec![0x51])];
        let tx = Transaction {
            inputs: vec![TransactionInput::new(OutPoint::new([1; 32], 0))],
            outputs: vec![
                TransactionOutput::explicit(asset(), 60, vec![0x51]),
                TransactionOutput::explicit(asset(), 40, vec![0x52]),
            ],
            ..Transaction::default()
        };
        let mut queue = CheckQueue::new();
        assert!(engine.verify_amounts(&spent, &tx, Some(&mut queue)).unwrap().is_valid());
        assert!(engine.drain(&mut queue).unwrap().is_valid());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_block_signature_result() {
        let engine = ConsensusEngine::default();
        let header = BlockHeader {
            version: 1,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            time: 0,
            height: 1,
            bits: 0x1e0fffff,
            nonce: 0,
            prevout_stake: OutPoint::new([1; 32], 0),
            block_sig: vec![0; 65],
        };
        let result = engine.check_block_signature(&header, &[0x51]).unwrap();
        assert_eq!(result, ValidationResult::Invalid(RejectReason::BlockSignature));
    }

    #[test]
    fn test_proof_of_work_limits() {
        let engine = ConsensusEngine::new(ChainParams::regtest());
        let mut header = BlockHeader {
            version: 1,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            time: 0,
            height: 1,
            bits: 0x207fffff,
            nonce: 0,
            prevout_stake: OutPoint::null(),
            block_sig: vec![],
        };
        // Any hash with a clear top bit meets the regtest limit
        let mut found = false;
        for nonce in 0..64 {
            header.nonce = nonce;
            if engine.check_proof_of_work(&header).unwrap().is_valid() {
                found = true;
                break;
            }
        }
        assert!(found);

        header.bits = 0x1d00ffff;
        assert_eq!(engine.check_proof_of_work(&header).unwrap(), ValidationResult::Invalid(RejectReason::HighHash));
    }
}
