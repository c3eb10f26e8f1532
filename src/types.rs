//! Core chain types for consensus validation

use crate::confidential::{AssetIssuance, ConfidentialAsset, ConfidentialNonce, ConfidentialValue};
use crate::constants::*;
use crate::error::RejectReason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hash type: 256-bit hash, little-endian byte order as stored on the wire
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Signed amount in base units
pub type Amount = i64;

/// OutPoint: 𝒪 = ℍ × ℕ₃₂
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The prevout of a coinbase input
    pub fn null() -> Self {
        OutPoint { hash: [0; 32], index: NULL_INDEX }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0; 32] && self.index == NULL_INDEX
    }
}

impl Default for OutPoint {
    fn default() -> Self {
        OutPoint::null()
    }
}

/// Transaction Input: ℐ = 𝒪 × 𝕊 × ℕ × Issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
    pub asset_issuance: AssetIssuance,
}

impl TransactionInput {
    pub fn new(prevout: OutPoint) -> Self {
        TransactionInput {
            prevout,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
            asset_issuance: AssetIssuance::default(),
        }
    }

    pub fn has_issuance(&self) -> bool {
        !self.asset_issuance.is_null()
    }
}

/// Transaction Output: 𝒯 = Asset × Value × Nonce × 𝕊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub asset: ConfidentialAsset,
    pub value: ConfidentialValue,
    pub nonce: ConfidentialNonce,
    pub script_pubkey: ByteString,
}

impl TransactionOutput {
    /// An output with explicit asset and value and a null nonce
    pub fn explicit(asset: crate::confidential::AssetId, value: Amount, script_pubkey: ByteString) -> Self {
        TransactionOutput {
            asset: ConfidentialAsset::Explicit(asset),
            value: ConfidentialValue::Explicit(value),
            nonce: ConfidentialNonce::Null,
            script_pubkey,
        }
    }

    /// The empty output marking a coinstake: explicit zero value, empty script
    pub fn is_empty(&self) -> bool {
        self.value.explicit() == Some(0) && self.script_pubkey.is_empty()
    }

    pub fn is_null(&self) -> bool {
        self.asset.is_null() && self.value.is_null() && self.nonce.is_null() && self.script_pubkey.is_empty()
    }

    /// Fee outputs carry an empty script and explicit amounts
    pub fn is_fee(&self) -> bool {
        self.script_pubkey.is_empty() && self.value.is_explicit() && self.asset.is_explicit()
    }
}

/// Special transaction types carried in the upper half of the version field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum TxType {
    Normal = 0,
    ProviderRegister = 1,
    ProviderUpdateService = 2,
    ProviderUpdateRegistrar = 3,
    ProviderUpdateRevoke = 4,
    Coinbase = 5,
    QuorumCommitment = 6,
    GovernanceVote = 7,
}

impl TxType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => TxType::Normal,
            1 => TxType::ProviderRegister,
            2 => TxType::ProviderUpdateService,
            3 => TxType::ProviderUpdateRegistrar,
            4 => TxType::ProviderUpdateRevoke,
            5 => TxType::Coinbase,
            6 => TxType::QuorumCommitment,
            7 => TxType::GovernanceVote,
            _ => return None,
        })
    }
}

/// Per-input witness data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInWitness {
    pub issuance_amount_rangeproof: ByteString,
    pub inflation_keys_rangeproof: ByteString,
    pub script_witness: Vec<ByteString>,
}

impl TxInWitness {
    pub fn is_null(&self) -> bool {
        self.issuance_amount_rangeproof.is_empty()
            && self.inflation_keys_rangeproof.is_empty()
            && self.script_witness.is_empty()
    }
}

/// Per-output witness data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutWitness {
    pub surjection_proof: ByteString,
    pub rangeproof: ByteString,
}

impl TxOutWitness {
    pub fn is_null(&self) -> bool {
        self.surjection_proof.is_empty() && self.rangeproof.is_empty()
    }
}

/// Witness side-structure; never longer than the inputs/outputs it annotates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxWitness {
    pub inputs: Vec<TxInWitness>,
    pub outputs: Vec<TxOutWitness>,
}

impl TxWitness {
    pub fn is_null(&self) -> bool {
        self.inputs.iter().all(TxInWitness::is_null) && self.outputs.iter().all(TxOutWitness::is_null)
    }
}

/// Transaction: 𝒯𝒳 = ℕ × TxType × ℕ × ℐ* × 𝒯* × ℕ × Payload × Witness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i16,
    pub tx_type: u16,
    pub time: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
    pub extra_payload: ByteString,
    pub witness: TxWitness,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 1,
            tx_type: TxType::Normal as u16,
            time: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            extra_payload: Vec::new(),
            witness: TxWitness::default(),
        }
    }
}

impl Transaction {
    pub fn kind(&self) -> Option<TxType> {
        TxType::from_u16(self.tx_type)
    }

    pub fn has_witness(&self) -> bool {
        !self.witness.is_null()
    }

    pub fn input_witness(&self, index: usize) -> Option<&TxInWitness> {
        self.witness.inputs.get(index)
    }

    pub fn output_witness(&self, index: usize) -> Option<&TxOutWitness> {
        self.witness.outputs.get(index)
    }
}

/// Block Header: ℋ = ℤ × ℍ × ℍ × ℕ × ℕ × ℕ × ℕ × 𝒪 × 𝕊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub height: u32,
    pub bits: u32,
    pub nonce: u32,
    pub prevout_stake: OutPoint,
    pub block_sig: ByteString,
}

impl BlockHeader {
    pub fn is_proof_of_stake(&self) -> bool {
        !self.prevout_stake.is_null()
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }
}

/// Block: ℬ = ℋ × 𝒯𝒳*
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_proof_of_stake(&self) -> bool {
        self.header.is_proof_of_stake()
    }

    /// The coinstake of a stake block is its second transaction
    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            self.transactions.get(1)
        } else {
            None
        }
    }
}

/// Unspent coin as resolved by the coin view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub output: TransactionOutput,
    pub height: u32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

impl Coin {
    pub fn new(output: TransactionOutput, height: u32) -> Self {
        Coin { output, height, is_coinbase: false, is_coinstake: false }
    }
}

/// UTXO Set: 𝒰𝒮 = 𝒪 → Coin
pub type UtxoSet = HashMap<OutPoint, Coin>;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(RejectReason),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(reason) => Some(reason),
        }
    }
}

impl From<std::result::Result<(), RejectReason>> for ValidationResult {
    fn from(result: std::result::Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => ValidationResult::Valid,
            Err(reason) => ValidationResult::Invalid(reason),
        }
    }
}
