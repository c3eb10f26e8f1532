//! Error types for consensus validation
//!
//! Three families are kept apart:
//! - [`ConsensusError`]: operational failures (encoding, unavailable indexes,
//!   unreadable block files). These never mean "the data is invalid".
//! - [`RejectReason`]: consensus rule violations. The `Display` output is the
//!   stable rejection code shared with peer software.
//! - [`AmountError`]: detailed failures of the confidential amount verifier.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction index not available")]
    TxIndexUnavailable,

    #[error("Transaction index entry not found: {0}")]
    TxIndexEntryMissing(String),

    #[error("Block file read failed: {0}")]
    BlockRead(String),

    #[error("Transaction mismatch: {0}")]
    TxMismatch(String),

    #[error("Block index not found: {0}")]
    BlockIndexMissing(String),

    #[error("Invalid chain parameters: {0}")]
    InvalidParams(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Consensus rejection reasons with their stable identifier strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    // Structural transaction checks
    #[error("bad-txns-vin-empty")]
    VinEmpty,
    #[error("bad-txns-vout-empty")]
    VoutEmpty,
    #[error("bad-txns-oversize")]
    Oversize,
    #[error("bad-txns-payload-oversize")]
    PayloadOversize,
    #[error("bad-txns-vout-empty-or-invalid")]
    VoutEmptyOrInvalid,
    #[error("bad-txns-vout-negative")]
    VoutNegative,
    #[error("bad-txns-vout-toolarge")]
    VoutTooLarge,
    #[error("bad-txns-txouttotal-toolarge")]
    TxOutTotalTooLarge,
    #[error("bad-txns-cold-stake-value")]
    ColdStakeValue,
    #[error("bad-txns-vout-not-explicit-value")]
    VoutNotExplicitValue,
    #[error("bad-txns-vout-not-explicit-asset")]
    VoutNotExplicitAsset,
    #[error("bad-txns-inputs-duplicate")]
    InputsDuplicate,
    #[error("bad-cb-length")]
    CoinbaseLength,
    #[error("bad-txns-prevout-null")]
    PrevoutNull,

    // Block structure
    #[error("bad-blk-length")]
    BlockLength,
    #[error("bad-cb-missing")]
    CoinbaseMissing,
    #[error("bad-cb-multiple")]
    CoinbaseMultiple,
    #[error("bad-cs-missing")]
    CoinstakeMissing,
    #[error("bad-cs-multiple")]
    CoinstakeMultiple,
    #[error("bad-txnmrklroot")]
    MerkleRoot,
    #[error("bad-coinbase-txos")]
    CoinbaseDestination,
    #[error("pow-period-ended")]
    PowPeriodEnded,

    // Contextual amount checks
    #[error("bad-txns-inputs-missingorspent")]
    InputsMissingOrSpent,
    #[error("bad-txns-in-ne-out")]
    Amounts(AmountError),
    #[error("bad-txns-fee-outofrange")]
    FeeOutOfRange,
    #[error("bad-cb-amount")]
    CoinbaseAmount(AmountError),
    #[error("bad-cs-amount")]
    CoinstakeAmount(AmountError),

    // Proof of work
    #[error("bad-diffbits")]
    BadDiffBits,
    #[error("high-hash")]
    HighHash,

    // Proof of stake
    #[error("bad-cs-not-coinstake")]
    NotCoinstake,
    #[error("stake-prevout-not-exist")]
    StakePrevoutMissing,
    #[error("stake-value-not-explicit")]
    StakeValueNotExplicit,
    #[error("stake-ntime-violation")]
    StakeTimeViolation,
    #[error("stake-min-age-violation")]
    StakeMinAge,
    #[error("stake-modifier-unavailable")]
    StakeModifierUnavailable,
    #[error("stake-kernel-check-failed")]
    KernelHashAboveTarget,
    #[error("bad-cs-timestamp")]
    CoinstakeTimestamp,
    #[error("bad-block-signature")]
    BlockSignature,

    // Masternode and superblock payments
    #[error("bad-cb-amount")]
    BlockValue(String),
    #[error("bad-cb-payee")]
    BlockPayee(String),
}

/// Failures of the confidential amount verifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("{inputs} inputs but {spent} spent outputs")]
    SpentOutputCount { inputs: usize, spent: usize },

    #[error("input {0}: null value or asset (bad-encoding)")]
    NullInput(usize),

    #[error("input {0}: explicit value out of range")]
    InputValueOutOfRange(usize),

    #[error("input {0}: invalid asset commitment")]
    InputAssetCommitment(usize),

    #[error("input {0}: invalid value commitment")]
    InputValueCommitment(usize),

    #[error("input {0}: reissuance token commitment mismatch")]
    ReissuanceTokenMismatch(usize),

    #[error("input {0}: inflation keys on reissuance")]
    InflationKeysOnReissuance(usize),

    #[error("input {0}: issuance without witness")]
    MissingIssuanceWitness(usize),

    #[error("input {0}: explicit issuance amount out of range")]
    IssuanceAmountOutOfRange(usize),

    #[error("input {0}: rangeproof on explicit issuance amount")]
    IssuanceRangeproofForbidden(usize),

    #[error("input {0}: invalid issuance amount commitment")]
    IssuanceCommitment(usize),

    #[error("input {0}: issuance rangeproof failed")]
    IssuanceRangeproof(usize),

    #[error("output {0}: invalid asset, value or nonce")]
    InvalidOutput(usize),

    #[error("output {0}: no spendable 0-value outputs")]
    SpendableZeroValue(usize),

    #[error("output {0}: explicit value out of range")]
    OutputValueOutOfRange(usize),

    #[error("output {0}: invalid asset commitment")]
    OutputAssetCommitment(usize),

    #[error("output {0}: invalid value commitment")]
    OutputValueCommitment(usize),

    #[error("value commitments do not balance")]
    BalanceCheckFailed,

    #[error("output {0}: rangeproof on explicit value")]
    RangeproofForbidden(usize),

    #[error("output {0}: missing rangeproof")]
    MissingRangeproof(usize),

    #[error("output {0}: rangeproof failed")]
    Rangeproof(usize),

    #[error("output {0}: surjection proof on explicit asset")]
    SurjectionProofForbidden(usize),

    #[error("output {0}: missing surjection proof")]
    MissingSurjectionProof(usize),

    #[error("output {0}: surjection proof failed")]
    SurjectionProof(usize),

    #[error("coinbase output witness present")]
    CoinbaseWitness,

    #[error("coinbase output {0}: not explicit or out of range")]
    CoinbaseNotExplicit(usize),

    #[error("coinbase outputs exceed fees and reward")]
    CoinbaseExceedsAllowance,

    #[error("coinstake input or output {0}: not explicit")]
    CoinstakeNotExplicit(usize),

    #[error("coinstake outputs exceed inputs and reward")]
    CoinstakeExceedsAllowance,
}
