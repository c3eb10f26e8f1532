//! Consensus constants for the confidential-asset chain

/// Base units per coin
pub const COIN: i64 = 100_000_000;

/// Maximum money supply per asset
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Seconds per day, the unit of coin-day weight
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Maximum block weight
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;

/// Scale factor between base size and weight
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Maximum size of a special transaction's extra payload
pub const MAX_TX_EXTRA_PAYLOAD: usize = 10_000;

/// Maximum script length; longer scripts are unspendable
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum coinbase scriptSig length
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;

/// Minimum value for an output paying to a cold-staking script
pub const MIN_COLD_STAKING_AMOUNT: i64 = COIN;

/// Sequence number for final inputs
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Outpoint index marking a coinbase (null) prevout
pub const NULL_INDEX: u32 = u32::MAX;

/// Outpoint index flag: input carries an asset issuance
pub const OUTPOINT_ISSUANCE_FLAG: u32 = 1 << 31;

/// Outpoint index flag: input is a peg-in (reserved, never accepted)
pub const OUTPOINT_PEGIN_FLAG: u32 = 1 << 30;

/// Mask extracting the output index from a serialized outpoint index
pub const OUTPOINT_INDEX_MASK: u32 = 0x3fff_ffff;

/// Serialized size of an explicit value payload (prefix included)
pub const EXPLICIT_VALUE_SIZE: usize = 9;

/// Serialized size of an explicit asset or nonce payload (prefix included)
pub const EXPLICIT_ASSET_SIZE: usize = 33;

/// Serialized size of any commitment (prefix included)
pub const COMMITTED_SIZE: usize = 33;

/// Legal commitment prefixes for values
pub const VALUE_COMMITMENT_PREFIXES: [u8; 2] = [0x08, 0x09];

/// Legal commitment prefixes for assets
pub const ASSET_COMMITMENT_PREFIXES: [u8; 2] = [0x0a, 0x0b];

/// Legal commitment prefixes for nonces (compressed public keys)
pub const NONCE_COMMITMENT_PREFIXES: [u8; 2] = [0x02, 0x03];

/// Rangeproof parameters used when constructing proofs
pub const RANGEPROOF_MIN_VALUE: u64 = 1;
pub const RANGEPROOF_EXPONENT: i32 = 0;
pub const RANGEPROOF_MIN_BITS: u8 = 52;

/// Ratio of group interval to stake modifier interval
pub const MODIFIER_INTERVAL_RATIO: i64 = 3;

/// Number of 64-bit selection rounds in a stake modifier
pub const MODIFIER_SELECTION_ROUNDS: usize = 64;

/// Masternode operator reward is expressed in basis points
pub const OPERATOR_REWARD_DENOMINATOR: i64 = 10_000;

/// Masternode share of the block reward is expressed in permille
pub const MASTERNODE_SHARE_DENOMINATOR: i64 = 1_000;

// Script opcodes used by classification
pub const OP_0: u8 = 0x00;
pub const OP_PUSHBYTES_20: u8 = 0x14;
pub const OP_IF: u8 = 0x63;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKCOLDSTAKEVERIFY: u8 = 0xd1;
