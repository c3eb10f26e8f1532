//! Confidential value, asset and nonce primitives
//!
//! Each field is either null, an explicit amount / asset id / nonce, or a
//! 33-byte commitment whose first byte is one of two legal prefixes. The wire
//! encoding lives in [`crate::encode`]; the in-memory form is a sum type so
//! every use site matches on the state instead of inspecting prefix bytes.

use crate::constants::*;
use crate::types::{Amount, Hash};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 256-bit asset identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(pub [u8; 32]);

impl AssetId {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(AssetId)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", hex::encode(self.0))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<Hash> for AssetId {
    fn from(hash: Hash) -> Self {
        AssetId(hash)
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        AssetId::from_slice(&bytes).ok_or_else(|| de::Error::invalid_length(bytes.len(), &"32 bytes"))
    }
}

/// Serialized elliptic-curve commitment, prefix byte included
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment(pub [u8; COMMITTED_SIZE]);

impl Commitment {
    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    pub fn as_bytes(&self) -> &[u8; COMMITTED_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(self.0))
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        <[u8; COMMITTED_SIZE]>::try_from(bytes.as_slice())
            .map(Commitment)
            .map_err(|_| de::Error::invalid_length(bytes.len(), &"33 bytes"))
    }
}

/// Value field of an output or issuance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidentialValue {
    #[default]
    Null,
    Explicit(Amount),
    Confidential(Commitment),
}

impl ConfidentialValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConfidentialValue::Null)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ConfidentialValue::Explicit(_))
    }

    pub fn is_commitment(&self) -> bool {
        matches!(self, ConfidentialValue::Confidential(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ConfidentialValue::Null | ConfidentialValue::Explicit(_) => true,
            ConfidentialValue::Confidential(c) => VALUE_COMMITMENT_PREFIXES.contains(&c.prefix()),
        }
    }

    pub fn explicit(&self) -> Option<Amount> {
        match self {
            ConfidentialValue::Explicit(amount) => Some(*amount),
            _ => None,
        }
    }

    pub fn commitment(&self) -> Option<&Commitment> {
        match self {
            ConfidentialValue::Confidential(c) => Some(c),
            _ => None,
        }
    }

    /// The explicit amount.
    ///
    /// # Panics
    ///
    /// Panics if the value is not explicit; callers branch on
    /// [`is_explicit`](Self::is_explicit) first.
    pub fn amount(&self) -> Amount {
        match self {
            ConfidentialValue::Explicit(amount) => *amount,
            other => panic!("amount() called on non-explicit value {:?}", other),
        }
    }
}

/// Asset field of an output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidentialAsset {
    #[default]
    Null,
    Explicit(AssetId),
    Confidential(Commitment),
}

impl ConfidentialAsset {
    pub fn is_null(&self) -> bool {
        matches!(self, ConfidentialAsset::Null)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ConfidentialAsset::Explicit(_))
    }

    pub fn is_commitment(&self) -> bool {
        matches!(self, ConfidentialAsset::Confidential(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ConfidentialAsset::Null | ConfidentialAsset::Explicit(_) => true,
            ConfidentialAsset::Confidential(c) => ASSET_COMMITMENT_PREFIXES.contains(&c.prefix()),
        }
    }

    pub fn explicit(&self) -> Option<AssetId> {
        match self {
            ConfidentialAsset::Explicit(asset) => Some(*asset),
            _ => None,
        }
    }

    pub fn commitment(&self) -> Option<&Commitment> {
        match self {
            ConfidentialAsset::Confidential(c) => Some(c),
            _ => None,
        }
    }

    /// The explicit asset id.
    ///
    /// # Panics
    ///
    /// Panics if the asset is not explicit.
    pub fn asset(&self) -> AssetId {
        match self {
            ConfidentialAsset::Explicit(asset) => *asset,
            other => panic!("asset() called on non-explicit asset {:?}", other),
        }
    }
}

/// Nonce field of an output (ECDH key or explicit nonce)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidentialNonce {
    #[default]
    Null,
    Explicit(Hash),
    Confidential(Commitment),
}

impl ConfidentialNonce {
    pub fn is_null(&self) -> bool {
        matches!(self, ConfidentialNonce::Null)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ConfidentialNonce::Explicit(_))
    }

    pub fn is_commitment(&self) -> bool {
        matches!(self, ConfidentialNonce::Confidential(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ConfidentialNonce::Null | ConfidentialNonce::Explicit(_) => true,
            ConfidentialNonce::Confidential(c) => NONCE_COMMITMENT_PREFIXES.contains(&c.prefix()),
        }
    }
}

/// Issuance sub-record of an input
///
/// A zero `asset_blinding_nonce` marks a new issuance, in which case
/// `asset_entropy` carries the contract hash. On reissuance the nonce is the
/// blinding factor of the spent token and `asset_entropy` is the stored
/// entropy of the asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIssuance {
    pub asset_blinding_nonce: Hash,
    pub asset_entropy: Hash,
    pub amount: ConfidentialValue,
    pub inflation_keys: ConfidentialValue,
}

impl AssetIssuance {
    pub fn is_null(&self) -> bool {
        self.amount.is_null() && self.inflation_keys.is_null()
    }

    pub fn is_reissuance(&self) -> bool {
        self.asset_blinding_nonce != [0; 32]
    }
}
