//! Chain parameters
//!
//! Parameters load from JSON so a node can run against custom networks;
//! 256-bit limits, asset ids and scripts are hex strings.

use crate::confidential::AssetId;
use crate::constants::COIN;
use crate::error::{ConsensusError, Result};
use crate::pow::U256;
use crate::types::{Amount, ByteString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: String,
    pub pow_limit: U256,
    pub pos_limit: U256,
    /// Seconds between blocks, shared by both ladders
    pub pow_target_spacing: i64,
    pub pow_target_timespan: i64,
    pub stake_min_age: i64,
    pub stake_max_age: i64,
    /// Seconds between stake modifier generations
    pub modifier_interval: i64,
    pub last_pow_block: u32,
    pub subsidy_asset: AssetId,
    pub masternode_collateral: Amount,
    /// Masternode share of the subsidy asset reward, permille
    pub masternode_share_permille: i64,
    pub superblock_start_block: u32,
    pub superblock_cycle: u32,
    #[serde(with = "hex_bytes", default)]
    pub mandatory_coinbase_destination: ByteString,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

fn limit(hex: &str) -> U256 {
    U256::from_hex(hex).unwrap_or(U256::MAX)
}

impl ChainParams {
    pub fn main() -> Self {
        ChainParams {
            network: "main".to_string(),
            pow_limit: limit("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            pos_limit: limit("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            pow_target_spacing: 60,
            pow_target_timespan: 15 * 60,
            stake_min_age: 4 * 60 * 60,
            stake_max_age: 10 * 24 * 60 * 60,
            modifier_interval: 10 * 60,
            last_pow_block: 200_000,
            subsidy_asset: AssetId([0x5a; 32]),
            masternode_collateral: 100_000 * COIN,
            masternode_share_permille: 500,
            superblock_start_block: 200_000,
            superblock_cycle: 43_200,
            mandatory_coinbase_destination: Vec::new(),
        }
    }

    pub fn testnet() -> Self {
        ChainParams {
            network: "test".to_string(),
            pow_target_timespan: 60,
            stake_min_age: 60 * 60,
            last_pow_block: 1_000,
            masternode_collateral: 1_000 * COIN,
            superblock_start_block: 1_000,
            superblock_cycle: 60,
            ..ChainParams::main()
        }
    }

    pub fn regtest() -> Self {
        ChainParams {
            network: "regtest".to_string(),
            pow_limit: limit("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            pos_limit: limit("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
            pow_target_spacing: 10 * 60,
            pow_target_timespan: 14 * 24 * 60 * 60,
            stake_min_age: 60,
            stake_max_age: 24 * 60 * 60,
            modifier_interval: 60,
            last_pow_block: 100,
            masternode_collateral: 1_000 * COIN,
            superblock_start_block: 1_500,
            superblock_cycle: 10,
            ..ChainParams::main()
        }
    }

    pub fn from_network(name: &str) -> Result<Self> {
        match name {
            "main" => Ok(Self::main()),
            "test" | "testnet" => Ok(Self::testnet()),
            "regtest" => Ok(Self::regtest()),
            other => Err(ConsensusError::InvalidParams(format!("unknown network {}", other))),
        }
    }

    /// Parse and validate parameters from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let params: ChainParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(ConsensusError::InvalidParams(msg.to_string()));
        if self.pow_target_spacing <= 0 {
            return fail("target spacing must be positive");
        }
        if self.pow_target_timespan < self.pow_target_spacing {
            return fail("target timespan shorter than spacing");
        }
        if self.pow_limit.is_zero() || self.pos_limit.is_zero() {
            return fail("target limit is zero");
        }
        if self.stake_min_age < 0 || self.stake_max_age < self.stake_min_age {
            return fail("stake ages out of order");
        }
        if self.modifier_interval <= 0 {
            return fail("modifier interval must be positive");
        }
        if !(0..=crate::constants::MASTERNODE_SHARE_DENOMINATOR).contains(&self.masternode_share_permille) {
            return fail("masternode share above 1000 permille");
        }
        Ok(())
    }

    /// Maximum target of the requested ladder
    pub fn target_limit(&self, proof_of_stake: bool) -> U256 {
        if proof_of_stake {
            self.pos_limit
        } else {
            self.pow_limit
        }
    }

    pub fn is_superblock_height(&self, height: u32) -> bool {
        height >= self.superblock_start_block && self.superblock_cycle > 0 && height % self.superblock_cycle == 0
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::main()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for params in [ChainParams::main(), ChainParams::testnet(), ChainParams::regtest()] {
            assert!(params.validate().is_ok(), "{}", params.network);
        }
        assert_eq!(ChainParams::regtest().pow_limit.to_compact(), 0x207fffff);
        assert!(ChainParams::from_network("nope").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut params = ChainParams::testnet();
        params.mandatory_coinbase_destination = vec![0x76, 0xa9];
        let json = params.to_json().unwrap();
        assert!(json.contains("\"76a9\""));
        assert_eq!(ChainParams::from_json(&json).unwrap(), params);
    }

    #[test]
    fn test_invalid_json_params() {
        let mut params = ChainParams::main();
        params.stake_max_age = params.stake_min_age - 1;
        let json = serde_json::to_string(&params).unwrap();
        assert!(matches!(ChainParams::from_json(&json), Err(ConsensusError::InvalidParams(_))));
        assert!(matches!(ChainParams::from_json("{"), Err(ConsensusError::Json(_))));
    }

    #[test]
    fn test_superblock_heights() {
        let params = ChainParams::regtest();
        assert!(params.is_superblock_height(1_500));
        assert!(!params.is_superblock_height(1_505));
        assert!(!params.is_superblock_height(1_490));
    }
}
