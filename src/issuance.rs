//! Asset identity and entropy derivation
//!
//! An issuance binds its originating outpoint and contract hash into 32 bytes
//! of entropy; the asset id and its reissuance token are derived from that
//! entropy with the two-leaf fast Merkle root.

use crate::confidential::AssetId;
use crate::encode::serialize;
use crate::hashes::{fast_merkle_root, sha256d};
use crate::types::{Hash, OutPoint};

/// GenerateAssetEntropy: 𝒪 × ℍ → ℍ
///
/// entropy = FastMerkle(SHA256d(serialize(prevout)), contract_hash)
pub fn generate_asset_entropy(prevout: &OutPoint, contract_hash: &Hash) -> Hash {
    let prevout_hash = sha256d(&serialize(prevout));
    fast_merkle_root(&prevout_hash, contract_hash)
}

/// CalculateAsset: ℍ → AssetId
///
/// asset = FastMerkle(entropy, 0)
pub fn calculate_asset(entropy: &Hash) -> AssetId {
    AssetId(fast_merkle_root(entropy, &[0u8; 32]))
}

/// CalculateReissuanceToken: ℍ × 𝔹 → AssetId
///
/// token = FastMerkle(entropy, 1) for explicit issuance amounts,
/// FastMerkle(entropy, 2) for confidential ones.
pub fn calculate_reissuance_token(entropy: &Hash, confidential: bool) -> AssetId {
    let mut leaf = [0u8; 32];
    leaf[0] = if confidential { 2 } else { 1 };
    AssetId(fast_merkle_root(entropy, &leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_derivation_is_deterministic() {
        let prevout = OutPoint::new([0x11; 32], 3);
        let contract = [0x22; 32];
        let a = calculate_asset(&generate_asset_entropy(&prevout, &contract));
        let b = calculate_asset(&generate_asset_entropy(&prevout, &contract));
        assert_eq!(a, b);
    }

    #[test]
    fn test_entropy_depends_on_every_input() {
        let prevout = OutPoint::new([0x11; 32], 3);
        let contract = [0x22; 32];
        let base = generate_asset_entropy(&prevout, &contract);

        assert_ne!(base, generate_asset_entropy(&OutPoint::new([0x11; 32], 4), &contract));
        assert_ne!(base, generate_asset_entropy(&OutPoint::new([0x12; 32], 3), &contract));
        assert_ne!(base, generate_asset_entropy(&prevout, &[0x23; 32]));
    }

    #[test]
    fn test_token_differs_by_confidentiality() {
        let entropy = [0x33; 32];
        let explicit = calculate_reissuance_token(&entropy, false);
        let confidential = calculate_reissuance_token(&entropy, true);
        assert_ne!(explicit, confidential);
        assert_ne!(explicit, calculate_asset(&entropy));
        assert_ne!(confidential, calculate_asset(&entropy));
    }

    #[test]
    fn test_token_leaf_encoding() {
        let entropy = [0x44; 32];
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(calculate_reissuance_token(&entropy, false).0, fast_merkle_root(&entropy, &one));
    }
}
