//! Hash primitives shared by the consensus rules

use crate::types::Hash;
use bitcoin_hashes::{sha256d, Hash as _};
use ripemd::Ripemd160;
use sha2::digest::generic_array::GenericArray;
use sha2::{Digest, Sha256};

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// SHA256(x)
pub fn sha256(data: &[u8]) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// SHA256(SHA256(x))
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

/// Fast Merkle root over a two-leaf tree.
///
/// A single SHA-256 compression of `left || right` from the standard IV, with
/// no padding and no length block; the state words are emitted big-endian.
pub fn fast_merkle_root(left: &Hash, right: &Hash) -> Hash {
    let mut block = [0u8; 64];
    block[..32].copy_from_slice(left);
    block[32..].copy_from_slice(right);

    let mut state = SHA256_IV;
    sha2::compress256(&mut state, &[GenericArray::clone_from_slice(&block)]);

    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Block Merkle root over transaction hashes.
///
/// Returns the root and whether a duplicated-pair mutation was observed.
pub fn merkle_root(leaves: &[Hash]) -> (Hash, bool) {
    if leaves.is_empty() {
        return ([0; 32], false);
    }

    let mut level = leaves.to_vec();
    let mut mutated = false;
    while level.len() > 1 {
        for pair in level.chunks_exact(2) {
            if pair[0] == pair[1] {
                mutated = true;
            }
        }
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                sha256d(&buf)
            })
            .collect();
    }
    (level[0], mutated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256d_abc() {
        assert_eq!(
            hex::encode(sha256d(b"abc")),
            "4f8b42c22dd3729b519ba6f68d2da7cc5b2d606d05daed5ad5128cc03e6c6358"
        );
    }

    #[test]
    fn test_hash160_empty() {
        assert_eq!(hex::encode(hash160(b"")), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
    }

    #[test]
    fn test_fast_merkle_root_zero_leaves() {
        // Midstate of a single all-zero block
        assert_eq!(
            hex::encode(fast_merkle_root(&[0; 32], &[0; 32])),
            "da5698be17b9b46962335799779fbeca8ce5d491c0d26243bafef9ea1837a9d8"
        );
    }

    #[test]
    fn test_fast_merkle_root_is_ordered() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(fast_merkle_root(&a, &b), fast_merkle_root(&b, &a));
        assert_ne!(fast_merkle_root(&a, &b), sha256(&[a, b].concat()));
    }

    #[test]
    fn test_merkle_root_single_leaf() {
        let leaf = [9u8; 32];
        assert_eq!(merkle_root(&[leaf]), (leaf, false));
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let (a, b, c) = ([1u8; 32], [2u8; 32], [3u8; 32]);
        let (three, _) = merkle_root(&[a, b, c]);
        let (four, mutated) = merkle_root(&[a, b, c, c]);
        assert_eq!(three, four);
        assert!(mutated);
    }
}
