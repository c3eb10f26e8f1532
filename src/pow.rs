//! Target arithmetic and difficulty retargeting
//!
//! Proof-of-work and proof-of-stake blocks keep separate difficulty ladders.
//! Each ladder retargets from the most recent block of its own type, skipping
//! blocks of the other type.

use crate::chain::{BlockId, BlockTree};
use crate::params::ChainParams;
use crate::types::Hash;
use log::trace;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// 256-bit unsigned integer, little-endian limbs
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn zero() -> Self {
        U256::ZERO
    }

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Interpret 32 little-endian bytes (the in-memory order of a hash)
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(limb);
        }
        U256(words)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, &word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Parse a big-endian hex string of at most 64 digits
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim_start_matches("0x");
        if s.is_empty() || s.len() > 64 {
            return None;
        }
        let padded = format!("{:0>64}", s);
        let mut bytes: [u8; 32] = hex::decode(padded).ok()?.try_into().ok()?;
        bytes.reverse();
        Some(U256::from_le_bytes(&bytes))
    }

    /// Big-endian hex, 64 digits
    pub fn to_hex(&self) -> String {
        let mut bytes = self.to_le_bytes();
        bytes.reverse();
        hex::encode(bytes)
    }

    /// Number of significant bits
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }

        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }

        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }

        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }

        result
    }

    /// Multiply by a 64-bit factor, `None` on overflow
    pub fn checked_mul_u64(&self, rhs: u64) -> Option<Self> {
        let mut result = U256::zero();
        let mut carry: u128 = 0;
        for i in 0..4 {
            let product = self.0[i] as u128 * rhs as u128 + carry;
            result.0[i] = product as u64;
            carry = product >> 64;
        }
        if carry != 0 {
            return None;
        }
        Some(result)
    }

    /// Divide by a non-zero 64-bit divisor
    ///
    /// # Panics
    ///
    /// Panics if `rhs` is zero.
    pub fn div_u64(&self, rhs: u64) -> Self {
        assert!(rhs != 0, "U256 division by zero");
        let mut result = U256::zero();
        let mut rem: u128 = 0;
        for i in (0..4).rev() {
            let cur = (rem << 64) | self.0[i] as u128;
            result.0[i] = (cur / rhs as u128) as u64;
            rem = cur % rhs as u128;
        }
        result
    }

    /// SetCompact: ℕ₃₂ → U256 × 𝔹 × 𝔹
    ///
    /// Decode compact bits into (target, negative, overflow). The mantissa is
    /// the low 23 bits, bit 23 is the sign and the top byte is the size in
    /// bytes.
    pub fn from_compact(bits: u32) -> (Self, bool, bool) {
        let size = bits >> 24;
        let mut word = bits & 0x007f_ffff;
        let value = if size <= 3 {
            word >>= 8 * (3 - size);
            U256::from_u64(word as u64)
        } else {
            U256::from_u64(word as u64).shl(8 * (size - 3))
        };
        let negative = word != 0 && (bits & 0x0080_0000) != 0;
        let overflow = word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
        (value, negative, overflow)
    }

    /// GetCompact: U256 → ℕ₃₂
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.low_u64() << (8 * (3 - size))) as u32
        } else {
            self.shr(8 * (size - 3)).low_u64() as u32
        };
        // The sign bit is reserved; move to the next size
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl From<&Hash> for U256 {
    fn from(hash: &Hash) -> Self {
        U256::from_le_bytes(hash)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self.to_hex())
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid 256-bit hex"))
    }
}

/// Walk back from `id` to the most recent block of the requested type.
///
/// Stops at the genesis block even if its type differs.
pub fn get_last_block_index(tree: &BlockTree, id: BlockId, proof_of_stake: bool) -> BlockId {
    let mut current = id;
    loop {
        let index = tree.get(current);
        match index.prev {
            Some(prev) if index.proof_of_stake != proof_of_stake => current = prev,
            _ => return current,
        }
    }
}

/// GetNextWorkRequired: BlockIndex? × Params × 𝔹 → ℕ₃₂
///
/// 1. No previous block, or fewer than two blocks of the requested type
///    with a predecessor: return the ladder limit
/// 2. Otherwise retarget from the last block of the type and the time of the
///    one before it
pub fn get_next_work_required(
    tree: &BlockTree,
    last: Option<BlockId>,
    params: &ChainParams,
    proof_of_stake: bool,
) -> u32 {
    let limit = params.target_limit(proof_of_stake).to_compact();

    let last = match last {
        Some(last) => last,
        None => return limit,
    };

    let prev = get_last_block_index(tree, last, proof_of_stake);
    let prev_parent = match tree.get(prev).prev {
        Some(parent) => parent,
        None => return limit,
    };

    let prev_prev = get_last_block_index(tree, prev_parent, proof_of_stake);
    if tree.get(prev_prev).prev.is_none() {
        return limit;
    }

    let first_time = tree.get(prev_prev).time as i64;
    let prev = tree.get(prev);
    calculate_next_work_required(prev.bits, prev.time as i64, first_time, params, proof_of_stake)
}

/// CalculateNextWorkRequired: ℕ₃₂ × ℤ × ℤ × Params × 𝔹 → ℕ₃₂
///
/// With T = spacing, N = timespan / T and A = last_time - first_time
/// (A := T when negative):
///
/// new = old × ((N - 1)·T + 2·A) / ((N + 1)·T)
///
/// A result that is zero, above the ladder limit, or overflows is replaced
/// by the limit.
pub fn calculate_next_work_required(
    last_bits: u32,
    last_time: i64,
    first_time: i64,
    params: &ChainParams,
    proof_of_stake: bool,
) -> u32 {
    let spacing = params.pow_target_spacing;
    let mut actual_timespan = last_time - first_time;
    if actual_timespan < 0 {
        actual_timespan = spacing;
    }

    let limit = params.target_limit(proof_of_stake);
    let interval = params.pow_target_timespan / spacing;
    let numerator = (interval - 1) * spacing + 2 * actual_timespan;
    let denominator = (interval + 1) * spacing;

    let (old, _, _) = U256::from_compact(last_bits);
    let new_target = if numerator <= 0 || denominator <= 0 {
        None
    } else {
        old.checked_mul_u64(numerator as u64).map(|t| t.div_u64(denominator as u64))
    };

    let new_target = match new_target {
        Some(t) if !t.is_zero() && t <= limit => t,
        _ => limit,
    };
    trace!(
        "retarget {}: actual timespan {} old {:08x} new {:08x}",
        if proof_of_stake { "pos" } else { "pow" },
        actual_timespan,
        last_bits,
        new_target.to_compact()
    );
    new_target.to_compact()
}

/// CheckProofOfWork: ℍ × ℕ₃₂ × Params × 𝔹 → 𝔹
///
/// The decoded target must be positive, not overflow and not exceed the
/// ladder limit; the hash read as a 256-bit integer must not exceed it.
pub fn check_proof_of_work(hash: &Hash, bits: u32, params: &ChainParams, proof_of_stake: bool) -> bool {
    let (target, negative, overflow) = U256::from_compact(bits);
    if negative || target.is_zero() || overflow || target > params.target_limit(proof_of_stake) {
        return false;
    }
    U256::from(hash) <= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BlockIndex;

    fn limit() -> U256 {
        U256::from_hex("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").unwrap()
    }

    #[test]
    fn test_compact_roundtrip_limits() {
        assert_eq!(limit().to_compact(), 0x1e0fffff);
        let regtest = U256::from_hex("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").unwrap();
        assert_eq!(regtest.to_compact(), 0x207fffff);
        assert_eq!(U256::from_compact(0x1d00ffff).0.to_compact(), 0x1d00ffff);
    }

    #[test]
    fn test_from_compact_flags() {
        let (value, negative, overflow) = U256::from_compact(0x01003456);
        assert!(value.is_zero() && !negative && !overflow);

        let (value, _, _) = U256::from_compact(0x01123456);
        assert_eq!(value, U256::from_u64(0x12));

        let (_, negative, _) = U256::from_compact(0x04923456);
        assert!(negative);

        let (_, _, overflow) = U256::from_compact(0xff123456);
        assert!(overflow);

        let (value, negative, overflow) = U256::from_compact(0x05009234);
        assert_eq!(value, U256::from_u64(0x92340000));
        assert!(!negative && !overflow);
    }

    #[test]
    fn test_to_compact_sign_bit_moves_size() {
        assert_eq!(U256::from_u64(0x80).to_compact(), 0x02008000);
        assert_eq!(U256::zero().to_compact(), 0);
    }

    #[test]
    fn test_shifts_and_division() {
        let one = U256::from_u64(1);
        assert_eq!(one.shl(255).shr(255), one);
        assert_eq!(one.shl(64).0, [0, 1, 0, 0]);
        assert_eq!(one.shl(64).shr(1).0, [1 << 63, 0, 0, 0]);
        assert_eq!(U256::from_u64(100).div_u64(7), U256::from_u64(14));
        assert_eq!(one.shl(128).div_u64(2), one.shl(127));
        assert!(U256::MAX.checked_mul_u64(2).is_none());
        assert_eq!(one.shl(64).checked_mul_u64(3), Some(U256([0, 3, 0, 0])));
    }

    #[test]
    fn test_hex_roundtrip() {
        let value = limit();
        assert_eq!(U256::from_hex(&value.to_hex()), Some(value));
        assert_eq!(value.bits(), 236);
        assert!(U256::from_hex("zz").is_none());
    }

    fn tree_with_times(times: &[u32], bits: u32) -> (BlockTree, BlockId) {
        let mut tree = BlockTree::new();
        let mut prev = None;
        for (height, &time) in times.iter().enumerate() {
            let mut hash = [0u8; 32];
            hash[..4].copy_from_slice(&(height as u32).to_le_bytes());
            prev = Some(tree.insert(BlockIndex::new(hash, prev, height as u32, time, bits, false)));
        }
        (tree, prev.unwrap())
    }

    #[test]
    fn test_early_chain_returns_limit() {
        let params = ChainParams::main();
        let expected = params.pow_limit.to_compact();
        assert_eq!(get_next_work_required(&BlockTree::new(), None, &params, false), expected);

        let (tree, tip) = tree_with_times(&[1000, 1060], 0x1d00ffff);
        assert_eq!(get_next_work_required(&tree, Some(tip), &params, false), expected);
    }

    #[test]
    fn test_on_schedule_keeps_target() {
        let params = ChainParams::main();
        let bits = 0x1d00ffff;
        let spacing = params.pow_target_spacing as u32;
        let (tree, tip) = tree_with_times(&[1000, 1000 + spacing, 1000 + 2 * spacing], bits);
        assert_eq!(get_next_work_required(&tree, Some(tip), &params, false), bits);
    }

    #[test]
    fn test_fast_blocks_tighten_target() {
        let params = ChainParams::main();
        let bits = 0x1d00ffff;
        let next = calculate_next_work_required(bits, 1001, 1000, &params, false);
        assert!(U256::from_compact(next).0 < U256::from_compact(bits).0);
    }

    #[test]
    fn test_negative_timespan_uses_spacing() {
        let params = ChainParams::main();
        let bits = 0x1d00ffff;
        let on_schedule = calculate_next_work_required(bits, 1000 + params.pow_target_spacing, 1000, &params, false);
        let backwards = calculate_next_work_required(bits, 1000, 5000, &params, false);
        assert_eq!(on_schedule, backwards);
        assert_eq!(backwards, bits);
    }

    #[test]
    fn test_retarget_clamped_to_limit() {
        let params = ChainParams::main();
        let limit_bits = params.pow_limit.to_compact();
        let next = calculate_next_work_required(limit_bits, i64::from(u32::MAX), 0, &params, false);
        assert_eq!(next, limit_bits);
        assert!(U256::from_compact(next).0 <= params.pow_limit);
    }

    #[test]
    fn test_ladders_skip_other_type() {
        let params = ChainParams::main();
        let mut tree = BlockTree::new();
        let genesis = tree.insert(BlockIndex::new([1; 32], None, 0, 1000, 0x1e0fffff, false));
        let pow = tree.insert(BlockIndex::new([2; 32], Some(genesis), 1, 1060, 0x1d00ffff, false));
        let pos = tree.insert(BlockIndex::new([3; 32], Some(pow), 2, 1120, 0x1e00ffff, true));
        assert_eq!(get_last_block_index(&tree, pos, false), pow);
        assert_eq!(get_last_block_index(&tree, pos, true), pos);
        // Only one stake block: the stake ladder still returns its limit
        assert_eq!(get_next_work_required(&tree, Some(pos), &params, true), params.pos_limit.to_compact());
    }

    #[test]
    fn test_check_proof_of_work() {
        let params = ChainParams::main();
        let bits = params.pow_limit.to_compact();
        assert!(check_proof_of_work(&[0; 32], bits, &params, false));
        assert!(!check_proof_of_work(&[0xff; 32], bits, &params, false));
        assert!(!check_proof_of_work(&[0; 32], 0, &params, false));
        assert!(!check_proof_of_work(&[0; 32], 0x1e8fffff, &params, false));
        assert!(!check_proof_of_work(&[0; 32], 0x1f0fffff, &params, false));
    }
}
