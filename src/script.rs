//! Script classification used by consensus checks
//!
//! Only template matching is needed here: unspendable outputs, key-hash
//! destinations recoverable from a block signature, and cold-staking outputs.

use crate::constants::*;

/// IsUnspendable: 𝕊 → 𝔹
///
/// An output is provably unspendable if its script starts with OP_RETURN or
/// exceeds the maximum script size.
pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN) || script.len() > MAX_SCRIPT_SIZE
}

/// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
pub fn is_pay_to_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == OP_PUSHBYTES_20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// OP_HASH160 <20> OP_EQUAL
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == OP_PUSHBYTES_20 && script[22] == OP_EQUAL
}

/// OP_0 <20>
pub fn is_pay_to_witness_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 22 && script[0] == OP_0 && script[1] == OP_PUSHBYTES_20
}

/// OP_DUP OP_HASH160 OP_ROT OP_IF OP_CHECKCOLDSTAKEVERIFY <20 staker>
/// OP_ELSE <20 owner> OP_ENDIF OP_EQUALVERIFY OP_CHECKSIG
pub fn is_pay_to_cold_staking(script: &[u8]) -> bool {
    script.len() == 51
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == OP_ROT
        && script[3] == OP_IF
        && script[4] == OP_CHECKCOLDSTAKEVERIFY
        && script[5] == OP_PUSHBYTES_20
        && script[26] == OP_ELSE
        && script[27] == OP_PUSHBYTES_20
        && script[48] == OP_ENDIF
        && script[49] == OP_EQUALVERIFY
        && script[50] == OP_CHECKSIG
}

/// Key hash of a P2PKH or P2WPKH script
pub fn extract_key_hash(script: &[u8]) -> Option<[u8; 20]> {
    let range = if is_pay_to_pubkey_hash(script) {
        3..23
    } else if is_pay_to_witness_pubkey_hash(script) {
        2..22
    } else {
        return None;
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&script[range]);
    Some(hash)
}

/// (staker, owner) key hashes of a cold-staking script
pub fn extract_cold_staking_keys(script: &[u8]) -> Option<([u8; 20], [u8; 20])> {
    if !is_pay_to_cold_staking(script) {
        return None;
    }
    let mut staker = [0u8; 20];
    let mut owner = [0u8; 20];
    staker.copy_from_slice(&script[6..26]);
    owner.copy_from_slice(&script[28..48]);
    Some((staker, owner))
}

pub fn pay_to_pubkey_hash(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, OP_PUSHBYTES_20];
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn pay_to_witness_pubkey_hash(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = vec![OP_0, OP_PUSHBYTES_20];
    script.extend_from_slice(hash);
    script
}

pub fn pay_to_cold_staking(staker: &[u8; 20], owner: &[u8; 20]) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, OP_ROT, OP_IF, OP_CHECKCOLDSTAKEVERIFY, OP_PUSHBYTES_20];
    script.extend_from_slice(staker);
    script.extend_from_slice(&[OP_ELSE, OP_PUSHBYTES_20]);
    script.extend_from_slice(owner);
    script.extend_from_slice(&[OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unspendable() {
        assert!(is_unspendable(&[OP_RETURN]));
        assert!(is_unspendable(&[OP_RETURN, 0x01, 0xff]));
        assert!(is_unspendable(&vec![0x51; MAX_SCRIPT_SIZE + 1]));
        assert!(!is_unspendable(&[]));
        assert!(!is_unspendable(&[0x51]));
    }

    #[test]
    fn test_key_hash_templates() {
        let hash = [0x5a; 20];
        let p2pkh = pay_to_pubkey_hash(&hash);
        let p2wpkh = pay_to_witness_pubkey_hash(&hash);
        assert!(is_pay_to_pubkey_hash(&p2pkh));
        assert!(is_pay_to_witness_pubkey_hash(&p2wpkh));
        assert_eq!(extract_key_hash(&p2pkh), Some(hash));
        assert_eq!(extract_key_hash(&p2wpkh), Some(hash));
        assert_eq!(extract_key_hash(&[OP_RETURN]), None);
    }

    #[test]
    fn test_cold_staking_template() {
        let script = pay_to_cold_staking(&[1; 20], &[2; 20]);
        assert_eq!(script.len(), 51);
        assert!(is_pay_to_cold_staking(&script));
        assert_eq!(extract_cold_staking_keys(&script), Some(([1; 20], [2; 20])));
        assert_eq!(extract_key_hash(&script), None);

        let mut broken = script.clone();
        broken[4] = OP_CHECKSIG;
        assert!(!is_pay_to_cold_staking(&broken));
    }
}
