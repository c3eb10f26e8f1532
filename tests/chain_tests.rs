//! Difficulty retarget over a block tree, parameter loading and the
//! address index key order

use anyhow::Result;
use confidential_consensus::encode::{deserialize, serialize};
use confidential_consensus::index::*;
use confidential_consensus::pow::{calculate_next_work_required, U256};
use confidential_consensus::script::pay_to_pubkey_hash;
use confidential_consensus::*;
use quickcheck_macros::quickcheck;
use std::collections::BTreeMap;

const STAKE_BITS: u32 = 0x1e0fffff;

fn target(bits: u32) -> U256 {
    U256::from_compact(bits).0
}

/// Work genesis followed by stake blocks `spacing` seconds apart
fn stake_chain(blocks: u32, spacing: u32) -> BlockTree {
    let mut tree = BlockTree::new();
    let mut prev = tree.insert(BlockIndex::new([0; 32], None, 0, 1_000, 0x207fffff, false));
    for height in 1..=blocks {
        let index = BlockIndex::new([height as u8; 32], Some(prev), height, 1_000 + spacing * height, STAKE_BITS, true);
        prev = tree.insert(index);
    }
    tree
}

#[test]
fn test_fast_stake_blocks_raise_difficulty() {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let tree = stake_chain(3, 60);
    let next = engine.get_next_work_required(&tree, Some(3), true);
    assert!(target(next) < target(STAKE_BITS));
}

#[test]
fn test_slow_stake_blocks_lower_difficulty() {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let tree = stake_chain(3, 6_000);
    let next = engine.get_next_work_required(&tree, Some(3), true);
    assert!(target(next) > target(STAKE_BITS));
    assert!(target(next) <= engine.params().target_limit(true));
}

#[test]
fn test_too_few_stake_blocks_use_limit() {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let limit = engine.params().target_limit(true).to_compact();
    let tree = stake_chain(1, 60);
    assert_eq!(engine.get_next_work_required(&tree, Some(1), true), limit);
    assert_eq!(engine.get_next_work_required(&tree, Some(0), true), limit);
}

#[test]
fn test_negative_timespan_uses_target_spacing() {
    let params = ChainParams::regtest();
    let spacing = params.pow_target_spacing;
    let backwards = calculate_next_work_required(STAKE_BITS, 1_000, 5_000, &params, true);
    let on_target = calculate_next_work_required(STAKE_BITS, 1_000 + spacing, 1_000, &params, true);
    assert_eq!(backwards, on_target);
    assert_eq!(on_target, STAKE_BITS);
}

#[quickcheck]
fn prop_retarget_stays_within_limit(last_time: u32, first_time: u32) -> bool {
    let params = ChainParams::regtest();
    let next = calculate_next_work_required(STAKE_BITS, last_time as i64, first_time as i64, &params, true);
    let t = target(next);
    !t.is_zero() && t <= params.target_limit(true)
}

#[test]
fn test_params_from_json() -> Result<()> {
    let mut params = ChainParams::regtest();
    params.superblock_cycle = 25;
    let loaded = ChainParams::from_json(&params.to_json()?)?;
    assert_eq!(loaded, params);
    assert!(loaded.is_superblock_height(1_525));
    assert_eq!(ConsensusEngine::new(loaded).params().network, "regtest");

    assert!(ChainParams::from_json(r#"{"network":"regtest"}"#).is_err());
    Ok(())
}

#[test]
fn test_address_history_scan() -> Result<()> {
    let script = pay_to_pubkey_hash(&[0x21; 20]);
    let (kind, hash) = script_address(&script).expect("p2pkh has an address");
    assert_eq!(kind, AddressType::PubKeyHash);

    // Insert out of order, as a store would receive them across reorgs
    let mut db: BTreeMap<Vec<u8>, Amount> = BTreeMap::new();
    for (height, tx_index, amount) in [(900u32, 2u32, 5i64), (12, 0, 7), (300, 1, -3), (300, 0, 11)] {
        let key = AddressIndexKey {
            address_type: kind,
            address_hash: hash,
            asset: "RAIN".to_string(),
            block_height: height,
            tx_index,
            txid: [height as u8; 32],
            index: 0,
            spending: amount < 0,
        };
        db.insert(serialize(&key), amount);
    }
    // Another asset of the same address sorts apart
    let other = AddressIndexKey {
        address_type: kind,
        address_hash: hash,
        asset: "SNOW".to_string(),
        block_height: 1,
        tx_index: 0,
        txid: [1; 32],
        index: 0,
        spending: false,
    };
    db.insert(serialize(&other), 1);

    let start = address_height_prefix(kind, &hash, "RAIN", 100);
    let prefix = address_asset_prefix(kind, &hash, "RAIN");
    let history: Vec<(u32, u32)> = db
        .range(start..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .map(|(k, _)| deserialize::<AddressIndexKey>(k).map(|key| (key.block_height, key.tx_index)))
        .collect::<confidential_consensus::Result<_>>()?;
    assert_eq!(history, vec![(300, 0), (300, 1), (900, 2)]);

    let all = db.keys().filter(|k| k.starts_with(&address_prefix(kind, &hash))).count();
    assert_eq!(all, 5);
    Ok(())
}
