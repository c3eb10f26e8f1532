//! Masternode payee and superblock value rules through the engine

use anyhow::Result;
use confidential_consensus::masternode::*;
use confidential_consensus::*;

const DIP3_HEIGHT: u32 = 1_000;

fn reward(params: &ChainParams) -> AmountMap {
    AmountMap::single(params.subsidy_asset, 10 * COIN)
}

fn node(tag: u8, registered_height: u32, last_paid_height: u32) -> MasternodeEntry {
    MasternodeEntry {
        pro_tx_hash: [tag; 32],
        collateral_outpoint: OutPoint::new([tag; 32], 0),
        owner_key_id: [tag; 20],
        operator_pubkey: vec![0x03, tag],
        script_payout: vec![0x76, 0xa9, tag],
        operator_reward: 0,
        script_operator_payout: vec![],
        registered_height,
        last_paid_height,
        pose_ban_height: None,
    }
}

/// Node 0xa1 is due: registered at 10 and never paid, ahead of 0xb2 paid at 20
fn masternodes() -> MemoryMasternodeSource {
    let mut due = node(0xa1, 10, 0);
    due.operator_reward = 1_000;
    due.script_operator_payout = vec![0x76, 0xa9, 0x0f];
    let mut list = DeterministicMnList::new();
    assert!(list.add(due));
    assert!(list.add(node(0xb2, 5, 20)));

    let mut source = MemoryMasternodeSource::new(DIP3_HEIGHT);
    source.insert(1_599, list);
    source
}

fn coinbase(params: &ChainParams, outputs: &[(Amount, Vec<u8>)]) -> Transaction {
    let mut input = TransactionInput::new(OutPoint::null());
    input.script_sig = vec![0x01, 0x02];
    Transaction {
        inputs: vec![input],
        outputs: outputs
            .iter()
            .map(|(value, script)| TransactionOutput::explicit(params.subsidy_asset, *value, script.clone()))
            .collect(),
        ..Transaction::default()
    }
}

fn block_with(coinbase: Transaction) -> Block {
    let header = BlockHeader {
        version: 1,
        prev_block_hash: [0; 32],
        merkle_root: [0; 32],
        time: 0,
        height: 0,
        bits: 0x207fffff,
        nonce: 0,
        prevout_stake: OutPoint::null(),
        block_sig: vec![],
    };
    Block { header, transactions: vec![coinbase] }
}

/// Miner keeps 5, masternode owner 4.5, operator 0.5
fn paying_coinbase(params: &ChainParams, extra: &[(Amount, Vec<u8>)]) -> Transaction {
    let mut outputs = vec![
        (5 * COIN, vec![0x51]),
        (45 * COIN / 10, vec![0x76, 0xa9, 0xa1]),
        (COIN / 2, vec![0x76, 0xa9, 0x0f]),
    ];
    outputs.extend_from_slice(extra);
    coinbase(params, &outputs)
}

#[test]
fn test_payee_with_operator_share() -> Result<()> {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let params = engine.params().clone();
    let governance = SuperblockSchedule::synced();

    let tx = paying_coinbase(&params, &[]);
    assert_eq!(
        engine.is_block_payee_valid(&tx, 1_601, &reward(&params), &masternodes(), &governance)?,
        ValidationResult::Valid
    );

    // Everything to the owner, nothing to the operator
    let tx = coinbase(&params, &[(5 * COIN, vec![0x51]), (5 * COIN, vec![0x76, 0xa9, 0xa1])]);
    let result = engine.is_block_payee_valid(&tx, 1_601, &reward(&params), &masternodes(), &governance)?;
    assert!(matches!(result, ValidationResult::Invalid(RejectReason::BlockPayee(_))));
    assert_eq!(result.reject_reason().map(|r| r.to_string()).as_deref(), Some("bad-cb-payee"));
    Ok(())
}

#[test]
fn test_payee_not_checked_before_enforcement() -> Result<()> {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let params = engine.params().clone();
    let tx = coinbase(&params, &[(10 * COIN, vec![0x51])]);

    // Before superblocks start
    let governance = SuperblockSchedule::synced();
    assert!(engine.is_block_payee_valid(&tx, 1_400, &reward(&params), &masternodes(), &governance)?.is_valid());

    // Governance switched off
    let disabled = SuperblockSchedule { disabled: true, ..SuperblockSchedule::synced() };
    assert!(engine.is_block_payee_valid(&tx, 1_601, &reward(&params), &masternodes(), &disabled)?.is_valid());

    // No list known for the parent block
    let empty = MemoryMasternodeSource::new(DIP3_HEIGHT);
    assert!(engine.is_block_payee_valid(&tx, 1_601, &reward(&params), &empty, &governance)?.is_valid());
    Ok(())
}

#[test]
fn test_regular_block_value() -> Result<()> {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let params = engine.params().clone();
    let governance = SuperblockSchedule::synced();

    let block = block_with(paying_coinbase(&params, &[]));
    assert!(engine.is_block_value_valid(&block, 1_601, &reward(&params), &governance)?.is_valid());

    let block = block_with(paying_coinbase(&params, &[(1, vec![0x52])]));
    let result = engine.is_block_value_valid(&block, 1_601, &reward(&params), &governance)?;
    assert_eq!(result.reject_reason().map(|r| r.to_string()).as_deref(), Some("bad-cb-amount"));
    Ok(())
}

#[test]
fn test_superblock_payments() -> Result<()> {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let params = engine.params().clone();
    let proposal = TransactionOutput::explicit(params.subsidy_asset, 3 * COIN, vec![0xa9, 0x14, 0x77]);
    let mut governance = SuperblockSchedule::synced();
    governance.superblocks.insert(1_610, vec![proposal.clone()]);

    let good = paying_coinbase(&params, &[(3 * COIN, proposal.script_pubkey.clone())]);
    assert!(engine.is_block_value_valid(&block_with(good.clone()), 1_610, &reward(&params), &governance)?.is_valid());
    assert!(engine.is_block_payee_valid(&good, 1_610, &reward(&params), &masternodes(), &governance)?.is_valid());

    // Same total, proposal not paid
    let diverted = paying_coinbase(&params, &[(3 * COIN, vec![0x52])]);
    let result = engine.is_block_value_valid(&block_with(diverted.clone()), 1_610, &reward(&params), &governance)?;
    assert!(matches!(result, ValidationResult::Invalid(RejectReason::BlockValue(_))));
    let result = engine.is_block_payee_valid(&diverted, 1_610, &reward(&params), &masternodes(), &governance)?;
    assert!(matches!(result, ValidationResult::Invalid(RejectReason::BlockPayee(_))));

    // Beyond reward plus the scheduled limit
    let greedy = paying_coinbase(&params, &[(3 * COIN, proposal.script_pubkey.clone()), (1, vec![0x52])]);
    let result = engine.is_block_value_valid(&block_with(greedy), 1_610, &reward(&params), &governance)?;
    assert!(matches!(result, ValidationResult::Invalid(RejectReason::BlockValue(_))));
    Ok(())
}

#[test]
fn test_unsynced_node_checks_bounds_only() -> Result<()> {
    let engine = ConsensusEngine::new(ChainParams::regtest());
    let params = engine.params().clone();
    let proposal = TransactionOutput::explicit(params.subsidy_asset, 3 * COIN, vec![0xa9, 0x14, 0x77]);
    let mut governance = SuperblockSchedule::default();
    governance.superblocks.insert(1_610, vec![proposal]);

    let diverted = block_with(paying_coinbase(&params, &[(3 * COIN, vec![0x52])]));
    assert!(engine.is_block_value_valid(&diverted, 1_610, &reward(&params), &governance)?.is_valid());

    let over = block_with(paying_coinbase(&params, &[(3 * COIN + 1, vec![0x52])]));
    assert!(!engine.is_block_value_valid(&over, 1_610, &reward(&params), &governance)?.is_valid());
    Ok(())
}

#[test]
fn test_banned_node_skipped() {
    let params = ChainParams::regtest();
    let mut banned = node(0xa1, 10, 0);
    banned.pose_ban_height = Some(1_200);
    let mut list = DeterministicMnList::new();
    assert!(list.add(banned));
    assert!(list.add(node(0xb2, 5, 20)));
    assert_eq!(list.valid_count(), 1);

    let mut source = MemoryMasternodeSource::new(DIP3_HEIGHT);
    source.insert(1_599, list);
    let outs = get_block_tx_outs(1_601, &reward(&params), &params, &source).unwrap();
    assert_eq!(outs, vec![TransactionOutput::explicit(params.subsidy_asset, 5 * COIN, vec![0x76, 0xa9, 0xb2])]);
}
