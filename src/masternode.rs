//! Masternode and superblock payment validation
//!
//! The coinbase (or coinstake) of every block must pay the scheduled
//! masternode its share of the subsidy asset, split with the operator when
//! one is registered. Superblocks may additionally pay governance proposals
//! up to a per-height limit. Both checks fall back to accepting when the node
//! lacks the data to judge.

use crate::amount::AmountMap;
use crate::constants::*;
use crate::encode::serialize;
use crate::error::{RejectReason, Result};
use crate::params::ChainParams;
use crate::types::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A registered masternode as seen by payment validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub pro_tx_hash: Hash,
    pub collateral_outpoint: OutPoint,
    pub owner_key_id: [u8; 20],
    pub operator_pubkey: ByteString,
    pub script_payout: ByteString,
    /// Operator share of the masternode reward in basis points
    pub operator_reward: u16,
    pub script_operator_payout: ByteString,
    pub registered_height: u32,
    pub last_paid_height: u32,
    pub pose_ban_height: Option<u32>,
}

impl MasternodeEntry {
    pub fn is_banned(&self) -> bool {
        self.pose_ban_height.is_some()
    }

    /// Height used to order payees: last payment, or registration if never paid
    pub fn payment_order_height(&self) -> u32 {
        if self.last_paid_height == 0 {
            self.registered_height
        } else {
            self.last_paid_height
        }
    }
}

/// Properties no two registered masternodes may share
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniqueProperty {
    Collateral(OutPoint),
    OwnerKey([u8; 20]),
    OperatorKey(ByteString),
}

impl UniqueProperty {
    fn key(&self) -> Vec<u8> {
        let mut key = Vec::new();
        match self {
            UniqueProperty::Collateral(outpoint) => {
                key.push(b'c');
                key.extend_from_slice(&serialize(outpoint));
            }
            UniqueProperty::OwnerKey(id) => {
                key.push(b'o');
                key.extend_from_slice(id);
            }
            UniqueProperty::OperatorKey(pubkey) => {
                key.push(b'p');
                key.extend_from_slice(pubkey);
            }
        }
        key
    }
}

/// Snapshot of the masternode list at one block
pub trait MasternodeList {
    /// Masternode due for payment in the next block
    fn mn_payee(&self) -> Option<&MasternodeEntry>;
    fn has_unique_property(&self, property: &UniqueProperty) -> bool;
    fn unique_property_mn(&self, property: &UniqueProperty) -> Option<&MasternodeEntry>;
}

/// Access to historical masternode lists
pub trait MasternodeListSource {
    /// List as of the block at `height`
    fn list_for_block(&self, height: u32) -> Option<&dyn MasternodeList>;
    fn is_dip3_enforced(&self, height: u32) -> bool;
}

/// Governance and superblock state
pub trait Governance {
    /// Governance data is switched off; payee checks are skipped
    fn is_disabled(&self) -> bool;
    /// Masternode and governance data is synced (never true in lite mode)
    fn is_synced(&self) -> bool;
    fn is_superblock_triggered(&self, height: u32) -> bool;
    fn is_superblock_valid(&self, tx: &Transaction, height: u32, reward: &AmountMap) -> bool;
    fn superblock_payments_limit(&self, height: u32) -> AmountMap;
}

/// Deterministic masternode list keyed by registration hash
#[derive(Debug, Clone, Default)]
pub struct DeterministicMnList {
    entries: BTreeMap<Hash, MasternodeEntry>,
    unique: HashMap<Vec<u8>, Hash>,
}

impl DeterministicMnList {
    pub fn new() -> Self {
        Self::default()
    }

    fn properties(entry: &MasternodeEntry) -> [UniqueProperty; 3] {
        [
            UniqueProperty::Collateral(entry.collateral_outpoint),
            UniqueProperty::OwnerKey(entry.owner_key_id),
            UniqueProperty::OperatorKey(entry.operator_pubkey.clone()),
        ]
    }

    /// Register a masternode; false if it reuses another one's unique property
    pub fn add(&mut self, entry: MasternodeEntry) -> bool {
        let conflict = Self::properties(&entry).iter().any(|p| {
            self.unique.get(&p.key()).map_or(false, |owner| *owner != entry.pro_tx_hash)
        });
        if conflict {
            debug!("masternode {} reuses a unique property", hex::encode(entry.pro_tx_hash));
            return false;
        }
        self.remove(&entry.pro_tx_hash);
        for property in Self::properties(&entry) {
            self.unique.insert(property.key(), entry.pro_tx_hash);
        }
        self.entries.insert(entry.pro_tx_hash, entry);
        true
    }

    /// Register a new masternode whose collateral output is `collateral`.
    ///
    /// The collateral must be exactly `masternode_collateral` of the subsidy
    /// asset, in the clear; otherwise, or on a unique-property clash, the
    /// list is left unchanged and false is returned.
    pub fn register(&mut self, entry: MasternodeEntry, collateral: &TransactionOutput, params: &ChainParams) -> bool {
        if !is_valid_collateral(collateral, params) {
            debug!("masternode {} has invalid collateral", hex::encode(entry.pro_tx_hash));
            return false;
        }
        self.add(entry)
    }

    pub fn remove(&mut self, pro_tx_hash: &Hash) -> Option<MasternodeEntry> {
        let entry = self.entries.remove(pro_tx_hash)?;
        for property in Self::properties(&entry) {
            self.unique.remove(&property.key());
        }
        Some(entry)
    }

    pub fn get(&self, pro_tx_hash: &Hash) -> Option<&MasternodeEntry> {
        self.entries.get(pro_tx_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_banned()).count()
    }
}

/// Collateral: explicit `masternode_collateral` of the subsidy asset
pub fn is_valid_collateral(output: &TransactionOutput, params: &ChainParams) -> bool {
    output.asset.explicit() == Some(params.subsidy_asset)
        && output.value.explicit() == Some(params.masternode_collateral)
}

impl MasternodeList for DeterministicMnList {
    fn mn_payee(&self) -> Option<&MasternodeEntry> {
        self.entries
            .values()
            .filter(|e| !e.is_banned())
            .min_by(|a, b| {
                a.payment_order_height()
                    .cmp(&b.payment_order_height())
                    .then_with(|| a.pro_tx_hash.cmp(&b.pro_tx_hash))
            })
    }

    fn has_unique_property(&self, property: &UniqueProperty) -> bool {
        self.unique.contains_key(&property.key())
    }

    fn unique_property_mn(&self, property: &UniqueProperty) -> Option<&MasternodeEntry> {
        self.unique.get(&property.key()).and_then(|hash| self.entries.get(hash))
    }
}

/// Masternode lists recorded per block height
#[derive(Debug, Clone, Default)]
pub struct MemoryMasternodeSource {
    lists: BTreeMap<u32, DeterministicMnList>,
    dip3_enforcement_height: u32,
}

impl MemoryMasternodeSource {
    pub fn new(dip3_enforcement_height: u32) -> Self {
        MemoryMasternodeSource { lists: BTreeMap::new(), dip3_enforcement_height }
    }

    /// Record the list in effect from `height` onwards
    pub fn insert(&mut self, height: u32, list: DeterministicMnList) {
        self.lists.insert(height, list);
    }
}

impl MasternodeListSource for MemoryMasternodeSource {
    fn list_for_block(&self, height: u32) -> Option<&dyn MasternodeList> {
        self.lists.range(..=height).next_back().map(|(_, list)| list as &dyn MasternodeList)
    }

    fn is_dip3_enforced(&self, height: u32) -> bool {
        height >= self.dip3_enforcement_height
    }
}

/// Governance state with a fixed superblock schedule
///
/// A superblock at a scheduled height must contain every listed payment and
/// may not pay out more than the block reward plus the payments limit.
#[derive(Debug, Clone, Default)]
pub struct SuperblockSchedule {
    pub disabled: bool,
    pub synced: bool,
    pub superblocks: BTreeMap<u32, Vec<TransactionOutput>>,
}

impl SuperblockSchedule {
    pub fn synced() -> Self {
        SuperblockSchedule { synced: true, ..Self::default() }
    }
}

impl Governance for SuperblockSchedule {
    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn is_superblock_triggered(&self, height: u32) -> bool {
        !self.disabled && self.superblocks.contains_key(&height)
    }

    fn is_superblock_valid(&self, tx: &Transaction, height: u32, reward: &AmountMap) -> bool {
        let payments = match self.superblocks.get(&height) {
            Some(payments) => payments,
            None => return false,
        };
        if !payments.iter().all(|payment| tx.outputs.contains(payment)) {
            return false;
        }
        value_out_map(tx) <= reward.clone() + self.superblock_payments_limit(height)
    }

    fn superblock_payments_limit(&self, height: u32) -> AmountMap {
        let mut limit = AmountMap::new();
        for payment in self.superblocks.get(&height).into_iter().flatten() {
            if let (Some(asset), Some(value)) = (payment.asset.explicit(), payment.value.explicit()) {
                limit.add_amount(asset, value);
            }
        }
        limit
    }
}

/// Sum of explicit output values per asset; blinded outputs are not counted
pub fn value_out_map(tx: &Transaction) -> AmountMap {
    let mut map = AmountMap::new();
    for output in &tx.outputs {
        if let (Some(asset), Some(value)) = (output.asset.explicit(), output.value.explicit()) {
            map.add_amount(asset, value);
        }
    }
    map
}

/// Masternode share of the subsidy asset reward, in permille
pub fn masternode_payment(params: &ChainParams, reward: &AmountMap) -> Amount {
    let subsidy = reward.get(&params.subsidy_asset) as i128;
    (subsidy * params.masternode_share_permille as i128 / MASTERNODE_SHARE_DENOMINATOR as i128) as Amount
}

/// Outputs the coinbase of the block at `height` must contain.
///
/// The payee comes from the list of the parent block. `None` when that list
/// is unavailable or has no payee.
pub fn get_block_tx_outs(
    height: u32,
    reward: &AmountMap,
    params: &ChainParams,
    masternodes: &dyn MasternodeListSource,
) -> Option<Vec<TransactionOutput>> {
    let list = masternodes.list_for_block(height.saturating_sub(1))?;
    let payee = list.mn_payee()?;

    let mut masternode_reward = masternode_payment(params, reward);
    let mut operator_reward = 0;
    if payee.operator_reward != 0 && !payee.script_operator_payout.is_empty() {
        operator_reward = (masternode_reward as i128 * payee.operator_reward as i128
            / OPERATOR_REWARD_DENOMINATOR as i128) as Amount;
        masternode_reward -= operator_reward;
    }

    let mut outs = Vec::with_capacity(2);
    if masternode_reward > 0 {
        outs.push(TransactionOutput::explicit(params.subsidy_asset, masternode_reward, payee.script_payout.clone()));
    }
    if operator_reward > 0 {
        outs.push(TransactionOutput::explicit(
            params.subsidy_asset,
            operator_reward,
            payee.script_operator_payout.clone(),
        ));
    }
    Some(outs)
}

/// Every expected masternode output must appear verbatim in `tx`
pub fn is_transaction_valid(
    tx: &Transaction,
    height: u32,
    reward: &AmountMap,
    params: &ChainParams,
    masternodes: &dyn MasternodeListSource,
) -> bool {
    if !masternodes.is_dip3_enforced(height) {
        return true;
    }
    let expected = match get_block_tx_outs(height, reward, params, masternodes) {
        Some(outs) => outs,
        None => {
            warn!("no masternode payee known for height {}", height);
            return true;
        }
    };
    for output in &expected {
        if !tx.outputs.contains(output) {
            debug!(
                "expected masternode payment of {} to {} missing at height {}",
                output.value.amount(),
                hex::encode(&output.script_pubkey),
                height
            );
            return false;
        }
    }
    true
}

/// IsBlockValueValid: ℬ × ℕ × AmountMap → {valid, invalid}
///
/// Let out = value_out(coinbase). Then:
/// 1. height > 1 and not a superblock height: out ≤ reward
/// 2. height > 1: out ≤ reward + superblock_limit(height)
/// 3. not synced: accept (bounds of 2 were honoured)
/// 4. no superblock triggered: out ≤ reward
/// 5. superblock triggered: the superblock must be valid
pub fn is_block_value_valid(
    block: &Block,
    height: u32,
    reward: &AmountMap,
    params: &ChainParams,
    governance: &dyn Governance,
) -> Result<ValidationResult> {
    let coinbase = match block.transactions.first() {
        Some(tx) => tx,
        None => return Ok(ValidationResult::Invalid(RejectReason::CoinbaseMissing)),
    };
    let value_out = value_out_map(coinbase);
    let reward_met = value_out <= *reward;
    let superblock_max = reward.clone() + governance.superblock_payments_limit(height);

    let invalid = |msg: String| -> Result<ValidationResult> {
        debug!("{}", msg);
        Ok(ValidationResult::Invalid(RejectReason::BlockValue(msg)))
    };

    if height > 1 && !params.is_superblock_height(height) {
        if !reward_met {
            return invalid(format!(
                "coinbase pays too much at height {} (actual={} vs limit={}), only regular blocks are allowed at this height",
                height, value_out, reward
            ));
        }
        return Ok(ValidationResult::Valid);
    }

    if height > 1 && !(value_out <= superblock_max) {
        return invalid(format!(
            "coinbase pays too much at height {} (actual={} vs limit={}), exceeded superblock max value",
            height, value_out, superblock_max
        ));
    }

    if !governance.is_synced() {
        debug!("not synced, checked superblock bounds only at height {}", height);
        return Ok(ValidationResult::Valid);
    }

    if !governance.is_superblock_triggered(height) {
        if !reward_met {
            return invalid(format!(
                "coinbase pays too much at height {} (actual={} vs limit={}), no triggered superblock detected",
                height, value_out, reward
            ));
        }
        return Ok(ValidationResult::Valid);
    }

    if !governance.is_superblock_valid(coinbase, height, reward) {
        warn!("invalid superblock detected at height {}", height);
        return invalid(format!("invalid superblock detected at height {}", height));
    }
    Ok(ValidationResult::Valid)
}

/// IsBlockPayeeValid: 𝒯𝒳 × ℕ × AmountMap → {valid, invalid}
///
/// Accepts when governance is disabled or before superblocks start; otherwise
/// a triggered superblock must be valid and the masternode must be paid.
pub fn is_block_payee_valid(
    tx: &Transaction,
    height: u32,
    reward: &AmountMap,
    params: &ChainParams,
    masternodes: &dyn MasternodeListSource,
    governance: &dyn Governance,
) -> Result<ValidationResult> {
    if governance.is_disabled() {
        debug!("governance disabled, skipping payee checks at height {}", height);
        return Ok(ValidationResult::Valid);
    }
    if height < params.superblock_start_block {
        return Ok(ValidationResult::Valid);
    }

    if governance.is_superblock_triggered(height) && !governance.is_superblock_valid(tx, height, reward) {
        warn!("invalid superblock payee at height {}", height);
        return Ok(ValidationResult::Invalid(RejectReason::BlockPayee(format!(
            "invalid superblock detected at height {}",
            height
        ))));
    }

    if is_transaction_valid(tx, height, reward, params, masternodes) {
        Ok(ValidationResult::Valid)
    } else {
        Ok(ValidationResult::Invalid(RejectReason::BlockPayee(format!(
            "invalid masternode payment at height {}",
            height
        ))))
    }
}
