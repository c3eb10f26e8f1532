//! Block index tree and the storage collaborators consensus reads from
//!
//! The tree is an arena of [`BlockIndex`] entries addressed by [`BlockId`];
//! parents are stored as ids so walks backward never borrow across entries.
//! UTXO lookup and transaction-index/block-file access are traits so callers
//! plug in their own storage.

use crate::block::block_hash;
use crate::error::{ConsensusError, Result};
use crate::transaction::txid;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Position of a block in the tree arena
pub type BlockId = usize;

/// Chain metadata kept for every known block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub hash: Hash,
    pub prev: Option<BlockId>,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    pub proof_of_stake: bool,
    /// Kernel hash for stake blocks; unused for work blocks
    pub hash_proof: Hash,
    pub stake_modifier: u64,
    pub generated_stake_modifier: bool,
    pub stake_entropy_bit: u8,
}

impl BlockIndex {
    pub fn new(hash: Hash, prev: Option<BlockId>, height: u32, time: u32, bits: u32, proof_of_stake: bool) -> Self {
        BlockIndex {
            hash,
            prev,
            height,
            time,
            bits,
            proof_of_stake,
            hash_proof: [0; 32],
            stake_modifier: 0,
            generated_stake_modifier: false,
            stake_entropy_bit: 0,
        }
    }

    /// Build an index entry for `header` on top of `prev`
    pub fn from_header(header: &BlockHeader, prev: Option<BlockId>) -> Self {
        BlockIndex::new(
            block_hash(header),
            prev,
            header.height,
            header.time,
            header.bits,
            header.is_proof_of_stake(),
        )
    }

    /// Hash used for stake modifier candidate selection
    pub fn selection_proof(&self) -> Hash {
        if self.proof_of_stake {
            self.hash_proof
        } else {
            self.hash
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash, BlockId>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; its `prev` must already be in the tree
    ///
    /// # Panics
    ///
    /// Panics if `prev` refers to an unknown id.
    pub fn insert(&mut self, index: BlockIndex) -> BlockId {
        if let Some(prev) = index.prev {
            assert!(prev < self.entries.len(), "parent {} not in tree", prev);
        }
        let id = self.entries.len();
        self.by_hash.insert(index.hash, id);
        self.entries.push(index);
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not returned by [`insert`](Self::insert).
    pub fn get(&self, id: BlockId) -> &BlockIndex {
        &self.entries[id]
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut BlockIndex {
        &mut self.entries[id]
    }

    pub fn lookup(&self, hash: &Hash) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ancestor of `id` at `height`, walking parent links
    pub fn ancestor(&self, id: BlockId, height: u32) -> Option<BlockId> {
        let mut current = id;
        loop {
            let index = self.get(current);
            if index.height == height {
                return Some(current);
            }
            if index.height < height {
                return None;
            }
            current = index.prev?;
        }
    }
}

/// UTXO lookup
pub trait CoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

impl CoinView for UtxoSet {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.get(outpoint).cloned()
    }
}

/// Location of a transaction on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskTxPos {
    pub file: u32,
    pub block_pos: u32,
    pub tx_offset: u32,
}

/// Transaction index and block file access
///
/// `read_tx_index` returns `Err(TxIndexUnavailable)` when the node keeps no
/// index and `Ok(None)` when the index has no entry.
pub trait BlockStore {
    fn read_tx_index(&self, txid: &Hash) -> Result<Option<DiskTxPos>>;
    fn read_block_tx(&self, pos: &DiskTxPos) -> Result<(BlockHeader, Transaction)>;
}

/// Block store held in memory, indexing every transaction of added blocks
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    tx_index_enabled: bool,
    blocks: Vec<Block>,
    tx_index: HashMap<Hash, DiskTxPos>,
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        MemoryBlockStore { tx_index_enabled: true, blocks: Vec::new(), tx_index: HashMap::new() }
    }

    /// A store whose transaction index is switched off
    pub fn without_tx_index() -> Self {
        MemoryBlockStore { tx_index_enabled: false, ..Self::new() }
    }

    pub fn add_block(&mut self, block: Block) {
        let block_pos = self.blocks.len() as u32;
        for (offset, tx) in block.transactions.iter().enumerate() {
            let pos = DiskTxPos { file: 0, block_pos, tx_offset: offset as u32 };
            self.tx_index.insert(txid(tx), pos);
        }
        self.blocks.push(block);
    }
}

impl BlockStore for MemoryBlockStore {
    fn read_tx_index(&self, txid: &Hash) -> Result<Option<DiskTxPos>> {
        if !self.tx_index_enabled {
            return Err(ConsensusError::TxIndexUnavailable);
        }
        Ok(self.tx_index.get(txid).copied())
    }

    fn read_block_tx(&self, pos: &DiskTxPos) -> Result<(BlockHeader, Transaction)> {
        let block = self
            .blocks
            .get(pos.block_pos as usize)
            .ok_or_else(|| ConsensusError::BlockRead(format!("no block at position {}", pos.block_pos)))?;
        let tx = block
            .transactions
            .get(pos.tx_offset as usize)
            .ok_or_else(|| ConsensusError::BlockRead(format!("no transaction at offset {}", pos.tx_offset)))?;
        Ok((block.header.clone(), tx.clone()))
    }
}
